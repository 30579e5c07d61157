//! Commonly used items for convenient importing.
//!
//! ```
//! use polyfn::prelude::*;
//!
//! let f: Function<dyn Fn(u32) -> u32> = Function::new(|x: u32| x + 1);
//! assert!(f != Empty);
//! assert_eq!(f.call(1), 2);
//! ```

pub use crate::{
    Allocator, Discard, Function, Global,
    error::{AllocError, InvalidState},
    markers::{Empty, Local, MayUnwind, NoUnwind, SendSync},
};
