//! Allocators that ship with the crate.
//!
//! Any type implementing [`Allocator`](crate::Allocator) can back a
//! [`Function`](crate::Function). These cover the common cases:
//!
//! - [`Counting`]: wraps another allocator and counts what passes through it.
//!   Useful to assert that an operation did not allocate.
//! - [`Arena`]: a bump allocator over a caller-supplied buffer, for example
//!   one that lives on the stack.
//! - [`Pool`]: a shared, thread-safe pool that recycles freed blocks by
//!   layout.

mod arena;
mod counting;
mod pool;
mod pool_lock;

pub use self::{arena::Arena, counting::Counting, pool::Pool};
