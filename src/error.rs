//! Errors reported by [`Function`](crate::Function).
//!
//! Allocation failures are reported as [`AllocError`], which carries the layout
//! that could not be allocated. Calling an empty container through one of the
//! `try_call` methods is reported as [`InvalidState`].
//!
//! Incompatible callables are not a runtime error: they are rejected at compile
//! time by the [`Callable`](crate::Callable) predicate.

pub use polyfn_internals::AllocError;

/// The error returned when an empty [`Function`](crate::Function) is invoked.
///
/// ```
/// use polyfn::{Function, error::InvalidState};
///
/// let f: Function<dyn Fn() -> u32> = Function::empty();
/// assert_eq!(f.try_call(), Err(InvalidState));
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
#[derive(derive_more::Display, derive_more::Error)]
#[display("called an empty `Function`")]
pub struct InvalidState;
