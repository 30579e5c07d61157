//! Marker types for the empty state, the unwinding contract and thread safety.
//!
//! The third type parameter of [`Function<S, A, U, T>`](crate::Function)
//! decides what happens when a stored callable panics:
//!
//! - [`MayUnwind`]: The panic unwinds into the caller of
//!   [`call`](crate::Function::call), like any other Rust function call. This is
//!   the default.
//! - [`NoUnwind`]: The container promises its callers that calls never unwind.
//!   A panic escaping the stored callable aborts the process instead.
//!
//! Both markers accept exactly the same callables. Rust cannot prove at compile
//! time that a closure never panics, so the promise is enforced where the call
//! happens rather than where the callable is stored. This also means that
//! converting between the two (see
//! [`assume_no_unwind`](crate::Function::assume_no_unwind)) never has to touch
//! the stored payload.
//!
//! # Examples
//!
//! ```
//! use polyfn::{Function, Global, markers};
//!
//! let f: Function<dyn Fn(i32) -> i32, Global, markers::NoUnwind> =
//!     Function::new(|x: i32| x * 2).assume_no_unwind();
//! assert_eq!(f.call(21), 42);
//! ```
//!
//! The fourth parameter decides whether the container may cross threads:
//!
//! - [`SendSync`]: Only `Send + Sync` callables can be stored, and the
//!   container is `Send`/`Sync` whenever its allocator is. This is the
//!   default.
//! - [`Local`]: Any callable can be stored, including ones capturing `Rc` or
//!   `Cell`, and the container never leaves its thread.
//!
//! [`Empty`] is the value-level marker for "no callable":
//!
//! ```
//! use polyfn::{Function, markers::Empty};
//!
//! let mut f: Function<dyn Fn() -> u8> = Function::new(|| 7u8);
//! assert!(f != Empty);
//!
//! f.clear();
//! assert!(f == Empty);
//! ```

/// The empty marker.
///
/// Converting [`Empty`] into a [`Function`](crate::Function) yields an empty
/// container, and every container can be compared against it.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct Empty;

/// Marker type for containers whose calls may unwind.
///
/// A panic inside the stored callable propagates to the caller. This is the
/// default unwinding marker.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct MayUnwind;

/// Marker type for containers whose calls never unwind.
///
/// If the stored callable panics, the panic is turned into an abort at the call
/// boundary. Callers can therefore rely on a call either returning normally or
/// not returning at all.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct NoUnwind;

/// Marker type for containers that can be sent to and shared between threads.
///
/// Every callable stored under this marker is `Send + Sync`, so the container
/// itself is `Send` when its allocator is `Send`, and `Sync` when its
/// allocator is `Sync`. This is the default thread-safety marker.
///
/// ```
/// use std::{
///     sync::{Arc, Mutex},
///     thread,
/// };
///
/// use polyfn::Function;
///
/// let handler: Function<dyn Fn(u8) -> u8> = Function::new(|x: u8| x + 1);
/// let shared = Arc::new(Mutex::new(handler));
///
/// let worker = Arc::clone(&shared);
/// let result = thread::spawn(move || worker.lock().unwrap().call(1))
///     .join()
///     .unwrap();
/// assert_eq!(result, 2);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct SendSync;

/// Marker type for containers that stay on the thread that created them.
///
/// Use `Local` for callables capturing `Rc`, `Cell`, raw pointers or anything
/// else that is not `Send + Sync`. A thread-safe container can be turned into
/// a local one with [`into_local`](crate::Function::into_local).
///
/// ```
/// use std::rc::Rc;
///
/// use polyfn::{Function, Global, markers};
///
/// let shared = Rc::new(5);
/// let f: Function<dyn Fn() -> i32, Global, markers::MayUnwind, markers::Local> =
///     Function::new(move || *shared);
/// assert_eq!(f.call(), 5);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct Local;

mod sealed_unwind_marker {
    use super::*;

    pub trait Sealed: 'static {}

    impl Sealed for MayUnwind {}
    impl Sealed for NoUnwind {}
}

/// Marker trait for the unwinding contract of a container.
///
/// This trait is sealed and cannot be implemented outside of this crate. It is
/// implemented for [`MayUnwind`] and [`NoUnwind`].
pub trait UnwindMarker: sealed_unwind_marker::Sealed {
    /// Runs `f` under this unwinding contract.
    #[doc(hidden)]
    fn run<T>(f: impl FnOnce() -> T) -> T;
}

impl UnwindMarker for MayUnwind {
    #[inline(always)]
    fn run<T>(f: impl FnOnce() -> T) -> T {
        f()
    }
}

impl UnwindMarker for NoUnwind {
    #[inline]
    fn run<T>(f: impl FnOnce() -> T) -> T {
        /// Panics when dropped. Dropping it while already unwinding is a
        /// panic during a panic, which the runtime turns into an abort.
        struct AbortOnUnwind;

        impl Drop for AbortOnUnwind {
            fn drop(&mut self) {
                panic!("a `NoUnwind` function panicked");
            }
        }

        let guard = AbortOnUnwind;
        let value = f();
        core::mem::forget(guard);
        value
    }
}

mod sealed_thread_safety_marker {
    use super::*;

    pub trait Sealed: 'static {}

    impl Sealed for SendSync {}
    impl Sealed for Local {}
}

/// Marker trait for the thread-safety contract of a container.
///
/// This trait is sealed and cannot be implemented outside of this crate. It is
/// implemented for [`SendSync`] and [`Local`].
pub trait ThreadSafetyMarker: sealed_thread_safety_marker::Sealed {}

impl ThreadSafetyMarker for SendSync {}
impl ThreadSafetyMarker for Local {}

/// Marker trait combining the storage and thread-safety requirements of a
/// callable.
///
/// - For `T = Local`: Implemented for all `Sized + 'static` types.
/// - For `T = SendSync`: Implemented only for `Sized + 'static` types that are
///   also `Send + Sync`.
///
/// Every constructor and setter of [`Function`](crate::Function) requires
/// `C: ObjectMarkerFor<T>`, so a thread-safe container can never hold a
/// callable that is not:
///
/// ```compile_fail
/// use std::rc::Rc;
///
/// use polyfn::Function;
///
/// let shared = Rc::new(5);
/// let f: Function<dyn Fn() -> i32> = Function::new(move || *shared);
/// ```
pub trait ObjectMarkerFor<T: ThreadSafetyMarker>: Sized + 'static {}

impl<O: Sized + 'static> ObjectMarkerFor<Local> for O {}

impl<O: Sized + Send + Sync + 'static> ObjectMarkerFor<SendSync> for O {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_passes_values_through() {
        assert_eq!(MayUnwind::run(|| 1 + 1), 2);
        assert_eq!(NoUnwind::run(|| "no panic"), "no panic");
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn test_may_unwind_propagates() {
        MayUnwind::run(|| -> u8 { panic!("boom") });
    }

    #[test]
    fn test_object_markers() {
        static_assertions::assert_impl_all!(u32: ObjectMarkerFor<SendSync>);
        static_assertions::assert_impl_all!(u32: ObjectMarkerFor<Local>);
        static_assertions::assert_impl_all!(alloc::rc::Rc<u32>: ObjectMarkerFor<Local>);
        static_assertions::assert_not_impl_any!(alloc::rc::Rc<u32>: ObjectMarkerFor<SendSync>);
        static_assertions::assert_not_impl_any!(core::cell::Cell<u32>: ObjectMarkerFor<SendSync>);
    }
}
