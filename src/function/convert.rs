//! Conversions between containers of related descriptors and markers.
//!
//! Every conversion moves the payload record over as-is: the record does not
//! depend on the const-ness of the descriptor or on the markers, so nothing is
//! allocated, cloned or re-wrapped.

use core::marker::PhantomData;

use polyfn_internals::Allocator;

use super::Function;
use crate::{
    markers::{Local, MayUnwind, NoUnwind, SendSync, ThreadSafetyMarker, UnwindMarker},
    signature::{SharedSignature, Signature},
};

impl<S, A, U, T> Function<S, A, U, T>
where
    S: ?Sized + SharedSignature,
    A: Allocator,
    U: UnwindMarker,
    T: ThreadSafetyMarker,
{
    /// Converts a const-invocation container into a mutable-invocation one.
    ///
    /// ```
    /// use polyfn::Function;
    ///
    /// let f: Function<dyn Fn(u8) -> u8> = Function::new(|x: u8| x + 1);
    /// let mut g: Function<dyn FnMut(u8) -> u8> = f.into_mut();
    /// assert_eq!(g.call_mut(1), 2);
    /// ```
    ///
    /// The reverse conversion does not exist: a callable that needs exclusive
    /// access cannot be invoked through a shared reference.
    #[inline]
    #[must_use]
    pub fn into_mut(self) -> Function<S::Exclusive, A, U, T> {
        let (raw, alloc) = self.into_parts();
        Function {
            // The invocation stubs only need shared access, which exclusive
            // access subsumes.
            raw,
            alloc,
            _marker: PhantomData,
        }
    }
}

impl<S, A, T> Function<S, A, MayUnwind, T>
where
    S: ?Sized + Signature,
    A: Allocator,
    T: ThreadSafetyMarker,
{
    /// Promises that calls through the returned container never unwind.
    ///
    /// If the stored callable panics anyway, the process aborts at the call
    /// boundary.
    #[inline]
    #[must_use]
    pub fn assume_no_unwind(self) -> Function<S, A, NoUnwind, T> {
        let (raw, alloc) = self.into_parts();
        Function {
            raw,
            alloc,
            _marker: PhantomData,
        }
    }
}

impl<S, A, T> Function<S, A, NoUnwind, T>
where
    S: ?Sized + Signature,
    A: Allocator,
    T: ThreadSafetyMarker,
{
    /// Drops the promise that calls never unwind.
    #[inline]
    #[must_use]
    pub fn into_may_unwind(self) -> Function<S, A, MayUnwind, T> {
        let (raw, alloc) = self.into_parts();
        Function {
            raw,
            alloc,
            _marker: PhantomData,
        }
    }
}

impl<S, A, T> From<Function<S, A, NoUnwind, T>> for Function<S, A, MayUnwind, T>
where
    S: ?Sized + Signature,
    A: Allocator,
    T: ThreadSafetyMarker,
{
    #[inline]
    fn from(function: Function<S, A, NoUnwind, T>) -> Self {
        function.into_may_unwind()
    }
}

impl<S, A, U> Function<S, A, U, SendSync>
where
    S: ?Sized + Signature,
    A: Allocator,
    U: UnwindMarker,
{
    /// Gives up the thread-safety guarantee.
    ///
    /// The returned container can be reassigned to callables that are not
    /// `Send + Sync`, and is itself neither `Send` nor `Sync`.
    ///
    /// ```
    /// use std::{cell::Cell, rc::Rc};
    ///
    /// use polyfn::Function;
    ///
    /// let f: Function<dyn Fn() -> u32> = Function::new(|| 1u32);
    /// let mut local = f.into_local();
    ///
    /// let hits = Rc::new(Cell::new(0u32));
    /// let seen = Rc::clone(&hits);
    /// local.set(move || {
    ///     seen.set(seen.get() + 1);
    ///     seen.get()
    /// });
    /// assert_eq!(local.call(), 1);
    /// ```
    #[inline]
    #[must_use]
    pub fn into_local(self) -> Function<S, A, U, Local> {
        let (raw, alloc) = self.into_parts();
        Function {
            // A `Send + Sync` callable trivially satisfies the local contract.
            raw,
            alloc,
            _marker: PhantomData,
        }
    }
}

impl<S, A, U> From<Function<S, A, U, SendSync>> for Function<S, A, U, Local>
where
    S: ?Sized + Signature,
    A: Allocator,
    U: UnwindMarker,
{
    #[inline]
    fn from(function: Function<S, A, U, SendSync>) -> Self {
        function.into_local()
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;

    use polyfn_internals::Global;

    use super::*;

    #[test]
    fn test_conversions_keep_the_payload() {
        let tracker = Rc::new(5);
        let captured = Rc::clone(&tracker);
        let f: Function<dyn Fn() -> i32, Global, MayUnwind, Local> =
            Function::new(move || *captured + 1);
        assert_eq!(Rc::strong_count(&tracker), 2);

        let g = f.assume_no_unwind();
        assert_eq!(g.call(), 6);
        let h: Function<dyn Fn() -> i32, Global, MayUnwind, Local> = g.into();
        let mut m = h.into_mut();
        assert_eq!(m.call_mut(), 6);
        assert_eq!(Rc::strong_count(&tracker), 2);

        drop(m);
        assert_eq!(Rc::strong_count(&tracker), 1);
    }

    #[test]
    fn test_into_local_accepts_local_callables() {
        let f: Function<dyn FnMut() -> usize> = Function::new(|| 0usize);
        let mut local: Function<dyn FnMut() -> usize, Global, MayUnwind, Local> = f.into();
        assert_eq!(local.call_mut(), 0);

        let tracker = Rc::new(());
        let captured = Rc::clone(&tracker);
        local.set(move || Rc::strong_count(&captured));
        assert_eq!(local.call_mut(), 2);
    }

    #[test]
    fn test_convert_empty() {
        let f: Function<dyn Fn(u8)> = Function::empty();
        assert!(f.into_mut().is_empty());
    }
}
