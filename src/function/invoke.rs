//! Invocation of [`Function`] and construction from function pointers.
//!
//! Invocation is generated once per arity, for the const-invocation
//! (`dyn Fn`) and mutable-invocation (`dyn FnMut`) descriptors.

use polyfn_internals::Allocator;

use super::Function;
use crate::{
    error::InvalidState,
    markers::{ObjectMarkerFor, ThreadSafetyMarker, UnwindMarker},
};

macro_rules! impl_invoke {
    ($($arg:ident $val:ident),*) => {
        impl<R, $($arg,)* Al, U, T> Function<dyn Fn($($arg),*) -> R, Al, U, T>
        where
            Al: Allocator,
            U: UnwindMarker,
            T: ThreadSafetyMarker,
        {
            /// Invokes the stored callable.
            ///
            /// # Panics
            ///
            /// Panics if the container is empty. With the
            /// [`MayUnwind`](crate::markers::MayUnwind) marker, a panic of
            /// the stored callable propagates to the caller.
            #[inline]
            #[track_caller]
            pub fn call(&self, $($val: $arg),*) -> R {
                match self.try_call($($val),*) {
                    Ok(value) => value,
                    Err(error) => panic!("{error}"),
                }
            }

            /// Invokes the stored callable, or returns [`InvalidState`] if the
            /// container is empty.
            #[inline]
            pub fn try_call(&self, $($val: $arg),*) -> Result<R, InvalidState> {
                let raw = self.raw.as_ref().ok_or(InvalidState)?;
                let invoke = raw.invoker();
                let handle = raw.handle();

                Ok(U::run(move || {
                    // SAFETY: The stub was generated for the stored callable
                    // and this container's signature and allocator type. The
                    // record stays alive while `self` is borrowed, and the
                    // stub only takes shared access.
                    unsafe { invoke(handle, $($val),*) }
                }))
            }
        }

        impl<R, $($arg,)* Al, U, T> Function<dyn FnMut($($arg),*) -> R, Al, U, T>
        where
            Al: Allocator,
            U: UnwindMarker,
            T: ThreadSafetyMarker,
        {
            /// Invokes the stored callable, which may mutate its state.
            ///
            /// # Panics
            ///
            /// Panics if the container is empty. With the
            /// [`MayUnwind`](crate::markers::MayUnwind) marker, a panic of
            /// the stored callable propagates to the caller.
            #[inline]
            #[track_caller]
            pub fn call_mut(&mut self, $($val: $arg),*) -> R {
                match self.try_call_mut($($val),*) {
                    Ok(value) => value,
                    Err(error) => panic!("{error}"),
                }
            }

            /// Invokes the stored callable, or returns [`InvalidState`] if the
            /// container is empty.
            #[inline]
            pub fn try_call_mut(&mut self, $($val: $arg),*) -> Result<R, InvalidState> {
                let raw = self.raw.as_ref().ok_or(InvalidState)?;
                let invoke = raw.invoker();
                let handle = raw.handle();

                Ok(U::run(move || {
                    // SAFETY: The stub was generated for the stored callable
                    // and this container's signature and allocator type. The
                    // record stays alive and unaliased while `self` is
                    // borrowed exclusively.
                    unsafe { invoke(handle, $($val),*) }
                }))
            }
        }

        impl<R, $($arg,)* Al, U, T> From<fn($($arg),*) -> R>
            for Function<dyn Fn($($arg),*) -> R, Al, U, T>
        where
            R: 'static,
            $($arg: 'static,)*
            Al: Allocator + Default,
            U: UnwindMarker,
            T: ThreadSafetyMarker,
            fn($($arg),*) -> R: ObjectMarkerFor<T>,
        {
            #[inline]
            fn from(f: fn($($arg),*) -> R) -> Self {
                Self::new(f)
            }
        }

        impl<R, $($arg,)* Al, U, T> From<fn($($arg),*) -> R>
            for Function<dyn FnMut($($arg),*) -> R, Al, U, T>
        where
            R: 'static,
            $($arg: 'static,)*
            Al: Allocator + Default,
            U: UnwindMarker,
            T: ThreadSafetyMarker,
            fn($($arg),*) -> R: ObjectMarkerFor<T>,
        {
            #[inline]
            fn from(f: fn($($arg),*) -> R) -> Self {
                Self::new(f)
            }
        }
    };
}

impl_invoke!();
impl_invoke!(A1 a1);
impl_invoke!(A1 a1, A2 a2);
impl_invoke!(A1 a1, A2 a2, A3 a3);
impl_invoke!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_invoke!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_invoke!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);
impl_invoke!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7);
impl_invoke!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8);
