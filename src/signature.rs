//! Signature descriptors and the storability predicate.
//!
//! A [`Function`](crate::Function) is parameterized by a *signature
//! descriptor*: a trait-object type that is only ever used at the type level.
//!
//! | Descriptor                   | Invocation            | Accepts                   |
//! |------------------------------|-----------------------|---------------------------|
//! | `dyn Fn(A1, .., An) -> R`    | `call(&self, ..)`     | `C: Fn(A1, .., An) -> T`    |
//! | `dyn FnMut(A1, .., An) -> R` | `call_mut(&mut self, ..)` | `C: FnMut(A1, .., An) -> T` |
//!
//! In both cases the callable must also be `Clone + 'static`, and its result
//! `T` must convert into `R` through [`Into`]. Callables whose result should
//! be thrown away can be wrapped in [`Discard`] and stored under a signature
//! returning `()`. Signatures with up to eight arguments are supported.
//!
//! The const-ness of the invocation is one axis of the descriptor. The other
//! axis, whether a call may unwind, is the
//! [`UnwindMarker`](crate::markers::UnwindMarker) parameter of the container.
//!
//! # The storability predicate
//!
//! [`Callable<S>`] is implemented exactly for the types that may be stored
//! under the descriptor `S`. A callable that does not fit is rejected at
//! compile time:
//!
//! ```compile_fail
//! use polyfn::Function;
//!
//! let mut count = 0;
//! // `FnMut` closures cannot be stored under a const-invocation signature.
//! let f: Function<dyn Fn() -> i32> = Function::new(move || {
//!     count += 1;
//!     count
//! });
//! ```
//!
//! Closure parameters must be annotated, because the descriptor is matched
//! through [`Callable`] rather than through a direct `Fn` bound:
//!
//! ```
//! use polyfn::Function;
//!
//! let f: Function<dyn Fn(i32, i32) -> i64> = Function::new(|a: i32, b: i32| a * b);
//! assert_eq!(f.call(6, 7), 42i64);
//! ```

use polyfn_internals::{Allocator, RecordHandle};

/// A signature descriptor.
///
/// This trait is implemented for `dyn Fn(A1, .., An) -> R` and
/// `dyn FnMut(A1, .., An) -> R` with up to eight arguments.
///
/// # Safety
///
/// `Invoke` must be an `unsafe fn(RecordHandle, A1, .., An) -> R` pointer
/// type. Implementing this trait outside of this crate is not supported.
pub unsafe trait Signature {
    /// The argument types, as a tuple.
    type Args;
    /// The return type.
    type Output;
    /// The type of the invocation stub stored in payload records.
    #[doc(hidden)]
    type Invoke: Copy;
}

/// A const-invocation signature descriptor.
///
/// Every callable that can be invoked through a shared reference can also be
/// invoked through an exclusive one. `Exclusive` is the mutable-invocation
/// descriptor with the same arguments and result, and it shares the same
/// invocation stubs.
pub trait SharedSignature: Signature {
    /// The mutable-invocation counterpart of this descriptor.
    type Exclusive: ?Sized
        + Signature<Args = Self::Args, Output = Self::Output, Invoke = Self::Invoke>;
}

/// The storability predicate: `C: Callable<S>` holds iff a `C` can be stored in
/// a container with descriptor `S`.
///
/// # Safety
///
/// `invoke_stub::<A>()` must return a stub that, given a handle to a payload
/// record of `Self` allocated with allocator type `A`, invokes the stored
/// value with the given arguments and converts the result to `S::Output`.
/// For const-invocation descriptors the stub must only access the value
/// through a shared reference.
pub unsafe trait Callable<S: ?Sized + Signature>: Clone + 'static {
    /// Returns the invocation stub for `Self` stored with allocator type `A`.
    ///
    /// The stub is generated once per callable type and container type, so
    /// two containers holding the same callable type share it.
    #[doc(hidden)]
    fn invoke_stub<A: Allocator>() -> S::Invoke;
}

/// Adapter that throws away the result of the wrapped callable.
///
/// `Discard<F>` is storable under any descriptor returning `()` whose
/// arguments `F` accepts, whatever `F` itself returns.
///
/// ```
/// use polyfn::{Discard, Function};
///
/// let f: Function<dyn Fn(&'static str)> = Function::new(Discard(|s: &'static str| s.len()));
/// f.call("ignored");
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct Discard<F>(pub F);

macro_rules! impl_signatures {
    ($($arg:ident $val:ident),*) => {
        // SAFETY: `Invoke` is the stub type for these arguments
        unsafe impl<R, $($arg,)*> Signature for dyn Fn($($arg),*) -> R {
            type Args = ($($arg,)*);
            type Output = R;
            type Invoke = unsafe fn(RecordHandle, $($arg),*) -> R;
        }

        // SAFETY: `Invoke` is the stub type for these arguments
        unsafe impl<R, $($arg,)*> Signature for dyn FnMut($($arg),*) -> R {
            type Args = ($($arg,)*);
            type Output = R;
            type Invoke = unsafe fn(RecordHandle, $($arg),*) -> R;
        }

        impl<R, $($arg,)*> SharedSignature for dyn Fn($($arg),*) -> R {
            type Exclusive = dyn FnMut($($arg),*) -> R;
        }

        // SAFETY: The stub casts the handle back to a record of `F` and only
        // takes a shared reference to it.
        unsafe impl<F, T, R, $($arg,)*> Callable<dyn Fn($($arg),*) -> R> for F
        where
            F: Fn($($arg),*) -> T + Clone + 'static,
            T: Into<R>,
        {
            #[inline]
            fn invoke_stub<Al: Allocator>() -> unsafe fn(RecordHandle, $($arg),*) -> R {
                |handle: RecordHandle, $($val: $arg),*| -> R {
                    // SAFETY: This stub is only ever stored in records holding
                    // an `F` allocated with `Al`.
                    let callable = unsafe {
                        handle.callable::<F, unsafe fn(RecordHandle, $($arg),*) -> R, Al>()
                    };
                    // SAFETY: The record is alive for the duration of the call
                    // and const-invocation containers only hand out shared
                    // access.
                    let callable: &F = unsafe { callable.as_ref() };
                    callable($($val),*).into()
                }
            }
        }

        // SAFETY: The stub casts the handle back to a record of `F`.
        unsafe impl<F, T, R, $($arg,)*> Callable<dyn FnMut($($arg),*) -> R> for F
        where
            F: FnMut($($arg),*) -> T + Clone + 'static,
            T: Into<R>,
        {
            #[inline]
            fn invoke_stub<Al: Allocator>() -> unsafe fn(RecordHandle, $($arg),*) -> R {
                |handle: RecordHandle, $($val: $arg),*| -> R {
                    // SAFETY: This stub is only ever stored in records holding
                    // an `F` allocated with `Al`.
                    let mut callable = unsafe {
                        handle.callable::<F, unsafe fn(RecordHandle, $($arg),*) -> R, Al>()
                    };
                    // SAFETY: The record is alive for the duration of the call
                    // and the container is borrowed exclusively.
                    let callable: &mut F = unsafe { callable.as_mut() };
                    callable($($val),*).into()
                }
            }
        }

        // SAFETY: The stub casts the handle back to a record of `Discard<F>`
        // and only takes a shared reference to it.
        unsafe impl<F, T, $($arg,)*> Callable<dyn Fn($($arg),*)> for Discard<F>
        where
            F: Fn($($arg),*) -> T + Clone + 'static,
        {
            #[inline]
            fn invoke_stub<Al: Allocator>() -> unsafe fn(RecordHandle, $($arg),*) {
                |handle: RecordHandle, $($val: $arg),*| {
                    // SAFETY: This stub is only ever stored in records holding
                    // a `Discard<F>` allocated with `Al`.
                    let callable = unsafe {
                        handle.callable::<Discard<F>, unsafe fn(RecordHandle, $($arg),*), Al>()
                    };
                    // SAFETY: See the shared stub above
                    let callable: &Discard<F> = unsafe { callable.as_ref() };
                    let _ = (callable.0)($($val),*);
                }
            }
        }

        // SAFETY: The stub casts the handle back to a record of `Discard<F>`.
        unsafe impl<F, T, $($arg,)*> Callable<dyn FnMut($($arg),*)> for Discard<F>
        where
            F: FnMut($($arg),*) -> T + Clone + 'static,
        {
            #[inline]
            fn invoke_stub<Al: Allocator>() -> unsafe fn(RecordHandle, $($arg),*) {
                |handle: RecordHandle, $($val: $arg),*| {
                    // SAFETY: This stub is only ever stored in records holding
                    // a `Discard<F>` allocated with `Al`.
                    let mut callable = unsafe {
                        handle.callable::<Discard<F>, unsafe fn(RecordHandle, $($arg),*), Al>()
                    };
                    // SAFETY: See the exclusive stub above
                    let callable: &mut Discard<F> = unsafe { callable.as_mut() };
                    let _ = (callable.0)($($val),*);
                }
            }
        }
    };
}

impl_signatures!();
impl_signatures!(A1 a1);
impl_signatures!(A1 a1, A2 a2);
impl_signatures!(A1 a1, A2 a2, A3 a3);
impl_signatures!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_signatures!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_signatures!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);
impl_signatures!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7);
impl_signatures!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8);

#[cfg(test)]
mod tests {
    use polyfn_internals::Global;

    use super::*;

    #[test]
    fn test_storability_predicate() {
        static_assertions::assert_impl_all!(fn(i32) -> i32: Callable<dyn Fn(i32) -> i32>);
        static_assertions::assert_impl_all!(fn(i32) -> i32: Callable<dyn FnMut(i32) -> i32>);
        static_assertions::assert_impl_all!(fn(i32) -> i32: Callable<dyn Fn(i32) -> i64>);
        static_assertions::assert_not_impl_any!(fn(i32) -> i32: Callable<dyn Fn(i32)>);
        static_assertions::assert_not_impl_any!(fn(i32) -> i64: Callable<dyn Fn(i32) -> i32>);
        static_assertions::assert_not_impl_any!(fn(i32) -> i32: Callable<dyn Fn(u8) -> i32>);
        static_assertions::assert_impl_all!(Discard<fn(i32) -> i32>: Callable<dyn Fn(i32)>);
    }

    #[test]
    fn test_stub_shared_per_type() {
        let first = <fn(i32) -> i32 as Callable<dyn Fn(i32) -> i32>>::invoke_stub::<Global>();
        let second = <fn(i32) -> i32 as Callable<dyn Fn(i32) -> i32>>::invoke_stub::<Global>();
        assert!(core::ptr::fn_addr_eq(first, second));
    }
}
