//! The [`Function`] container.
//!
//! This module encapsulates the `raw` and `alloc` fields of [`Function`]. The
//! safety of every call into [`RawPayload`] rests on one invariant that is only
//! verifiable here: **an engaged payload was allocated by an allocator equal to
//! the container's current `alloc`**. Every method that replaces `alloc`
//! releases or transfers the payload first, under the propagation rules of
//! [`Allocator`].

mod convert;
mod invoke;

use core::{fmt, marker::PhantomData, mem::ManuallyDrop};

use polyfn_internals::{AllocError, Allocator, Global, RawPayload};

use crate::{
    markers::{Empty, MayUnwind, ObjectMarkerFor, SendSync, ThreadSafetyMarker, UnwindMarker},
    signature::{Callable, Signature},
};

/// An allocator-aware, type-erased callable of signature `S`.
///
/// A `Function` owns at most one callable. The callable lives in a payload
/// record allocated through `A`, next to the two entry points that know its
/// concrete type: the invocation stub and the lifecycle action dispatcher.
/// After construction the container never names the concrete type again.
///
/// - `S` is the signature descriptor, such as `dyn Fn(i32) -> i32` or
///   `dyn FnMut(&'a mut Vec<u8>)`. See [`signature`](crate::signature).
/// - `A` is the [`Allocator`] that supplies payload storage. It defaults to
///   [`Global`].
/// - `U` is the [`UnwindMarker`] that decides whether calls may unwind. It
///   defaults to [`MayUnwind`].
/// - `T` is the [`ThreadSafetyMarker`] that decides whether the container may
///   cross threads. It defaults to [`SendSync`], which only accepts
///   `Send + Sync` callables. See [`markers`](crate::markers).
///
/// # Value semantics
///
/// - Cloning deep-copies the stored callable. Cloning into an engaged
///   container reuses its storage when the old and new payload records have
///   the same layout.
/// - Moving with plain Rust moves transfers the callable and the allocator.
///   [`take`](Function::take) and [`move_from`](Function::move_from) move the
///   callable out of a container that stays behind, leaving it empty.
/// - [`swap`](Function::swap) exchanges callables without allocating when the
///   allocators compare equal or propagate on swap.
///
/// # Errors and panics
///
/// Methods that allocate come in pairs: `try_*` returns [`AllocError`], and
/// the plain form reports the failure through
/// [`handle_alloc_error`](alloc::alloc::handle_alloc_error), like the standard
/// collections do. When a reassignment needs a record of a different layout,
/// the old callable is destroyed before the new record is allocated. A failed
/// allocation therefore leaves the container empty rather than restoring its
/// previous callable.
///
/// Invoking an empty container panics. Use the `try_call` family to get an
/// [`InvalidState`](crate::error::InvalidState) error instead.
///
/// # Examples
///
/// ```
/// use polyfn::Function;
///
/// let double: Function<dyn Fn(i32) -> i32> = Function::new(|x: i32| x * 2);
/// assert_eq!(double.call(21), 42);
///
/// let copy = double.clone();
/// assert_eq!(copy.call(4), double.call(4));
/// ```
pub struct Function<S, A = Global, U = MayUnwind, T = SendSync>
where
    S: ?Sized + Signature,
    A: Allocator,
    U: UnwindMarker,
    T: ThreadSafetyMarker,
{
    /// The payload record, if engaged
    ///
    /// # Safety
    ///
    /// When engaged, the record was allocated by an allocator equal to
    /// `alloc`, and its invocation stub was generated for signature `S` and
    /// allocator type `A`. If `T` is [`SendSync`], the stored callable is
    /// `Send + Sync`.
    raw: Option<RawPayload<S::Invoke, A>>,
    /// The allocator used for all payload storage
    alloc: A,
    /// Ties the signature and both contracts to the container
    _marker: PhantomData<(fn() -> U, fn() -> T, *const S)>,
}

impl<S, A, U, T> Function<S, A, U, T>
where
    S: ?Sized + Signature,
    A: Allocator,
    U: UnwindMarker,
    T: ThreadSafetyMarker,
{
    /// Creates an empty container with a default-constructed allocator.
    #[inline]
    #[must_use]
    pub fn empty() -> Self
    where
        A: Default,
    {
        Self::empty_in(A::default())
    }

    /// Creates an empty container that will allocate through `alloc`.
    #[inline]
    #[must_use]
    pub const fn empty_in(alloc: A) -> Self {
        Self {
            raw: None,
            alloc,
            _marker: PhantomData,
        }
    }

    /// Creates a container holding `callable`, allocated through a
    /// default-constructed allocator.
    #[inline]
    #[must_use]
    pub fn new<C>(callable: C) -> Self
    where
        C: Callable<S> + ObjectMarkerFor<T>,
        A: Default,
    {
        Self::new_in(callable, A::default())
    }

    /// Creates a container holding `callable`, allocated through `alloc`.
    #[inline]
    #[must_use]
    pub fn new_in<C>(callable: C, alloc: A) -> Self
    where
        C: Callable<S> + ObjectMarkerFor<T>,
    {
        Self::try_new_in(callable, alloc).unwrap_or_else(|e| alloc_failure(e))
    }

    /// Creates a container holding `callable`, allocated through `alloc`, or
    /// returns the allocation failure.
    #[inline]
    pub fn try_new_in<C>(callable: C, alloc: A) -> Result<Self, AllocError>
    where
        C: Callable<S> + ObjectMarkerFor<T>,
    {
        let raw = RawPayload::new(callable, C::invoke_stub::<A>(), &alloc)?;
        Ok(Self {
            // SAFETY: The payload was just allocated by `alloc`, with the stub
            // for `S` and `A`, and `C: ObjectMarkerFor<T>`.
            raw: Some(raw),
            alloc,
            _marker: PhantomData,
        })
    }

    /// Creates a container from a method.
    ///
    /// Methods are plain functions whose first parameter is the receiver, so
    /// the receiver is the first argument of every call:
    ///
    /// ```
    /// use polyfn::Function;
    ///
    /// struct Counter {
    ///     step: i32,
    /// }
    ///
    /// impl Counter {
    ///     fn advance(&self, from: i32) -> i32 {
    ///         from + self.step
    ///     }
    /// }
    ///
    /// fn advance_fn<'a>() -> Function<dyn Fn(&'a Counter, i32) -> i32> {
    ///     Function::from_method(Counter::advance)
    /// }
    ///
    /// let counter = Counter { step: 3 };
    /// assert_eq!(advance_fn().call(&counter, 4), counter.advance(4));
    /// ```
    ///
    /// Descriptors cannot be higher-ranked, so the receiver's lifetime has to
    /// be named.
    #[inline]
    #[must_use]
    pub fn from_method<M>(method: M) -> Self
    where
        M: Callable<S> + ObjectMarkerFor<T>,
        A: Default,
    {
        Self::new(method)
    }

    /// Returns `true` if the container holds a callable.
    #[inline]
    #[must_use]
    pub fn is_engaged(&self) -> bool {
        self.raw.is_some()
    }

    /// Returns `true` if the container holds no callable.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_none()
    }

    /// Returns the allocator of this container.
    #[inline]
    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Replaces the stored callable with `callable`.
    ///
    /// If the new payload record has the same layout as the current one, its
    /// storage is reused and nothing is allocated.
    #[inline]
    pub fn set<C>(&mut self, callable: C)
    where
        C: Callable<S> + ObjectMarkerFor<T>,
    {
        self.try_set(callable).unwrap_or_else(|e| alloc_failure(e));
    }

    /// Replaces the stored callable with `callable`, or returns the allocation
    /// failure.
    ///
    /// On failure the container is left empty.
    #[inline]
    pub fn try_set<C>(&mut self, callable: C) -> Result<(), AllocError>
    where
        C: Callable<S> + ObjectMarkerFor<T>,
    {
        // SAFETY: `self.raw` is empty or was allocated by an allocator equal
        // to `self.alloc` (invariant on `raw`)
        unsafe { RawPayload::replace(&mut self.raw, callable, C::invoke_stub::<A>(), &self.alloc) }
    }

    /// Destroys the stored callable, if any, and releases its storage.
    #[inline]
    pub fn clear(&mut self) {
        if let Some(raw) = self.raw.take() {
            // SAFETY: The payload was allocated by an allocator equal to
            // `self.alloc` (invariant on `raw`)
            unsafe {
                raw.release(&self.alloc);
            }
        }
    }

    /// Moves the stored callable into a new container, leaving this one
    /// empty.
    ///
    /// Nothing is allocated, destroyed or released. The new container gets a
    /// clone of this container's allocator.
    #[inline]
    #[must_use]
    pub fn take(&mut self) -> Self {
        Self {
            // SAFETY: The allocator is cloned, and clones compare equal
            raw: self.raw.take(),
            alloc: self.alloc.clone(),
            _marker: PhantomData,
        }
    }

    /// Creates a deep copy of this container, or returns the allocation
    /// failure.
    ///
    /// The copy uses the allocator returned by [`Allocator::select_on_copy`].
    pub fn try_clone(&self) -> Result<Self, AllocError> {
        let mut copy = Self::empty_in(self.alloc.select_on_copy());
        if let Some(raw) = &self.raw {
            // SAFETY:
            // 1. `raw` was allocated by an allocator equal to `self.alloc`
            // 2. The target is empty
            unsafe { raw.clone_into(&self.alloc, &mut copy.raw, &copy.alloc) }?;
        }
        Ok(copy)
    }

    /// Replaces this container's callable with a deep copy of `source`'s, or
    /// returns the allocation failure.
    ///
    /// If [`Allocator::PROPAGATE_ON_COPY`] is set, this container adopts
    /// `source`'s allocator first. Storage is reused when the payload records
    /// have the same layout. On failure this container is left empty.
    pub fn try_clone_from(&mut self, source: &Self) -> Result<(), AllocError> {
        if A::PROPAGATE_ON_COPY && self.alloc != source.alloc {
            // The current payload can only be released by the old allocator.
            self.clear();
            self.alloc = source.alloc.clone();
        }

        match &source.raw {
            None => {
                self.clear();
                Ok(())
            }
            // SAFETY:
            // 1. `raw` was allocated by an allocator equal to `source.alloc`
            // 2. `self.raw` is empty or was allocated by an allocator equal to
            //    `self.alloc`
            Some(raw) => unsafe { raw.clone_into(&source.alloc, &mut self.raw, &self.alloc) },
        }
    }

    /// Move-assigns `source` into this container, leaving `source` empty.
    ///
    /// See [`try_move_from`](Function::try_move_from).
    #[inline]
    pub fn move_from(&mut self, source: &mut Self) {
        self.try_move_from(source).unwrap_or_else(|e| alloc_failure(e));
    }

    /// Move-assigns `source` into this container, leaving `source` empty, or
    /// returns the allocation failure.
    ///
    /// If [`Allocator::PROPAGATE_ON_MOVE`] is set, or both allocators compare
    /// equal, ownership of the payload is transferred without allocating, and
    /// with propagation this container adopts `source`'s allocator. Otherwise
    /// the payload is deep-copied into this container's allocator and then
    /// released from `source`.
    ///
    /// On failure this container is left empty and `source` is untouched.
    pub fn try_move_from(&mut self, source: &mut Self) -> Result<(), AllocError> {
        if A::PROPAGATE_ON_MOVE || self.alloc == source.alloc {
            self.clear();
            if A::PROPAGATE_ON_MOVE {
                self.alloc = source.alloc.clone();
            }
            // The payload belongs to `source.alloc`, which is now equal to
            // `self.alloc`.
            self.raw = source.raw.take();
            return Ok(());
        }

        tracing::debug!("moving between unequal allocators by deep copy");
        match &source.raw {
            None => self.clear(),
            // SAFETY:
            // 1. `raw` was allocated by an allocator equal to `source.alloc`
            // 2. `self.raw` is empty or was allocated by an allocator equal to
            //    `self.alloc`
            Some(raw) => unsafe { raw.clone_into(&source.alloc, &mut self.raw, &self.alloc) }?,
        }
        source.clear();
        Ok(())
    }

    /// Exchanges the callables of two containers.
    ///
    /// See [`try_swap`](Function::try_swap).
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        self.try_swap(other).unwrap_or_else(|e| alloc_failure(e));
    }

    /// Exchanges the callables of two containers, or returns the allocation
    /// failure.
    ///
    /// If [`Allocator::PROPAGATE_ON_SWAP`] is set, the allocators are swapped
    /// along with the payloads. Otherwise, if the allocators compare equal,
    /// only the payloads are swapped. In both cases nothing is allocated.
    ///
    /// With unequal, non-propagating allocators each callable is deep-copied
    /// into the other container's allocator. If that fails, both containers
    /// are left as they were.
    pub fn try_swap(&mut self, other: &mut Self) -> Result<(), AllocError> {
        if A::PROPAGATE_ON_SWAP {
            core::mem::swap(&mut self.alloc, &mut other.alloc);
            core::mem::swap(&mut self.raw, &mut other.raw);
            return Ok(());
        }

        if self.alloc == other.alloc {
            core::mem::swap(&mut self.raw, &mut other.raw);
            return Ok(());
        }

        tracing::debug!("swapping between unequal allocators by deep copy");
        let mut into_self = None;
        if let Some(raw) = &other.raw {
            // SAFETY:
            // 1. `raw` was allocated by an allocator equal to `other.alloc`
            // 2. The target is empty
            unsafe { raw.clone_into(&other.alloc, &mut into_self, &self.alloc) }?;
        }

        let mut into_other = None;
        if let Some(raw) = &self.raw {
            // SAFETY:
            // 1. `raw` was allocated by an allocator equal to `self.alloc`
            // 2. The target is empty
            let result = unsafe { raw.clone_into(&self.alloc, &mut into_other, &other.alloc) };
            if let Err(error) = result {
                if let Some(copy) = into_self {
                    // SAFETY: The copy was allocated by `self.alloc` above
                    unsafe {
                        copy.release(&self.alloc);
                    }
                }
                return Err(error);
            }
        }

        self.clear();
        self.raw = into_self;
        other.clear();
        other.raw = into_other;
        Ok(())
    }

    /// Splits the container into its payload and allocator without releasing
    /// anything.
    #[inline]
    fn into_parts(self) -> (Option<RawPayload<S::Invoke, A>>, A) {
        let mut this = ManuallyDrop::new(self);
        let raw = this.raw.take();

        // SAFETY: `this` is never used again and its destructor never runs, so
        // the allocator is moved out exactly once.
        let alloc = unsafe { core::ptr::read(&this.alloc) };
        (raw, alloc)
    }
}

impl<S, A, U, T> Drop for Function<S, A, U, T>
where
    S: ?Sized + Signature,
    A: Allocator,
    U: UnwindMarker,
    T: ThreadSafetyMarker,
{
    #[inline]
    fn drop(&mut self) {
        self.clear();
    }
}

impl<S, A, U, T> Clone for Function<S, A, U, T>
where
    S: ?Sized + Signature,
    A: Allocator,
    U: UnwindMarker,
    T: ThreadSafetyMarker,
{
    #[inline]
    fn clone(&self) -> Self {
        self.try_clone().unwrap_or_else(|e| alloc_failure(e))
    }

    #[inline]
    fn clone_from(&mut self, source: &Self) {
        self.try_clone_from(source).unwrap_or_else(|e| alloc_failure(e));
    }
}

impl<S, A, U, T> Default for Function<S, A, U, T>
where
    S: ?Sized + Signature,
    A: Allocator + Default,
    U: UnwindMarker,
    T: ThreadSafetyMarker,
{
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl<S, A, U, T> From<Empty> for Function<S, A, U, T>
where
    S: ?Sized + Signature,
    A: Allocator + Default,
    U: UnwindMarker,
    T: ThreadSafetyMarker,
{
    #[inline]
    fn from(_: Empty) -> Self {
        Self::empty()
    }
}

impl<S, A, U, T> PartialEq<Empty> for Function<S, A, U, T>
where
    S: ?Sized + Signature,
    A: Allocator,
    U: UnwindMarker,
    T: ThreadSafetyMarker,
{
    #[inline]
    fn eq(&self, _: &Empty) -> bool {
        self.is_empty()
    }
}

impl<S, A, U, T> PartialEq<Function<S, A, U, T>> for Empty
where
    S: ?Sized + Signature,
    A: Allocator,
    U: UnwindMarker,
    T: ThreadSafetyMarker,
{
    #[inline]
    fn eq(&self, other: &Function<S, A, U, T>) -> bool {
        other.is_empty()
    }
}

impl<S, A, U, T> fmt::Debug for Function<S, A, U, T>
where
    S: ?Sized + Signature,
    A: Allocator + fmt::Debug,
    U: UnwindMarker,
    T: ThreadSafetyMarker,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("signature", &core::any::type_name::<S>())
            .field("engaged", &self.is_engaged())
            .field("allocator", &self.alloc)
            .finish()
    }
}

// SAFETY: With `T = SendSync` every stored callable is `Send + Sync`
// (invariant on `raw`), and the record holds nothing else but fn pointers.
// The allocator is moved along with the container.
unsafe impl<S, A, U> Send for Function<S, A, U, SendSync>
where
    S: ?Sized + Signature,
    A: Allocator + Send,
    U: UnwindMarker,
{
}

// SAFETY: Shared access calls and clones the stored callable through `&C`,
// which is fine for `C: Sync`, and reaches the allocator through `&A`.
unsafe impl<S, A, U> Sync for Function<S, A, U, SendSync>
where
    S: ?Sized + Signature,
    A: Allocator + Sync,
    U: UnwindMarker,
{
}

/// Reports an allocation failure the way the standard collections do.
#[cold]
fn alloc_failure(error: AllocError) -> ! {
    alloc::alloc::handle_alloc_error(error.layout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        allocators::{Arena, Counting},
        markers::{Local, NoUnwind},
    };

    #[test]
    fn test_function_size() {
        assert_eq!(
            core::mem::size_of::<Function<dyn Fn() -> u8>>(),
            core::mem::size_of::<usize>()
        );
        assert_eq!(
            core::mem::size_of::<Function<dyn FnMut(u8, u16) -> u32, Global, NoUnwind>>(),
            core::mem::size_of::<usize>()
        );
    }

    #[test]
    fn test_send_sync() {
        static_assertions::assert_impl_all!(Function<dyn Fn() -> u8>: Send, Sync);
        static_assertions::assert_impl_all!(Function<dyn FnMut(u8), Counting, NoUnwind>: Send, Sync);
        static_assertions::assert_not_impl_any!(
            Function<dyn Fn() -> u8, Global, MayUnwind, Local>: Send, Sync
        );
        static_assertions::assert_not_impl_any!(
            Function<dyn Fn() -> u8, &'static Arena<'static>>: Send, Sync
        );
    }

    #[test]
    fn test_empty_states() {
        let f: Function<dyn Fn(i32) -> i32> = Function::empty();
        assert!(f.is_empty());
        assert!(!f.is_engaged());
        assert!(f == Empty);
        assert!(Empty == f);

        let g: Function<dyn Fn(i32) -> i32> = Empty.into();
        assert!(g.is_empty());

        let h: Function<dyn Fn(i32) -> i32> = Function::default();
        assert!(h.is_empty());
    }

    #[test]
    fn test_take_leaves_source_empty() {
        let mut f: Function<dyn Fn(i32) -> i32> = Function::new(|x: i32| x + 1);
        let g = f.take();
        assert!(f.is_empty());
        assert_eq!(g.call(1), 2);
    }

    #[test]
    fn test_debug() {
        use alloc::format;

        let f: Function<dyn Fn() -> u8> = Function::new(|| 1u8);
        let debug = format!("{f:?}");
        assert!(debug.starts_with("Function { signature: "));
        assert!(debug.ends_with("engaged: true, allocator: Global }"));
    }
}
