//! The allocator contract consumed by payload records.
//!
//! A [`Function`] never allocates through a fixed heap. Every byte of payload
//! storage is requested from an [`Allocator`] value owned by the container, and
//! that value is rebound to the concrete record type at the point where the
//! record type is known (see [`Rebound`]).
//!
//! [`Function`]: https://docs.rs/polyfn/latest/polyfn/struct.Function.html

use core::{alloc::Layout, marker::PhantomData, ptr::NonNull};

/// The error returned when an [`Allocator`] cannot satisfy a request.
#[derive(Copy, Clone, PartialEq, Eq, Debug, derive_more::Display, derive_more::Error)]
#[display("memory allocation of {} bytes (align {}) failed", layout.size(), layout.align())]
pub struct AllocError {
    /// The layout that could not be allocated.
    layout: Layout,
}

impl AllocError {
    /// Creates an [`AllocError`] for the given failed request.
    #[inline]
    #[must_use]
    pub const fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Returns the layout of the request that failed.
    #[inline]
    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }
}

/// A source of raw memory for payload records.
///
/// Implementations are values: they are cloned into containers, compared for
/// equality, and optionally carried along when containers are copied, moved or
/// swapped, as decided by the three `PROPAGATE_ON_*` constants.
///
/// # Safety
///
/// Implementors must guarantee:
///
/// 1. A pointer returned by [`allocate`] is valid for reads and writes of
///    `layout.size()` bytes and aligned to `layout.align()`, until it is passed
///    to [`deallocate`].
/// 2. Two allocators that compare equal (including clones of each other) can
///    deallocate each other's blocks.
/// 3. Cloning or moving an allocator does not invalidate blocks it has handed
///    out.
///
/// [`allocate`]: Allocator::allocate
/// [`deallocate`]: Allocator::deallocate
pub unsafe trait Allocator: Clone + PartialEq {
    /// Whether copy-assignment replaces the target's allocator with the
    /// source's.
    const PROPAGATE_ON_COPY: bool = false;
    /// Whether move-assignment replaces the target's allocator with the
    /// source's. When `false` and the allocators differ, move-assignment falls
    /// back to a deep copy.
    const PROPAGATE_ON_MOVE: bool = true;
    /// Whether swapping two containers also swaps their allocators.
    const PROPAGATE_ON_SWAP: bool = false;

    /// Allocates a block of memory described by `layout`.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Releases a block previously returned by [`allocate`].
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` was returned by [`allocate`] on this allocator, or on one that
    ///    compares equal to it.
    /// 2. `layout` is the same layout that was used to allocate the block.
    /// 3. The block is not used after this call.
    ///
    /// [`allocate`]: Allocator::allocate
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Returns the allocator a copy-constructed container should use.
    #[inline]
    fn select_on_copy(&self) -> Self {
        self.clone()
    }

    /// Rebinds this allocator to the record type `T`.
    #[inline]
    fn rebind<T>(&self) -> Rebound<'_, T, Self> {
        Rebound {
            alloc: self,
            _marker: PhantomData,
        }
    }
}

/// An [`Allocator`] rebound to the concrete type `T`.
///
/// Two different `T`s produce two different rebound types even though the
/// underlying allocator type never changes.
pub struct Rebound<'a, T, A: ?Sized> {
    /// The allocator all requests are forwarded to
    alloc: &'a A,
    /// The type this allocator has been rebound to
    _marker: PhantomData<fn() -> T>,
}

impl<T, A: Allocator> Rebound<'_, T, A> {
    /// The layout of a single `T`.
    #[inline]
    #[must_use]
    pub const fn layout() -> Layout {
        Layout::new::<T>()
    }

    /// Allocates uninitialized storage for a single `T`.
    #[inline]
    pub fn allocate(&self) -> Result<NonNull<T>, AllocError> {
        let ptr = self.alloc.allocate(Self::layout())?;
        Ok(ptr.cast::<T>())
    }

    /// Releases storage for a single `T` without running its destructor.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` was returned by [`Rebound::allocate`] for the same `T` on an
    ///    allocator equal to this one.
    /// 2. The pointee has already been destroyed, or was never constructed.
    /// 3. The pointer is not used after this call.
    #[inline]
    pub unsafe fn deallocate(&self, ptr: NonNull<T>) {
        // SAFETY:
        // 1. Guaranteed by the caller
        // 2. The layout is `Layout::new::<T>()`, which is what `allocate` used
        // 3. Guaranteed by the caller
        unsafe {
            self.alloc.deallocate(ptr.cast::<u8>(), Self::layout());
        }
    }

    /// Moves `value` into the storage at `ptr`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` is valid for writes and properly aligned for `T`.
    /// 2. Any value previously stored at `ptr` has already been destroyed.
    #[inline]
    pub unsafe fn construct(&self, ptr: NonNull<T>, value: T) {
        // SAFETY: Guaranteed by the caller
        unsafe {
            ptr.write(value);
        }
    }

    /// Runs the destructor of the `T` at `ptr` without releasing its storage.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` points to an initialized `T`.
    /// 2. The `T` is not used after this call except to deallocate it or to
    ///    construct a new value in its place.
    #[inline]
    pub unsafe fn destroy(&self, ptr: NonNull<T>) {
        // SAFETY: Guaranteed by the caller
        unsafe {
            ptr.drop_in_place();
        }
    }
}

/// The global heap, as exposed by the `alloc` crate.
///
/// This is the default allocator of every container. It is stateless, so all
/// instances compare equal.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct Global;

// SAFETY:
// 1. Blocks come from `alloc::alloc::alloc` with the requested layout, or are
//    dangling-but-aligned pointers for zero-sized requests.
// 2. `Global` is stateless, so every instance can free every other instance's
//    blocks.
// 3. `Global` holds no state that could be invalidated.
unsafe impl Allocator for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            let dangling = core::ptr::without_provenance_mut::<u8>(layout.align());
            return NonNull::new(dangling).ok_or(AllocError::new(layout));
        }

        // SAFETY: The layout has a non-zero size, which is the only requirement
        // of `alloc::alloc::alloc`.
        let ptr = unsafe { alloc::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::new(layout))
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        // SAFETY: The block was allocated by `alloc::alloc::alloc` with this
        // exact layout (guaranteed by the caller).
        unsafe {
            alloc::alloc::dealloc(ptr.as_ptr(), layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_round_trip() {
        let layout = Layout::new::<[u64; 4]>();
        let ptr = Global.allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % layout.align(), 0);

        // SAFETY: The block was just allocated with this layout and is not
        // used afterwards.
        unsafe {
            Global.deallocate(ptr, layout);
        }
    }

    #[test]
    fn test_global_zero_sized() {
        #[repr(align(64))]
        struct Aligned;

        let layout = Layout::new::<Aligned>();
        let ptr = Global.allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize, 64);

        // SAFETY: Zero-sized blocks are never actually released.
        unsafe {
            Global.deallocate(ptr, layout);
        }
    }

    #[test]
    fn test_rebound_layout_depends_on_type() {
        assert_eq!(Rebound::<'_, u8, Global>::layout(), Layout::new::<u8>());
        assert_eq!(
            Rebound::<'_, [u32; 3], Global>::layout(),
            Layout::new::<[u32; 3]>()
        );
    }

    #[test]
    fn test_rebound_construct_destroy() {
        use alloc::rc::Rc;

        let tracker = Rc::new(());
        let rebound = Global.rebind::<Rc<()>>();
        let ptr = rebound.allocate().unwrap();

        // SAFETY: `ptr` is freshly allocated for an `Rc<()>`, is constructed
        // once, destroyed once and then released.
        unsafe {
            rebound.construct(ptr, Rc::clone(&tracker));
        }
        assert_eq!(Rc::strong_count(&tracker), 2);

        // SAFETY: See above
        unsafe {
            rebound.destroy(ptr);
        }
        assert_eq!(Rc::strong_count(&tracker), 1);

        // SAFETY: See above
        unsafe {
            rebound.deallocate(ptr);
        }
    }

    #[test]
    fn test_alloc_error_display() {
        use alloc::string::ToString;

        let error = AllocError::new(Layout::new::<u64>());
        assert_eq!(
            error.to_string(),
            "memory allocation of 8 bytes (align 8) failed"
        );
        assert_eq!(error.layout(), Layout::new::<u64>());
    }
}
