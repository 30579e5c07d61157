use core::{
    alloc::Layout,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use polyfn_internals::{AllocError, Allocator, Global};
use triomphe::Arc;

/// Counters shared by all clones of a [`Counting`] allocator.
#[derive(Debug, Default)]
struct Counters {
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
    live_bytes: AtomicUsize,
}

/// An allocator that counts the requests it forwards to `A`.
///
/// Clones share their counters and compare equal to each other. Two
/// independently created `Counting` allocators never compare equal, which
/// makes this type handy for exercising the unequal-allocator paths of
/// [`Function`](crate::Function) too.
///
/// The propagation constants and [`select_on_copy`](Allocator::select_on_copy)
/// are those of `A`.
///
/// ```
/// use polyfn::{Function, allocators::Counting};
///
/// let alloc: Counting = Counting::default();
/// let mut f: Function<dyn Fn() -> u64, _> = Function::new_in(|| 1u64, alloc.clone());
/// assert_eq!(alloc.allocations(), 1);
///
/// // A callable of the same size reuses the existing storage.
/// f.set(|| 2u64);
/// assert_eq!(alloc.allocations(), 1);
/// assert_eq!(f.call(), 2);
///
/// drop(f);
/// assert_eq!(alloc.deallocations(), 1);
/// assert_eq!(alloc.live_bytes(), 0);
/// ```
#[derive(Clone, Debug)]
pub struct Counting<A = Global> {
    inner: A,
    counters: Arc<Counters>,
}

impl<A> Counting<A> {
    /// Wraps `inner` with a fresh set of counters.
    #[must_use]
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Returns the wrapped allocator.
    #[must_use]
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Returns the number of successful allocations so far.
    #[must_use]
    pub fn allocations(&self) -> usize {
        self.counters.allocations.load(Ordering::Relaxed)
    }

    /// Returns the number of deallocations so far.
    #[must_use]
    pub fn deallocations(&self) -> usize {
        self.counters.deallocations.load(Ordering::Relaxed)
    }

    /// Returns the number of bytes currently allocated.
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.counters.live_bytes.load(Ordering::Relaxed)
    }
}

impl<A: Default> Default for Counting<A> {
    fn default() -> Self {
        Self::new(A::default())
    }
}

impl<A: PartialEq> PartialEq for Counting<A> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.counters, &other.counters) && self.inner == other.inner
    }
}

impl<A: Eq> Eq for Counting<A> {}

// SAFETY: Every block comes from `inner` and goes back to it. Clones share
// `inner`'s clones, and equality requires equal inner allocators, so the
// guarantees of `A` carry over.
unsafe impl<A: Allocator> Allocator for Counting<A> {
    const PROPAGATE_ON_COPY: bool = A::PROPAGATE_ON_COPY;
    const PROPAGATE_ON_MOVE: bool = A::PROPAGATE_ON_MOVE;
    const PROPAGATE_ON_SWAP: bool = A::PROPAGATE_ON_SWAP;

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.inner.allocate(layout)?;
        self.counters.allocations.fetch_add(1, Ordering::Relaxed);
        self.counters
            .live_bytes
            .fetch_add(layout.size(), Ordering::Relaxed);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Guaranteed by the caller, since equal `Counting` allocators
        // wrap equal inner allocators
        unsafe {
            self.inner.deallocate(ptr, layout);
        }
        self.counters.deallocations.fetch_add(1, Ordering::Relaxed);
        self.counters
            .live_bytes
            .fetch_sub(layout.size(), Ordering::Relaxed);
    }

    fn select_on_copy(&self) -> Self {
        Self {
            inner: self.inner.select_on_copy(),
            counters: Arc::clone(&self.counters),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let alloc = Counting::<Global>::default();
        let layout = Layout::new::<[u32; 4]>();
        let ptr = alloc.allocate(layout).unwrap();
        assert_eq!(alloc.allocations(), 1);
        assert_eq!(alloc.live_bytes(), 16);

        // SAFETY: Allocated above with the same layout
        unsafe {
            alloc.clone().deallocate(ptr, layout);
        }
        assert_eq!(alloc.deallocations(), 1);
        assert_eq!(alloc.live_bytes(), 0);
    }

    #[test]
    fn test_equality_follows_counters() {
        let first = Counting::<Global>::default();
        let second = Counting::<Global>::default();
        assert_eq!(first, first.clone());
        assert_eq!(first, first.select_on_copy());
        assert_ne!(first, second);
    }
}
