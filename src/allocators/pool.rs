use alloc::vec::Vec;
use core::{alloc::Layout, fmt, ptr::NonNull};

use hashbrown::HashMap;
use polyfn_internals::{AllocError, Allocator, Global};
use rustc_hash::FxBuildHasher;
use triomphe::Arc;

use super::pool_lock::PoolLock;

/// Free blocks, by the layout they were allocated with.
struct FreeLists(HashMap<Layout, Vec<NonNull<u8>>, FxBuildHasher>);

// SAFETY: The cached blocks come from the global heap and are owned by the
// pool alone, so they can be handed out and freed on any thread.
unsafe impl Send for FreeLists {}

// SAFETY: All access to the lists goes through the pool lock.
unsafe impl Sync for FreeLists {}

impl FreeLists {
    fn pop(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        self.0.get_mut(&layout).and_then(Vec::pop)
    }

    fn push(&mut self, layout: Layout, ptr: NonNull<u8>) {
        self.0.entry(layout).or_default().push(ptr);
    }

    fn cached(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Returns every cached block to the global heap.
    fn release_all(&mut self) {
        for (layout, blocks) in self.0.drain() {
            for ptr in blocks {
                // SAFETY: Every cached block was allocated by `Global` with
                // `layout` and is owned by the pool alone
                unsafe {
                    Global.deallocate(ptr, layout);
                }
            }
        }
    }
}

/// A shared pool that recycles freed blocks by layout.
///
/// Blocks come from [`Global`]. A deallocated block is kept on a free list
/// for its exact layout and handed out again by the next allocation with that
/// layout. Cached blocks are returned to the global heap by
/// [`trim`](Pool::trim), or when the last handle to the pool is dropped.
///
/// `Pool` is a cheap handle: clones share the same pool and compare equal.
/// The pool is thread-safe, so handles can be sent to other threads, though
/// [`Function`](crate::Function) itself stays on the thread that created it.
///
/// ```
/// use polyfn::{Function, allocators::Pool};
///
/// let pool = Pool::new();
/// let f: Function<dyn Fn() -> u8, Pool> = Function::new_in(|| 1u8, pool.clone());
/// drop(f);
/// assert_eq!(pool.cached_blocks(), 1);
///
/// // The next record with the same layout takes the cached block.
/// let g: Function<dyn Fn() -> u8, Pool> = Function::new_in(|| 2u8, pool.clone());
/// assert_eq!(pool.cached_blocks(), 0);
/// assert_eq!(g.call(), 2);
/// ```
#[derive(Clone)]
pub struct Pool {
    lists: Arc<PoolLock<FreeLists>>,
}

impl Pool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lists: Arc::new(PoolLock::new(FreeLists(HashMap::with_hasher(
                FxBuildHasher,
            )))),
        }
    }

    /// Returns the number of freed blocks waiting to be reused.
    #[must_use]
    pub fn cached_blocks(&self) -> usize {
        self.lists.lock().cached()
    }

    /// Returns every cached block to the global heap.
    pub fn trim(&self) {
        self.lists.lock().release_all();
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Pool {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.lists, &other.lists)
    }
}

impl Eq for Pool {}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("cached_blocks", &self.cached_blocks())
            .finish()
    }
}

impl Drop for FreeLists {
    fn drop(&mut self) {
        self.release_all();
    }
}

// SAFETY:
// 1. Blocks come from `Global` with the requested layout, and a cached block
//    is only handed out for the layout it was allocated with.
// 2. Equal pools share the same free lists, and every block goes back to
//    `Global` eventually.
// 3. Clones share the pool, so cloning never invalidates a block.
unsafe impl Allocator for Pool {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let recycled = self.lists.lock().pop(layout);
        if let Some(ptr) = recycled {
            tracing::trace!(
                size = layout.size(),
                align = layout.align(),
                "reusing pooled block"
            );
            return Ok(ptr);
        }

        Global.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.lists.lock().push(layout, ptr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recycles_by_layout() {
        let pool = Pool::new();
        let small = Layout::new::<u32>();
        let large = Layout::new::<[u64; 8]>();

        let ptr = pool.allocate(small).unwrap();
        // SAFETY: Allocated above with the same layout
        unsafe {
            pool.deallocate(ptr, small);
        }
        assert_eq!(pool.cached_blocks(), 1);

        let other = pool.allocate(large).unwrap();
        assert_eq!(pool.cached_blocks(), 1);
        let again = pool.allocate(small).unwrap();
        assert_eq!(again, ptr);
        assert_eq!(pool.cached_blocks(), 0);

        // SAFETY: Allocated above with the same layout
        unsafe {
            pool.deallocate(other, large);
        }
        // SAFETY: Allocated above with the same layout
        unsafe {
            pool.deallocate(again, small);
        }
        pool.trim();
        assert_eq!(pool.cached_blocks(), 0);
    }

    #[test]
    fn test_clones_share_the_pool() {
        let pool = Pool::new();
        assert_eq!(pool, pool.clone());
        assert_ne!(pool, Pool::new());
    }

    #[test]
    fn test_thread_safety() {
        static_assertions::assert_impl_all!(Pool: Send, Sync);
    }
}
