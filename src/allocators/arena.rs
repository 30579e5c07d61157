use core::{alloc::Layout, cell::Cell, fmt, marker::PhantomData, mem::MaybeUninit, ptr::NonNull};

use polyfn_internals::{AllocError, Allocator};

/// A bump allocator over a caller-supplied buffer.
///
/// The allocator itself is `&Arena`, so every container allocating from the
/// arena borrows it, and the buffer outlives all of them. Blocks are carved
/// off the front of the remaining space. Deallocation only reclaims space when
/// the block is the most recent one; everything else is reclaimed by
/// [`reset`](Arena::reset) once no container borrows the arena anymore.
///
/// Two `&Arena` handles compare equal iff they refer to the same arena.
///
/// ```
/// use core::mem::MaybeUninit;
///
/// use polyfn::{Function, allocators::Arena};
///
/// let mut buf = [MaybeUninit::<u8>::uninit(); 256];
/// let arena = Arena::new(&mut buf);
///
/// let offset = 40;
/// let f: Function<dyn Fn(i32) -> i32, &Arena> =
///     Function::new_in(move |x: i32| x + offset, &arena);
/// assert_eq!(f.call(2), 42);
///
/// let used = arena.used();
/// drop(f);
/// assert!(arena.used() < used);
/// ```
pub struct Arena<'buf> {
    /// Start of the buffer
    start: NonNull<u8>,
    /// Length of the buffer in bytes
    capacity: usize,
    /// Offset of the first free byte
    offset: Cell<usize>,
    _buf: PhantomData<&'buf mut [MaybeUninit<u8>]>,
}

impl<'buf> Arena<'buf> {
    /// Creates an arena that hands out blocks from `buf`.
    #[must_use]
    pub fn new(buf: &'buf mut [MaybeUninit<u8>]) -> Self {
        let capacity = buf.len();
        Self {
            start: NonNull::from(buf).cast::<u8>(),
            capacity,
            offset: Cell::new(0),
            _buf: PhantomData,
        }
    }

    /// Returns the size of the buffer in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of bytes in use, including alignment padding.
    #[must_use]
    pub fn used(&self) -> usize {
        self.offset.get()
    }

    /// Returns the number of bytes not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity - self.offset.get()
    }

    /// Makes the whole buffer available again.
    ///
    /// Taking `&mut self` guarantees that no container still borrows the
    /// arena, so none of the blocks handed out so far are alive.
    pub fn reset(&mut self) {
        self.offset.set(0);
    }
}

impl fmt::Debug for Arena<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity)
            .field("used", &self.used())
            .finish()
    }
}

impl PartialEq for Arena<'_> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self, other)
    }
}

impl Eq for Arena<'_> {}

// SAFETY:
// 1. Every block lies inside the buffer, is aligned as requested, and does not
//    overlap any other live block, since the offset only moves back past the
//    most recent block.
// 2. Equal handles refer to the same arena.
// 3. Copying a reference does not affect the arena.
unsafe impl Allocator for &Arena<'_> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let offset = self.offset.get();
        let padding = self
            .start
            .as_ptr()
            .wrapping_add(offset)
            .align_offset(layout.align());
        let begin = offset.checked_add(padding).ok_or(AllocError::new(layout))?;
        let end = begin
            .checked_add(layout.size())
            .ok_or(AllocError::new(layout))?;
        if end > self.capacity {
            tracing::trace!(
                size = layout.size(),
                remaining = self.remaining(),
                "arena exhausted"
            );
            return Err(AllocError::new(layout));
        }

        self.offset.set(end);
        // SAFETY: `begin <= end <= capacity`, so the pointer stays inside the
        // buffer (or one past its end for an empty block at the very end)
        let ptr = unsafe { self.start.add(begin) };
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: The block was handed out by this arena (guaranteed by the
        // caller), so both pointers are derived from the same buffer
        let begin = unsafe { ptr.offset_from(self.start) };
        let Ok(begin) = usize::try_from(begin) else {
            return;
        };
        if begin + layout.size() == self.offset.get() {
            self.offset.set(begin);
        }
    }
}
