//! Allocator policies: propagation on copy, move and swap, allocation
//! failures, and the bundled allocators.

use std::{alloc::Layout, cell::Cell, mem::MaybeUninit, ptr::NonNull, rc::Rc};

use polyfn::{
    AllocError, Allocator, Function, Global,
    allocators::{Arena, Counting, Pool},
    markers::{Local, MayUnwind},
};

/// Shared state of a [`Scripted`] allocator.
#[derive(Debug, Default)]
struct Script {
    allocations: Cell<usize>,
    deallocations: Cell<usize>,
    fail: Cell<bool>,
}

/// A heap allocator that can be told to fail, with configurable propagation.
///
/// Handles compare equal iff they share a script.
#[derive(Clone, Debug, Default)]
struct Scripted<const PROPAGATE: bool>(Rc<Script>);

impl<const PROPAGATE: bool> Scripted<PROPAGATE> {
    fn failing(&self, fail: bool) {
        self.0.fail.set(fail);
    }

    fn allocations(&self) -> usize {
        self.0.allocations.get()
    }

    fn deallocations(&self) -> usize {
        self.0.deallocations.get()
    }
}

impl<const PROPAGATE: bool> PartialEq for Scripted<PROPAGATE> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// SAFETY: Every request is forwarded to `Global`, which is stateless.
unsafe impl<const PROPAGATE: bool> Allocator for Scripted<PROPAGATE> {
    const PROPAGATE_ON_COPY: bool = PROPAGATE;
    const PROPAGATE_ON_MOVE: bool = PROPAGATE;
    const PROPAGATE_ON_SWAP: bool = PROPAGATE;

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if self.0.fail.get() {
            return Err(AllocError::new(layout));
        }
        self.0.allocations.set(self.0.allocations.get() + 1);
        Global.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.0.deallocations.set(self.0.deallocations.get() + 1);
        // SAFETY: The block came from `Global` with this layout
        unsafe {
            Global.deallocate(ptr, layout);
        }
    }
}

type Sticky = Scripted<false>;
type Roaming = Scripted<true>;

#[test]
fn test_failed_construction_reports_layout() {
    let alloc = Sticky::default();
    alloc.failing(true);

    let result: Result<Function<dyn Fn() -> u8, _>, _> = Function::try_new_in(|| 1u8, alloc);
    let error = result.err().unwrap();
    assert!(error.layout().size() > 0);
    assert!(error.to_string().starts_with("memory allocation of"));
}

#[test]
fn test_failed_reassignment_leaves_container_empty() {
    let alloc = Sticky::default();
    let tracker = Rc::new(());
    let captured = Rc::clone(&tracker);
    let mut f: Function<dyn Fn() -> usize, _, MayUnwind, Local> =
        Function::new_in(move || Rc::strong_count(&captured), alloc.clone());

    alloc.failing(true);
    let big = [1usize; 16];
    let result = f.try_set(move || big.len());
    assert_eq!(result.map_err(|_| ()), Err(()));
    assert!(f.is_empty());
    assert_eq!(Rc::strong_count(&tracker), 1);
    assert_eq!(alloc.deallocations(), 1);
}

#[test]
fn test_failed_reassignment_with_equal_layout_succeeds() {
    let alloc = Sticky::default();
    let mut f: Function<dyn Fn() -> u8, _> = Function::new_in(|| 1u8, alloc.clone());

    // Reusing storage does not allocate, so a failing allocator is fine.
    alloc.failing(true);
    f.try_set(|| 2u8).unwrap();
    assert_eq!(f.call(), 2);
}

#[test]
fn test_clone_uses_select_on_copy_and_can_fail() {
    let alloc = Sticky::default();
    let f: Function<dyn Fn() -> u8, _> = Function::new_in(|| 3u8, alloc.clone());

    let g = f.try_clone().unwrap();
    assert_eq!(g.allocator(), f.allocator());
    assert_eq!(g.call(), 3);
    assert_eq!(alloc.allocations(), 2);

    alloc.failing(true);
    assert!(f.try_clone().is_err());
    assert_eq!(f.call(), 3);
}

#[test]
fn test_non_propagating_move_deep_copies() {
    let left = Sticky::default();
    let right = Sticky::default();
    let mut source: Function<dyn Fn() -> u8, _> = Function::new_in(|| 4u8, left.clone());
    let mut target: Function<dyn Fn() -> u8, _> = Function::empty_in(right.clone());

    target.try_move_from(&mut source).unwrap();
    assert!(source.is_empty());
    assert_eq!(target.call(), 4);
    assert_eq!(target.allocator(), &right);
    assert_eq!(right.allocations(), 1);
    assert_eq!(left.deallocations(), 1);
}

#[test]
fn test_non_propagating_move_failure_keeps_source() {
    let left = Sticky::default();
    let right = Sticky::default();
    let mut source: Function<dyn Fn() -> u8, _> = Function::new_in(|| 4u8, left.clone());
    let mut target: Function<dyn Fn() -> u8, _> = Function::empty_in(right.clone());

    right.failing(true);
    assert!(target.try_move_from(&mut source).is_err());
    assert!(target.is_empty());
    assert_eq!(source.call(), 4);
}

#[test]
fn test_propagating_move_steals() {
    let left = Roaming::default();
    let right = Roaming::default();
    let mut source: Function<dyn Fn() -> u8, _> = Function::new_in(|| 5u8, left.clone());
    let mut target: Function<dyn Fn() -> u8, _> = Function::new_in(|| 6u8, right.clone());

    target.move_from(&mut source);
    assert_eq!(target.call(), 5);
    assert_eq!(target.allocator(), &left);
    assert_eq!(right.deallocations(), 1);
    assert_eq!(left.allocations(), 1);
}

#[test]
fn test_propagating_copy_assignment_adopts_allocator() {
    let left = Roaming::default();
    let right = Roaming::default();
    let source: Function<dyn Fn() -> u8, _> = Function::new_in(|| 7u8, left.clone());
    let mut target: Function<dyn Fn() -> u8, _> = Function::new_in(|| 8u8, right.clone());

    target.clone_from(&source);
    assert_eq!(target.call(), 7);
    assert_eq!(target.allocator(), &left);
    assert_eq!(right.deallocations(), 1);
    assert_eq!(left.allocations(), 2);
}

#[test]
fn test_non_propagating_copy_assignment_keeps_allocator() {
    let left = Sticky::default();
    let right = Sticky::default();
    let source: Function<dyn Fn() -> u8, _> = Function::new_in(|| 7u8, left.clone());
    let mut target: Function<dyn Fn() -> u8, _> = Function::new_in(|| 8u8, right.clone());

    target.clone_from(&source);
    assert_eq!(target.call(), 7);
    assert_eq!(target.allocator(), &right);
    assert_eq!(right.allocations(), 1);
    assert_eq!(right.deallocations(), 0);
}

#[test]
fn test_propagating_swap_exchanges_allocators() {
    let left = Roaming::default();
    let right = Roaming::default();
    let mut f: Function<dyn Fn() -> u8, _> = Function::new_in(|| 1u8, left.clone());
    let mut g: Function<dyn Fn() -> u8, _> = Function::new_in(|| 2u8, right.clone());

    f.swap(&mut g);
    assert_eq!((f.call(), g.call()), (2, 1));
    assert_eq!(f.allocator(), &right);
    assert_eq!(g.allocator(), &left);
    assert_eq!(left.allocations() + right.allocations(), 2);
}

#[test]
fn test_unequal_swap_deep_exchanges() {
    let left = Sticky::default();
    let right = Sticky::default();
    let mut f: Function<dyn Fn() -> u8, _> = Function::new_in(|| 1u8, left.clone());
    let mut g: Function<dyn Fn() -> u8, _> = Function::empty_in(right.clone());

    f.swap(&mut g);
    assert!(f.is_empty());
    assert_eq!(g.call(), 1);
    assert_eq!(f.allocator(), &left);
    assert_eq!(g.allocator(), &right);
    assert_eq!(left.deallocations(), 1);
    assert_eq!(right.allocations(), 1);
}

#[test]
fn test_unequal_swap_failure_changes_nothing() {
    let left = Sticky::default();
    let right = Sticky::default();
    let mut f: Function<dyn Fn() -> u8, _> = Function::new_in(|| 1u8, left.clone());
    let mut g: Function<dyn Fn() -> u8, _> = Function::new_in(|| 2u8, right.clone());

    // The copy into `left` succeeds, the copy into `right` fails, and the
    // first copy is released again.
    right.failing(true);
    assert!(f.try_swap(&mut g).is_err());
    assert_eq!((f.call(), g.call()), (1, 2));
    assert_eq!(f.allocator(), &left);
    assert_eq!(left.allocations(), 2);
    assert_eq!(left.deallocations(), 1);
    assert_eq!(right.deallocations(), 0);
}

#[test]
fn test_counting_unequal_handles() {
    let first: Counting = Counting::default();
    let second: Counting = Counting::default();
    let mut f: Function<dyn Fn() -> u8, _> = Function::new_in(|| 1u8, first.clone());
    let mut g: Function<dyn Fn() -> u8, _> = Function::new_in(|| 2u8, second.clone());

    // `Counting<Global>` propagates on move like `Global` does.
    g.move_from(&mut f);
    assert_eq!(g.call(), 1);
    assert_eq!(g.allocator(), &first);
    assert_eq!(g.allocator().inner(), &Global);
    assert_eq!(second.live_bytes(), 0);
}

#[test]
fn test_arena_backed_functions() {
    let mut buf = [MaybeUninit::<u8>::uninit(); 512];
    let arena = Arena::new(&mut buf);
    assert_eq!(arena.capacity(), 512);

    let scale = 3;
    let mut f: Function<dyn Fn(i32) -> i32, &Arena> =
        Function::new_in(move |x: i32| x * scale, &arena);
    let g = f.clone();
    assert_eq!(f.call(2), 6);
    assert_eq!(g.call(3), 9);

    f.set(|x: i32| x - 1);
    assert_eq!(f.call(1), 0);
    drop((f, g));

    let big = [0u8; 1024];
    let result: Result<Function<dyn Fn() -> usize, &Arena>, _> =
        Function::try_new_in(move || big.len(), &arena);
    assert!(result.is_err());
}

#[test]
fn test_pool_recycles_records() {
    let pool = Pool::new();
    let mut functions: Vec<Function<dyn Fn() -> usize, Pool>> = (0..4)
        .map(|i: usize| Function::new_in(move || i, pool.clone()))
        .collect();
    assert_eq!(pool.cached_blocks(), 0);

    functions.truncate(1);
    assert_eq!(pool.cached_blocks(), 3);

    let nine = 9usize;
    let again: Function<dyn Fn() -> usize, Pool> = Function::new_in(move || nine, pool.clone());
    assert_eq!(pool.cached_blocks(), 2);
    assert_eq!(again.call() + functions[0].call(), 9);

    pool.trim();
    assert_eq!(pool.cached_blocks(), 0);
}
