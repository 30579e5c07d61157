//! The lifecycle action dispatcher of a payload record.
//!
//! Every record stores a single [`ActionFn`] next to its invocation stub. The
//! function is generated for one concrete callable type `C` and performs one
//! of four operations selected by an [`Action`] tag, so the owning container
//! never has to name `C` after construction.
//!
//! # Safety Invariant
//!
//! A dispatcher is only ever paired with a record of the type it was
//! generated for. [`PayloadRecord::new`] is the only place that writes the
//! pair, and it writes both halves at once.

use core::{alloc::Layout, ptr::NonNull};

use crate::{
    allocator::{AllocError, Allocator},
    payload::{data::PayloadRecord, raw::RawPayload},
    util::Erased,
};

/// Signature of the per-type action dispatcher.
///
/// The arguments are the erased record, the allocator of the container that
/// owns the record, and the operation to perform.
pub(super) type ActionFn<I, A> =
    unsafe fn(NonNull<PayloadRecord<Erased, I, A>>, &A, Action<'_, I, A>) -> Outcome;

/// Operation tag passed to an [`ActionFn`].
pub(super) enum Action<'a, I, A> {
    /// Release the record's memory. The record must already be destroyed.
    Deallocate,
    /// Run the callable's destructor without releasing memory.
    Destroy,
    /// Report the layout of the record.
    ReportLayout,
    /// Deep-copy the record into another container's slot.
    CloneInto {
        /// The slot of the target container, engaged or not
        target: &'a mut Option<RawPayload<I, A>>,
        /// The allocator of the target container
        target_alloc: &'a A,
    },
}

/// Result of an [`ActionFn`] call.
#[derive(Debug)]
pub(super) enum Outcome {
    /// The action has no result.
    Done,
    /// The result of [`Action::ReportLayout`].
    Layout(Layout),
    /// The result of [`Action::CloneInto`].
    Cloned(Result<(), AllocError>),
}

/// Performs `action` on a record holding a `C`.
///
/// Every allocator operation goes through `alloc` rebound to
/// `PayloadRecord<C, I, A>`.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `record` points to a `PayloadRecord<C, I, A>` allocated by an allocator
///    equal to `alloc`.
/// 2. For [`Action::Destroy`], [`Action::ReportLayout`] and
///    [`Action::CloneInto`], the record is initialized.
/// 3. For [`Action::Deallocate`], the record has already been destroyed and is
///    not used afterwards.
/// 4. For [`Action::Destroy`], the record is not used afterwards except to
///    deallocate it or to construct a new record in its place.
/// 5. For [`Action::CloneInto`], the target slot is empty or holds a record
///    allocated by an allocator equal to `target_alloc`.
pub(super) unsafe fn dispatch<C: Clone, I: Copy, A: Allocator>(
    record: NonNull<PayloadRecord<Erased, I, A>>,
    alloc: &A,
    action: Action<'_, I, A>,
) -> Outcome {
    let record: NonNull<PayloadRecord<C, I, A>> = record.cast::<PayloadRecord<C, I, A>>();
    let rebound = alloc.rebind::<PayloadRecord<C, I, A>>();

    match action {
        Action::Deallocate => {
            // SAFETY:
            // 1. Guaranteed by the caller
            // 2. Guaranteed by the caller
            // 3. Guaranteed by the caller
            unsafe {
                rebound.deallocate(record);
            }
            Outcome::Done
        }
        Action::Destroy => {
            // SAFETY:
            // 1. The record is initialized (guaranteed by the caller)
            // 2. Guaranteed by the caller
            unsafe {
                rebound.destroy(record);
            }
            Outcome::Done
        }
        Action::ReportLayout => Outcome::Layout(Layout::new::<PayloadRecord<C, I, A>>()),
        Action::CloneInto {
            target,
            target_alloc,
        } => {
            // SAFETY: The record is initialized and has the right type
            // (guaranteed by the caller). Only shared access happens while the
            // reference is alive.
            let source: &PayloadRecord<C, I, A> = unsafe { record.as_ref() };

            // Clone before touching the target, so that a panicking `Clone`
            // leaves it as it was.
            let copy = source.duplicate();

            // SAFETY: The target slot satisfies the requirements of `install`
            // (guaranteed by the caller)
            let result = unsafe { RawPayload::install(target, copy, target_alloc) };
            Outcome::Cloned(result)
        }
    }
}
