//! This module encapsulates the fields of the [`PayloadRecord`]. Since this is
//! the only place they are visible, the `invoke` and `action` entry points are
//! guaranteed to always be generated for the same concrete callable type as
//! the stored `callable`. This follows from the fact that they are set
//! together when a record is constructed and that the API offers no way to
//! change either of them afterwards.

use core::ptr::NonNull;

use crate::{
    allocator::Allocator,
    payload::{
        action::{self, ActionFn},
        raw::{RawPayload, RecordHandle},
    },
};

/// Heap-resident payload record with hand-rolled dispatch.
///
/// This struct uses `#[repr(C)]` so that the two entry points sit at offsets
/// that do not depend on `C`. That allows reading them from a record whose
/// callable type has been erased.
#[repr(C)]
pub(super) struct PayloadRecord<C, I, A> {
    /// Invocation stub generated for `C`
    invoke: I,
    /// Lifecycle action dispatcher generated for `C`
    action: ActionFn<I, A>,
    /// The stored callable
    callable: C,
}

impl<C: Clone, I: Copy, A: Allocator> PayloadRecord<C, I, A> {
    /// Creates a new [`PayloadRecord`] pairing `callable` with its invocation
    /// stub and the matching action dispatcher.
    #[inline]
    pub(super) fn new(callable: C, invoke: I) -> Self {
        Self {
            invoke,
            action: action::dispatch::<C, I, A>,
            callable,
        }
    }

    /// Creates an independent copy of this record.
    ///
    /// The entry points are copied verbatim, and the callable is cloned.
    #[inline]
    pub(super) fn duplicate(&self) -> Self {
        Self {
            invoke: self.invoke,
            action: self.action,
            callable: self.callable.clone(),
        }
    }
}

impl<I: Copy, A: Allocator> RawPayload<I, A> {
    /// Returns the invocation stub stored in the record.
    #[inline]
    pub fn invoker(&self) -> I {
        let ptr = self.as_ptr();
        // SAFETY: We don't know the actual callable type, but we do know that
        // the pointer refers to an initialized `PayloadRecord<C, I, A>` for some
        // specific `C`. Since the record is `#[repr(C)]`, the fields before the
        // callable have the same offsets for every `C`.
        //
        // We take care to not create a reference to the record itself, as that
        // would be undefined behavior since we don't have the right type.
        let invoke_ptr: *const I = unsafe { &raw const (*ptr).invoke };

        // SAFETY: Reading the `Copy` stub out of the field is valid for the
        // same reasons.
        unsafe { *invoke_ptr }
    }

    /// Returns the action dispatcher stored in the record.
    #[inline]
    pub(super) fn action(&self) -> ActionFn<I, A> {
        let ptr = self.as_ptr();
        // SAFETY: See `invoker` above.
        let action_ptr: *const ActionFn<I, A> = unsafe { &raw const (*ptr).action };

        // SAFETY: See `invoker` above.
        unsafe { *action_ptr }
    }
}

impl RecordHandle {
    /// Returns a pointer to the callable stored in the record.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The handle points to an initialized `PayloadRecord<C, I, A>` with
    ///    exactly these type parameters.
    #[inline]
    pub unsafe fn callable<C, I, A>(self) -> NonNull<C> {
        let record: *mut PayloadRecord<C, I, A> = self.as_ptr().cast::<PayloadRecord<C, I, A>>();

        // SAFETY: The record is live and has the right type (guaranteed by
        // the caller), so projecting to one of its fields stays in bounds.
        let callable: *mut C = unsafe { &raw mut (*record).callable };

        // SAFETY: A field pointer of a non-null record is never null.
        unsafe { NonNull::new_unchecked(callable) }
    }
}
