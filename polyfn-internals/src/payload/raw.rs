//! Type-erased payload pointer types.
//!
//! This module encapsulates the `ptr` field of [`RawPayload`] and
//! [`RecordHandle`], ensuring it is only visible within this module. This
//! visibility restriction guarantees the safety invariant: **the pointer always
//! refers to a `PayloadRecord<C, I, A>` allocated through `A` rebound to that
//! record type**.
//!
//! # Safety Invariant
//!
//! Since the `ptr` field can only be set by [`RawPayload::new`] and by the
//! reuse path of [`RawPayload::install`] (which writes a complete record of the
//! same layout into storage it already owns), the pointer provenance and the
//! record's entry points stay valid throughout the value's lifetime.
//!
//! # Ownership
//!
//! Unlike `Box`, a [`RawPayload`] does not know its allocator. It has no `Drop`
//! implementation; the owning container must hand it back through
//! [`RawPayload::release`] together with the allocator it was created with.
//! A [`RawPayload`] that is dropped without being released leaks its record.

use core::{alloc::Layout, ptr::NonNull};

use crate::{
    allocator::{AllocError, Allocator},
    payload::{
        action::{Action, Outcome},
        data::PayloadRecord,
    },
    util::Erased,
};

/// An owning pointer to a [`PayloadRecord`] that is guaranteed to point to an
/// initialized instance of a `PayloadRecord<C, I, A>` for some specific `C`,
/// though we do not know which actual `C` it is.
///
/// `I` is the type of the invocation stub and `A` the allocator type of the
/// owning container. Neither depends on `C`.
#[repr(transparent)]
pub struct RawPayload<I, A> {
    /// Pointer to the record
    ///
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. The pointer was returned by an allocator of type `A` rebound to
    ///    `PayloadRecord<C, I, A>` for some `C`.
    /// 2. The pointee is an initialized `PayloadRecord<C, I, A>` for that `C`,
    ///    except transiently inside [`RawPayload::install`] and
    ///    [`RawPayload::release`].
    /// 3. No other [`RawPayload`] points to the same record.
    ptr: NonNull<PayloadRecord<Erased, I, A>>,
}

impl<I: Copy, A: Allocator> RawPayload<I, A> {
    /// Allocates a new record holding `callable` and its invocation stub.
    ///
    /// The record's action dispatcher is generated for `C`, and `invoke` must
    /// be the invocation stub generated for `C` as well.
    #[inline]
    pub fn new<C: Clone>(callable: C, invoke: I, alloc: &A) -> Result<Self, AllocError> {
        Self::from_record(PayloadRecord::<C, I, A>::new(callable, invoke), alloc)
    }

    /// Allocates storage for `record` and moves it there.
    fn from_record<C>(record: PayloadRecord<C, I, A>, alloc: &A) -> Result<Self, AllocError> {
        let rebound = alloc.rebind::<PayloadRecord<C, I, A>>();
        let layout = Layout::new::<PayloadRecord<C, I, A>>();
        let ptr = rebound.allocate()?;
        tracing::trace!(
            size = layout.size(),
            align = layout.align(),
            "allocated payload storage"
        );

        // SAFETY:
        // 1. The pointer was just allocated for a `PayloadRecord<C, I, A>`
        // 2. Nothing has been stored there yet
        unsafe {
            rebound.construct(ptr, record);
        }

        Ok(Self {
            // SAFETY:
            // 1. The pointer was allocated through `A` rebound to the record type
            // 2. The record was initialized just above
            // 3. The allocation is fresh, so nothing else points to it
            ptr: ptr.cast::<PayloadRecord<Erased, I, A>>(),
        })
    }

    /// Returns a raw pointer to the erased record.
    #[inline]
    pub(super) fn as_ptr(&self) -> *const PayloadRecord<Erased, I, A> {
        self.ptr.as_ptr()
    }

    /// Returns the handle that the invocation stub expects.
    #[inline]
    pub fn handle(&self) -> RecordHandle {
        RecordHandle {
            ptr: self.ptr.cast::<Erased>(),
        }
    }

    /// Returns the layout of the record, as reported by its dispatcher.
    ///
    /// Two records with equal layouts can occupy the same storage.
    #[inline]
    pub fn layout(&self, alloc: &A) -> Layout {
        let action = self.action();

        // SAFETY: The dispatcher belongs to this record and the record is
        // initialized (invariants 1 and 2). Reporting the layout does not
        // touch the allocator or the record.
        match unsafe { action(self.ptr, alloc, Action::ReportLayout) } {
            Outcome::Layout(layout) => layout,
            outcome => unreachable!("dispatcher answered `ReportLayout` with {outcome:?}"),
        }
    }

    /// Destroys the callable and releases the record's storage.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `alloc` is equal to the allocator the record was allocated with.
    #[inline]
    pub unsafe fn release(self, alloc: &A) {
        let action = self.action();
        tracing::trace!("releasing payload storage");

        // SAFETY:
        // 1. Guaranteed by the caller
        // 2. The record is initialized (invariant 2)
        // 4. `self` is consumed, so the record is only used for deallocation
        unsafe {
            action(self.ptr, alloc, Action::Destroy);
        }

        // SAFETY:
        // 1. Guaranteed by the caller
        // 3. The record was destroyed above and `self` is consumed
        unsafe {
            action(self.ptr, alloc, Action::Deallocate);
        }
    }

    /// Deep-copies this record into `target`.
    ///
    /// If `target` is engaged and its record has the same layout as this one,
    /// the target's storage is reused: the old callable is destroyed and the
    /// copy is constructed in place. Otherwise the old record (if any) is
    /// destroyed and deallocated, and a fresh record is allocated through
    /// `target_alloc`.
    ///
    /// On allocation failure `target` is left empty.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `alloc` is equal to the allocator this record was allocated with.
    /// 2. `target` is empty, or holds a record allocated by an allocator equal
    ///    to `target_alloc`.
    #[inline]
    pub unsafe fn clone_into(
        &self,
        alloc: &A,
        target: &mut Option<Self>,
        target_alloc: &A,
    ) -> Result<(), AllocError> {
        let action = self.action();

        // SAFETY:
        // 1. Guaranteed by the caller
        // 2. The record is initialized (invariant 2)
        // 5. Guaranteed by the caller
        let outcome = unsafe {
            action(
                self.ptr,
                alloc,
                Action::CloneInto {
                    target,
                    target_alloc,
                },
            )
        };

        match outcome {
            Outcome::Cloned(result) => result,
            outcome => unreachable!("dispatcher answered `CloneInto` with {outcome:?}"),
        }
    }

    /// Stores `callable` in `slot`, following the same storage policy as
    /// [`RawPayload::clone_into`].
    ///
    /// On allocation failure `slot` is left empty: the old callable has
    /// already been destroyed at that point.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `slot` is empty, or holds a record allocated by an allocator equal to
    ///    `alloc`.
    #[inline]
    pub unsafe fn replace<C: Clone>(
        slot: &mut Option<Self>,
        callable: C,
        invoke: I,
        alloc: &A,
    ) -> Result<(), AllocError> {
        // SAFETY: Guaranteed by the caller
        unsafe { Self::install(slot, PayloadRecord::<C, I, A>::new(callable, invoke), alloc) }
    }

    /// Moves `record` into `slot`, reusing the slot's storage when the layouts
    /// match.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `slot` is empty, or holds a record allocated by an allocator equal to
    ///    `alloc`.
    pub(super) unsafe fn install<C>(
        slot: &mut Option<Self>,
        record: PayloadRecord<C, I, A>,
        alloc: &A,
    ) -> Result<(), AllocError> {
        let layout = Layout::new::<PayloadRecord<C, I, A>>();

        // The slot is emptied before anything is destroyed, so a panicking
        // destructor can leak the old record but never expose it twice.
        if let Some(existing) = slot.take() {
            let existing_layout = existing.layout(alloc);
            let action = existing.action();

            // SAFETY:
            // 1. Guaranteed by the caller
            // 2. The record is initialized (invariant 2)
            // 4. The storage is either reused or deallocated below
            unsafe {
                action(existing.ptr, alloc, Action::Destroy);
            }

            if existing_layout == layout {
                tracing::trace!(
                    size = layout.size(),
                    align = layout.align(),
                    "reusing payload storage"
                );
                let ptr = existing.ptr.cast::<PayloadRecord<C, I, A>>();

                // SAFETY:
                // 1. The storage was allocated for a record with exactly this
                //    layout, so it is valid and aligned for the new record
                // 2. The previous record was destroyed above
                unsafe {
                    alloc
                        .rebind::<PayloadRecord<C, I, A>>()
                        .construct(ptr, record);
                }

                // The pointer now refers to a `PayloadRecord<C, I, A>` with a
                // matching dispatcher, allocated with the same layout, so all
                // invariants of `RawPayload` hold again.
                *slot = Some(existing);
                return Ok(());
            }

            tracing::trace!(
                old_size = existing_layout.size(),
                new_size = layout.size(),
                "reallocating payload storage"
            );

            // SAFETY:
            // 1. Guaranteed by the caller
            // 3. The record was destroyed above and `existing` is not used
            //    afterwards
            unsafe {
                action(existing.ptr, alloc, Action::Deallocate);
            }
        }

        *slot = Some(Self::from_record(record, alloc)?);
        Ok(())
    }
}

impl<I, A> core::fmt::Debug for RawPayload<I, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("RawPayload").field(&self.ptr).finish()
    }
}

/// The opaque handle passed to invocation stubs.
///
/// It points at a record whose callable type is only known to the stub that
/// was generated for it. See [`RecordHandle::callable`].
#[derive(Clone, Copy, Debug)]
#[repr(transparent)]
pub struct RecordHandle {
    /// Pointer to the start of a `PayloadRecord<C, I, A>`
    ptr: NonNull<Erased>,
}

impl RecordHandle {
    /// Returns the raw pointer to the start of the record.
    #[inline]
    pub(super) fn as_ptr(self) -> *mut Erased {
        self.ptr.as_ptr()
    }
}

#[cfg(test)]
mod tests {
    use alloc::{rc::Rc, string::String};

    use super::*;
    use crate::allocator::Global;

    type Stub = unsafe fn(RecordHandle) -> usize;

    unsafe fn len_stub<C: AsRef<str>>(handle: RecordHandle) -> usize {
        // SAFETY: The test only uses this stub with records holding a `C`
        let callable = unsafe { handle.callable::<C, Stub, Global>() };
        // SAFETY: See above
        unsafe { callable.as_ref() }.as_ref().len()
    }

    #[test]
    fn test_raw_payload_size() {
        assert_eq!(
            core::mem::size_of::<RawPayload<Stub, Global>>(),
            core::mem::size_of::<usize>()
        );
        assert_eq!(
            core::mem::size_of::<Option<RawPayload<Stub, Global>>>(),
            core::mem::size_of::<usize>()
        );
        assert_eq!(
            core::mem::size_of::<RecordHandle>(),
            core::mem::size_of::<usize>()
        );
    }

    #[test]
    fn test_invoke_through_handle() {
        let payload =
            RawPayload::<Stub, Global>::new(String::from("hello"), len_stub::<String>, &Global)
                .unwrap();
        let invoke = payload.invoker();

        // SAFETY: The stub was generated for `String`
        assert_eq!(unsafe { invoke(payload.handle()) }, 5);

        // SAFETY: Allocated by `Global`
        unsafe {
            payload.release(&Global);
        }
    }

    #[test]
    fn test_replace_reuses_equal_layout() {
        let mut slot = Some(
            RawPayload::<Stub, Global>::new(String::from("a"), len_stub::<String>, &Global)
                .unwrap(),
        );
        let before = slot.as_ref().unwrap().as_ptr();

        // SAFETY: The slot was allocated by `Global`
        unsafe {
            RawPayload::replace(&mut slot, String::from("abc"), len_stub::<String>, &Global)
                .unwrap();
        }

        let payload = slot.take().unwrap();
        assert_eq!(payload.as_ptr(), before);
        // SAFETY: The stub was generated for `String`
        assert_eq!(unsafe { payload.invoker()(payload.handle()) }, 3);

        // SAFETY: Allocated by `Global`
        unsafe {
            payload.release(&Global);
        }
    }

    #[test]
    fn test_clone_into_is_independent() {
        let tracker = Rc::new(());
        let source =
            RawPayload::<Stub, Global>::new(Rc::clone(&tracker), dummy_stub, &Global).unwrap();
        let mut target = None;

        // SAFETY: Both sides use `Global`
        unsafe {
            source.clone_into(&Global, &mut target, &Global).unwrap();
        }
        assert_eq!(Rc::strong_count(&tracker), 3);

        let target = target.unwrap();
        assert_ne!(target.as_ptr(), source.as_ptr());
        assert!(core::ptr::fn_addr_eq(target.invoker(), source.invoker()));

        // SAFETY: Allocated by `Global`
        unsafe {
            source.release(&Global);
        }
        assert_eq!(Rc::strong_count(&tracker), 2);

        // SAFETY: Allocated by `Global`
        unsafe {
            target.release(&Global);
        }
        assert_eq!(Rc::strong_count(&tracker), 1);
    }

    unsafe fn dummy_stub(_handle: RecordHandle) -> usize {
        0
    }

    #[test]
    fn test_send_sync() {
        static_assertions::assert_not_impl_any!(RawPayload<Stub, Global>: Send, Sync);
        static_assertions::assert_not_impl_any!(RecordHandle: Send, Sync);
    }
}
