#![no_std]
#![forbid(
    missing_docs,
    clippy::alloc_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    clippy::missing_safety_doc,
    clippy::missing_docs_in_private_items,
    clippy::undocumented_unsafe_blocks,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    unused_doc_comments
)]
#![allow(rustdoc::private_intra_doc_links)]
//! Internal implementation crate for [`polyfn`].
//!
//! # Overview
//!
//! This crate contains the low-level, type-erased data structures and unsafe
//! operations that power the [`polyfn`] callable container. It provides
//! type erasure through two hand-rolled entry points per stored callable
//! instead of a trait object.
//!
//! **This crate is an implementation detail.** No semantic versioning guarantees
//! are provided. Users should depend on the [`polyfn`] crate, not this one.
//!
//! # Architecture
//!
//! - **[`allocator`]**: The allocator contract
//!   - [`Allocator`]: Allocate/deallocate plus the propagation constants
//!   - [`Rebound`]: An allocator rebound to one concrete record type
//!   - [`Global`]: The default, stateless allocator
//!
//! - **[`payload`]**: Type-erased payload storage
//!   - [`RawPayload`]: Owning pointer to a record, released by its container
//!   - [`RecordHandle`]: The opaque handle passed to invocation stubs
//!   - [`PayloadRecord`]: `#[repr(C)]` record of invocation stub, action
//!     dispatcher and callable
//!   - [`dispatch`]: The per-type deallocate / destroy / report-layout /
//!     clone-into dispatcher
//!
//! # Safety Strategy
//!
//! When we erase `PayloadRecord<MyClosure, I, A>` to
//! `PayloadRecord<Erased, I, A>`, the two stored entry points must still match
//! the actual callable stored in memory. This crate maintains that through:
//!
//! - **Module-based encapsulation**: The record's fields and the handle's
//!   pointer are module-private, making the invariants locally verifiable
//!   within a single file
//! - **`#[repr(C)]` layout**: The entry points sit at offsets that do not
//!   depend on the callable type, so they can be read through an erased
//!   pointer without constructing invalid references
//! - **Explicit allocator hand-off**: A [`RawPayload`] never frees itself; the
//!   container passes the allocator that created it to
//!   [`RawPayload::release`]
//!
//! [`polyfn`]: https://docs.rs/polyfn/latest/polyfn/
//! [`PayloadRecord`]: payload::data::PayloadRecord
//! [`dispatch`]: payload::action::dispatch

extern crate alloc;

pub mod allocator;
mod payload;
mod util;

pub use self::{
    allocator::{AllocError, Allocator, Global, Rebound},
    payload::{RawPayload, RecordHandle},
};
