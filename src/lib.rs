#![cfg_attr(not(doc), no_std)]
#![deny(
    missing_docs,
    clippy::alloc_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    clippy::missing_safety_doc,
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::as_ptr_cast_mut,
    clippy::ptr_as_ptr,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! An allocator-aware, type-erased container for callables.
//!
//! ## Overview
//!
//! [`Function<S, A, U, T>`](Function) holds any callable matching the signature
//! `S`: closures, function pointers, methods, or your own types implementing
//! the `Fn` traits. Unlike `Box<dyn Fn(..)>`, every byte of storage comes from
//! the allocator `A`, which can be a stack arena, a pool, an instrumented
//! wrapper, or anything else implementing [`Allocator`].
//!
//! ```
//! use polyfn::Function;
//!
//! let mut f: Function<dyn Fn(i32) -> i32> = Function::new(|x: i32| x * 2);
//! assert_eq!(f.call(21), 42);
//!
//! f.set(|x: i32| x + 1);
//! assert_eq!(f.call(41), 42);
//!
//! f.clear();
//! assert!(f.is_empty());
//! ```
//!
//! ## Core Concepts
//!
//! A container is either **empty** or **engaged**. An engaged container owns
//! one *payload record*, allocated through its allocator, that holds three
//! things:
//!
//! - The **invocation stub**, which knows how to call the stored callable with
//!   the signature's arguments.
//! - The **action dispatcher**, which knows how to destroy, deallocate, clone
//!   and measure the record.
//! - The **callable** itself.
//!
//! Both entry points are generated for the concrete callable type when the
//! container is constructed, so the container never needs to name that type
//! again, and there is no vtable, `Box` or `Any` involved.
//!
//! ## Signatures
//!
//! The signature parameter is a trait-object type used only at the type level:
//!
//! - `Function<dyn Fn(A1, .., An) -> R>` is invoked through a shared reference
//!   with [`call`](Function::call).
//! - `Function<dyn FnMut(A1, .., An) -> R>` is invoked through an exclusive
//!   reference with [`call_mut`](Function::call_mut), and can hold callables
//!   that mutate their own state.
//!
//! Results are converted through [`Into`], and the [`Discard`] adapter drops a
//! result when the signature returns `()`. See [`signature`] for details.
//!
//! ## Allocators
//!
//! Every storage decision goes through the container's [`Allocator`]:
//!
//! - Reassigning a callable whose payload record has the same layout as the
//!   current one reuses the storage in place.
//! - Copies allocate from [`Allocator::select_on_copy`].
//! - Moving, swapping and copy-assignment honor the allocator's propagation
//!   constants, and fall back to deep copies between unequal allocators.
//!
//! The [`allocators`] module ships a counting wrapper, a bump arena and a
//! recycling pool. Every storage decision is also reported as a `tracing`
//! event at the `trace` level.
//!
//! ## Unwinding
//!
//! The third parameter is a marker: [`MayUnwind`](markers::MayUnwind) (the
//! default) lets panics propagate out of calls, while
//! [`NoUnwind`](markers::NoUnwind) turns them into an abort. See [`markers`].
//!
//! ## Thread Safety
//!
//! The fourth parameter is another marker. With [`SendSync`](markers::SendSync)
//! (the default) only `Send + Sync` callables can be stored, and the container
//! is `Send` and `Sync` whenever its allocator is. With
//! [`Local`](markers::Local) any callable can be stored, and the container
//! stays on its thread. Either way the container adds no synchronization of
//! its own: concurrent mutation needs a lock around it, as with any other
//! value.

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod allocators;
pub mod error;
mod function;
pub mod markers;
pub mod prelude;
pub mod signature;

pub use polyfn_internals::{AllocError, Allocator, Global, Rebound};

pub use self::{
    function::Function,
    signature::{Callable, Discard, SharedSignature, Signature},
};
