//! Module containing the payload record and its type-erased handles

mod action;
mod data;
mod raw;

pub use self::raw::{RawPayload, RecordHandle};
