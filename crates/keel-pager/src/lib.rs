//! Paged file layer for KeelDB.
//!
//! A [`Pager`] owns a single OS file and exposes fixed-size page I/O with an
//! LRU write-back cache, a free-page list threaded through page bodies, raw
//! byte I/O for the record log, and a background periodic flush.

mod cache;
mod pager;

pub use pager::Pager;
