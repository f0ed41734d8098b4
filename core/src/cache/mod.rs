//! Bounded cache of decoded pages.

pub mod memory;

pub use memory::{Admission, CacheState, CachedPage, PageCache};
