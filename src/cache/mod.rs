//! L1 process cache and object-cache adapter.

pub mod l1;
pub mod object_cache;

pub use l1::L1Cache;
pub use object_cache::{ObjectCacheAdapter, WriteBackDecision};
