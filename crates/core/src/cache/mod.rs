//! Persistent cache: storage trait, in-memory store, tiered mirror and key scheme.

pub mod keys;
mod memory;
mod meta;
mod store;
mod tiered;

pub use memory::MemoryCacheStore;
pub use meta::TabMeta;
pub use store::CacheStore;
pub use tiered::TieredCache;
