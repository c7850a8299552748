//! Storage backends shared by the cache tier and the request registry.

pub mod traits;
pub mod memory;
pub mod redis;

pub use traits::{CacheStore, RegistryStore, StorageError};
pub use memory::InMemoryStore;
pub use self::redis::RedisStore;
