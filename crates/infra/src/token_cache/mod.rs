//! Token cache backends.

mod in_memory;
#[cfg(feature = "redis")]
mod redis;

pub use in_memory::InMemoryTokenCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisTokenCache;
