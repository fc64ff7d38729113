// Service exports
pub mod client;
pub mod handoff;

pub use client::{ApiError, ErrorKind, MatchApi, ProgressCallback, RemoteClient};
pub use handoff::{open_store, FileStore, Handoff, HandoffError, HandoffKey, HandoffStore, MemoryStore, RedisStore};
