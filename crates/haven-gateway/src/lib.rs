pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod mock;
pub mod server;
pub mod storage;
pub mod upstream;

#[cfg(test)]
mod tests;

pub use gateway::{Gateway, GatewayBuilder, Policy, Source, State};
pub use storage::{CacheStorage, CacheStore, ResponseSnapshot};
pub use upstream::{HttpUpstream, Upstream};
