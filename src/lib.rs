pub mod client;
pub mod config;
pub mod errors;
pub mod grouping;
pub mod models;
pub mod stats;
pub mod store;
pub mod time;

pub use client::{AuthSession, FeedingApi, NetworkMonitor, RemoteClient};
pub use config::Config;
pub use errors::{ApiError, ErrorCode};
pub use store::{FeedingStore, PollingHandle, SyncState, SyncTrigger};
