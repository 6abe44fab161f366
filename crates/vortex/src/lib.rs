//! Vortex analytics client for Rust.
//!
//! Collects application events, stamps them with a durable anonymous
//! identity and a per-process session, and delivers them to a Vortex
//! collector, either one request per event or in batches.
//!
//! # Example
//!
//! ```rust,ignore
//! use vortex::{AnalyticsManager, FileStore};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vortex::Error> {
//!     let analytics = AnalyticsManager::builder()
//!         .store(FileStore::new("saved/vortex.toml"))
//!         .app_version("0.9.1")
//!         .build()?;
//!
//!     analytics.init("tenant_123", "https://in.vortexanalytics.io", "linux");
//!     analytics.track_event("menu_opened", "");
//!
//!     analytics.batched_track_event("item_crafted", r#"{"item":"sword"}"#);
//!     analytics.flush_manual_batch();
//!
//!     analytics.set_auto_batching(true, Duration::from_secs(5));
//!
//!     analytics.shutdown().await;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod queue;
mod session;
mod state;
mod transport;
pub mod types;

pub use client::{AnalyticsManager, ManagerStatus, APP_STARTED_EVENT};
pub use config::{
    AnalyticsBuilder, Config, RuntimeContext, Settings, DEFAULT_AUTO_FLUSH_INTERVAL,
    DEFAULT_HEALTH_CHECK_TIMEOUT, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_TIMEOUT, ENV_DISABLED,
    ENV_ENABLED,
};
pub use error::Error;
pub use session::{
    FileStore, IdentityStore, MemoryStore, Session, DEFAULT_APP_VERSION, IDENTITY_KEY,
    IDENTITY_SECTION,
};
pub use types::{BatchedTracks, Tracking, TrackingData};
