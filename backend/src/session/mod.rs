//! Run sessions and the lifecycle of the values they hold

pub mod config;
pub mod run_session;
pub mod tracker;

pub use config::SessionConfig;
pub use run_session::{RunSession, SessionState};
pub use tracker::{LifecycleTracker, Settlement, TrackedValue};
