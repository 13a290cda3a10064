//! Application state for the pitch deck analyzer client.
//!
//! [`AppStore`] runs REST actions and records their outcome in [`AppState`];
//! [`JobProgress`] folds status stream messages into per-job progress.

pub mod progress;
pub mod store;

pub use progress::JobProgress;
pub use store::{AppState, AppStore};
