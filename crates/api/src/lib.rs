//! REST client for the pitch deck analyzer backend.
//!
//! Decks, analysis jobs and the knowledge base. Uploads are validated locally
//! before any request is made.

pub mod client;
pub mod upload;

pub use client::{ApiClient, ApiError};
pub use upload::UploadError;
