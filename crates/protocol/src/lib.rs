//! Wire protocol and data-model types for the pitch deck analyzer client.
//!
//! Shared by the job status channel, the REST client and the store.

pub mod constants;
pub mod envelope;
pub mod types;

// Re-export primary types for convenience.
pub use constants::MessageKind;
pub use envelope::StatusMessage;
pub use types::{
    Analysis, AnalysisResult, Deck, JobId, JobStatus, KnowledgeFile, encode_path_segment,
};
