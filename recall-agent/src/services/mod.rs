//! External collaborators: the recall source and the summarizer

pub mod gemini_client;
pub mod openfda_client;

pub use gemini_client::{GeminiClient, SummarizeError, Summarizer};
pub use openfda_client::{FetchError, OpenFdaClient, RecallSource};
