//! Schema-bound LLM call surface shared by the vetting agent, discovery
//! fetcher, and enrichment orchestrator.

pub mod client;
pub mod error;
pub mod mock;
pub mod schema;

pub use client::{extract, LlmClient, OpenAiClient};
pub use error::AiError;
pub use mock::MockLlmClient;
pub use schema::StructuredOutput;
