//! Core orchestration: configuration, per-session conversation state, prompt
//! assembly, and the fixed retrieve-then-generate pipeline.

pub mod config;
pub mod pipeline;
pub mod prompt;
pub mod session;

pub use config::{Config, Secret};
pub use pipeline::{ChatPipeline, PipelineAnswer, PipelineError, Retriever, RetrieverConfig};
pub use session::{SessionStore, Speaker, Transcript};
