pub mod agent;
pub mod chart;
pub mod config;
pub mod error;
pub mod executor;
pub mod export;
pub mod guard;
pub mod intent;
pub mod llm;
pub mod orchestrator;
pub mod store;
pub mod synthesis;
pub mod tools;

pub use error::{AgentError, Result};
pub use orchestrator::{Orchestrator, PresentationOutput};
