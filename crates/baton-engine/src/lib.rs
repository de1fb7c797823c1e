pub mod config;
pub mod emitter;
pub mod error;
pub mod guardrails;
pub mod handoff;
pub mod invoker;
pub mod registry;
pub mod runner;
pub mod state;
pub mod turn;

pub use config::{RetryPolicy, RunOptions, RunnerConfig};
pub use error::RunError;
pub use runner::{RunInput, RunStream, Runner};
