pub mod agent;
pub mod errors;
pub mod events;
pub mod guardrail;
pub mod handoff;
pub mod ids;
pub mod items;
pub mod provider;
pub mod result;
pub mod session;
pub mod stream;
pub mod tools;
pub mod trace;
pub mod usage;
