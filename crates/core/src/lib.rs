// crates/core/src/lib.rs

//! Capability lifecycle: versioned store, human review gate, sandboxed
//! execution and the bounded repair loop that ties them together.

pub mod ai_client;
pub mod error;
pub mod generation;
pub mod manifest;
pub mod node;
pub mod openai;
pub mod payload;
pub mod prompts;
pub mod quarantine;
pub mod repair;
pub mod resolver;
pub mod sandbox;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use generation::CapabilityFactory;
pub use quarantine::{Approver, QuarantineGate};
pub use repair::{Invocation, SelfHealingExecutor};
pub use sandbox::{ExecutionContext, ModuleLoader, Sandbox};
pub use store::CapabilityStore;
pub use types::{CapabilitySpec, ExecutionOutcome, Fault, LogLevel, LogLine};
