#![warn(missing_docs)]

//! # rulegate-engine
//!
//! Sandboxed execution of approval rules against pull-request change sets.
//!
//! A rule is a short program in a constrained scripting dialect whose
//! `main(patches, metadata)` decides whether a change set is
//! auto-approvable. The engine runs it hermetically and returns
//! `{approve, logs}`.
//!
//! ## Security model
//!
//! - **Purpose-built interpreter**: the dialect is executed by a small
//!   tree-walking evaluator, not a host engine — there is no runtime to
//!   escape into
//! - **No ambient capabilities**: no network, filesystem, environment,
//!   process, timer, or randomness primitives exist in the guest's scope;
//!   referencing one is a ReferenceError
//! - **JSON-only bridge**: inputs and outputs cross the boundary as
//!   serialized text, never as host references
//! - **Cooperative stepping**: the evaluator yields its thread every
//!   `N` micro-steps and enforces a hard wall-clock deadline
//! - **Fresh state per call**: each invocation gets its own interpreter,
//!   globals, and bridge; nothing persists
//!
//! ## Example
//!
//! ```no_run
//! # async fn example() -> Result<(), rulegate_engine::RuleError> {
//! use rulegate_engine::{EngineConfig, LogMode, RuleExecutor};
//!
//! let executor = RuleExecutor::new(EngineConfig {
//!     log_mode: LogMode::Capture,
//!     ..EngineConfig::default()
//! });
//!
//! let rule = "function main(patches, metadata) { return patches.length === 1; }";
//! let evaluation = executor.run_rule(rule, &[], &Default::default()).await?;
//! assert!(!evaluation.approve);
//! # Ok(())
//! # }
//! ```

mod ast;
mod builtins;
mod interp;
mod lexer;
mod parser;
mod value;

pub mod bridge;
pub mod error;
pub mod executor;
pub mod validator;

pub use bridge::{LogEntry, LogLevel, LogMode};
pub use error::RuleError;
pub use executor::{run_rule, EngineConfig, RuleEvaluation, RuleExecutor};
