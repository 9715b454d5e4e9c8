//! Rule executor — runs rule programs on dedicated interpreter threads.
//!
//! The interpreter's value graph is `Rc`-based and `!Send`, so each
//! invocation runs on its own thread and reports back over a oneshot
//! channel. The public API is fully async and `Send`-safe. A semaphore
//! bounds concurrent executions; a host-side backstop timer covers the
//! (never-expected) case of an interpreter thread failing to observe its
//! own deadline.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use rulegate_patch::{ChangeSetMetadata, Patch};
use tokio::sync::Semaphore;

use crate::bridge::{Bridge, LogEntry, LogMode};
use crate::error::RuleError;
use crate::interp::{escaped_signal_message, Interpreter, Signal, StepLimits};
use crate::parser;
use crate::validator::validate_program;

/// Driver appended after the rule text (function declarations hoist, so
/// `main` is visible regardless of where it is defined).
const HARNESS: &str = "\
var __rulegate_in = JSON.parse(getInput());\n\
setOutput(JSON.stringify(main(__rulegate_in.patches, __rulegate_in.metadata)));\n";

/// Configuration for the rule executor.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wall-clock budget per rule invocation.
    pub max_runtime: Duration,
    /// Sleep duration at each cooperative yield point.
    pub sleep: Duration,
    /// Interpreter micro-steps between yields.
    pub steps_per_yield: u64,
    /// Maximum rule text size in bytes.
    pub max_code_size: usize,
    /// Maximum concurrent rule executions.
    pub max_concurrent: usize,
    /// Maximum guest call depth.
    pub max_call_depth: usize,
    /// What happens to guest `console.*` calls.
    pub log_mode: LogMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_runtime: Duration::from_millis(5000),
            sleep: Duration::from_millis(100),
            steps_per_yield: 100,
            max_code_size: 64 * 1024, // 64 KB
            max_concurrent: 8,
            max_call_depth: 128,
            log_mode: LogMode::default(),
        }
    }
}

/// Result of a settled rule invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEvaluation {
    /// The rule's decision.
    pub approve: bool,
    /// Captured guest logs (empty unless [`LogMode::Capture`]).
    pub logs: Vec<LogEntry>,
}

/// The rule executor. Spawns a fresh interpreter per invocation; no state
/// persists across calls.
pub struct RuleExecutor {
    config: EngineConfig,
    semaphore: Arc<Semaphore>,
}

impl RuleExecutor {
    /// Create an executor with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self { config, semaphore }
    }

    /// Evaluate one rule against a change-set snapshot.
    ///
    /// The snapshot is serialized to JSON before crossing into the guest;
    /// the guest never holds references into host data.
    pub async fn run_rule(
        &self,
        program: &str,
        patch_list: &[Patch],
        metadata: &ChangeSetMetadata,
    ) -> Result<RuleEvaluation, RuleError> {
        tracing::info!(code_len = program.len(), "run_rule: starting");

        validate_program(program, self.config.max_code_size)?;

        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RuleError::Internal("executor semaphore closed".into()))?;

        let input = serde_json::json!({
            "patches": patch_list,
            "metadata": metadata,
        })
        .to_string();

        let config = self.config.clone();
        let program = program.to_string();
        let (tx, rx) = tokio::sync::oneshot::channel();

        std::thread::spawn(move || {
            let result = run_interpreter(&config, &program, input);
            if tx.send(result).is_err() {
                tracing::warn!("rule result receiver dropped before result was sent");
            }
        });

        // The interpreter enforces the deadline itself at every step
        // boundary; this outer timer only covers a wedged thread.
        let backstop = self.config.max_runtime + self.config.sleep + Duration::from_secs(1);
        let result = match tokio::time::timeout(backstop, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RuleError::Internal("interpreter thread panicked".into())),
            Err(_) => Err(RuleError::Timeout {
                timeout_ms: self.config.max_runtime.as_millis() as u64,
            }),
        };

        match &result {
            Ok(evaluation) => {
                tracing::info!(approve = evaluation.approve, "run_rule: settled");
            }
            Err(e) => tracing::warn!(error = %e, "run_rule: failed"),
        }

        result
    }
}

/// One-shot convenience wrapper around [`RuleExecutor`].
pub async fn run_rule(
    program: &str,
    patch_list: &[Patch],
    metadata: &ChangeSetMetadata,
    config: EngineConfig,
) -> Result<RuleEvaluation, RuleError> {
    RuleExecutor::new(config)
        .run_rule(program, patch_list, metadata)
        .await
}

/// Parse and run one rule on the current thread (called from a dedicated
/// interpreter thread).
fn run_interpreter(
    config: &EngineConfig,
    program: &str,
    input: String,
) -> Result<RuleEvaluation, RuleError> {
    let mut stmts = parser::parse(program).map_err(|message| RuleError::RuleExecutionFailure {
        message: format!("parse error: {message}"),
    })?;
    let harness = parser::parse(HARNESS)
        .map_err(|message| RuleError::Internal(format!("harness failed to parse: {message}")))?;
    stmts.extend(harness);

    let bridge = Rc::new(Bridge::new(input, config.log_mode));
    let limits = StepLimits {
        steps_per_yield: config.steps_per_yield,
        sleep: config.sleep,
        max_runtime: config.max_runtime,
        max_call_depth: config.max_call_depth,
    };
    let interpreter = Interpreter::new(&bridge, &limits);

    match interpreter.run(&stmts) {
        Ok(()) => {}
        Err(Signal::Timeout) => {
            // Logs captured before the timeout are discarded with the bridge.
            return Err(RuleError::Timeout {
                timeout_ms: config.max_runtime.as_millis() as u64,
            });
        }
        Err(Signal::Internal(message)) => return Err(RuleError::Internal(message)),
        Err(signal) => {
            return Err(RuleError::RuleExecutionFailure {
                message: escaped_signal_message(&signal),
            });
        }
    }

    let output = bridge.output.borrow_mut().take();
    let Some(output) = output else {
        return Err(RuleError::Internal(
            "rule settled without writing an output".into(),
        ));
    };

    match serde_json::from_str::<serde_json::Value>(&output) {
        Ok(serde_json::Value::Bool(approve)) => Ok(RuleEvaluation {
            approve,
            logs: std::mem::take(&mut *bridge.logs.borrow_mut()),
        }),
        Ok(other) => Err(RuleError::NonBooleanResult {
            got: describe_json(&other).to_string(),
        }),
        Err(_) => Err(RuleError::NonBooleanResult {
            got: format!("unparseable output `{output}`"),
        }),
    }
}

fn describe_json(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
