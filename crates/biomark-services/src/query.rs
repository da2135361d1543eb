//! Query execution: the polling runner and a scripted local engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use biomark_protocol::{
    Clock, QueryEngine, QueryResultSet, QueryStatus, ServiceError, StatementId,
};
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

/// Fixed polling cadence for long-running statements.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Submits a statement and polls it to completion on a fixed interval.
///
/// `Failed` and `Cancelled` are reported as errors and never retried. There
/// is deliberately no bounding timeout here; the invoking platform owns the
/// overall deadline.
#[derive(Clone)]
pub struct QueryRunner {
    engine: Arc<dyn QueryEngine>,
    clock: Arc<dyn Clock>,
    config: PollConfig,
}

impl QueryRunner {
    pub fn new(engine: Arc<dyn QueryEngine>, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine,
            clock,
            config: PollConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PollConfig) -> Self {
        self.config = config;
        self
    }

    #[instrument(skip(self, sql), fields(sql_len = sql.len()))]
    pub async fn run(&self, database: &str, sql: &str) -> Result<QueryResultSet, ServiceError> {
        let id = self.engine.submit(database, sql).await?;
        debug!(statement = %id, "statement submitted");

        loop {
            match self.engine.describe(&id).await? {
                QueryStatus::Finished => {
                    debug!(statement = %id, "statement finished");
                    return self.engine.fetch(&id).await;
                }
                QueryStatus::Failed { reason } => {
                    warn!(statement = %id, %reason, "statement failed");
                    return Err(ServiceError::QueryFailed {
                        id: id.to_string(),
                        reason,
                    });
                }
                QueryStatus::Cancelled => {
                    warn!(statement = %id, "statement cancelled");
                    return Err(ServiceError::QueryCancelled { id: id.to_string() });
                }
                QueryStatus::Submitted | QueryStatus::Running => {
                    self.clock.sleep(self.config.interval).await;
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
enum ScriptedOutcome {
    Finish(QueryResultSet),
    Fail(String),
}

#[derive(Debug)]
struct StatementState {
    remaining_polls: u32,
    outcome: ScriptedOutcome,
}

#[derive(Debug, Default)]
struct EngineState {
    scripts: Vec<(String, ScriptedOutcome)>,
    statements: HashMap<String, StatementState>,
    submissions: u64,
}

/// Local engine that answers registered SQL fragments with canned result
/// sets, staying `Running` for a configurable number of polls first. Used by
/// tests and by gateway runs without a real engine.
#[derive(Debug, Clone, Default)]
pub struct StaticQueryEngine {
    state: Arc<Mutex<EngineState>>,
    polls_until_finish: u32,
}

impl StaticQueryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stay `Running` for `polls` describe calls before finishing.
    pub fn with_polls_until_finish(mut self, polls: u32) -> Self {
        self.polls_until_finish = polls;
        self
    }

    /// Answer any statement containing `sql_fragment` with `result`.
    /// Fragments are matched case-insensitively, first registration wins.
    pub fn register(&self, sql_fragment: impl Into<String>, result: QueryResultSet) {
        self.state
            .lock()
            .scripts
            .push((sql_fragment.into().to_lowercase(), ScriptedOutcome::Finish(result)));
    }

    /// Fail any statement containing `sql_fragment`.
    pub fn fail_matching(&self, sql_fragment: impl Into<String>, reason: impl Into<String>) {
        self.state
            .lock()
            .scripts
            .push((sql_fragment.into().to_lowercase(), ScriptedOutcome::Fail(reason.into())));
    }

    pub fn submissions(&self) -> u64 {
        self.state.lock().submissions
    }
}

#[async_trait]
impl QueryEngine for StaticQueryEngine {
    async fn submit(&self, _database: &str, sql: &str) -> Result<StatementId, ServiceError> {
        let mut state = self.state.lock();
        state.submissions += 1;
        let lowered = sql.to_lowercase();
        let outcome = state
            .scripts
            .iter()
            .find(|(fragment, _)| lowered.contains(fragment))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or_else(|| ScriptedOutcome::Finish(QueryResultSet::default()));

        let id = format!("stmt-{}", state.submissions);
        state.statements.insert(id.clone(), StatementState {
            remaining_polls: self.polls_until_finish,
            outcome,
        });
        Ok(StatementId(id))
    }

    async fn describe(&self, id: &StatementId) -> Result<QueryStatus, ServiceError> {
        let mut state = self.state.lock();
        let statement = state
            .statements
            .get_mut(&id.0)
            .ok_or_else(|| ServiceError::response("query-engine", format!("unknown statement {id}")))?;

        if statement.remaining_polls > 0 {
            statement.remaining_polls -= 1;
            return Ok(QueryStatus::Running);
        }
        Ok(match &statement.outcome {
            ScriptedOutcome::Finish(_) => QueryStatus::Finished,
            ScriptedOutcome::Fail(reason) => QueryStatus::Failed {
                reason: reason.clone(),
            },
        })
    }

    async fn fetch(&self, id: &StatementId) -> Result<QueryResultSet, ServiceError> {
        let state = self.state.lock();
        let statement = state
            .statements
            .get(&id.0)
            .ok_or_else(|| ServiceError::response("query-engine", format!("unknown statement {id}")))?;
        match &statement.outcome {
            ScriptedOutcome::Finish(result) if statement.remaining_polls == 0 => Ok(result.clone()),
            _ => Err(ServiceError::response(
                "query-engine",
                format!("statement {id} has no result"),
            )),
        }
    }
}
