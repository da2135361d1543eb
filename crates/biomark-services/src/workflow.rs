//! Workflow trigger adapters.

use std::sync::Arc;

use async_trait::async_trait;
use biomark_protocol::{ServiceError, WorkflowExecution, WorkflowTrigger};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, instrument};

/// A workflow execution accepted by [`LocalWorkflowTrigger`].
#[derive(Debug, Clone, PartialEq)]
pub struct StartedExecution {
    pub state_machine: String,
    pub name: String,
    pub input: Value,
    pub execution_arn: String,
    pub started_at: DateTime<Utc>,
}

/// Records workflow starts locally and hands back ARN-shaped execution ids.
/// Stands in for the managed orchestration service in tests and offline
/// gateway runs.
#[derive(Debug, Clone)]
pub struct LocalWorkflowTrigger {
    region: String,
    account: String,
    executions: Arc<Mutex<Vec<StartedExecution>>>,
}

impl Default for LocalWorkflowTrigger {
    fn default() -> Self {
        Self::new("us-east-1", "000000000000")
    }
}

impl LocalWorkflowTrigger {
    pub fn new(region: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account: account.into(),
            executions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn executions(&self) -> Vec<StartedExecution> {
        self.executions.lock().clone()
    }
}

#[async_trait]
impl WorkflowTrigger for LocalWorkflowTrigger {
    #[instrument(skip(self, input))]
    async fn start(
        &self,
        state_machine: &str,
        name: &str,
        input: Value,
    ) -> Result<WorkflowExecution, ServiceError> {
        let execution_arn = format!(
            "arn:aws:states:{}:{}:execution:{state_machine}:{name}",
            self.region, self.account
        );
        self.executions.lock().push(StartedExecution {
            state_machine: state_machine.to_owned(),
            name: name.to_owned(),
            input,
            execution_arn: execution_arn.clone(),
            started_at: Utc::now(),
        });
        info!(%execution_arn, "workflow execution started");
        Ok(WorkflowExecution { execution_arn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn start_records_execution_and_returns_arn() {
        let trigger = LocalWorkflowTrigger::default();
        let execution = trigger
            .start(
                "imaging-pipeline",
                "a1b2c3",
                json!({"Subject": ["R01-005"]}),
            )
            .await
            .unwrap();

        assert!(execution.execution_arn.contains("imaging-pipeline"));
        assert!(execution.execution_arn.ends_with("a1b2c3"));

        let recorded = trigger.executions();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].state_machine, "imaging-pipeline");
        assert_eq!(recorded[0].input["Subject"][0], "R01-005");
        assert_eq!(recorded[0].execution_arn, execution.execution_arn);
    }
}
