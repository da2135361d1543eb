//! Boundary ports for the managed collaborators.
//!
//! These traits are the only runtime boundary between the handlers and the
//! external services they delegate to. Adapters live in `biomark-services`;
//! everything here is `async-trait` for dyn dispatch and carries its wire
//! types alongside.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceError;

/// Object storage: get by key (missing keys are a [`ServiceError::NotFound`])
/// and put with a content type.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ServiceError>;
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementId(pub String);

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Execution status of a submitted statement. `Finished`, `Failed`, and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryStatus {
    Submitted,
    Running,
    Finished,
    Failed { reason: String },
    Cancelled,
}

impl QueryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryStatus::Finished | QueryStatus::Failed { .. } | QueryStatus::Cancelled
        )
    }
}

/// One typed cell of a query result, in the managed engine's wire encoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CellValue {
    #[serde(rename = "stringValue")]
    Text(String),
    #[serde(rename = "longValue")]
    Long(i64),
    #[serde(rename = "doubleValue")]
    Double(f64),
    #[serde(rename = "booleanValue")]
    Bool(bool),
    #[serde(rename = "isNull")]
    Null(bool),
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Long(value) => Some(*value as f64),
            CellValue::Double(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "typeName", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

impl ColumnInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
        }
    }
}

/// Tabular query result in the managed engine's wire shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QueryResultSet {
    #[serde(rename = "ColumnMetadata", default)]
    pub column_metadata: Vec<ColumnInfo>,
    #[serde(rename = "Records", default)]
    pub records: Vec<Vec<CellValue>>,
}

/// SQL execution: submit, poll, fetch. Long-running by design; callers poll
/// [`QueryEngine::describe`] until a terminal status.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn submit(&self, database: &str, sql: &str) -> Result<StatementId, ServiceError>;
    async fn describe(&self, id: &StatementId) -> Result<QueryStatus, ServiceError>;
    async fn fetch(&self, id: &StatementId) -> Result<QueryResultSet, ServiceError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_owned(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_owned(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
}

/// Model invocation: a prompt/message list in, a text completion out.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ServiceError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowExecution {
    pub execution_arn: String,
}

/// Long-running workflow orchestration: start a named workflow with a JSON
/// payload and get back an execution identifier.
#[async_trait]
pub trait WorkflowTrigger: Send + Sync {
    async fn start(
        &self,
        state_machine: &str,
        name: &str,
        input: Value,
    ) -> Result<WorkflowExecution, ServiceError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
}

/// Third-party literature search.
#[async_trait]
pub trait LiteratureSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize)
    -> Result<Vec<Citation>, ServiceError>;
}

/// Injected time source so polling loops are testable without real delays.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}
