//! Response envelope construction.
//!
//! Every handler result, success or failure, leaves through here: the
//! builder picks the envelope shape matching the invocation's dispatch
//! style, serializes the payload, and redirects oversized payloads to
//! object storage so the response stays inside the platform's size limit.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::HandlerError;
use crate::invocation::{Dispatch, ToolInvocation};
use crate::ports::ObjectStore;

/// Payloads above this serialized size are written to object storage and
/// replaced by a pointer body.
pub const DEFAULT_INLINE_LIMIT_BYTES: usize = 20_000;

#[derive(Debug, Clone)]
pub struct EnvelopeConfig {
    pub inline_limit_bytes: usize,
    /// Bucket that receives externalized payloads.
    pub bucket: String,
    /// Key prefix for externalized payloads, e.g. `"results/"`.
    pub key_prefix: String,
}

impl EnvelopeConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            inline_limit_bytes: DEFAULT_INLINE_LIMIT_BYTES,
            bucket: bucket.into(),
            key_prefix: String::new(),
        }
    }

    pub fn with_inline_limit(mut self, limit: usize) -> Self {
        self.inline_limit_bytes = limit;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

/// A successful tool result before envelope encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
    /// The handler already wrote the real output to object storage.
    Stored { bucket: String, key: String },
}

/// Response body keyed by content type. Exactly one key is ever populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResponseBody {
    #[serde(rename = "TEXT")]
    Text { body: String },
    #[serde(rename = "application/json")]
    Json { body: String },
}

impl ResponseBody {
    pub fn body(&self) -> &str {
        match self {
            ResponseBody::Text { body } | ResponseBody::Json { body } => body,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub response_body: ResponseBody,
}

/// The inner platform response, shaped by dispatch style.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ActionResponse {
    #[serde(rename_all = "camelCase")]
    Api {
        action_group: String,
        api_path: String,
        http_method: String,
        http_status_code: u16,
        response_body: ResponseBody,
    },
    #[serde(rename_all = "camelCase")]
    Function {
        action_group: String,
        function: String,
        function_response: FunctionResponse,
    },
}

impl ActionResponse {
    pub fn response_body(&self) -> &ResponseBody {
        match self {
            ActionResponse::Api { response_body, .. } => response_body,
            ActionResponse::Function {
                function_response, ..
            } => &function_response.response_body,
        }
    }
}

/// The complete message returned to the agent platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub message_version: String,
    pub response: ActionResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_attributes: Option<IndexMap<String, String>>,
}

/// Builds [`AgentResponse`] values from handler results, externalizing
/// oversized success payloads.
#[derive(Clone)]
pub struct ResponseBuilder {
    store: Arc<dyn ObjectStore>,
    config: EnvelopeConfig,
}

impl ResponseBuilder {
    pub fn new(store: Arc<dyn ObjectStore>, config: EnvelopeConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    pub async fn build(
        &self,
        invocation: &ToolInvocation,
        result: Result<ToolOutput, HandlerError>,
    ) -> AgentResponse {
        self.build_with_attributes(invocation, result, None).await
    }

    pub async fn build_with_attributes(
        &self,
        invocation: &ToolInvocation,
        result: Result<ToolOutput, HandlerError>,
        session_attributes: Option<IndexMap<String, String>>,
    ) -> AgentResponse {
        let (body, status) = match result {
            Ok(output) => match self.render_success(output).await {
                Ok(body) => (body, 200),
                Err(error) => (error.to_string(), error.http_status()),
            },
            Err(error) => (error.to_string(), error.http_status()),
        };

        let response = match &invocation.dispatch {
            Dispatch::Api {
                api_path,
                http_method,
            } => ActionResponse::Api {
                action_group: invocation.action_group.clone(),
                api_path: api_path.clone(),
                http_method: http_method.clone(),
                http_status_code: status,
                response_body: ResponseBody::Json { body },
            },
            Dispatch::Function { function } => ActionResponse::Function {
                action_group: invocation.action_group.clone(),
                function: function.clone(),
                function_response: FunctionResponse {
                    response_body: ResponseBody::Text {
                        body: if status == 200 {
                            body
                        } else {
                            format!("An error occurred: {body}")
                        },
                    },
                },
            },
        };

        AgentResponse {
            message_version: invocation.message_version.clone(),
            response,
            session_attributes,
        }
    }

    async fn render_success(&self, output: ToolOutput) -> Result<String, HandlerError> {
        let serialized = match output {
            ToolOutput::Text(text) => text,
            ToolOutput::Json(value) => value.to_string(),
            ToolOutput::Stored { bucket, key } => return Ok(stored_pointer(&bucket, &key)),
        };

        if serialized.len() <= self.config.inline_limit_bytes {
            return Ok(serialized);
        }

        let key = format!("{}{}.json", self.config.key_prefix, Uuid::new_v4());
        self.store
            .put(
                &self.config.bucket,
                &key,
                serialized.into_bytes(),
                "application/json",
            )
            .await?;
        Ok(stored_pointer(&self.config.bucket, &key))
    }
}

fn stored_pointer(bucket: &str, key: &str) -> String {
    format!("Result uploaded to object storage. Bucket: {bucket}, Key: {key}")
}
