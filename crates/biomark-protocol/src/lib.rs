//! # biomark-protocol — Action-Group Contract
//!
//! This crate defines the shared contract between the agent platform and
//! every biomark action-group handler: the invocation and envelope wire
//! types, the schema-driven parameter decoder, and the trait interfaces
//! behind which the managed collaborators sit.
//!
//! It is intentionally dependency-light (no runtime deps like tokio, axum,
//! or reqwest) so it can be used as a pure contract crate.
//!
//! ## Module Overview
//!
//! - [`invocation`] — `ToolInvocation`, `Parameter`, the two dispatch styles
//! - [`decode`] — schema-driven parameter decoding with ordered fallbacks
//! - [`envelope`] — `AgentResponse` construction + oversized-payload
//!   externalization
//! - [`ports`] — boundary ports (object store, query engine, model
//!   provider, workflow trigger, literature search, clock)
//! - [`error`] — `HandlerError`, `ServiceError`

pub mod decode;
pub mod envelope;
pub mod error;
pub mod invocation;
pub mod ports;

// Re-export the most commonly used types at the crate root.
pub use decode::{DecodeError, DecodedParams, ParamSchema, ParamType, ParamValue, decode};
pub use envelope::{
    ActionResponse, AgentResponse, EnvelopeConfig, FunctionResponse, ResponseBody,
    ResponseBuilder, ToolOutput, DEFAULT_INLINE_LIMIT_BYTES,
};
pub use error::{HandlerError, HandlerResult, ServiceError};
pub use invocation::{Dispatch, Parameter, ToolInvocation};
pub use ports::{
    CellValue, ChatMessage, Citation, Clock, ColumnInfo, Completion, CompletionRequest,
    LiteratureSearch, ModelProvider, ObjectStore, QueryEngine, QueryResultSet, QueryStatus,
    StatementId, WorkflowExecution, WorkflowTrigger,
};
