//! # biomark-services — Boundary Adapters
//!
//! Concrete implementations of the `biomark-protocol` ports: in-memory and
//! filesystem object stores, a polling query runner with scripted engines
//! for local use, an HTTP messages-endpoint model client, an NCBI Entrez
//! literature client, and a local workflow trigger. Handlers only ever see
//! the port traits; everything here is swappable.

pub mod clock;
pub mod literature;
pub mod model;
pub mod query;
pub mod storage;
pub mod workflow;

pub use clock::{ManualClock, TokioClock};
pub use literature::{EntrezClient, EntrezConfig, StaticLiteratureSearch};
pub use model::{HttpModelProvider, ModelConfig, ScriptedModelProvider};
pub use query::{PollConfig, QueryRunner, StaticQueryEngine};
pub use storage::{FsObjectStore, MemoryObjectStore, StoredObject};
pub use workflow::{LocalWorkflowTrigger, StartedExecution};
