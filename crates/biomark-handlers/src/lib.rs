//! # biomark-handlers — Action-Group Handlers
//!
//! One handler per action group exposed to the agent platform, plus the
//! router that picks the handler for an invocation. Handlers decode
//! parameters through the shared schema-driven decoder, call their managed
//! collaborators through the `biomark-protocol` ports, and always answer
//! with a well-formed envelope; no error leaves a handler as a fault.

pub mod charts;
pub mod database;
pub mod imaging;
pub mod literature;
pub mod plots;
pub mod survival;

pub use charts::{ChartActionGroup, ChartConfig};
pub use database::{DatabaseActionGroup, DatabaseConfig};
pub use imaging::{ImagingActionGroup, ImagingConfig};
pub use literature::{LiteratureActionGroup, LiteratureConfig};
pub use plots::{SurvivalPlotActionGroup, SurvivalPlotConfig};
pub use survival::SurvivalActionGroup;

use std::sync::Arc;

use async_trait::async_trait;
use biomark_protocol::{AgentResponse, HandlerError, ResponseBuilder, ToolInvocation};
use indexmap::IndexMap;
use tracing::{info, instrument, warn};

/// One callable action group.
#[async_trait]
pub trait ActionGroupHandler: Send + Sync {
    fn action_group(&self) -> &str;
    async fn handle(&self, invocation: &ToolInvocation) -> AgentResponse;
}

/// Routes invocations to the handler registered for their action group. An
/// unknown action group still gets a well-formed error envelope.
pub struct ActionGroupRouter {
    handlers: IndexMap<String, Arc<dyn ActionGroupHandler>>,
    builder: ResponseBuilder,
}

impl ActionGroupRouter {
    pub fn new(builder: ResponseBuilder) -> Self {
        Self {
            handlers: IndexMap::new(),
            builder,
        }
    }

    pub fn register(mut self, handler: Arc<dyn ActionGroupHandler>) -> Self {
        self.handlers
            .insert(handler.action_group().to_owned(), handler);
        self
    }

    pub fn action_groups(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    #[instrument(skip(self, invocation), fields(
        action_group = %invocation.action_group,
        operation = %invocation.operation()
    ))]
    pub async fn dispatch(&self, invocation: &ToolInvocation) -> AgentResponse {
        match self.handlers.get(&invocation.action_group) {
            Some(handler) => {
                info!("dispatching invocation");
                handler.handle(invocation).await
            }
            None => {
                warn!("unknown action group");
                self.builder
                    .build(
                        invocation,
                        Err(HandlerError::unrecognized(
                            invocation.action_group.clone(),
                            invocation.operation(),
                        )),
                    )
                    .await
            }
        }
    }
}
