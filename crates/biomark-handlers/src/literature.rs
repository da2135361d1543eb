//! Literature action group: citation search.

use std::sync::Arc;

use async_trait::async_trait;
use biomark_protocol::{
    AgentResponse, HandlerError, HandlerResult, LiteratureSearch, ParamSchema, ParamType,
    ResponseBuilder, ToolInvocation, ToolOutput, decode,
};
use tracing::{debug, instrument};

use crate::ActionGroupHandler;

pub const ACTION_GROUP: &str = "literature";

#[derive(Debug, Clone)]
pub struct LiteratureConfig {
    pub max_results: usize,
}

impl Default for LiteratureConfig {
    fn default() -> Self {
        Self { max_results: 10 }
    }
}

pub struct LiteratureActionGroup {
    search: Arc<dyn LiteratureSearch>,
    builder: ResponseBuilder,
    config: LiteratureConfig,
}

impl LiteratureActionGroup {
    pub fn new(search: Arc<dyn LiteratureSearch>, builder: ResponseBuilder) -> Self {
        Self {
            search,
            builder,
            config: LiteratureConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LiteratureConfig) -> Self {
        self.config = config;
        self
    }

    async fn call(&self, invocation: &ToolInvocation) -> HandlerResult<ToolOutput> {
        match invocation.operation() {
            "/query-pubmed" => {
                let schema = ParamSchema::new().required("query", ParamType::Text);
                let params = decode(&invocation.parameters, &schema)?;
                let query = params.text("query").unwrap_or_default();

                let citations = self.search.search(query, self.config.max_results).await?;
                debug!(hits = citations.len(), "literature search complete");
                let value = serde_json::to_value(citations)
                    .map_err(|error| HandlerError::InvalidInput(error.to_string()))?;
                Ok(ToolOutput::Json(value))
            }
            other => Err(HandlerError::unrecognized(ACTION_GROUP, other)),
        }
    }
}

#[async_trait]
impl ActionGroupHandler for LiteratureActionGroup {
    fn action_group(&self) -> &str {
        ACTION_GROUP
    }

    #[instrument(skip(self, invocation), fields(operation = %invocation.operation()))]
    async fn handle(&self, invocation: &ToolInvocation) -> AgentResponse {
        let result = self.call(invocation).await;
        self.builder.build(invocation, result).await
    }
}
