//! Chart action group: bar charts rendered to object storage.

use std::sync::Arc;

use async_trait::async_trait;
use biomark_protocol::{
    AgentResponse, HandlerError, HandlerResult, ObjectStore, ParamSchema, ParamType,
    ResponseBuilder, ToolInvocation, ToolOutput, decode,
};
use biomark_render::BarChart;
use tracing::{info, instrument};

use crate::ActionGroupHandler;

pub const ACTION_GROUP: &str = "charts";

#[derive(Debug, Clone)]
pub struct ChartConfig {
    /// Bucket that receives rendered charts.
    pub bucket: String,
    pub key_prefix: String,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            bucket: "biomark-charts".to_owned(),
            key_prefix: "graphs/".to_owned(),
        }
    }
}

pub struct ChartActionGroup {
    store: Arc<dyn ObjectStore>,
    builder: ResponseBuilder,
    config: ChartConfig,
}

impl ChartActionGroup {
    pub fn new(store: Arc<dyn ObjectStore>, builder: ResponseBuilder) -> Self {
        Self {
            store,
            builder,
            config: ChartConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ChartConfig) -> Self {
        self.config = config;
        self
    }

    async fn bar_chart(&self, invocation: &ToolInvocation) -> HandlerResult<ToolOutput> {
        let schema = ParamSchema::new()
            .required("title", ParamType::Text)
            .required("x_values", ParamType::TextList)
            .required("y_values", ParamType::NumberList)
            .required("x_label", ParamType::Text)
            .required("y_label", ParamType::Text);
        let params = decode(&invocation.parameters, &schema)?;

        let title = params.text("title").unwrap_or_default().to_owned();
        let x_labels = params
            .text_list("x_values")
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        let values = params
            .number_list("y_values")
            .ok_or_else(|| {
                HandlerError::InvalidInput("parameter y_values must be a numeric list".to_owned())
            })?
            .to_vec();

        let chart = BarChart {
            title: title.clone(),
            x_labels,
            values,
            x_axis_label: params.text("x_label").unwrap_or_default().to_owned(),
            y_axis_label: params.text("y_label").unwrap_or_default().to_owned(),
        };
        let svg = chart
            .render_svg()
            .map_err(|error| HandlerError::InvalidInput(error.to_string()))?;

        let key = format!("{}{}.svg", self.config.key_prefix, title);
        self.store
            .put(&self.config.bucket, &key, svg.into_bytes(), "image/svg+xml")
            .await?;
        info!(bucket = %self.config.bucket, %key, "bar chart stored");

        Ok(ToolOutput::Text(format!(
            "Your bar chart named {title} is saved to object storage. Bucket: {}, Key: {key}",
            self.config.bucket
        )))
    }

    async fn call(&self, invocation: &ToolInvocation) -> HandlerResult<ToolOutput> {
        match invocation.operation() {
            "bar_chart" => self.bar_chart(invocation).await,
            other => Err(HandlerError::unrecognized(ACTION_GROUP, other)),
        }
    }
}

#[async_trait]
impl ActionGroupHandler for ChartActionGroup {
    fn action_group(&self) -> &str {
        ACTION_GROUP
    }

    #[instrument(skip(self, invocation), fields(operation = %invocation.operation()))]
    async fn handle(&self, invocation: &ToolInvocation) -> AgentResponse {
        let result = self.call(invocation).await;
        self.builder.build(invocation, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biomark_protocol::{EnvelopeConfig, Parameter};
    use biomark_services::MemoryObjectStore;

    fn handler(store: Arc<MemoryObjectStore>) -> ChartActionGroup {
        let builder = ResponseBuilder::new(store.clone(), EnvelopeConfig::new("results"));
        ChartActionGroup::new(store, builder)
    }

    #[tokio::test]
    async fn renders_and_stores_chart() {
        let store = Arc::new(MemoryObjectStore::new());
        let invocation = ToolInvocation::function(ACTION_GROUP, "bar_chart", vec![
            Parameter::new("title", "Mutation frequency"),
            Parameter::new("x_values", r#"["EGFR", "KRAS"]"#),
            Parameter::new("y_values", "[12, 30]"),
            Parameter::new("x_label", "Mutation"),
            Parameter::new("y_label", "Patients"),
        ]);

        let response = handler(store.clone()).handle(&invocation).await;

        let body = response.response.response_body().body();
        assert!(body.contains("Mutation frequency"));
        assert!(body.contains("graphs/Mutation frequency.svg"));

        let object = store
            .object("biomark-charts", "graphs/Mutation frequency.svg")
            .unwrap();
        assert_eq!(object.content_type, "image/svg+xml");
        let svg = String::from_utf8(object.body).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Mutation frequency"));
    }

    #[tokio::test]
    async fn ragged_fragment_labels_still_render() {
        // Labels arriving as a bare fragment with stray quotes go through
        // the permissive recovery path.
        let store = Arc::new(MemoryObjectStore::new());
        let invocation = ToolInvocation::function(ACTION_GROUP, "bar_chart", vec![
            Parameter::new("title", "Stage distribution"),
            Parameter::new("x_values", r#"I, II, "III"}"#),
            Parameter::new("y_values", "[4, 9, 2]"),
            Parameter::new("x_label", "Stage"),
            Parameter::new("y_label", "Count"),
        ]);

        let response = handler(store.clone()).handle(&invocation).await;
        assert!(
            response
                .response
                .response_body()
                .body()
                .contains("Stage distribution")
        );
        assert_eq!(store.keys("biomark-charts").len(), 1);
    }

    #[tokio::test]
    async fn mismatched_series_report_an_error() {
        let store = Arc::new(MemoryObjectStore::new());
        let invocation = ToolInvocation::function(ACTION_GROUP, "bar_chart", vec![
            Parameter::new("title", "broken"),
            Parameter::new("x_values", r#"["a", "b", "c"]"#),
            Parameter::new("y_values", "[1, 2]"),
            Parameter::new("x_label", "x"),
            Parameter::new("y_label", "y"),
        ]);

        let response = handler(store.clone()).handle(&invocation).await;
        let body = response.response.response_body().body();
        assert!(body.starts_with("An error occurred:"));
        assert!(store.is_empty());
    }
}
