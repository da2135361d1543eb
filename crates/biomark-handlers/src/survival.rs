//! Survival-data action group: threshold grouping of biomarker series.

use async_trait::async_trait;
use biomark_protocol::{
    AgentResponse, HandlerError, HandlerResult, ParamSchema, ParamType, ResponseBuilder,
    ToolInvocation, ToolOutput, decode,
};
use biomark_stats::group_survival_data;
use tracing::instrument;

use crate::ActionGroupHandler;

pub const ACTION_GROUP: &str = "survival-data";

pub struct SurvivalActionGroup {
    builder: ResponseBuilder,
}

impl SurvivalActionGroup {
    pub fn new(builder: ResponseBuilder) -> Self {
        Self { builder }
    }

    async fn call(&self, invocation: &ToolInvocation) -> HandlerResult<ToolOutput> {
        match invocation.operation() {
            "group_survival_data" => {
                let schema = ParamSchema::new()
                    .required("biomarker", ParamType::NumberList)
                    .required("survival_duration", ParamType::NumberList)
                    .required("survival_status", ParamType::NumberList)
                    .required("threshold", ParamType::Number);
                let params = decode(&invocation.parameters, &schema)?;

                let biomarker = require_numbers(&params, "biomarker")?;
                let durations = require_numbers(&params, "survival_duration")?;
                let statuses = require_numbers(&params, "survival_status")?;
                let threshold = params
                    .number("threshold")
                    .ok_or_else(|| HandlerError::InvalidInput("threshold must be a number".to_owned()))?;

                let events: Vec<u8> = statuses
                    .iter()
                    .map(|status| u8::from(*status != 0.0))
                    .collect();
                let groups = group_survival_data(biomarker, durations, &events, threshold)
                    .map_err(|error| HandlerError::InvalidInput(error.to_string()))?;
                let value = serde_json::to_value(groups)
                    .map_err(|error| HandlerError::InvalidInput(error.to_string()))?;
                Ok(ToolOutput::Json(value))
            }
            other => Err(HandlerError::unrecognized(ACTION_GROUP, other)),
        }
    }
}

fn require_numbers<'a>(
    params: &'a biomark_protocol::DecodedParams,
    name: &str,
) -> HandlerResult<&'a [f64]> {
    params
        .number_list(name)
        .ok_or_else(|| HandlerError::InvalidInput(format!("parameter {name} must be a numeric list")))
}

#[async_trait]
impl ActionGroupHandler for SurvivalActionGroup {
    fn action_group(&self) -> &str {
        ACTION_GROUP
    }

    #[instrument(skip(self, invocation), fields(operation = %invocation.operation()))]
    async fn handle(&self, invocation: &ToolInvocation) -> AgentResponse {
        let result = self.call(invocation).await;
        self.builder.build(invocation, result).await
    }
}
