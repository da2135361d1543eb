//! Survival-plot action group: Kaplan-Meier comparison plots and Cox
//! regression over stored query results.

use std::sync::Arc;

use async_trait::async_trait;
use biomark_protocol::{
    AgentResponse, HandlerError, HandlerResult, ObjectStore, ParamSchema, ParamType,
    QueryResultSet, ResponseBuilder, ToolInvocation, ToolOutput, decode,
};
use biomark_render::{StepPoint, StepSeries, SurvivalPlot};
use biomark_stats::{CoxObservation, KmCurve, fit_cox, fit_kaplan_meier};
use tracing::{info, instrument, warn};

use crate::ActionGroupHandler;

pub const ACTION_GROUP: &str = "survival-plot";

#[derive(Debug, Clone)]
pub struct SurvivalPlotConfig {
    /// Bucket that receives rendered plots.
    pub bucket: String,
    pub key_prefix: String,
}

impl Default for SurvivalPlotConfig {
    fn default() -> Self {
        Self {
            bucket: "biomark-charts".to_owned(),
            key_prefix: "graphs/".to_owned(),
        }
    }
}

pub struct SurvivalPlotActionGroup {
    store: Arc<dyn ObjectStore>,
    builder: ResponseBuilder,
    config: SurvivalPlotConfig,
}

impl SurvivalPlotActionGroup {
    pub fn new(store: Arc<dyn ObjectStore>, builder: ResponseBuilder) -> Self {
        Self {
            store,
            builder,
            config: SurvivalPlotConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SurvivalPlotConfig) -> Self {
        self.config = config;
        self
    }

    async fn plot_kaplan_meier(&self, invocation: &ToolInvocation) -> HandlerResult<ToolOutput> {
        let schema = ParamSchema::new()
            .required("biomarker_name", ParamType::Text)
            .required("baseline", ParamType::Text)
            .required("duration_baseline", ParamType::NumberList)
            .required("event_baseline", ParamType::NumberList)
            .required("condition", ParamType::Text)
            .required("duration_condition", ParamType::NumberList)
            .required("event_condition", ParamType::NumberList);
        let params = decode(&invocation.parameters, &schema)?;

        let biomarker_name = params.text("biomarker_name").unwrap_or_default().to_owned();
        let baseline_label = params.text("baseline").unwrap_or_default();
        let condition_label = params.text("condition").unwrap_or_default();

        let baseline = fit_group(
            &params,
            baseline_label,
            "duration_baseline",
            "event_baseline",
        )?;
        let condition = fit_group(
            &params,
            condition_label,
            "duration_condition",
            "event_condition",
        )?;

        let plot = SurvivalPlot {
            title: biomarker_name.clone(),
            x_axis_label: "Time".to_owned(),
            y_axis_label: "Survival probability".to_owned(),
            series: vec![step_series(&baseline, 0), step_series(&condition, 1)],
        };
        let svg = plot
            .render_svg()
            .map_err(|error| HandlerError::InvalidInput(error.to_string()))?;

        let key = format!("{}{biomarker_name}/km.svg", self.config.key_prefix);
        self.store
            .put(&self.config.bucket, &key, svg.into_bytes(), "image/svg+xml")
            .await?;
        info!(bucket = %self.config.bucket, %key, "survival plot stored");

        Ok(ToolOutput::Text(format!(
            "The Kaplan-Meier plot for {biomarker_name} is saved to object storage. Bucket: {}, Key: {key}",
            self.config.bucket
        )))
    }

    async fn fit_survival_regression(
        &self,
        invocation: &ToolInvocation,
    ) -> HandlerResult<ToolOutput> {
        let schema = ParamSchema::new()
            .required("bucket", ParamType::Text)
            .required("key", ParamType::Text);
        let params = decode(&invocation.parameters, &schema)?;
        let bucket = params.text("bucket").unwrap_or_default();
        let key = params.text("key").unwrap_or_default();

        let bytes = self.store.get(bucket, key).await?;
        let result_set: QueryResultSet = serde_json::from_slice(&bytes).map_err(|error| {
            HandlerError::InvalidInput(format!(
                "stored object {bucket}/{key} is not a query result set: {error}"
            ))
        })?;

        let (observations, names) = cox_input(&result_set)?;
        let summary = fit_cox(&observations, &names)
            .map_err(|error| HandlerError::InvalidInput(error.to_string()))?;
        let value = serde_json::to_value(summary)
            .map_err(|error| HandlerError::InvalidInput(error.to_string()))?;
        Ok(ToolOutput::Json(value))
    }

    async fn call(&self, invocation: &ToolInvocation) -> HandlerResult<ToolOutput> {
        match invocation.operation() {
            "plot_kaplan_meier" => self.plot_kaplan_meier(invocation).await,
            "fit_survival_regression" => self.fit_survival_regression(invocation).await,
            other => Err(HandlerError::unrecognized(ACTION_GROUP, other)),
        }
    }
}

fn fit_group(
    params: &biomark_protocol::DecodedParams,
    label: &str,
    duration_param: &str,
    event_param: &str,
) -> HandlerResult<KmCurve> {
    let durations = params.number_list(duration_param).ok_or_else(|| {
        HandlerError::InvalidInput(format!("parameter {duration_param} must be a numeric list"))
    })?;
    let events: Vec<bool> = params
        .number_list(event_param)
        .ok_or_else(|| {
            HandlerError::InvalidInput(format!("parameter {event_param} must be a numeric list"))
        })?
        .iter()
        .map(|event| *event != 0.0)
        .collect();

    fit_kaplan_meier(label, durations, &events)
        .map_err(|error| HandlerError::InvalidInput(error.to_string()))
}

fn step_series(curve: &KmCurve, index: usize) -> StepSeries {
    let points = curve
        .points
        .iter()
        .map(|point| StepPoint {
            time: point.time,
            value: point.survival,
            lower: point.lower,
            upper: point.upper,
        })
        .collect();
    StepSeries::indexed(curve.label.clone(), index, points)
}

/// Shape a stored result set for regression: column 0 is the event
/// indicator, column 1 the duration, and every remaining all-numeric column
/// a covariate. Rows with a missing event or duration are skipped.
fn cox_input(result_set: &QueryResultSet) -> HandlerResult<(Vec<CoxObservation>, Vec<String>)> {
    let width = result_set
        .records
        .iter()
        .map(Vec::len)
        .max()
        .unwrap_or_default();
    if width < 2 {
        return Err(HandlerError::InvalidInput(
            "regression input needs an event column and a duration column".to_owned(),
        ));
    }

    let numeric_columns: Vec<usize> = (2..width)
        .filter(|&column| {
            result_set.records.iter().all(|record| {
                record
                    .get(column)
                    .is_some_and(|cell| cell.as_f64().is_some())
            })
        })
        .collect();
    if numeric_columns.is_empty() {
        return Err(HandlerError::InvalidInput(
            "regression input has no numeric covariate columns".to_owned(),
        ));
    }

    let names: Vec<String> = numeric_columns
        .iter()
        .map(|&column| {
            result_set
                .column_metadata
                .get(column)
                .map(|info| info.name.clone())
                .unwrap_or_else(|| format!("covariate_{column}"))
        })
        .collect();

    let mut observations = Vec::with_capacity(result_set.records.len());
    for (row, record) in result_set.records.iter().enumerate() {
        let event = record.first().and_then(|cell| {
            cell.as_bool().or_else(|| cell.as_f64().map(|v| v != 0.0))
        });
        let duration = record.get(1).and_then(|cell| cell.as_f64());
        let (Some(event), Some(duration)) = (event, duration) else {
            warn!(row, "skipping row without event or duration");
            continue;
        };
        let covariates = numeric_columns
            .iter()
            .map(|&column| record[column].as_f64().unwrap_or_default())
            .collect();
        observations.push(CoxObservation {
            duration,
            event,
            covariates,
        });
    }

    Ok((observations, names))
}

#[async_trait]
impl ActionGroupHandler for SurvivalPlotActionGroup {
    fn action_group(&self) -> &str {
        ACTION_GROUP
    }

    #[instrument(skip(self, invocation), fields(operation = %invocation.operation()))]
    async fn handle(&self, invocation: &ToolInvocation) -> AgentResponse {
        let result = self.call(invocation).await;
        self.builder.build(invocation, result).await
    }
}
