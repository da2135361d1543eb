//! Imaging action group: long-running biomarker computation and retrieval
//! of computed feature tables.

use std::sync::Arc;

use async_trait::async_trait;
use biomark_protocol::{
    AgentResponse, HandlerError, HandlerResult, ObjectStore, ParamSchema, ParamType,
    ResponseBuilder, ToolInvocation, ToolOutput, WorkflowTrigger, decode,
};
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::ActionGroupHandler;

pub const ACTION_GROUP: &str = "imaging";

#[derive(Debug, Clone)]
pub struct ImagingConfig {
    /// Workflow that converts raw scans and computes features.
    pub state_machine: String,
    /// Bucket holding the computed feature tables.
    pub bucket: String,
    /// Prefix under which per-subject CSVs live: `{prefix}/CSV/{id}.csv`.
    pub results_prefix: String,
    pub job_name_prefix: String,
}

impl Default for ImagingConfig {
    fn default() -> Self {
        Self {
            state_machine: "imaging-biomarker-pipeline".to_owned(),
            bucket: "biomark-imaging".to_owned(),
            results_prefix: "nsclc_radiogenomics".to_owned(),
            job_name_prefix: "dcm-nifti-conversion-".to_owned(),
        }
    }
}

pub struct ImagingActionGroup {
    workflow: Arc<dyn WorkflowTrigger>,
    store: Arc<dyn ObjectStore>,
    builder: ResponseBuilder,
    config: ImagingConfig,
}

impl ImagingActionGroup {
    pub fn new(
        workflow: Arc<dyn WorkflowTrigger>,
        store: Arc<dyn ObjectStore>,
        builder: ResponseBuilder,
    ) -> Self {
        Self {
            workflow,
            store,
            builder,
            config: ImagingConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ImagingConfig) -> Self {
        self.config = config;
        self
    }

    fn subject_ids(invocation: &ToolInvocation) -> HandlerResult<Vec<String>> {
        let schema = ParamSchema::new().required("subject_id", ParamType::TextList);
        let params = decode(&invocation.parameters, &schema)?;
        let ids = params
            .text_list("subject_id")
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        if ids.is_empty() {
            return Err(HandlerError::InvalidInput(
                "subject_id must name at least one subject".to_owned(),
            ));
        }
        Ok(ids)
    }

    async fn compute(
        &self,
        invocation: &ToolInvocation,
    ) -> HandlerResult<(ToolOutput, IndexMap<String, String>)> {
        let ids = Self::subject_ids(invocation)?;

        let suffix: String = Uuid::new_v4().simple().to_string()[..6].to_owned();
        let payload = json!({
            "PreprocessingJobName": format!("{}{suffix}", self.config.job_name_prefix),
            "Subject": ids,
        });
        let execution = self
            .workflow
            .start(&self.config.state_machine, &suffix, payload)
            .await?;
        info!(execution_arn = %execution.execution_arn, "imaging workflow started");

        let output_uri = format!("s3://{}", self.config.bucket);
        let mut attributes = IndexMap::new();
        attributes.insert("sfn_executionArn".to_owned(), execution.execution_arn.clone());
        attributes.insert("imaging_biomarker_output_s3".to_owned(), output_uri);

        let body = format!(
            "Imaging biomarker processing has been submitted. Results can be retrieved from \
             your database once the job {} completes.",
            execution.execution_arn
        );
        Ok((ToolOutput::Text(body), attributes))
    }

    async fn analyze(&self, invocation: &ToolInvocation) -> HandlerResult<ToolOutput> {
        let ids = Self::subject_ids(invocation)?;

        let mut rows = Vec::new();
        for id in &ids {
            let key = format!("{}/CSV/{id}.csv", self.config.results_prefix);
            let bytes = match self.store.get(&self.config.bucket, &key).await {
                Ok(bytes) => bytes,
                Err(error) => {
                    // One missing subject must not sink the rest.
                    warn!(subject = %id, %error, "skipping subject without feature table");
                    continue;
                }
            };
            match parse_feature_csv(&bytes, id) {
                Ok(mut parsed) => rows.append(&mut parsed),
                Err(error) => warn!(subject = %id, %error, "skipping malformed feature table"),
            }
        }

        Ok(ToolOutput::Json(Value::Array(rows)))
    }

    async fn call(&self, invocation: &ToolInvocation) -> HandlerResult<AgentResponse> {
        match invocation.operation() {
            "compute_imaging_biomarker" => {
                let (output, attributes) = self.compute(invocation).await?;
                Ok(self
                    .builder
                    .build_with_attributes(invocation, Ok(output), Some(attributes))
                    .await)
            }
            "analyze_imaging_biomarker" => {
                let output = self.analyze(invocation).await?;
                Ok(self.builder.build(invocation, Ok(output)).await)
            }
            other => Err(HandlerError::unrecognized(ACTION_GROUP, other)),
        }
    }
}

/// Parse one subject's feature CSV into JSON records, tagging each row with
/// the subject id. Numeric-looking fields become numbers.
fn parse_feature_csv(bytes: &[u8], subject_id: &str) -> HandlerResult<Vec<Value>> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|error| HandlerError::InvalidInput(format!("feature table header: {error}")))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|error| HandlerError::InvalidInput(format!("feature table row: {error}")))?;
        let mut row = Map::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            row.insert(header.to_owned(), field_value(field));
        }
        row.insert("subject_id".to_owned(), Value::String(subject_id.to_owned()));
        rows.push(Value::Object(row));
    }
    Ok(rows)
}

fn field_value(field: &str) -> Value {
    if let Ok(number) = field.trim().parse::<f64>()
        && let Some(number) = serde_json::Number::from_f64(number)
    {
        return Value::Number(number);
    }
    Value::String(field.to_owned())
}

#[async_trait]
impl ActionGroupHandler for ImagingActionGroup {
    fn action_group(&self) -> &str {
        ACTION_GROUP
    }

    #[instrument(skip(self, invocation), fields(operation = %invocation.operation()))]
    async fn handle(&self, invocation: &ToolInvocation) -> AgentResponse {
        match self.call(invocation).await {
            Ok(response) => response,
            Err(error) => self.builder.build(invocation, Err(error)).await,
        }
    }
}
