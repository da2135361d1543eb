//! Database action group: schema discovery, SQL refinement, query execution.

use std::sync::Arc;

use async_trait::async_trait;
use biomark_protocol::{
    AgentResponse, ChatMessage, CompletionRequest, HandlerError, HandlerResult, ModelProvider,
    ParamSchema, ParamType, QueryResultSet, ResponseBuilder, ToolInvocation, ToolOutput, decode,
};
use biomark_services::QueryRunner;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::ActionGroupHandler;

pub const ACTION_GROUP: &str = "database";

const REFINE_SYSTEM_PROMPT: &str = "You are an extremely critical sql query evaluation \
assistant, your job is to look at the schema, sql query and question being asked to then \
evaluate the query to ensure it is efficient.";

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database the statements run against.
    pub database: String,
    /// Table whose column catalog `/getschema` describes.
    pub schema_table: String,
    pub model_max_tokens: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database: "dev".to_owned(),
            schema_table: "clinical_genomic".to_owned(),
            model_max_tokens: 1000,
        }
    }
}

/// One column of the described table.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub comment: String,
}

pub struct DatabaseActionGroup {
    runner: QueryRunner,
    model: Arc<dyn ModelProvider>,
    builder: ResponseBuilder,
    config: DatabaseConfig,
}

impl DatabaseActionGroup {
    pub fn new(
        runner: QueryRunner,
        model: Arc<dyn ModelProvider>,
        builder: ResponseBuilder,
    ) -> Self {
        Self {
            runner,
            model,
            builder,
            config: DatabaseConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DatabaseConfig) -> Self {
        self.config = config;
        self
    }

    fn schema_sql(&self) -> String {
        format!(
            "SELECT
    '{table}' AS table_name,
    a.attname AS column_name,
    pg_catalog.format_type(a.atttypid, a.atttypmod) AS column_type,
    pg_catalog.col_description(a.attrelid, a.attnum) AS column_comment
FROM
    pg_catalog.pg_attribute a
WHERE
    a.attrelid = '{table}'::regclass
    AND a.attnum > 0
    AND NOT a.attisdropped;",
            table = self.config.schema_table
        )
    }

    async fn fetch_schema(&self) -> HandlerResult<IndexMap<String, Vec<ColumnDescription>>> {
        let result = self
            .runner
            .run(&self.config.database, &self.schema_sql())
            .await?;
        Ok(extract_table_columns(&result))
    }

    async fn get_schema(&self) -> HandlerResult<ToolOutput> {
        let schema = self.fetch_schema().await?;
        let value = serde_json::to_value(schema)
            .map_err(|error| HandlerError::InvalidInput(error.to_string()))?;
        Ok(ToolOutput::Json(value))
    }

    async fn refine_sql(&self, sql: &str, question: &str) -> HandlerResult<ToolOutput> {
        let schema = self.fetch_schema().await?;
        let schema_json = serde_json::to_value(&schema)
            .map_err(|error| HandlerError::InvalidInput(error.to_string()))?;
        let prompt = refine_prompt(&schema_json.to_string(), sql, question);

        // Seeding the assistant turn pins the reply inside the tag.
        let request = CompletionRequest {
            system: Some(REFINE_SYSTEM_PROMPT.to_owned()),
            messages: vec![
                ChatMessage::user(prompt),
                ChatMessage::assistant("<efficientQuery>"),
            ],
            max_tokens: self.config.model_max_tokens,
        };
        let completion = self.model.complete(request).await?;
        debug!(chars = completion.text.len(), "refinement received");
        Ok(ToolOutput::Text(completion.text))
    }

    async fn run_query(&self, sql: &str) -> HandlerResult<ToolOutput> {
        let result = self.runner.run(&self.config.database, sql).await?;
        let value = serde_json::to_value(result)
            .map_err(|error| HandlerError::InvalidInput(error.to_string()))?;
        Ok(ToolOutput::Json(value))
    }

    async fn call(&self, invocation: &ToolInvocation) -> HandlerResult<ToolOutput> {
        match invocation.operation() {
            "/getschema" => self.get_schema().await,
            "/refinesql" => {
                let schema = ParamSchema::new()
                    .required("sql", ParamType::Text)
                    .required("question", ParamType::Text);
                let params = decode(&invocation.parameters, &schema)?;
                self.refine_sql(
                    params.text("sql").unwrap_or_default(),
                    params.text("question").unwrap_or_default(),
                )
                .await
            }
            "/queryredshift" => {
                let schema = ParamSchema::new().required("query", ParamType::Text);
                let params = decode(&invocation.parameters, &schema)?;
                self.run_query(params.text("query").unwrap_or_default()).await
            }
            other => Err(HandlerError::unrecognized(ACTION_GROUP, other)),
        }
    }
}

#[async_trait]
impl ActionGroupHandler for DatabaseActionGroup {
    fn action_group(&self) -> &str {
        ACTION_GROUP
    }

    #[instrument(skip(self, invocation), fields(operation = %invocation.operation()))]
    async fn handle(&self, invocation: &ToolInvocation) -> AgentResponse {
        let result = self.call(invocation).await;
        self.builder.build(invocation, result).await
    }
}

/// Fold catalog rows (`table_name`, `column_name`, `column_type`,
/// `column_comment`) into a per-table column listing.
pub fn extract_table_columns(
    result: &QueryResultSet,
) -> IndexMap<String, Vec<ColumnDescription>> {
    let mut tables: IndexMap<String, Vec<ColumnDescription>> = IndexMap::new();
    for record in &result.records {
        let mut texts = record
            .iter()
            .map(|cell| cell.as_text().unwrap_or_default().to_owned());
        let (Some(table), Some(name), Some(column_type), Some(comment)) = (
            texts.next(),
            texts.next(),
            texts.next(),
            texts.next(),
        ) else {
            continue;
        };
        tables.entry(table).or_default().push(ColumnDescription {
            name,
            column_type,
            comment,
        });
    }
    tables
}

fn refine_prompt(schema_json: &str, sql: &str, question: &str) -> String {
    format!(
        "You are an extremely critical SQL query evaluation assistant. Your job is to analyze
the given schema, SQL query, and question to ensure the query is efficient and accurately answers the
question. You should focus on making the query as efficient as possible, using aggregation when applicable.

Here is the schema you should consider:
<schema>
{schema_json}
</schema>

Pay close attention to the accepted values and the column data type located in the comment field for each column.

Here is the generated SQL query to evaluate:
<sql_query>
{sql}
</sql_query>

Here is the question that was asked:
<question>
{question}
</question>

Your task is to evaluate and refine the SQL query to ensure it is very efficient. Follow these steps:
1. Analyze the query in relation to the schema and the question.
2. Determine if the query efficiently answers the question.
3. If the query is not efficient, provide a more efficient SQL query.
4. If the query is already efficient, respond with \"no change needed\".

When evaluating efficiency, consider the following:
- Use of appropriate aggregation functions (COUNT, SUM, AVG, etc.)
- Proper use of GROUP BY clauses
- Avoiding unnecessary JOINs or subqueries
- Selecting only necessary columns
- Using appropriate WHERE clauses to filter data

Provide your response within <efficientQuery> tags. If you suggest a new query, do not use line
breaks in the generated SQL. Your response should be a single line of SQL or \"no change needed\"
if the original query is already efficient.

Remember to prioritize aggregation when possible to reduce SQL output size and provide more meaningful results."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use biomark_protocol::{CellValue, ColumnInfo, EnvelopeConfig, Parameter};
    use biomark_services::{
        ManualClock, MemoryObjectStore, ScriptedModelProvider, StaticQueryEngine,
    };

    fn schema_rows() -> QueryResultSet {
        let row = |name: &str, ty: &str, comment: &str| {
            vec![
                CellValue::Text("clinical_genomic".to_owned()),
                CellValue::Text(name.to_owned()),
                CellValue::Text(ty.to_owned()),
                CellValue::Text(comment.to_owned()),
            ]
        };
        QueryResultSet {
            column_metadata: vec![
                ColumnInfo::named("table_name"),
                ColumnInfo::named("column_name"),
                ColumnInfo::named("column_type"),
                ColumnInfo::named("column_comment"),
            ],
            records: vec![
                row("case_id", "character varying(256)", "Patient identifier"),
                row("survival_status", "bigint", "0 Alive, 1 Dead"),
            ],
        }
    }

    fn handler_with(
        engine: Arc<StaticQueryEngine>,
        model: Arc<ScriptedModelProvider>,
        store: Arc<MemoryObjectStore>,
    ) -> DatabaseActionGroup {
        let runner = QueryRunner::new(engine, Arc::new(ManualClock::new()));
        let builder = ResponseBuilder::new(store, EnvelopeConfig::new("results"));
        DatabaseActionGroup::new(runner, model, builder)
    }

    #[tokio::test]
    async fn getschema_folds_catalog_rows() {
        let engine = Arc::new(StaticQueryEngine::new());
        engine.register("pg_catalog.pg_attribute", schema_rows());
        let handler = handler_with(
            engine,
            Arc::new(ScriptedModelProvider::default()),
            Arc::new(MemoryObjectStore::new()),
        );

        let invocation = ToolInvocation::api(ACTION_GROUP, "/getschema", "GET", vec![]);
        let response = handler.handle(&invocation).await;

        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["response"]["httpStatusCode"], 200);
        let body: serde_json::Value =
            serde_json::from_str(response.response.response_body().body()).unwrap();
        assert_eq!(body["clinical_genomic"][0]["name"], "case_id");
        assert_eq!(body["clinical_genomic"][1]["comment"], "0 Alive, 1 Dead");
    }

    #[tokio::test]
    async fn refinesql_sends_schema_and_seeded_turn() {
        let engine = Arc::new(StaticQueryEngine::new());
        engine.register("pg_catalog.pg_attribute", schema_rows());
        let model = Arc::new(ScriptedModelProvider::new(vec![
            "no change needed".to_owned(),
        ]));
        let handler = handler_with(engine, model.clone(), Arc::new(MemoryObjectStore::new()));

        let invocation = ToolInvocation::api(ACTION_GROUP, "/refinesql", "POST", vec![
            Parameter::new(
                "sql",
                "SELECT survival_status, COUNT(*) FROM clinical_genomic GROUP BY survival_status",
            ),
            Parameter::new("question", "How many patients are alive?"),
        ]);
        let response = handler.handle(&invocation).await;

        assert_eq!(response.response.response_body().body(), "no change needed");
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages.len(), 2);
        assert!(requests[0].messages[0].content.contains("<schema>"));
        assert!(requests[0].messages[0].content.contains("survival_status"));
        assert_eq!(requests[0].messages[1].content, "<efficientQuery>");
        assert!(requests[0].system.as_deref().unwrap().contains("critical"));
    }

    #[tokio::test]
    async fn queryredshift_returns_result_set() {
        let engine = Arc::new(StaticQueryEngine::new());
        engine.register("from clinical_genomic", QueryResultSet {
            column_metadata: vec![ColumnInfo::named("count")],
            records: vec![vec![CellValue::Long(12)]],
        });
        let handler = handler_with(
            engine,
            Arc::new(ScriptedModelProvider::default()),
            Arc::new(MemoryObjectStore::new()),
        );

        let invocation = ToolInvocation::api(ACTION_GROUP, "/queryredshift", "POST", vec![
            Parameter::new("query", "SELECT COUNT(*) FROM clinical_genomic"),
        ]);
        let response = handler.handle(&invocation).await;

        let body: serde_json::Value =
            serde_json::from_str(response.response.response_body().body()).unwrap();
        assert_eq!(body["Records"][0][0]["longValue"], 12);
    }

    #[tokio::test]
    async fn oversized_result_is_externalized() {
        let engine = Arc::new(StaticQueryEngine::new());
        let wide = QueryResultSet {
            column_metadata: vec![ColumnInfo::named("notes")],
            records: (0..2_000)
                .map(|i| vec![CellValue::Text(format!("row {i} padding padding"))])
                .collect(),
        };
        engine.register("select notes", wide);
        let store = Arc::new(MemoryObjectStore::new());
        let handler = handler_with(
            engine,
            Arc::new(ScriptedModelProvider::default()),
            store.clone(),
        );

        let invocation = ToolInvocation::api(ACTION_GROUP, "/queryredshift", "POST", vec![
            Parameter::new("query", "SELECT notes FROM visits"),
        ]);
        let response = handler.handle(&invocation).await;

        let body = response.response.response_body().body();
        assert!(body.contains("Bucket: results"));
        assert_eq!(store.keys("results").len(), 1);
    }

    #[tokio::test]
    async fn failed_statement_becomes_500_envelope() {
        let engine = Arc::new(StaticQueryEngine::new());
        engine.fail_matching("select", "relation does not exist");
        let handler = handler_with(
            engine,
            Arc::new(ScriptedModelProvider::default()),
            Arc::new(MemoryObjectStore::new()),
        );

        let invocation = ToolInvocation::api(ACTION_GROUP, "/queryredshift", "POST", vec![
            Parameter::new("query", "SELECT * FROM missing"),
        ]);
        let response = handler.handle(&invocation).await;

        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["response"]["httpStatusCode"], 500);
        assert!(
            response
                .response
                .response_body()
                .body()
                .contains("relation does not exist")
        );
    }

    #[tokio::test]
    async fn unknown_path_is_400() {
        let handler = handler_with(
            Arc::new(StaticQueryEngine::new()),
            Arc::new(ScriptedModelProvider::default()),
            Arc::new(MemoryObjectStore::new()),
        );
        let invocation = ToolInvocation::api(ACTION_GROUP, "/dropdatabase", "POST", vec![]);
        let response = handler.handle(&invocation).await;
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["response"]["httpStatusCode"], 400);
    }

    #[tokio::test]
    async fn missing_parameter_is_500_with_message() {
        let handler = handler_with(
            Arc::new(StaticQueryEngine::new()),
            Arc::new(ScriptedModelProvider::default()),
            Arc::new(MemoryObjectStore::new()),
        );
        let invocation = ToolInvocation::api(ACTION_GROUP, "/queryredshift", "POST", vec![]);
        let response = handler.handle(&invocation).await;

        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["response"]["httpStatusCode"], 500);
        assert!(
            response
                .response
                .response_body()
                .body()
                .contains("missing required parameter: query")
        );
    }
}
