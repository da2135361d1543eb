use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use biomark_handlers::{
    ActionGroupRouter, ChartActionGroup, ChartConfig, DatabaseActionGroup, ImagingActionGroup,
    ImagingConfig, LiteratureActionGroup, SurvivalActionGroup, SurvivalPlotActionGroup,
    SurvivalPlotConfig,
};
use biomark_protocol::{
    AgentResponse, CellValue, ColumnInfo, EnvelopeConfig, ModelProvider, ObjectStore,
    QueryResultSet, ResponseBuilder, ToolInvocation,
};
use biomark_services::{
    EntrezClient, EntrezConfig, FsObjectStore, HttpModelProvider, LocalWorkflowTrigger,
    MemoryObjectStore, ModelConfig, QueryRunner, ScriptedModelProvider, StaticQueryEngine,
    TokioClock,
};
use clap::Parser;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "biomark-gateway")]
#[command(about = "Action-group gateway for the biomark research agent")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:8878")]
    listen: SocketAddr,
    /// Persist objects under this directory; in-memory when omitted.
    #[arg(long)]
    store_root: Option<PathBuf>,
    #[arg(long, default_value = "biomark-results")]
    results_bucket: String,
    #[arg(long, default_value = "biomark-charts")]
    charts_bucket: String,
    #[arg(long, default_value = "biomark-imaging")]
    imaging_bucket: String,
    /// API key for the model endpoint; without it `/refinesql` answers from
    /// a canned offline provider.
    #[arg(long)]
    model_api_key: Option<String>,
}

#[derive(Clone)]
struct AppState {
    router: Arc<ActionGroupRouter>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let router = build_router(&cli)?;
    let state = AppState {
        router: Arc::new(router),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/action-groups", get(action_groups))
        .route("/invocations", post(invoke))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!(listen = %cli.listen, "biomark-gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn build_router(cli: &Cli) -> Result<ActionGroupRouter> {
    let store: Arc<dyn ObjectStore> = match &cli.store_root {
        Some(root) => Arc::new(FsObjectStore::new(root.clone())),
        None => Arc::new(MemoryObjectStore::new()),
    };

    let engine = Arc::new(StaticQueryEngine::new());
    engine.register("pg_catalog.pg_attribute", demo_schema());
    let runner = QueryRunner::new(engine, Arc::new(TokioClock));

    let model: Arc<dyn ModelProvider> = match &cli.model_api_key {
        Some(api_key) => Arc::new(HttpModelProvider::new(ModelConfig::new(api_key.clone()))?),
        None => Arc::new(ScriptedModelProvider::new(vec![
            "no change needed".to_owned();
            8
        ])),
    };

    let literature = Arc::new(EntrezClient::new(EntrezConfig::default())?);
    let workflow = Arc::new(LocalWorkflowTrigger::default());

    let results_builder = ResponseBuilder::new(
        store.clone(),
        EnvelopeConfig::new(cli.results_bucket.clone()),
    );
    let chart_config = ChartConfig {
        bucket: cli.charts_bucket.clone(),
        ..ChartConfig::default()
    };
    let plot_config = SurvivalPlotConfig {
        bucket: cli.charts_bucket.clone(),
        ..SurvivalPlotConfig::default()
    };
    let imaging_config = ImagingConfig {
        bucket: cli.imaging_bucket.clone(),
        ..ImagingConfig::default()
    };

    Ok(ActionGroupRouter::new(results_builder.clone())
        .register(Arc::new(DatabaseActionGroup::new(
            runner,
            model,
            results_builder.clone(),
        )))
        .register(Arc::new(SurvivalActionGroup::new(results_builder.clone())))
        .register(Arc::new(
            ChartActionGroup::new(store.clone(), results_builder.clone()).with_config(chart_config),
        ))
        .register(Arc::new(
            SurvivalPlotActionGroup::new(store.clone(), results_builder.clone())
                .with_config(plot_config),
        ))
        .register(Arc::new(
            ImagingActionGroup::new(workflow, store.clone(), results_builder.clone())
                .with_config(imaging_config),
        ))
        .register(Arc::new(LiteratureActionGroup::new(
            literature,
            results_builder,
        ))))
}

/// Catalog rows served by the built-in demo engine so `/getschema` works
/// out of the box.
fn demo_schema() -> QueryResultSet {
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
            row(
                "survival_status",
                "bigint",
                "Survival status, accepted values: 0 Alive, 1 Dead",
            ),
            row("survival_duration", "double precision", "Days from diagnosis"),
            row(
                "chemotherapy",
                "character varying(8)",
                "Accepted values: Yes, No",
            ),
        ],
    }
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "biomark-gateway"
    }))
}

async fn action_groups(State(state): State<AppState>) -> Json<serde_json::Value> {
    let groups: Vec<&str> = state.router.action_groups().collect();
    Json(json!({ "actionGroups": groups }))
}

async fn invoke(
    State(state): State<AppState>,
    Json(invocation): Json<ToolInvocation>,
) -> Json<AgentResponse> {
    Json(state.router.dispatch(&invocation).await)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(error) => {
                    tracing::error!(%error, "failed to install SIGTERM handler");
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
