use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use metrics::counter;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use shuttle_axum::axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::abtest::{
    analyze, analyze_events, AbAnalysis, AbTest, AbTestManager, RawEvent, RawVariantResult,
    Variant,
};
use crate::competitive::{analyze_competitors, CompetitiveReport, SerpSnapshot};
use crate::config::EngineConfig;
use crate::error::{AbTestError, ConfigError};
use crate::filter::KeywordFilter;
use crate::metrics::Metrics;
use crate::model::KeywordRecord;
use crate::niche::{analyze_niche, NicheReport};
use crate::provider::{KeywordDataProvider, StaticProvider};
use crate::scoring::{OpportunityScorer, ScoringReport};
use crate::store::{InMemoryTaskStore, TaskId, TaskRecord, TaskStore, TaskUpdate};
use crate::weights::HotReloadWeights;

// ---------- errors ----------

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0} is not implemented yet")]
    NotImplemented(String),
    #[error("keyword provider failed: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::NotImplemented(_) => (StatusCode::NOT_IMPLEMENTED, "not_implemented"),
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": code, "message": self.to_string() }))).into_response()
    }
}

impl From<AbTestError> for ApiError {
    fn from(e: AbTestError) -> Self {
        match e {
            AbTestError::NotFound(_) => Self::NotFound(e.to_string()),
            AbTestError::InvalidTransition { .. } | AbTestError::NotRunning(_) => {
                Self::Conflict(e.to_string())
            }
            AbTestError::UnknownVariant(_) | AbTestError::InvalidDefinition(_) => {
                Self::BadRequest(e.to_string())
            }
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        Self::BadRequest(r.body_text())
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// `Json` body extractor whose rejections use the `{error, message}` shape.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
struct AppJson<T>(T);

/// Decode a batch item by item. Items that don't fit `T` are counted, not fatal.
fn decode_each<T: DeserializeOwned>(items: Vec<Value>, kind: &'static str) -> (Vec<T>, usize) {
    let mut out = Vec::with_capacity(items.len());
    let mut skipped = 0usize;
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<T>(item) {
            Ok(v) => out.push(v),
            Err(e) => {
                debug!(index, kind, error = %e, "skipping undecodable record");
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        warn!(skipped, kind, "request batch contained undecodable records");
    }
    (out, skipped)
}

fn decode_keywords(items: Vec<Value>) -> (Vec<KeywordRecord>, usize) {
    let (records, skipped) = decode_each::<KeywordRecord>(items, "keyword record");
    counter!("opportunity_keywords_skipped_total").increment(skipped as u64);
    (records, skipped)
}

// ---------- state ----------

#[derive(Clone)]
pub struct AppState {
    weights: Arc<HotReloadWeights>,
    abtests: Arc<Mutex<AbTestManager>>,
    tasks: Arc<dyn TaskStore<ScoringReport>>,
    provider: Arc<dyn KeywordDataProvider>,
    config: Arc<EngineConfig>,
    metrics: Metrics,
}

impl AppState {
    pub fn new(
        config: EngineConfig,
        tasks: Arc<dyn TaskStore<ScoringReport>>,
        provider: Arc<dyn KeywordDataProvider>,
        metrics: Metrics,
    ) -> Self {
        let weights = HotReloadWeights::new(Some(config.paths.weights_file.as_path()), config.weights);
        Self {
            weights: Arc::new(weights),
            abtests: Arc::new(Mutex::new(AbTestManager::new(config.significance))),
            tasks,
            provider,
            config: Arc::new(config),
            metrics,
        }
    }

    /// In-memory task store plus a static provider (fixture from config, or empty).
    pub fn from_config(config: EngineConfig, metrics: Metrics) -> anyhow::Result<Self> {
        let provider = match &config.paths.provider_fixture {
            Some(path) => StaticProvider::from_file(path)?,
            None => StaticProvider::default(),
        };
        let tasks = InMemoryTaskStore::new(config.task_ttl(), config.tasks.capacity);
        info!(
            provider = provider.name(),
            task_ttl_secs = config.tasks.ttl_secs,
            "app state ready"
        );
        Ok(Self::new(config, Arc::new(tasks), Arc::new(provider), metrics))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn scorer(&self, filter: KeywordFilter) -> ApiResult<OpportunityScorer> {
        Ok(OpportunityScorer::new(self.weights.current(), filter)?)
    }

    fn abtests(&self) -> MutexGuard<'_, AbTestManager> {
        self.abtests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------- router ----------

pub fn create_router(state: AppState) -> Router {
    let metrics: Router = state.metrics.router();

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/opportunities/score", post(score_opportunities))
        .route("/opportunities/research", post(research_opportunities))
        .route("/niche/analyze", post(niche_analyze))
        .route("/competitors/analyze", post(competitors_analyze))
        .route("/competitors/research", post(competitors_research))
        .route("/ab-tests", post(create_ab_test).get(list_ab_tests))
        .route("/ab-tests/analyze", post(analyze_ab_results))
        .route("/ab-tests/{id}", get(get_ab_test))
        .route("/ab-tests/{id}/start", post(start_ab_test))
        .route("/ab-tests/{id}/complete", post(complete_ab_test))
        .route("/ab-tests/{id}/cancel", post(cancel_ab_test))
        .route("/ab-tests/{id}/events", post(record_ab_events))
        .route("/ab-tests/{id}/analysis", get(ab_test_analysis))
        .route("/tasks/opportunities", post(submit_opportunity_task))
        .route("/tasks/{id}", get(get_task))
        .route("/local/{feature}", get(local_seo))
        .with_state(state)
        .merge(metrics)
        .layer(CorsLayer::very_permissive())
}

/// Alias kept for callers that build the app as `api::router(state)`.
pub fn router(state: AppState) -> Router {
    create_router(state)
}

// ---------- opportunities ----------

#[derive(Debug, Deserialize)]
struct ScoreReq {
    keywords: Vec<Value>,
    #[serde(default)]
    filter: KeywordFilter,
    #[serde(default)]
    limit: Option<usize>,
}

async fn score_opportunities(
    State(state): State<AppState>,
    AppJson(body): AppJson<ScoreReq>,
) -> ApiResult<Json<ScoringReport>> {
    let scorer = state.scorer(body.filter)?;
    let (records, undecodable) = decode_keywords(body.keywords);
    let mut report = scorer.score_and_rank(&records);
    report.skipped += undecodable;
    Ok(Json(limit(report, body.limit)))
}

#[derive(Debug, Deserialize)]
struct ResearchReq {
    keywords: Vec<String>,
    #[serde(default)]
    filter: KeywordFilter,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ResearchResp {
    provider: &'static str,
    requested: usize,
    found: usize,
    report: ScoringReport,
}

async fn research_opportunities(
    State(state): State<AppState>,
    AppJson(body): AppJson<ResearchReq>,
) -> ApiResult<Json<ResearchResp>> {
    let scorer = state.scorer(body.filter)?;
    let records = state
        .provider
        .keyword_metrics(&body.keywords)
        .await
        .map_err(|e| ApiError::Upstream(format!("{e:#}")))?;
    let report = scorer.score_and_rank(&records);
    Ok(Json(ResearchResp {
        provider: state.provider.name(),
        requested: body.keywords.len(),
        found: records.len(),
        report: limit(report, body.limit),
    }))
}

fn limit(report: ScoringReport, n: Option<usize>) -> ScoringReport {
    match n {
        Some(n) => report.top(n),
        None => report,
    }
}

// ---------- niche / competitors ----------

#[derive(Debug, Deserialize)]
struct NicheReq {
    name: String,
    keywords: Vec<Value>,
    #[serde(default)]
    filter: KeywordFilter,
}

async fn niche_analyze(
    State(state): State<AppState>,
    AppJson(body): AppJson<NicheReq>,
) -> ApiResult<Json<NicheReport>> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("niche name must not be empty".into()));
    }
    let scorer = state.scorer(body.filter)?;
    let (records, undecodable) = decode_keywords(body.keywords);
    let mut report = analyze_niche(&body.name, &records, &scorer);
    report.skipped += undecodable;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct CompetitorsReq {
    target_domain: String,
    serps: Vec<SerpSnapshot>,
}

async fn competitors_analyze(
    AppJson(body): AppJson<CompetitorsReq>,
) -> ApiResult<Json<CompetitiveReport>> {
    if body.target_domain.trim().is_empty() {
        return Err(ApiError::BadRequest("target_domain must not be empty".into()));
    }
    Ok(Json(analyze_competitors(&body.target_domain, &body.serps)))
}

#[derive(Debug, Deserialize)]
struct CompetitorResearchReq {
    target_domain: String,
    keywords: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CompetitorResearchResp {
    provider: &'static str,
    requested: usize,
    found: usize,
    /// Keywords the provider had no SERP for.
    missing: Vec<String>,
    report: CompetitiveReport,
}

/// Fetch a SERP per keyword from the provider, then run the competitor analysis.
async fn competitors_research(
    State(state): State<AppState>,
    AppJson(body): AppJson<CompetitorResearchReq>,
) -> ApiResult<Json<CompetitorResearchResp>> {
    if body.target_domain.trim().is_empty() {
        return Err(ApiError::BadRequest("target_domain must not be empty".into()));
    }
    let mut serps = Vec::with_capacity(body.keywords.len());
    let mut missing = Vec::new();
    for kw in &body.keywords {
        match state.provider.serp(kw).await {
            Ok(serp) => serps.push(serp),
            Err(e) => {
                debug!(keyword = %kw, error = %format!("{e:#}"), "no serp for keyword");
                missing.push(kw.clone());
            }
        }
    }
    if !body.keywords.is_empty() && serps.is_empty() {
        warn!(
            provider = state.provider.name(),
            requested = body.keywords.len(),
            "provider returned no serps"
        );
    }
    let report = analyze_competitors(&body.target_domain, &serps);
    Ok(Json(CompetitorResearchResp {
        provider: state.provider.name(),
        requested: body.keywords.len(),
        found: serps.len(),
        missing,
        report,
    }))
}

// ---------- a/b tests ----------

#[derive(Debug, Deserialize)]
struct CreateAbTestReq {
    name: String,
    variants: Vec<Variant>,
}

async fn create_ab_test(
    State(state): State<AppState>,
    AppJson(body): AppJson<CreateAbTestReq>,
) -> ApiResult<(StatusCode, Json<AbTest>)> {
    let mut mgr = state.abtests();
    let test = mgr.create_test(&body.name, body.variants, Utc::now())?;
    Ok((StatusCode::CREATED, Json(test.clone())))
}

async fn list_ab_tests(State(state): State<AppState>) -> Json<Vec<AbTest>> {
    let mgr = state.abtests();
    Json(mgr.list().into_iter().cloned().collect())
}

async fn get_ab_test(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AbTest>> {
    let mgr = state.abtests();
    Ok(Json(mgr.get(&id)?.clone()))
}

async fn start_ab_test(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AbTest>> {
    let mut mgr = state.abtests();
    Ok(Json(mgr.start(&id, Utc::now())?.clone()))
}

async fn cancel_ab_test(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AbTest>> {
    let mut mgr = state.abtests();
    Ok(Json(mgr.cancel(&id, Utc::now())?.clone()))
}

#[derive(Debug, Serialize)]
struct CompleteResp {
    test: AbTest,
    analysis: AbAnalysis,
}

async fn complete_ab_test(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CompleteResp>> {
    let mut mgr = state.abtests();
    let analysis = mgr.complete(&id, Utc::now())?;
    let test = mgr.get(&id)?.clone();
    Ok(Json(CompleteResp { test, analysis }))
}

#[derive(Debug, Deserialize)]
struct EventsReq {
    events: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct EventsResp {
    accepted: usize,
    skipped: usize,
    events_recorded: u64,
}

async fn record_ab_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(body): AppJson<EventsReq>,
) -> ApiResult<Json<EventsResp>> {
    let (events, undecodable) = decode_each::<RawEvent>(body.events, "a/b event");
    let mut mgr = state.abtests();
    let (accepted, skipped) = mgr.record_events(&id, &events)?;
    let skipped = skipped + undecodable;
    let events_recorded = mgr.get(&id)?.events_recorded;
    Ok(Json(EventsResp {
        accepted,
        skipped,
        events_recorded,
    }))
}

async fn ab_test_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AbAnalysis>> {
    let mut mgr = state.abtests();
    Ok(Json(mgr.analyze(&id, Utc::now())?))
}

/// Stateless analysis: either per-variant `results` or raw `events`.
#[derive(Debug, Deserialize)]
struct AnalyzeAbReq {
    #[serde(default)]
    results: Option<Vec<Value>>,
    #[serde(default)]
    events: Option<Vec<Value>>,
}

async fn analyze_ab_results(
    State(state): State<AppState>,
    AppJson(body): AppJson<AnalyzeAbReq>,
) -> ApiResult<Json<AbAnalysis>> {
    let cfg = &state.config.significance;
    let (mut analysis, undecodable) = match (body.results, body.events) {
        (Some(items), _) => {
            let (results, bad) = decode_each::<RawVariantResult>(items, "variant result");
            (analyze(&results, cfg), bad)
        }
        (None, Some(items)) => {
            let (events, bad) = decode_each::<RawEvent>(items, "a/b event");
            (analyze_events(&events, cfg), bad)
        }
        (None, None) => {
            return Err(ApiError::BadRequest(
                "provide either `results` or `events`".into(),
            ))
        }
    };
    analysis.skipped_records += undecodable;
    Ok(Json(analysis))
}

// ---------- background tasks ----------

#[derive(Debug, Serialize)]
struct TaskAccepted {
    task_id: TaskId,
    status: &'static str,
}

async fn submit_opportunity_task(
    State(state): State<AppState>,
    AppJson(body): AppJson<ScoreReq>,
) -> ApiResult<(StatusCode, Json<TaskAccepted>)> {
    let scorer = state.scorer(body.filter)?;
    let (keywords, undecodable) = decode_keywords(body.keywords);
    let now = Utc::now();
    state.tasks.expire(now);
    let task_id = state.tasks.create("opportunities", now);

    let tasks = state.tasks.clone();
    let id = task_id.clone();
    let n = body.limit;
    tokio::spawn(async move {
        let worker_tasks = tasks.clone();
        let worker_id = id.clone();
        let res = tokio::task::spawn_blocking(move || {
            if !worker_tasks.update(&worker_id, TaskUpdate::Running, Utc::now()) {
                warn!(task = %worker_id, "task record gone before the run started");
            }
            let mut report = scorer.score_and_rank(&keywords);
            report.skipped += undecodable;
            limit(report, n)
        })
        .await;
        let update = match res {
            Ok(report) => TaskUpdate::Completed(report),
            Err(e) => {
                warn!(task = %id, error = %e, "opportunity task failed");
                TaskUpdate::Failed(e.to_string())
            }
        };
        if !tasks.update(&id, update, Utc::now()) {
            warn!(task = %id, "task record gone before its result landed; result dropped");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskAccepted {
            task_id,
            status: "pending",
        }),
    ))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskRecord<ScoringReport>>> {
    state
        .tasks
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("task `{id}` not found")))
}

// ---------- local SEO ----------

async fn local_seo(Path(feature): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    match feature.as_str() {
        "reviews" | "competitors" | "geo" => {
            Err(ApiError::NotImplemented(format!("local SEO `{feature}`")))
        }
        _ => Err(ApiError::NotFound(format!("unknown local SEO feature `{feature}`"))),
    }
}
