use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tower_http::cors::CorsLayer;

use crate::config::MonitorConfig;
use crate::error::{SearchError, StoreError, ValidationError};
use crate::model::{
    AlertFilter, AlertId, AlertStatus, NewTarget, QueryOrigin, RiskTier, SearchQuery, SourceKind,
    TargetId,
};
use crate::scan::{ScanOrchestrator, ScanOutcome, ScanReport};
use crate::search::{SearchOrchestrator, SearchOutcome};
use crate::store::AlertStore;

/// Target name shown for alerts that came from an ad-hoc search.
pub const SEARCH_RESULT_LABEL: &str = "Search Result";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AlertStore>,
    pub scan: Arc<ScanOrchestrator>,
    pub search: Arc<SearchOrchestrator>,
    pub page_size: usize,
    pub history_limit: usize,
}

impl AppState {
    pub fn new(
        cfg: &MonitorConfig,
        store: Arc<dyn AlertStore>,
        scan: Arc<ScanOrchestrator>,
        search: Arc<SearchOrchestrator>,
    ) -> Self {
        Self {
            store,
            scan,
            search,
            page_size: cfg.page_size,
            history_limit: cfg.search_history_limit,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/search", post(run_search))
        .route("/api/search/history", get(search_history))
        .route("/api/targets", get(list_targets).post(create_target))
        .route("/api/targets/{id}", delete(deactivate_target))
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/{id}", put(update_alert))
        .route("/api/dashboard/stats", get(dashboard_stats))
        .route("/api/scan/manual", post(manual_scan))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---- errors ----

#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    Store(StoreError),
    Busy(&'static str),
    /// Body, query or path the extractors could not decode.
    Rejected { status: StatusCode, message: String },
    /// Background scan or search task died before answering.
    Task(String),
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        ApiError::Rejected {
            status: r.status(),
            message: r.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(r: QueryRejection) -> Self {
        ApiError::Rejected {
            status: r.status(),
            message: r.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(r: PathRejection) -> Self {
        ApiError::Rejected {
            status: r.status(),
            message: r.body_text(),
        }
    }
}

impl From<JoinError> for ApiError {
    fn from(e: JoinError) -> Self {
        ApiError::Task(e.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::Validation(v) => ApiError::Validation(v),
            SearchError::Store(s) => ApiError::Store(s),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Store(e @ StoreError::NotFound { .. }) => (StatusCode::NOT_FOUND, e.to_string()),
            ApiError::Store(e) => {
                tracing::error!(error = %e, "store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            ApiError::Busy(msg) => (StatusCode::CONFLICT, msg.to_string()),
            ApiError::Rejected { status, message } => (status, message),
            ApiError::Task(e) => {
                tracing::error!(error = %e, "background task failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "background task failed".to_string())
            }
        };
        (status, Json(ErrorBody { error: msg })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// Extractors whose rejections answer with the JSON error body.

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
struct JsonBody<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
struct QueryParams<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
struct PathParam<T>(T);

#[derive(Serialize)]
struct MessageResp {
    message: String,
}

/// Empty or whitespace-only query params count as absent.
fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

// ---- search ----

#[derive(Deserialize)]
struct SearchReq {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Serialize)]
struct SearchResp {
    message: String,
    #[serde(flatten)]
    outcome: SearchOutcome,
}

/// The search runs on its own task so a client that goes away does not cut
/// it short; the audit row always gets its final count.
async fn run_search(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SearchReq>,
) -> ApiResult<SearchResp> {
    let topic = non_blank(req.topic).ok_or(ValidationError::MissingField("topic"))?;
    let location = non_blank(req.location);
    let search = state.search.clone();
    let outcome =
        tokio::spawn(async move { search.run(&topic, location.as_deref()).await }).await??;
    Ok(Json(SearchResp {
        message: format!("Search completed, {} results found", outcome.results_count),
        outcome,
    }))
}

async fn search_history(State(state): State<AppState>) -> ApiResult<Vec<SearchQuery>> {
    Ok(Json(state.store.list_search_queries(state.history_limit).await?))
}

// ---- targets ----

/// Keywords arrive either as a list or as one comma-separated string.
#[derive(Deserialize)]
#[serde(untagged)]
enum KeywordsInput {
    List(Vec<String>),
    Csv(String),
}

impl KeywordsInput {
    fn into_keywords(self) -> Vec<String> {
        let raw = match self {
            KeywordsInput::List(v) => v,
            KeywordsInput::Csv(s) => s.split(',').map(str::to_string).collect(),
        };
        raw.into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

#[derive(Deserialize)]
struct CreateTargetReq {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    keywords: Option<KeywordsInput>,
    #[serde(default)]
    target_type: Option<String>,
}

impl CreateTargetReq {
    fn validate(self) -> Result<NewTarget, ValidationError> {
        let name = non_blank(self.name).ok_or(ValidationError::MissingField("name"))?;
        let keywords = self
            .keywords
            .ok_or(ValidationError::MissingField("keywords"))?
            .into_keywords();
        let target_type =
            non_blank(self.target_type).ok_or(ValidationError::MissingField("target_type"))?;
        Ok(NewTarget {
            name,
            keywords,
            target_type,
        })
    }
}

#[derive(Serialize)]
struct CreatedResp {
    id: TargetId,
    message: String,
}

async fn create_target(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateTargetReq>,
) -> ApiResult<CreatedResp> {
    let new = req.validate()?;
    let t = state.store.create_target(new).await?;
    tracing::info!(target_id = t.id, target_name = %t.name, keywords = t.keywords.len(), "target created");
    Ok(Json(CreatedResp {
        id: t.id,
        message: "Target created".into(),
    }))
}

#[derive(Serialize)]
struct TargetView {
    id: TargetId,
    name: String,
    keywords: Vec<String>,
    target_type: String,
    created_at: DateTime<Utc>,
    alert_count: usize,
}

async fn list_targets(State(state): State<AppState>) -> ApiResult<Vec<TargetView>> {
    let targets = state.store.list_active_targets().await?;
    let mut out = Vec::with_capacity(targets.len());
    for t in targets {
        let alert_count = state.store.count_new_alerts_for_target(t.id).await?;
        out.push(TargetView {
            id: t.id,
            name: t.name,
            keywords: t.keywords,
            target_type: t.target_type,
            created_at: t.created_at,
            alert_count,
        });
    }
    Ok(Json(out))
}

async fn deactivate_target(
    State(state): State<AppState>,
    PathParam(id): PathParam<TargetId>,
) -> ApiResult<MessageResp> {
    let t = state.store.deactivate_target(id).await?;
    tracing::info!(target_id = t.id, target_name = %t.name, "target deactivated");
    Ok(Json(MessageResp {
        message: "Target deactivated".into(),
    }))
}

// ---- alerts ----

#[derive(Deserialize, Default)]
struct AlertsParams {
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    risk_level: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    query_type: Option<String>,
}

impl AlertsParams {
    fn filter(&self) -> Result<AlertFilter, ValidationError> {
        Ok(AlertFilter {
            risk_level: non_blank(self.risk_level.clone())
                .map(|s| s.parse::<RiskTier>())
                .transpose()?,
            status: non_blank(self.status.clone())
                .map(|s| s.parse::<AlertStatus>())
                .transpose()?,
            query_type: non_blank(self.query_type.clone())
                .map(|s| s.parse::<QueryOrigin>())
                .transpose()?,
        })
    }
}

#[derive(Serialize)]
struct AlertView {
    id: AlertId,
    title: String,
    description: String,
    source_url: String,
    source_type: SourceKind,
    risk_level: RiskTier,
    relevance_score: Option<f64>,
    status: AlertStatus,
    created_at: DateTime<Utc>,
    target_name: String,
    location: Option<String>,
    query_type: QueryOrigin,
}

#[derive(Serialize)]
struct AlertsResp {
    alerts: Vec<AlertView>,
    total: usize,
    pages: usize,
    current_page: usize,
}

async fn list_alerts(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<AlertsParams>,
) -> ApiResult<AlertsResp> {
    let filter = params.filter()?;
    let page = state
        .store
        .query_alerts(&filter, params.page.unwrap_or(1), state.page_size)
        .await?;

    let mut names: HashMap<TargetId, String> = HashMap::new();
    let mut alerts = Vec::with_capacity(page.items.len());
    for a in page.items {
        let target_name = match a.target_id {
            None => SEARCH_RESULT_LABEL.to_string(),
            Some(id) => match names.get(&id) {
                Some(n) => n.clone(),
                None => {
                    let n = match state.store.get_target(id).await {
                        Ok(t) => t.name,
                        Err(StoreError::NotFound { .. }) => "Unknown".to_string(),
                        Err(e) => return Err(e.into()),
                    };
                    names.insert(id, n.clone());
                    n
                }
            },
        };
        alerts.push(AlertView {
            id: a.id,
            title: a.title,
            description: a.description,
            source_url: a.source_url,
            source_type: a.source_type,
            risk_level: a.risk_level,
            relevance_score: a.relevance_score,
            status: a.status,
            created_at: a.created_at,
            target_name,
            location: a.location,
            query_type: a.query_type,
        });
    }

    Ok(Json(AlertsResp {
        alerts,
        total: page.total,
        pages: page.pages,
        current_page: page.current_page,
    }))
}

#[derive(Deserialize)]
struct UpdateAlertReq {
    #[serde(default)]
    status: Option<String>,
}

async fn update_alert(
    State(state): State<AppState>,
    PathParam(id): PathParam<AlertId>,
    JsonBody(req): JsonBody<UpdateAlertReq>,
) -> ApiResult<MessageResp> {
    let status: AlertStatus = non_blank(req.status)
        .ok_or(ValidationError::MissingField("status"))?
        .parse()?;
    state.store.update_alert_status(id, status).await?;
    tracing::info!(alert_id = id, status = ?status, "alert status updated");
    Ok(Json(MessageResp {
        message: "Alert updated".into(),
    }))
}

// ---- dashboard ----

#[derive(Serialize)]
struct StatsResp {
    total_alerts: usize,
    new_alerts: usize,
    critical_alerts: usize,
    active_targets: usize,
    recent_alerts_by_risk: BTreeMap<&'static str, usize>,
}

async fn dashboard_stats(State(state): State<AppState>) -> ApiResult<StatsResp> {
    let totals = state.store.alert_totals().await?;
    let active_targets = state.store.count_active_targets().await?;
    let since = Utc::now() - Duration::days(7);
    let recent = state.store.aggregate_alert_counts_by_risk_tier(since).await?;
    Ok(Json(StatsResp {
        total_alerts: totals.total,
        new_alerts: totals.new,
        critical_alerts: totals.critical,
        active_targets,
        recent_alerts_by_risk: recent.into_iter().map(|(k, v)| (k.as_str(), v)).collect(),
    }))
}

// ---- scan ----

#[derive(Serialize)]
struct ScanResp {
    message: String,
    alerts_created: usize,
    report: ScanReport,
}

/// The cycle is spawned and awaited, so it runs to completion even when the
/// caller disconnects first.
async fn manual_scan(State(state): State<AppState>) -> Result<Json<ScanResp>, ApiError> {
    tracing::info!("manual scan triggered");
    let scan = state.scan.clone();
    match tokio::spawn(async move { scan.run_cycle().await }).await? {
        ScanOutcome::Completed(report) => Ok(Json(ScanResp {
            message: format!("Manual scan completed, {} new alerts", report.alerts_created),
            alerts_created: report.alerts_created,
            report,
        })),
        ScanOutcome::Skipped => Err(ApiError::Busy("a scan is already running")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_accept_csv_and_list() {
        let csv: KeywordsInput = serde_json::from_str(r#"" acme, globex ,,""#).unwrap();
        assert_eq!(csv.into_keywords(), vec!["acme", "globex"]);
        let list: KeywordsInput = serde_json::from_str(r#"["a", " ", "b "]"#).unwrap();
        assert_eq!(list.into_keywords(), vec!["a", "b"]);
    }

    #[test]
    fn create_target_requires_fields() {
        let req: CreateTargetReq = serde_json::from_str(r#"{"name":"x","keywords":"a"}"#).unwrap();
        assert_eq!(
            req.validate().unwrap_err(),
            ValidationError::MissingField("target_type")
        );
    }

    #[test]
    fn bad_filter_value_is_a_validation_error() {
        let p = AlertsParams {
            risk_level: Some("severe".into()),
            ..Default::default()
        };
        assert!(matches!(
            p.filter(),
            Err(ValidationError::InvalidValue { field: "risk_level", .. })
        ));
        let blank = AlertsParams {
            status: Some("".into()),
            ..Default::default()
        };
        assert_eq!(blank.filter().unwrap(), AlertFilter::default());
    }
}
