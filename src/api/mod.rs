use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::db::models::{Match, MatchStatus, OddsQuote, Pick};
use crate::db::Database;
use crate::error::WagerError;
use crate::leaderboard::{self, Metric, Period};
use crate::predict::{GenerateParams, PredictionEngine};
use crate::wagering::{PickRequest, WagerService};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub wagers: WagerService,
    pub predictions: PredictionEngine,
    pub leaderboard_min_picks: u32,
}

/// Build the Axum router for the engine API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/matches", put(upsert_match_handler))
        .route("/api/odds", put(upsert_odds_handler))
        .route("/api/predictions", get(predictions_handler))
        .route("/api/predictions/value", get(value_bets_handler))
        .route("/api/predictions/:id", get(prediction_handler))
        .route("/api/predictions/generate", post(generate_handler))
        .route("/api/picks", post(place_pick_handler))
        .route("/api/picks/:id", get(pick_handler))
        .route("/api/settlements", post(settle_handler))
        .route("/api/users/:id/ledger", post(open_ledger_handler))
        .route("/api/users/:id/picks", get(user_picks_handler))
        .route("/api/users/:id/stats", get(stats_handler))
        .route("/api/users/:id/achievements", get(achievements_handler))
        .route("/api/users/:id/bankroll-history", get(bankroll_history_handler))
        .route("/api/leaderboard", get(leaderboard_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Error body: `{ "error": message, "code": machine_code }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_request",
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
        }
    }
}

impl From<WagerError> for ApiError {
    fn from(e: WagerError) -> Self {
        let status = match &e {
            WagerError::InvalidStake(_) | WagerError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
            WagerError::PredictionNotFound(_) | WagerError::MatchNotFound(_) | WagerError::UserNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            WagerError::MatchAlreadyStarted(_) | WagerError::DuplicatePick { .. } | WagerError::MatchNotFinished(_) => {
                StatusCode::CONFLICT
            }
            WagerError::Storage(err) => {
                error!("Storage error: {:#}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError {
            status,
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        WagerError::Storage(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message, "code": self.code }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ── Query parameters ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub status: Option<String>,
}

impl Page {
    fn limit(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, 200)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub metric: Metric,
    pub limit: Option<usize>,
}

/// Fixture as delivered by the match feed. `status` accepts provider short codes
/// (`NS`, `1H`, `FT`, ...) as well as the engine's own labels.
#[derive(Debug, Deserialize)]
pub struct MatchUpsert {
    pub id: i64,
    pub external_key: Option<String>,
    pub league_id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub kickoff: DateTime<Utc>,
    pub status: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
}

impl From<MatchUpsert> for Match {
    fn from(m: MatchUpsert) -> Self {
        let status = MatchStatus::parse(&m.status).unwrap_or_else(|| MatchStatus::from_provider_code(&m.status));
        Match {
            id: m.id,
            external_key: m.external_key,
            league_id: m.league_id,
            home_team_id: m.home_team_id,
            away_team_id: m.away_team_id,
            kickoff: m.kickoff,
            status,
            home_score: m.home_score,
            away_score: m.away_score,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    pub match_id: i64,
}

#[derive(Debug, Serialize)]
pub struct PickView {
    #[serde(flatten)]
    pub pick: Pick,
    pub profit: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct PicksPage<T> {
    pub picks: Vec<T>,
    pub has_more: bool,
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// Run a store call on the blocking pool; the SQLite handle is synchronous.
async fn blocking<T, E, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(res) => res.map_err(Into::into),
        Err(e) => Err(anyhow::anyhow!("store task failed: {e}").into()),
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// PUT /api/matches
async fn upsert_match_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MatchUpsert>,
) -> ApiResult<Match> {
    let m: Match = body.into();
    if m.home_team_id == m.away_team_id {
        return Err(ApiError::bad_request("home and away team must differ"));
    }
    let stored = m.clone();
    blocking(move || state.db.upsert_match(&stored)).await?;
    Ok(Json(m))
}

/// PUT /api/odds
async fn upsert_odds_handler(
    State(state): State<Arc<AppState>>,
    Json(quote): Json<OddsQuote>,
) -> ApiResult<OddsQuote> {
    if !(quote.odds.is_finite() && quote.odds > 1.0) {
        return Err(ApiError::bad_request("decimal odds must be greater than 1.0"));
    }
    let stored = quote.clone();
    blocking(move || -> Result<(), ApiError> {
        if state.db.get_match(stored.match_id)?.is_none() {
            return Err(WagerError::MatchNotFound(stored.match_id).into());
        }
        state.db.upsert_odds(&stored)?;
        Ok(())
    })
    .await?;
    Ok(Json(quote))
}

/// GET /api/predictions?limit=50
async fn predictions_handler(
    State(state): State<Arc<AppState>>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = page.limit(50);
    Ok(Json(blocking(move || state.db.list_upcoming_predictions(limit)).await?))
}

/// GET /api/predictions/value?limit=20
async fn value_bets_handler(
    State(state): State<Arc<AppState>>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = page.limit(20);
    Ok(Json(blocking(move || state.db.list_value_bets(limit)).await?))
}

/// GET /api/predictions/:id
async fn prediction_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let prediction = blocking(move || state.db.get_prediction(id))
        .await?
        .ok_or(WagerError::PredictionNotFound(id))?;
    Ok(Json(prediction))
}

/// POST /api/predictions/generate
async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Json(params): Json<GenerateParams>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        blocking(move || state.predictions.generate_for_upcoming(&params)).await?,
    ))
}

/// POST /api/picks
async fn place_pick_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PickRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = blocking(move || state.wagers.place_pick(&req)).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /api/picks/:id
async fn pick_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let pick = blocking(move || state.db.get_pick(id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("pick {id} not found")))?;
    let profit = pick.profit();
    Ok(Json(PickView { pick, profit }))
}

/// POST /api/settlements
async fn settle_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SettleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(blocking(move || state.wagers.settle_match(req.match_id)).await?))
}

/// POST /api/users/:id/ledger
async fn open_ledger_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(blocking(move || state.wagers.open_ledger(user_id)).await?))
}

/// GET /api/users/:id/picks?status=pending&limit=50&offset=0
async fn user_picks_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(s) = page.status.as_deref() {
        if !matches!(s, "pending" | "won" | "lost") {
            return Err(ApiError::bad_request(format!("unknown pick status {s:?}")));
        }
    }
    let (limit, offset) = (page.limit(50), page.offset());
    let (picks, has_more) = blocking(move || {
        state
            .db
            .list_picks(user_id, page.status.as_deref(), limit, offset)
    })
    .await?;
    Ok(Json(PicksPage { picks, has_more }))
}

/// GET /api/users/:id/stats
async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(blocking(move || state.wagers.stats(user_id)).await?))
}

/// GET /api/users/:id/achievements
async fn achievements_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        blocking(move || state.wagers.progression().achievements(user_id)).await?,
    ))
}

/// GET /api/users/:id/bankroll-history?limit=100&offset=0
async fn bankroll_history_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = (page.limit(100), page.offset());
    let history = blocking(move || -> Result<_, ApiError> {
        if state.db.get_ledger(user_id)?.is_none() {
            return Err(WagerError::UserNotFound(user_id).into());
        }
        Ok(state.db.bankroll_history(user_id, limit, offset)?)
    })
    .await?;
    Ok(Json(history))
}

/// GET /api/leaderboard?period=weekly&metric=profit&limit=50
async fn leaderboard_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LeaderboardQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = q.limit.unwrap_or(50).clamp(1, 200);
    let (period, metric) = (q.period, q.metric);
    let board = blocking(move || {
        leaderboard::leaderboard(
            &state.db,
            period,
            metric,
            limit,
            state.leaderboard_min_picks,
            Utc::now(),
        )
    })
    .await?;
    Ok(Json(json!({
        "period": period,
        "metric": metric,
        "entries": board,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::classifier::ClassifierConfig;
    use crate::predict::probability::ModelConfig;
    use crate::wagering::StakePolicy;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use chrono::Duration;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let db = Database::open_in_memory().unwrap();
        router(AppState {
            wagers: WagerService::new(db.clone(), StakePolicy::default(), 1000.0),
            predictions: PredictionEngine::new(db.clone(), ModelConfig::default(), ClassifierConfig::default()),
            leaderboard_min_picks: 1,
            db,
        })
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let req = match body {
            Some(b) => req.body(Body::from(b.to_string())).unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn fixture_json(id: i64, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "league_id": 39,
            "home_team_id": 10,
            "away_team_id": 20,
            "kickoff": (Utc::now() + Duration::days(1)).to_rfc3339(),
            "status": status,
        })
    }

    /// Match, prediction and an opened ledger for user 1. Returns the prediction id.
    async fn seed(app: &Router) -> i64 {
        let (s, _) = call(app, Method::PUT, "/api/matches", Some(fixture_json(1, "NS"))).await;
        assert_eq!(s, StatusCode::OK);
        let (s, report) = call(app, Method::POST, "/api/predictions/generate", Some(json!({}))).await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(report["generated"], 1);
        let (_, preds) = call(app, Method::GET, "/api/predictions", None).await;
        let (s, _) = call(app, Method::POST, "/api/users/1/ledger", None).await;
        assert_eq!(s, StatusCode::OK);
        preds[0]["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = test_app();
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_pick_lifecycle_over_http() {
        let app = test_app();
        let pid = seed(&app).await;

        let (status, receipt) = call(
            &app,
            Method::POST,
            "/api/picks",
            Some(json!({ "user_id": 1, "prediction_id": pid, "stake": 100.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(receipt["new_bankroll"], 900.0);

        let (status, err) = call(
            &app,
            Method::POST,
            "/api/picks",
            Some(json!({ "user_id": 1, "prediction_id": pid, "stake": 100.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["code"], "duplicate_pick");

        let mut done = fixture_json(1, "FT");
        done["home_score"] = json!(0);
        done["away_score"] = json!(0);
        call(&app, Method::PUT, "/api/matches", Some(done)).await;

        let (status, report) = call(&app, Method::POST, "/api/settlements", Some(json!({ "match_id": 1 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["resolved"], 1);

        let uri = format!("/api/picks/{}", receipt["pick_id"]);
        let (status, pick) = call(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pick["status"], "lost");
        assert_eq!(pick["profit"], -100.0);
        let (status, _) = call(&app, Method::GET, "/api/picks/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, page) = call(&app, Method::GET, "/api/users/1/picks?status=pending", None).await;
        assert_eq!(page["picks"].as_array().unwrap().len(), 0);
        let (_, stats) = call(&app, Method::GET, "/api/users/1/stats", None).await;
        assert_eq!(stats["settled_picks"], 1);

        let (status, board) = call(&app, Method::GET, "/api/leaderboard?period=all_time&metric=roi", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(board["entries"][0]["user_id"], 1);
        assert_eq!(board["entries"][0]["rank"], 1);

        let (_, achievements) = call(&app, Method::GET, "/api/users/1/achievements", None).await;
        assert!(achievements["summary"]["unlocked"].as_u64().unwrap() >= 1);

        let (_, history) = call(&app, Method::GET, "/api/users/1/bankroll-history", None).await;
        assert!(!history.as_array().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_requests_run_off_the_runtime() {
        let app = test_app();
        let pid = seed(&app).await;
        for user in 2..=8 {
            let (s, _) = call(&app, Method::POST, &format!("/api/users/{user}/ledger"), None).await;
            assert_eq!(s, StatusCode::OK);
        }

        let tasks: Vec<_> = (1..=8)
            .map(|user| {
                let app = app.clone();
                tokio::spawn(async move {
                    let body = json!({ "user_id": user, "prediction_id": pid, "stake": 25.0 });
                    call(&app, Method::POST, "/api/picks", Some(body)).await.0
                })
            })
            .collect();
        for status in futures_util::future::join_all(tasks).await {
            assert_eq!(status.unwrap(), StatusCode::CREATED);
        }

        let (_, board) = call(&app, Method::GET, "/api/leaderboard?period=all_time", None).await;
        assert_eq!(board["entries"].as_array().unwrap().len(), 0);
        let (_, stats) = call(&app, Method::GET, "/api/users/5/stats", None).await;
        assert_eq!(stats["bankroll"], 975.0);
    }

    #[tokio::test]
    async fn test_rejections_map_to_status_codes() {
        let app = test_app();
        let pid = seed(&app).await;

        let (status, err) = call(
            &app,
            Method::POST,
            "/api/picks",
            Some(json!({ "user_id": 1, "prediction_id": pid, "stake": 5000.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["code"], "insufficient_funds");

        let (status, err) = call(
            &app,
            Method::POST,
            "/api/picks",
            Some(json!({ "user_id": 1, "prediction_id": pid, "stake": -1.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["code"], "invalid_stake");

        let (status, err) = call(&app, Method::GET, "/api/users/99/stats", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["code"], "user_not_found");

        let (status, err) = call(&app, Method::POST, "/api/settlements", Some(json!({ "match_id": 1 }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["code"], "match_not_finished");

        call(&app, Method::PUT, "/api/matches", Some(fixture_json(1, "1H"))).await;
        let (status, err) = call(
            &app,
            Method::POST,
            "/api/picks",
            Some(json!({ "user_id": 1, "prediction_id": pid, "stake": 10.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["code"], "match_already_started");
    }

    #[tokio::test]
    async fn test_bad_odds_and_status_filter_rejected() {
        let app = test_app();
        seed(&app).await;
        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/odds",
            Some(json!({ "match_id": 1, "outcome": "home", "bookmaker": "x", "odds": 0.9 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/odds",
            Some(json!({ "match_id": 1, "outcome": "home", "bookmaker": "x", "odds": 2.1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, err) = call(&app, Method::GET, "/api/users/1/picks?status=void", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["code"], "invalid_request");
    }
}
