use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use sqlx::MySqlPool;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

use stoma_core::session::{self, SessionClaims, SessionConfig, SessionError, UserType};
use stoma_db::error::StoreError;
use stoma_db::models::PlanStatus;
use stoma_db::queries::care_plan_items::{self as item_db, ItemDraft};
use stoma_db::queries::care_plans::{self as plan_db, NewCarePlan, RawCarePlan};
use stoma_db::queries::{education, patients};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub pool: MySqlPool,
    /// When set, every write needs a valid bearer token.
    pub session: Option<SessionConfig>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.into(),
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: msg.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => Self::bad_request(msg),
            err @ StoreError::NotFound { .. } => Self::not_found(err.to_string()),
            other => {
                warn!(error = %other, "store operation failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: other.to_string(),
                }
            }
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        Self::unauthorized(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CompletedBody {
    pub completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct EducationQuery {
    pub category: Option<String>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/patients", get(list_patients))
        .route("/api/patients/{id}/care-plan", get(get_active_plan))
        .route("/api/patients/{id}/care-plans", post(create_plan))
        .route(
            "/api/care-plans/{id}",
            get(get_plan_summary).patch(update_plan_status),
        )
        .route("/api/care-plans/{id}/items", put(replace_plan_items))
        .route("/api/care-plan-items/{id}", patch(set_item_completed))
        .route("/api/education", get(list_education))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    if state.session.is_none() {
        warn!("no token secret configured; writes are not authenticated");
    }
    let app = build_router(state);
    let listener = bind_listener(bind, port).await?;
    tracing::info!("stoma serve listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("stoma serve shut down");
    Ok(())
}

/// Bind `bind:port`, resolving host names such as `localhost`.
async fn bind_listener(bind: &str, port: u16) -> Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind((bind, port))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// Check the bearer token of a write request.
///
/// Returns `None` when the server runs without a token secret. With
/// `nurse_only`, patient tokens are refused.
fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    nurse_only: bool,
) -> Result<Option<SessionClaims>, AppError> {
    let Some(config) = &state.session else {
        return Ok(None);
    };

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(session::bearer_token)
        .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;

    let claims = session::validate_token(config, token, Utc::now())?;
    if nurse_only && claims.user_type != UserType::Nurse {
        return Err(AppError::forbidden("only nurses may change care plans"));
    }

    debug!(subject = %claims.subject, user_type = %claims.user_type, "request authorized");
    Ok(Some(claims))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> axum::response::Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

async fn list_patients(State(state): State<AppState>) -> Result<axum::response::Response, AppError> {
    let patients = patients::list_patients(&state.pool).await?;
    Ok(Json(patients).into_response())
}

async fn get_active_plan(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<axum::response::Response, AppError> {
    let detail = plan_db::active_plan_detail(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("patient {id} has no active care plan")))?;
    Ok(Json(detail).into_response())
}

async fn create_plan(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
    headers: HeaderMap,
    Json(raw): Json<RawCarePlan>,
) -> Result<axum::response::Response, AppError> {
    authorize(&state, &headers, true)?;

    if patients::get_patient(&state.pool, patient_id).await?.is_none() {
        return Err(AppError::not_found(format!("patient {patient_id} not found")));
    }
    let plan = NewCarePlan::try_from(raw)?;
    let plan_id = plan_db::create_plan(&state.pool, patient_id, &plan).await?;
    let summary = plan_db::get_plan_with_item_count(&state.pool, plan_id).await?;

    Ok((StatusCode::CREATED, Json(summary)).into_response())
}

async fn get_plan_summary(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<axum::response::Response, AppError> {
    let summary = plan_db::get_plan_with_item_count(&state.pool, id).await?;
    Ok(Json(summary).into_response())
}

async fn update_plan_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<StatusBody>,
) -> Result<axum::response::Response, AppError> {
    authorize(&state, &headers, true)?;

    let status: PlanStatus = body.status.parse().map_err(StoreError::from)?;
    plan_db::update_plan_status(&state.pool, id, status).await?;
    let summary = plan_db::get_plan_with_item_count(&state.pool, id).await?;
    Ok(Json(summary).into_response())
}

async fn replace_plan_items(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(items): Json<Vec<ItemDraft>>,
) -> Result<axum::response::Response, AppError> {
    authorize(&state, &headers, true)?;

    item_db::replace_items(&state.pool, id, &items).await?;
    let detail = plan_db::get_plan_detail(&state.pool, id).await?;
    Ok(Json(detail).into_response())
}

async fn set_item_completed(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<CompletedBody>,
) -> Result<axum::response::Response, AppError> {
    authorize(&state, &headers, false)?;

    item_db::set_item_completed(&state.pool, id, body.completed).await?;
    let item = item_db::get_item(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("care plan item {id} not found")))?;
    Ok(Json(item).into_response())
}

async fn list_education(
    State(state): State<AppState>,
    Query(query): Query<EducationQuery>,
) -> Result<axum::response::Response, AppError> {
    let category = query.category.as_deref().filter(|c| !c.is_empty());
    let articles = education::list_articles(&state.pool, category).await?;
    Ok(Json(articles).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{NaiveDate, Utc};
    use sqlx::MySqlPool;
    use tower::ServiceExt;

    use stoma_core::client::{ClientContext, HttpSource, PatientShell, Session};
    use stoma_core::deploy::{ClientConfig, DeployTarget};
    use stoma_core::seed;
    use stoma_core::session::{SessionConfig, UserType, issue_token};
    use stoma_db::queries::education::{NewArticle, insert_article};
    use stoma_db::queries::patients::insert_patient;
    use stoma_test_utils::{create_test_db, drop_test_db};

    use super::AppState;

    // -----------------------------------------------------------------------
    // HTTP helpers
    // -----------------------------------------------------------------------

    fn secret() -> SessionConfig {
        SessionConfig::new(b"serve-test-secret".to_vec())
    }

    fn open_state(pool: MySqlPool) -> AppState {
        AppState {
            pool,
            session: None,
        }
    }

    fn locked_state(pool: MySqlPool) -> AppState {
        AppState {
            pool,
            session: Some(secret()),
        }
    }

    fn bearer(user_type: UserType) -> String {
        format!(
            "Bearer {}",
            issue_token(&secret(), user_type, "tester", Utc::now())
        )
    }

    async fn send_request(state: AppState, uri: &str) -> axum::response::Response {
        let app = super::build_router(state);
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn send_json(
        state: AppState,
        method: &str,
        uri: &str,
        auth: Option<&str>,
        body: serde_json::Value,
    ) -> axum::response::Response {
        let app = super::build_router(state);
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        app.oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_health() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_request(open_state(pool.clone()), "/api/health").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_active_plan_of_seeded_patient() {
        let (pool, db_name) = create_test_db().await;
        let patient_id = insert_patient(&pool, "张三", None, None).await.unwrap();
        seed::seed_demo_plan(&pool, None, today()).await.unwrap();

        let uri = format!("/api/patients/{patient_id}/care-plan");
        let resp = send_request(open_state(pool.clone()), &uri).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["title"], "造口日常护理计划");
        assert_eq!(json["task_count"], 8);
        assert_eq!(json["completed_count"], 0);
        assert_eq!(json["items"].as_array().unwrap().len(), 8);
        assert_eq!(json["items"][0]["sort_order"], 1);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_missing_plan_is_404() {
        let (pool, db_name) = create_test_db().await;
        let patient_id = insert_patient(&pool, "李四", None, None).await.unwrap();

        let uri = format!("/api/patients/{patient_id}/care-plan");
        let resp = send_request(open_state(pool.clone()), &uri).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(body_json(resp).await["error"].is_string());

        let resp = send_request(open_state(pool.clone()), "/api/care-plans/9999").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_create_plan_validates_dates() {
        let (pool, db_name) = create_test_db().await;
        let patient_id = insert_patient(&pool, "张三", None, None).await.unwrap();
        let uri = format!("/api/patients/{patient_id}/care-plans");

        let bad = serde_json::json!({
            "title": "术后护理",
            "start_date": "2025-03-10",
            "end_date": "2025-03-01",
            "frequency": "daily",
        });
        let resp = send_json(open_state(pool.clone()), "POST", &uri, None, bad).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let good = serde_json::json!({
            "title": "术后护理",
            "start_date": "2025-03-01",
            "end_date": "2025-03-10",
            "frequency": "weekly",
        });
        let resp = send_json(open_state(pool.clone()), "POST", &uri, None, good).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "active");
        assert_eq!(json["frequency"], "weekly");
        assert_eq!(json["task_count"], 0);

        let resp = send_json(
            open_state(pool.clone()),
            "POST",
            "/api/patients/9999/care-plans",
            None,
            serde_json::json!({
                "title": "x",
                "start_date": "2025-03-01",
                "end_date": "2025-03-02",
                "frequency": "daily",
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_over_long_fields_are_400() {
        let (pool, db_name) = create_test_db().await;
        let patient_id = insert_patient(&pool, "张三", None, None).await.unwrap();
        let report = seed::seed_demo_plan(&pool, None, today()).await.unwrap();

        let uri = format!("/api/patients/{patient_id}/care-plans");
        let long_title = serde_json::json!({
            "title": "护".repeat(300),
            "start_date": "2025-03-01",
            "end_date": "2025-03-10",
            "frequency": "daily",
        });
        let resp = send_json(open_state(pool.clone()), "POST", &uri, None, long_title).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["error"].is_string());

        let uri = format!("/api/care-plans/{}/items", report.plan_id);
        let long_target = serde_json::json!([
            { "title": "观察造口", "target_value": "x".repeat(256) },
        ]);
        let resp = send_json(open_state(pool.clone()), "PUT", &uri, None, long_target).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let uri = format!("/api/care-plans/{}", report.plan_id);
        let resp = send_request(open_state(pool.clone()), &uri).await;
        assert_eq!(body_json(resp).await["task_count"], 8);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_bind_accepts_host_names() {
        let listener = super::bind_listener("localhost", 0).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());

        let err = super::bind_listener("no-such-host.invalid", 0).await.unwrap_err();
        assert!(err.to_string().contains("no-such-host.invalid"));
    }

    #[tokio::test]
    async fn test_replace_items_and_update_status() {
        let (pool, db_name) = create_test_db().await;
        insert_patient(&pool, "张三", None, None).await.unwrap();
        let report = seed::seed_demo_plan(&pool, None, today()).await.unwrap();

        let uri = format!("/api/care-plans/{}/items", report.plan_id);
        let items = serde_json::json!([
            { "title": "观察造口颜色" },
            { "title": "更换造口袋", "target_value": "每3天" },
        ]);
        let resp = send_json(open_state(pool.clone()), "PUT", &uri, None, items).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["task_count"], 2);
        assert_eq!(json["items"][1]["sort_order"], 2);

        let uri = format!("/api/care-plans/{}", report.plan_id);
        let body = serde_json::json!({ "status": "completed" });
        let resp = send_json(open_state(pool.clone()), "PATCH", &uri, None, body).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "completed");

        let body = serde_json::json!({ "status": "paused" });
        let resp = send_json(open_state(pool.clone()), "PATCH", &uri, None, body).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_writes_require_token_when_secret_configured() {
        let (pool, db_name) = create_test_db().await;
        insert_patient(&pool, "张三", None, None).await.unwrap();
        let report = seed::seed_demo_plan(&pool, None, today()).await.unwrap();
        let detail = stoma_db::queries::care_plans::get_plan_detail(&pool, report.plan_id)
            .await
            .unwrap();
        let item_uri = format!("/api/care-plan-items/{}", detail.items[0].id);
        let done = serde_json::json!({ "completed": true });

        let resp = send_json(locked_state(pool.clone()), "PATCH", &item_uri, None, done.clone()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = send_json(
            locked_state(pool.clone()),
            "PATCH",
            &item_uri,
            Some("Bearer stoma_st_garbage"),
            done.clone(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let patient = bearer(UserType::Patient);
        let resp = send_json(
            locked_state(pool.clone()),
            "PATCH",
            &item_uri,
            Some(&patient),
            done,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["completed"], true);

        // Plan changes are reserved for nurses.
        let status_uri = format!("/api/care-plans/{}", report.plan_id);
        let body = serde_json::json!({ "status": "cancelled" });
        let resp = send_json(
            locked_state(pool.clone()),
            "PATCH",
            &status_uri,
            Some(&patient),
            body.clone(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let nurse = bearer(UserType::Nurse);
        let resp = send_json(
            locked_state(pool.clone()),
            "PATCH",
            &status_uri,
            Some(&nurse),
            body,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        // Reads stay open.
        let resp = send_request(locked_state(pool.clone()), "/api/patients").await;
        assert_eq!(resp.status(), StatusCode::OK);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_unknown_item_is_404() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_json(
            open_state(pool.clone()),
            "PATCH",
            "/api/care-plan-items/424242",
            None,
            serde_json::json!({ "completed": true }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_education_category_filter() {
        let (pool, db_name) = create_test_db().await;
        for (category, title) in [("diet", "饮食指导"), ("care", "造口袋更换"), ("diet", "饮水建议")] {
            insert_article(
                &pool,
                &NewArticle {
                    category,
                    title,
                    summary: "",
                    content: "",
                },
            )
            .await
            .unwrap();
        }

        let resp = send_request(open_state(pool.clone()), "/api/education?category=diet").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await.as_array().unwrap().len(), 2);

        let resp = send_request(open_state(pool.clone()), "/api/education").await;
        assert_eq!(body_json(resp).await.as_array().unwrap().len(), 3);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_patient_shell_against_live_server() {
        let (pool, db_name) = create_test_db().await;
        let patient_id = insert_patient(&pool, "张三", None, None).await.unwrap();
        seed::seed_demo_plan(&pool, None, today()).await.unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = super::build_router(locked_state(pool.clone()));
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let token = issue_token(&secret(), UserType::Patient, "张三", Utc::now());
        let config = ClientConfig::for_target(DeployTarget::Production)
            .with_api_base_url(format!("http://{addr}"));
        let ctx = ClientContext::new(config, Some(Session::issued("张三", UserType::Patient, token)));
        let source = HttpSource::new(&ctx);
        let mut shell = PatientShell::new(ctx, source);

        let view = shell
            .open_plan(patient_id)
            .await
            .into_shown()
            .expect("plan should load");
        assert_eq!(view.items.len(), 8);
        assert_eq!(view.progress.completed, 0);

        let first = view.items[0].id;
        assert!(shell.toggle_item(first).await.unwrap());
        assert_eq!(shell.view().unwrap().progress.completed, 1);

        let stored = stoma_db::queries::care_plan_items::get_item(&pool, first)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.completed);

        assert!(shell.open_plan(9999).await.is_back());

        server.abort();
        pool.close().await;
        drop_test_db(&db_name).await;
    }
}
