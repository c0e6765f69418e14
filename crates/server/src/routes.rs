use axum::extract::rejection::QueryRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use tally_core::{Category, Money, SignPolicy, TransactionId, YearMonth};
use tally_engine::{
    category_breakdown, daily_spend, forecast, merchants, summary, CategoryFilter, Engine,
    ForecastRequest, Scope, SortOrder, TransactionQuery, Upload, ALL_SOURCES,
    DEFAULT_MONTHS_LOOKBACK,
};

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/transactions", get(transactions))
        .route("/api/summary", get(get_summary))
        .route("/api/categories", get(categories))
        .route("/api/daily-spend", get(get_daily_spend))
        .route("/api/forecast", get(get_forecast))
        .route("/api/merchants", get(get_merchants))
        .route(
            "/api/settings/merchant-rules",
            get(list_merchant_rules).post(set_merchant_rule),
        )
        .route(
            "/api/settings/merchant-rules/{merchant}",
            delete(remove_merchant_rule),
        )
        .route(
            "/api/settings/one-off",
            get(list_one_off_overrides).post(set_one_off_override),
        )
        .route("/api/settings/one-off/{txn_id}", delete(remove_one_off_override))
        .route("/api/upload", post(upload))
        .route("/api/files", get(list_files))
        .route("/api/files/{filename}", delete(delete_file))
        .route("/api/sources", get(sources))
        .route("/api/date-range", get(date_range))
        .route("/api/rebuild", post(rebuild))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── parameter parsing ──

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_date(name: &str, value: &Option<String>) -> Result<Option<NaiveDate>, ApiError> {
    let Some(raw) = present(value) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .map(Some)
        .map_err(|_| ApiError::bad_request(format!("Invalid {name}: '{raw}', expected YYYY-MM-DD")))
}

fn parse_amount(name: &str, value: &Option<String>) -> Result<Option<Money>, ApiError> {
    let Some(raw) = present(value) else {
        return Ok(None);
    };
    Decimal::from_str(raw)
        .map(|d| Some(Money::from_decimal(d)))
        .map_err(|_| ApiError::bad_request(format!("Invalid {name}: '{raw}'")))
}

fn parse_category(raw: &str) -> Result<Category, ApiError> {
    raw.parse().map_err(|e: tally_core::ParseCategoryError| ApiError::bad_request(e.to_string()))
}

#[derive(Debug, Default, Deserialize)]
pub struct ScopeParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub source: Option<String>,
}

impl ScopeParams {
    fn scope(&self) -> Result<Scope, ApiError> {
        Ok(Scope {
            start: parse_date("start_date", &self.start_date)?,
            end: parse_date("end_date", &self.end_date)?,
            source: present(&self.source).map(str::to_string),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub source: Option<String>,
    pub category: Option<String>,
    pub merchant_search: Option<String>,
    pub min_amount: Option<String>,
    pub max_amount: Option<String>,
    pub exclude_transfers: Option<String>,
    pub sort: Option<String>,
}

impl TransactionParams {
    fn query(&self) -> Result<TransactionQuery, ApiError> {
        let scope = ScopeParams {
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            source: self.source.clone(),
        }
        .scope()?;
        let category = present(&self.category)
            .map(CategoryFilter::from_str)
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        let sort = present(&self.sort)
            .map(SortOrder::from_str)
            .transpose()
            .map_err(ApiError::bad_request)?
            .unwrap_or_default();

        Ok(TransactionQuery {
            scope,
            category,
            merchant_search: present(&self.merchant_search).map(str::to_string),
            min_amount: parse_amount("min_amount", &self.min_amount)?,
            max_amount: parse_amount("max_amount", &self.max_amount)?,
            exclude_transfers: present(&self.exclude_transfers)
                .map_or(true, |v| v.eq_ignore_ascii_case("true")),
            sort,
        })
    }
}

/// Forecast parameters. Exclusion lists accept repeated keys (with or
/// without a `[]` suffix) and comma-separated values.
#[derive(Debug, Default)]
pub struct ForecastParams {
    pub months_lookback: Option<String>,
    pub exclude_months: Vec<String>,
    pub exclude_categories: Vec<String>,
}

impl FromIterator<(String, String)> for ForecastParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(pairs: I) -> Self {
        let mut params = ForecastParams::default();
        for (key, value) in pairs {
            let list = match key.trim_end_matches("[]") {
                "months_lookback" => {
                    params.months_lookback = Some(value);
                    continue;
                }
                "exclude_months" => &mut params.exclude_months,
                "exclude_categories" => &mut params.exclude_categories,
                _ => continue,
            };
            list.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }
        params
    }
}

impl ForecastParams {
    fn request(&self) -> Result<ForecastRequest, ApiError> {
        let months_lookback = match present(&self.months_lookback) {
            Some(raw) => raw
                .parse()
                .map_err(|_| ApiError::bad_request(format!("Invalid months_lookback: '{raw}'")))?,
            None => DEFAULT_MONTHS_LOOKBACK,
        };
        let exclude_months: BTreeSet<YearMonth> = self
            .exclude_months
            .iter()
            .map(|m| m.parse::<YearMonth>().map_err(|e| ApiError::bad_request(e.to_string())))
            .collect::<Result<_, _>>()?;
        let exclude_categories: BTreeSet<Category> = self
            .exclude_categories
            .iter()
            .map(|c| parse_category(c))
            .collect::<Result<_, _>>()?;

        Ok(ForecastRequest {
            months_lookback,
            exclude_months,
            exclude_categories,
        })
    }
}

// ── read handlers ──

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "Tally API is running" }))
}

async fn transactions(
    State(state): State<AppState>,
    params: Result<Query<TransactionParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params?;
    let query = params.query()?;
    let snapshot = state.engine.snapshot().await;
    let rows = query.run(snapshot.transactions());
    Ok(Json(json!({ "count": rows.len(), "transactions": rows })))
}

async fn get_summary(
    State(state): State<AppState>,
    params: Result<Query<ScopeParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params?;
    let scope = params.scope()?;
    let snapshot = state.engine.snapshot().await;
    Ok(Json(json!(summary(snapshot.transactions(), &scope))))
}

async fn categories(
    State(state): State<AppState>,
    params: Result<Query<ScopeParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params?;
    let scope = params.scope()?;
    let snapshot = state.engine.snapshot().await;
    Ok(Json(json!({
        "categories": category_breakdown(snapshot.transactions(), &scope)
    })))
}

async fn get_daily_spend(
    State(state): State<AppState>,
    params: Result<Query<ScopeParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params?;
    let scope = params.scope()?;
    let snapshot = state.engine.snapshot().await;
    Ok(Json(json!({
        "daily_spend": daily_spend(snapshot.transactions(), &scope)
    })))
}

async fn get_forecast(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, ApiError> {
    let params: ForecastParams = pairs.into_iter().collect();
    let request = params.request()?;
    let snapshot = state.engine.snapshot().await;
    Ok(Json(json!(forecast(snapshot.transactions(), &request))))
}

async fn get_merchants(
    State(state): State<AppState>,
    params: Result<Query<ScopeParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params?;
    let scope = params.scope()?;
    let snapshot = state.engine.snapshot().await;
    Ok(Json(json!({
        "merchants": merchants(snapshot.transactions(), &scope)
    })))
}

async fn sources(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.engine.snapshot().await;
    let mut sources = vec![ALL_SOURCES.to_string()];
    sources.extend(snapshot.sources());
    Json(json!({ "sources": sources }))
}

async fn date_range(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.engine.snapshot().await;
    let (min, max) = match snapshot.date_range() {
        Some(range) => (range.start, range.end),
        None => {
            let today = Utc::now().date_naive();
            (today, today)
        }
    };
    Json(json!({ "min_date": min, "max_date": max }))
}

// ── rule handlers ──

#[derive(Debug, Deserialize)]
pub struct MerchantRuleBody {
    pub merchant: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OneOffBody {
    pub txn_id: Option<String>,
    pub category: Option<String>,
}

async fn list_merchant_rules(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let rules = state.engine.merchant_rules().await?;
    Ok(Json(json!({ "rules": rules })))
}

async fn set_merchant_rule(
    State(state): State<AppState>,
    Json(body): Json<MerchantRuleBody>,
) -> Result<Json<Value>, ApiError> {
    let (Some(merchant), Some(category)) = (present(&body.merchant), present(&body.category)) else {
        return Err(ApiError::bad_request("merchant and category are required"));
    };
    let category = parse_category(category)?;
    let key = state.engine.set_merchant_rule(merchant, category).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Updated rule for {key}"),
        "merchant": key,
        "category": category,
    })))
}

async fn remove_merchant_rule(
    State(state): State<AppState>,
    Path(merchant): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.engine.remove_merchant_rule(&merchant).await?;
    Ok(Json(json!({ "success": true, "message": format!("Removed rule for {merchant}") })))
}

async fn list_one_off_overrides(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let overrides = state.engine.one_off_overrides().await?;
    Ok(Json(json!({ "overrides": overrides })))
}

async fn set_one_off_override(
    State(state): State<AppState>,
    Json(body): Json<OneOffBody>,
) -> Result<Json<Value>, ApiError> {
    let (Some(txn_id), Some(category)) = (present(&body.txn_id), present(&body.category)) else {
        return Err(ApiError::bad_request("txn_id and category are required"));
    };
    let category = parse_category(category)?;
    let id = TransactionId::from(txn_id);
    state.engine.set_one_off_override(&id, category).await?;

    let known = state.engine.snapshot().await.get(&id).is_some();
    Ok(Json(json!({
        "success": true,
        "message": "Updated one-off override",
        "matched": known,
    })))
}

async fn remove_one_off_override(
    State(state): State<AppState>,
    Path(txn_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .engine
        .remove_one_off_override(&TransactionId::from(txn_id))
        .await?;
    Ok(Json(json!({ "success": true, "message": "Removed one-off override" })))
}

// ── file handlers ──

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut uploads = Vec::new();
    let mut policy: Option<SignPolicy> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read form field: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" => {
                let filename = field.file_name().unwrap_or("uploaded.csv").to_string();
                let content = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read {filename}: {e}")))?;
                uploads.push(Upload {
                    filename,
                    content: content.to_vec(),
                    sign_policy: None,
                });
            }
            "sign_policy" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|_| ApiError::bad_request("Failed to read sign_policy"))?;
                if !raw.trim().is_empty() {
                    policy = Some(raw.parse().map_err(ApiError::bad_request)?);
                }
            }
            _ => {}
        }
    }

    if uploads.is_empty() {
        return Err(ApiError::bad_request("No files provided"));
    }
    for item in &mut uploads {
        item.sign_policy = policy;
    }

    let report = state.engine.upload(uploads).await?;
    let stored: Vec<&str> = report.stored().collect();
    if stored.is_empty() {
        let body = json!({ "error": "No valid files uploaded", "files": report.files });
        return Ok((StatusCode::BAD_REQUEST, Json(body)).into_response());
    }

    Ok(Json(json!({
        "success": true,
        "message": format!("Uploaded {} file(s)", stored.len()),
        "files": stored,
        "details": report.files,
        "transactions_count": report.transactions_count,
    }))
    .into_response())
}

async fn list_files(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let files = state.engine.list_files().await?;
    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    Ok(Json(json!({ "files": names, "details": files })))
}

async fn delete_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let remaining = state.engine.delete_file(&filename).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Deleted {filename}"),
        "remaining_files": remaining,
    })))
}

async fn rebuild(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let dataset = state.engine.rebuild().await?;
    Ok(Json(json!({
        "success": true,
        "transactions_count": dataset.len(),
        "built_at": dataset.built_at(),
        "files": dataset.files(),
        "orphaned_overrides": dataset.orphaned_overrides(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tally_engine::EngineSettings;
    use tower::ServiceExt;

    const SCENARIO_CSV: &str = "Transaction Date,Description,Amount\n\
        2025-10-01,TRADER JOE'S #706,-45.23\n\
        2025-10-02,NETFLIX.COM,-15.99\n";
    const BOUNDARY: &str = "tally-test-boundary";

    async fn app() -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let pool = tally_storage::create_db(&dir.path().join("tally.db")).await.unwrap();
        let engine = Engine::open(pool, EngineSettings::default()).await.unwrap();
        let state = AppState {
            engine: Arc::new(engine),
        };
        (dir, router(state, 1024 * 1024))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        send(app, Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(app, request).await
    }

    fn multipart_body(files: &[(&str, &str)], sign_policy: Option<&str>) -> Body {
        let mut body = String::new();
        for (name, content) in files {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: text/csv\r\n\r\n{content}\r\n"
            ));
        }
        if let Some(policy) = sign_policy {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"sign_policy\"\r\n\r\n{policy}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Body::from(body)
    }

    async fn upload_files(
        app: &Router,
        files: &[(&str, &str)],
        sign_policy: Option<&str>,
    ) -> (StatusCode, Value) {
        let request = Request::post("/api/upload")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(multipart_body(files, sign_policy))
            .unwrap();
        send(app, request).await
    }

    // ── health / empty state ──

    #[tokio::test]
    async fn health_is_ok() {
        let (_dir, app) = app().await;
        let (status, body) = get_json(&app, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn empty_dataset_reads() {
        let (_dir, app) = app().await;
        let (_, body) = get_json(&app, "/api/transactions").await;
        assert_eq!(body["count"], 0);
        let (_, body) = get_json(&app, "/api/sources").await;
        assert_eq!(body["sources"], json!(["All"]));
        let (_, body) = get_json(&app, "/api/forecast?months_lookback=0").await;
        assert_eq!(body["total"]["num_months"], 0);
        let (status, body) = get_json(&app, "/api/date-range").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["min_date"], body["max_date"]);
    }

    // ── upload and queries ──

    #[tokio::test]
    async fn upload_then_summarize() {
        let (_dir, app) = app().await;
        let (status, body) = upload_files(&app, &[("Chase Oct.csv", SCENARIO_CSV)], None).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["files"], json!(["Chase_Oct.csv"]));
        assert_eq!(body["transactions_count"], 2);

        let (_, body) = get_json(&app, "/api/summary").await;
        assert_eq!(body["total_spend"], 61.22);
        assert_eq!(body["total_transactions"], 2);

        let (_, body) = get_json(&app, "/api/transactions?sort=amount_desc").await;
        assert_eq!(body["transactions"][0]["merchant"], "TRADER JOE'S");
        assert_eq!(body["transactions"][0]["category"], "Groceries");
        assert_eq!(body["transactions"][0]["amount_spend"], 45.23);
        assert!(body["transactions"][0]["txn_id"].is_string());

        let (_, body) = get_json(&app, "/api/categories").await;
        assert_eq!(body["categories"][0]["category"], "Groceries");

        let (_, body) = get_json(&app, "/api/date-range").await;
        assert_eq!(body["min_date"], "2025-10-01");
        assert_eq!(body["max_date"], "2025-10-02");

        let (_, body) = get_json(&app, "/api/sources").await;
        assert_eq!(body["sources"], json!(["All", "Chase_Oct.csv"]));
    }

    #[tokio::test]
    async fn upload_with_positive_policy() {
        let (_dir, app) = app().await;
        let csv = "Date,Description,Amount\n2025-10-01,SHELL OIL,30.00\n";
        let (status, _) = upload_files(&app, &[("card.csv", csv)], Some("positive_is_spend")).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = get_json(&app, "/api/daily-spend").await;
        assert_eq!(body["daily_spend"], json!([{ "date": "2025-10-01", "amount": 30.0 }]));
    }

    #[tokio::test]
    async fn upload_rejects_bad_schema() {
        let (_dir, app) = app().await;
        let (status, body) = upload_files(&app, &[("bad.csv", "Foo,Bar\n1,2\n")], None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["files"][0]["error"].as_str().unwrap().contains("date"));
    }

    #[tokio::test]
    async fn invalid_query_params_are_400() {
        let (_dir, app) = app().await;
        let (status, _) = get_json(&app, "/api/transactions?start_date=yesterday").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get_json(&app, "/api/transactions?category=Yachts").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get_json(&app, "/api/forecast?exclude_months=2025-13").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn forecast_accepts_repeated_exclusions() {
        let (_dir, app) = app().await;
        let csv = "Date,Description,Amount\n\
            2025-08-05,SHELL OIL,-100.00\n\
            2025-09-05,SHELL OIL,-200.00\n\
            2025-10-05,SHELL OIL,-300.00\n\
            2025-10-06,NETFLIX.COM,-15.99\n";
        upload_files(&app, &[("card.csv", csv)], None).await;

        let (status, body) = get_json(
            &app,
            "/api/forecast?exclude_months=2025-09&exclude_months%5B%5D=2025-08&exclude_categories=Entertainment",
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["total"]["months"], json!(["2025-10"]));
        assert_eq!(body["total"]["avg_spend"], 300.0);

        let (_, body) = get_json(&app, "/api/forecast?exclude_months=2025-09,2025-10").await;
        assert_eq!(body["total"]["months"], json!(["2025-08"]));
    }

    #[tokio::test]
    async fn duplicate_scalar_param_is_json_400() {
        let (_dir, app) = app().await;
        let (status, body) =
            get_json(&app, "/api/summary?start_date=2025-01-01&start_date=2025-02-01").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    // ── rules ──

    #[tokio::test]
    async fn merchant_rule_lifecycle() {
        let (_dir, app) = app().await;
        upload_files(&app, &[("bank.csv", SCENARIO_CSV)], None).await;

        let (status, body) = post_json(
            &app,
            "/api/settings/merchant-rules",
            json!({ "merchant": "NETFLIX.COM", "category": "Shopping" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let (_, body) = get_json(&app, "/api/settings/merchant-rules").await;
        assert_eq!(body["rules"], json!({ "NETFLIX.COM": "Shopping" }));

        let (_, body) = get_json(&app, "/api/merchants").await;
        let netflix = body["merchants"]
            .as_array()
            .unwrap()
            .iter()
            .find(|m| m["name"] == "NETFLIX.COM")
            .unwrap()
            .clone();
        assert_eq!(netflix["current_category"], "Shopping");

        let (status, _) = send(
            &app,
            Request::delete("/api/settings/merchant-rules/NETFLIX.COM")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = get_json(&app, "/api/transactions?category=Entertainment").await;
        assert_eq!(body["count"], 1);
    }

    #[tokio::test]
    async fn merchant_rule_requires_fields() {
        let (_dir, app) = app().await;
        let (status, _) = post_json(
            &app,
            "/api/settings/merchant-rules",
            json!({ "merchant": "NETFLIX.COM" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_json(
            &app,
            "/api/settings/merchant-rules",
            json!({ "merchant": "NETFLIX.COM", "category": "Yachts" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn one_off_override_lifecycle() {
        let (_dir, app) = app().await;
        upload_files(&app, &[("bank.csv", SCENARIO_CSV)], None).await;
        let (_, body) = get_json(&app, "/api/transactions?merchant_search=trader").await;
        let id = body["transactions"][0]["txn_id"].as_str().unwrap().to_string();

        let (status, body) = post_json(
            &app,
            "/api/settings/one-off",
            json!({ "txn_id": id, "category": "EXCLUDE" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["matched"], true);

        // Transfers are hidden by default.
        let (_, body) = get_json(&app, "/api/transactions").await;
        assert_eq!(body["count"], 1);
        let (_, body) = get_json(&app, "/api/transactions?exclude_transfers=false").await;
        assert_eq!(body["count"], 2);

        let uri = format!("/api/settings/one-off/{id}");
        let (status, _) = send(&app, Request::delete(uri.as_str()).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Request::delete(uri.as_str()).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // ── files ──

    #[tokio::test]
    async fn delete_file_rebuilds() {
        let (_dir, app) = app().await;
        upload_files(&app, &[("a.csv", SCENARIO_CSV), ("b.csv", SCENARIO_CSV)], None).await;

        let (_, body) = get_json(&app, "/api/files").await;
        assert_eq!(body["files"], json!(["a.csv", "b.csv"]));

        let (status, body) = send(
            &app,
            Request::delete("/api/files/a.csv").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["remaining_files"], json!(["b.csv"]));

        let (_, body) = get_json(&app, "/api/transactions").await;
        assert_eq!(body["count"], 2);

        let (status, _) = send(
            &app,
            Request::delete("/api/files/a.csv").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rebuild_reports_files() {
        let (_dir, app) = app().await;
        upload_files(&app, &[("a.csv", SCENARIO_CSV)], None).await;
        let (status, body) = send(&app, Request::post("/api/rebuild").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transactions_count"], 2);
        assert_eq!(body["files"][0]["accepted"], 2);
        let built_at = body["built_at"].as_str().unwrap();
        assert!(built_at.parse::<chrono::DateTime<Utc>>().is_ok(), "{built_at}");
    }
}
