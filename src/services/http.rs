use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::earnings::EarningsRequest;
use super::referrals::ReferralsRequest;
use super::sweep::SweepRequest;
use super::tasks::TasksRequest;
use super::users::UsersRequest;
use super::ServiceError;
use crate::repositories::store::now_rfc3339;

/// Per-engine request channels; this is the whole application state.
#[derive(Clone)]
pub struct Channels {
    pub earnings: mpsc::Sender<EarningsRequest>,
    pub tasks: mpsc::Sender<TasksRequest>,
    pub referrals: mpsc::Sender<ReferralsRequest>,
    pub sweep: mpsc::Sender<SweepRequest>,
    pub users: mpsc::Sender<UsersRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProfileRequest {
    full_name: Option<String>,
    phone: Option<String>,
}

#[derive(Deserialize)]
struct AddEarningRequest {
    #[serde(rename = "type")]
    kind: Option<String>,
    amount: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteTaskRequest {
    task_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UseReferralRequest {
    referral_code: Option<String>,
    new_user_id: Option<String>,
}

fn ok<T: Serialize>(data: T) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "success": true, "data": data })))
}

fn ok_with_message<T: Serialize>(message: &str, data: T) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "success": true, "message": message, "data": data })),
    )
}

fn fail(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "success": false, "message": message })))
}

fn service_failure(error: ServiceError) -> (StatusCode, Json<Value>) {
    let status = match &error {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    fail(status, &error.to_string())
}

fn send_failure(error: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    fail(
        StatusCode::INTERNAL_SERVER_ERROR,
        &format!("Failed to process request: {}", error),
    )
}

fn recv_failure(error: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    fail(
        StatusCode::INTERNAL_SERVER_ERROR,
        &format!("Failed to receive response: {}", error),
    )
}

/// Old clients send `amount` as either a JSON number or a numeric string.
fn parse_amount(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "message": "EarnHub API is running successfully",
        "timestamp": now_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn get_user(
    State(state): State<Channels>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state.users.send(UsersRequest::Get { user_id, response: tx }).await {
        return send_failure(e);
    }
    match rx.await {
        Ok(Ok(Some(user))) => ok(user),
        Ok(Ok(None)) => fail(StatusCode::NOT_FOUND, "User not found"),
        Ok(Err(error)) => service_failure(error),
        Err(e) => recv_failure(e),
    }
}

async fn update_profile(
    State(state): State<Channels>,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateProfileRequest>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let request = UsersRequest::UpdateProfile {
        user_id,
        full_name: req.full_name,
        phone: req.phone,
        response: tx,
    };
    if let Err(e) = state.users.send(request).await {
        return send_failure(e);
    }
    match rx.await {
        Ok(Ok(updates)) => ok_with_message("Profile updated successfully", updates),
        Ok(Err(error)) => service_failure(error),
        Err(e) => recv_failure(e),
    }
}

async fn get_earnings(
    State(state): State<Channels>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let request = EarningsRequest::ListEarnings { user_id, response: tx };
    if let Err(e) = state.earnings.send(request).await {
        return send_failure(e);
    }
    match rx.await {
        Ok(Ok(earnings)) => ok(earnings),
        Ok(Err(error)) => service_failure(error),
        Err(e) => recv_failure(e),
    }
}

async fn add_earning(
    State(state): State<Channels>,
    Path(user_id): Path<String>,
    Json(req): Json<AddEarningRequest>,
) -> impl IntoResponse {
    let kind = match req.kind {
        Some(kind) if !kind.is_empty() => kind,
        _ => return fail(StatusCode::BAD_REQUEST, "Type and amount are required"),
    };
    let amount = match req.amount.as_ref().and_then(parse_amount) {
        Some(amount) => amount,
        None => return fail(StatusCode::BAD_REQUEST, "Type and amount are required"),
    };

    let (tx, rx) = oneshot::channel();
    let request = EarningsRequest::Credit {
        user_id,
        amount,
        kind,
        task_id: None,
        response: tx,
    };
    if let Err(e) = state.earnings.send(request).await {
        return send_failure(e);
    }
    match rx.await {
        Ok(Ok(outcome)) => ok_with_message("Earnings added successfully", outcome),
        Ok(Err(error)) => service_failure(error),
        Err(e) => recv_failure(e),
    }
}

async fn reconcile(
    State(state): State<Channels>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let request = EarningsRequest::Reconcile { user_id, response: tx };
    if let Err(e) = state.earnings.send(request).await {
        return send_failure(e);
    }
    match rx.await {
        Ok(Ok(coins)) => ok_with_message("Balance reconciled successfully", json!({ "coins": coins })),
        Ok(Err(error)) => service_failure(error),
        Err(e) => recv_failure(e),
    }
}

async fn list_tasks(State(state): State<Channels>) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state.tasks.send(TasksRequest::List { response: tx }).await {
        return send_failure(e);
    }
    match rx.await {
        Ok(Ok(tasks)) => ok(tasks),
        Ok(Err(error)) => service_failure(error),
        Err(e) => recv_failure(e),
    }
}

async fn complete_task(
    State(state): State<Channels>,
    Path(user_id): Path<String>,
    Json(req): Json<CompleteTaskRequest>,
) -> impl IntoResponse {
    let task_id = match req.task_id {
        Some(task_id) if !task_id.is_empty() => task_id,
        _ => return fail(StatusCode::BAD_REQUEST, "Task ID is required"),
    };

    let (tx, rx) = oneshot::channel();
    let request = TasksRequest::Complete {
        user_id,
        task_id,
        response: tx,
    };
    if let Err(e) = state.tasks.send(request).await {
        return send_failure(e);
    }
    match rx.await {
        Ok(Ok(completion)) => ok_with_message("Task completed successfully", completion),
        Ok(Err(error)) => service_failure(error),
        Err(e) => recv_failure(e),
    }
}

async fn connect_whatsapp(
    State(state): State<Channels>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let request = UsersRequest::ConnectWhatsapp { user_id, response: tx };
    if let Err(e) = state.users.send(request).await {
        return send_failure(e);
    }
    match rx.await {
        Ok(Ok(())) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "WhatsApp connected successfully" })),
        ),
        Ok(Err(error)) => service_failure(error),
        Err(e) => recv_failure(e),
    }
}

async fn get_referrals(
    State(state): State<Channels>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    let request = ReferralsRequest::Summary { user_id, response: tx };
    if let Err(e) = state.referrals.send(request).await {
        return send_failure(e);
    }
    match rx.await {
        Ok(Ok(summary)) => ok(summary),
        Ok(Err(error)) => service_failure(error),
        Err(e) => recv_failure(e),
    }
}

async fn use_referral(
    State(state): State<Channels>,
    Json(req): Json<UseReferralRequest>,
) -> impl IntoResponse {
    let (referral_code, new_user_id) = match (req.referral_code, req.new_user_id) {
        (Some(code), Some(user)) if !code.is_empty() && !user.is_empty() => (code, user),
        _ => {
            return fail(
                StatusCode::BAD_REQUEST,
                "Referral code and user ID are required",
            )
        }
    };

    let (tx, rx) = oneshot::channel();
    let request = ReferralsRequest::Apply {
        referral_code,
        new_user_id,
        response: tx,
    };
    if let Err(e) = state.referrals.send(request).await {
        return send_failure(e);
    }
    match rx.await {
        Ok(Ok(outcome)) => ok_with_message("Referral applied successfully", outcome),
        Ok(Err(error)) => service_failure(error),
        Err(e) => recv_failure(e),
    }
}

async fn process_whatsapp_earnings(State(state): State<Channels>) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state.sweep.send(SweepRequest::Run { response: tx }).await {
        return send_failure(e);
    }
    match rx.await {
        Ok(Ok(processed)) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": format!("WhatsApp earnings processed for {} users", processed),
                "processed": processed,
            })),
        ),
        Ok(Err(error)) => service_failure(error),
        Err(e) => recv_failure(e),
    }
}

async fn leaderboard(State(state): State<Channels>) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state.users.send(UsersRequest::Leaderboard { response: tx }).await {
        return send_failure(e);
    }
    match rx.await {
        Ok(Ok(entries)) => ok(entries),
        Ok(Err(error)) => service_failure(error),
        Err(e) => recv_failure(e),
    }
}

async fn not_found() -> impl IntoResponse {
    fail(StatusCode::NOT_FOUND, "API endpoint not found")
}

pub fn router(channels: Channels) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/user/{user_id}", get(get_user).put(update_profile))
        .route("/api/earnings/{user_id}", get(get_earnings).post(add_earning))
        .route("/api/reconcile/{user_id}", post(reconcile))
        .route("/api/tasks", get(list_tasks))
        .route("/api/complete-task/{user_id}", post(complete_task))
        .route("/api/connect-whatsapp/{user_id}", post(connect_whatsapp))
        .route("/api/referrals/{user_id}", get(get_referrals))
        .route("/api/use-referral", post(use_referral))
        .route("/api/process-whatsapp-earnings", post(process_whatsapp_earnings))
        .route("/api/leaderboard", get(leaderboard))
        .fallback(not_found)
        .with_state(channels)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn start_http_server(listen: &str, channels: Channels) -> Result<(), anyhow::Error> {
    let app = router(channels);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
