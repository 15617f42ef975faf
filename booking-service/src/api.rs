use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::*;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::availability::AvailabilityChecker;
use crate::checkout::{Checkout, CheckoutSession};
use crate::committer::ReservationCommitter;
use crate::payment::{PaymentProvider, ProviderEvent, WebhookVerifier};
use crate::reconciler::{Reconciled, StatusReconciler};
use crate::store::{bounded_commit, bounded_lookup, Catalog, IdentityResolver, ReservationStore, StoreTimeouts};

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReservationStore>,
    pub catalog: Arc<dyn Catalog>,
    pub identity: Arc<dyn IdentityResolver>,
    pub checker: Arc<AvailabilityChecker>,
    pub committer: Arc<ReservationCommitter>,
    pub reconciler: Arc<StatusReconciler>,
    pub checkout: Arc<Checkout>,
    pub webhook: Arc<WebhookVerifier>,
    pub timeouts: StoreTimeouts,
}

impl AppState {
    pub fn new<S>(
        store: Arc<S>,
        provider: Arc<dyn PaymentProvider>,
        webhook: WebhookVerifier,
        timeouts: StoreTimeouts,
    ) -> Self
    where
        S: ReservationStore + Catalog + IdentityResolver + 'static,
    {
        Self {
            checker: Arc::new(AvailabilityChecker::new(store.clone(), timeouts)),
            committer: Arc::new(ReservationCommitter::new(store.clone(), store.clone(), timeouts)),
            reconciler: Arc::new(StatusReconciler::new(store.clone(), timeouts)),
            checkout: Arc::new(Checkout::new(store.clone(), store.clone(), provider, timeouts)),
            webhook: Arc::new(webhook),
            store: store.clone(),
            catalog: store.clone(),
            identity: store,
            timeouts,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConflictView {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ReservationStatus,
}

impl From<&Reservation> for ConflictView {
    fn from(r: &Reservation) -> Self {
        Self {
            id: r.id,
            start_time: r.start,
            end_time: r.end,
            status: r.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookingView {
    pub id: Uuid,
    pub service_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ReservationStatus,
    pub total_amount: BigDecimal,
    pub notes: Option<String>,
    pub guest_booking: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Reservation> for BookingView {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            service_id: r.resource_id,
            start_time: r.start,
            end_time: r.end,
            status: r.status,
            total_amount: r.total_amount,
            notes: r.notes,
            guest_booking: r.identity.account_id().is_none(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ConflictView>,
}

impl ErrorResponse {
    fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            field: None,
            conflicts: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Booking(BookingError),
    Unauthorized,
    BadBody(String),
}

impl From<BookingError> for ApiError {
    fn from(e: BookingError) -> Self {
        ApiError::Booking(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadBody(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Booking(BookingError::Validation { field, reason }) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: format!("invalid `{}`: {}", field, reason),
                    field: Some(field),
                    conflicts: Vec::new(),
                },
            ),
            ApiError::Booking(BookingError::Conflict(conflicts)) => (
                StatusCode::CONFLICT,
                ErrorResponse {
                    error: "the requested time is not available".to_string(),
                    field: None,
                    conflicts: conflicts.iter().map(ConflictView::from).collect(),
                },
            ),
            ApiError::Booking(e @ BookingError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, ErrorResponse::message(e.to_string()))
            }
            ApiError::Booking(BookingError::LookupFailure | BookingError::CommitFailure) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::message("the request could not be completed, please retry"),
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::message("a valid session is required"),
            ),
            ApiError::BadBody(reason) => (StatusCode::BAD_REQUEST, ErrorResponse::message(reason)),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/services", get(list_services))
        .route("/services/:id", get(get_service))
        .route("/services/:id/availability", get(check_availability))
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/bookings/:id/payment-intent", post(create_payment_intent))
        .route("/stripe-webhook", post(stripe_webhook))
        .route("/inquiries", post(create_inquiry))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// `None` without a token; a token that resolves to no account is rejected.
async fn caller(state: &AppState, headers: &HeaderMap) -> ApiResult<Option<Uuid>> {
    let Some(token) = bearer_token(headers) else {
        return Ok(None);
    };
    let account_id = bounded_lookup(
        state.timeouts.lookup,
        "resolve_identity",
        state.identity.resolve_identity(token),
    )
    .await?;
    account_id.map(Some).ok_or(ApiError::Unauthorized)
}

pub async fn health_check() -> &'static str {
    "OK"
}

async fn list_services(State(state): State<AppState>) -> ApiResult<Json<Vec<Resource>>> {
    let services = bounded_lookup(state.timeouts.lookup, "list_resources", state.catalog.list_resources()).await?;
    Ok(Json(services))
}

async fn find_service(state: &AppState, id: Uuid) -> ApiResult<Resource> {
    bounded_lookup(state.timeouts.lookup, "get_resource", state.catalog.get_resource(id))
        .await?
        .ok_or_else(|| BookingError::not_found("service", id).into())
}

async fn get_service(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Resource>> {
    Ok(Json(find_service(&state, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    #[serde(alias = "start")]
    pub start_time: Option<String>,
    #[serde(alias = "end")]
    pub end_time: Option<String>,
    pub exclude: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub available: bool,
    pub conflicts: Vec<ConflictView>,
}

async fn check_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> ApiResult<Json<AvailabilityResponse>> {
    let window = TimeWindow::parse(query.start_time.as_deref(), query.end_time.as_deref())?;
    find_service(&state, id).await?;

    let availability = state.checker.check_availability(id, window, query.exclude).await?;
    Ok(Json(AvailabilityResponse {
        available: availability.available,
        conflicts: availability.conflicts.iter().map(ConflictView::from).collect(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct GuestBody {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub service_id: Option<Uuid>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub total_amount: Option<BigDecimal>,
    pub notes: Option<String>,
    pub guest: Option<GuestBody>,
}

async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BookingView>)> {
    let Json(body) = body?;

    // Decided once here; a signed-in caller's guest fields are ignored.
    let identity = match caller(&state, &headers).await? {
        Some(account_id) => Some(Identity::Authenticated { account_id }),
        None => body.guest.map(|g| {
            Identity::Guest(GuestContact {
                name: g.name.unwrap_or_default(),
                email: g.email.unwrap_or_default(),
                phone: g.phone,
            })
        }),
    };

    let reservation = state
        .committer
        .commit_reservation(ReservationRequest {
            resource_id: body.service_id,
            start_time: body.start_time,
            end_time: body.end_time,
            total_amount: body.total_amount,
            notes: body.notes,
            identity,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(reservation.into())))
}

async fn list_bookings(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Vec<BookingView>>> {
    let account_id = caller(&state, &headers).await?.ok_or(ApiError::Unauthorized)?;
    let bookings = bounded_lookup(
        state.timeouts.lookup,
        "reservations_for_account",
        state.store.reservations_for_account(account_id),
    )
    .await?;
    Ok(Json(bookings.into_iter().map(BookingView::from).collect()))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<BookingView>> {
    let caller = caller(&state, &headers).await?;
    let reservation = bounded_lookup(state.timeouts.lookup, "get_reservation", state.store.get_reservation(id))
        .await?
        .filter(|r| r.identity.permits(caller))
        .ok_or_else(|| BookingError::not_found("booking", id))?;
    Ok(Json(reservation.into()))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<BookingView>> {
    let caller = caller(&state, &headers).await?;
    let reservation = state.reconciler.cancel_reservation(id, caller).await?;
    Ok(Json(reservation.into()))
}

async fn create_payment_intent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<CheckoutSession>> {
    let caller = caller(&state, &headers).await?;
    Ok(Json(state.checkout.start_payment(id, caller).await?))
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

fn acknowledged() -> Response {
    (StatusCode::OK, Json(WebhookAck { received: true })).into_response()
}

async fn stripe_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if let Err(e) = state.webhook.verify(&body, signature, Utc::now().timestamp()) {
        warn!("Rejected webhook delivery: {}", e);
        return (StatusCode::BAD_REQUEST, Json(ErrorResponse::message(e.to_string()))).into_response();
    }

    let event: ProviderEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("Undecodable webhook payload: {}", e);
            return (StatusCode::BAD_REQUEST, Json(ErrorResponse::message("invalid event payload"))).into_response();
        }
    };

    let Some(kind) = PaymentEventKind::from_event_type(&event.event_type) else {
        info!("Ignoring webhook event {} of type {}", event.id, event.event_type);
        return acknowledged();
    };

    match state.reconciler.apply_payment_event(&event.data.object.id, kind).await {
        Ok(Reconciled::Applied(_)) | Ok(Reconciled::Ignored) => acknowledged(),
        Err(e) if e.is_retryable() => {
            error!("Webhook event {} could not be applied, asking for redelivery", event.id);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::message(e.to_string()))).into_response()
        }
        Err(e) => {
            warn!("Webhook event {} acknowledged without effect: {}", event.id, e);
            acknowledged()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InquiryCreated {
    pub id: Uuid,
}

async fn create_inquiry(
    State(state): State<AppState>,
    body: Result<Json<InquiryRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<InquiryCreated>)> {
    let Json(body) = body?;
    let inquiry = body.validate()?;
    let id = inquiry.id;

    bounded_commit(state.timeouts.commit, "insert_inquiry", state.store.insert_inquiry(inquiry)).await?;
    info!("Inquiry {} recorded", id);
    Ok((StatusCode::CREATED, Json(InquiryCreated { id })))
}
