// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! REST API demo for the shelter core.
//!
//! Run with: `cargo run --example server`
//!
//! # Example requests
//!
//! ```bash
//! # List available dogs
//! curl 'http://localhost:3000/api/pets?species=dog&status=Available'
//!
//! # Add a pet
//! curl -X POST http://localhost:3000/api/pets \
//!   -H "Content-Type: application/json" \
//!   -d '{"name": "Rex", "species": "Dog", "breed": "Boxer", "age": 4, "status": "Available"}'
//!
//! # Sign up, verify with the emailed code, log in
//! curl -X POST http://localhost:3000/api/auth/register \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "jane@example.com", "username": "jane", "password": "s3cret"}'
//! curl -X POST http://localhost:3000/api/auth/verify \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "jane@example.com", "code": "123456"}'
//! curl -X POST http://localhost:3000/api/auth/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "jane@example.com", "password": "s3cret"}'
//!
//! # Donate
//! curl -X POST http://localhost:3000/api/donations \
//!   -H "Content-Type: application/json" \
//!   -d '{"donorName": "Jane Doe", "donorEmail": "jane@example.com", "amount": "500", "paymentMethod": "UPI"}'
//! ```

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use pawtner_core::{
    AdoptionInquiry, Backend, BookingRequest, ContactMessage, ContactRequest, CoreError, Donation,
    DonationRequest, InquiryRequest, LogTransport, NewPet, NullMirror, PetId, PetQuery, PetRecord,
    PetUpdate, Receipt, ServiceBooking, ServiceConfig, ServiceOffering, Statistics, SystemClock,
    UserProfile,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<Backend>,
}

// === Error Handling ===

/// Wrapper for converting `CoreError` into HTTP responses.
pub struct AppError(CoreError);

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.0.is_unauthorized() {
            let body = ErrorResponse {
                error: "unauthorized".to_string(),
                code: "UNAUTHORIZED".to_string(),
            };
            return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        }
        let (status, code) = match &self.0 {
            CoreError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            CoreError::AlreadyExists => (StatusCode::CONFLICT, "ALREADY_EXISTS"),
            CoreError::AlreadySettled => (StatusCode::CONFLICT, "ALREADY_SETTLED"),
            CoreError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            CoreError::NoPendingRegistration => (StatusCode::BAD_REQUEST, "NO_PENDING_REGISTRATION"),
            CoreError::CodeExpired => (StatusCode::BAD_REQUEST, "CODE_EXPIRED"),
            CoreError::CodeMismatch => (StatusCode::BAD_REQUEST, "CODE_MISMATCH"),
            CoreError::Throttled(_) => (StatusCode::TOO_MANY_REQUESTS, "THROTTLED"),
            CoreError::ShutDown => (StatusCode::SERVICE_UNAVAILABLE, "SHUT_DOWN"),
            CoreError::InvalidCredentials | CoreError::Expired => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED")
            }
            CoreError::Render(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError(CoreError::InvalidCredentials))
}

// === Handlers ===

/// GET /api/pets - List pets, optionally by `q`, `species` and `status`.
async fn list_pets(State(state): State<AppState>, Query(query): Query<PetQuery>) -> Json<Vec<PetRecord>> {
    Json(state.backend.queries().list(&query))
}

/// POST /api/pets - Add a pet.
async fn create_pet(
    State(state): State<AppState>,
    Json(pet): Json<NewPet>,
) -> Result<(StatusCode, Json<PetRecord>), AppError> {
    let pet = state.backend.add_pet(pet)?;
    Ok((StatusCode::CREATED, Json(pet)))
}

/// GET /api/pets/{id}
async fn get_pet(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<PetRecord>, AppError> {
    state
        .backend
        .repository()
        .find_pet(&PetId(id))
        .map(Json)
        .ok_or(AppError(CoreError::NotFound))
}

/// PUT /api/pets/{id} - Partial update; empty fields are left unchanged.
async fn update_pet(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<PetUpdate>,
) -> Result<Json<PetRecord>, AppError> {
    Ok(Json(state.backend.update_pet(&PetId(id), &update)?))
}

/// DELETE /api/pets/{id}
async fn delete_pet(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, AppError> {
    state.backend.delete_pet(&PetId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/register - Email a verification code.
async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<StatusCode, AppError> {
    state
        .backend
        .auth()
        .register(&request.email, &request.username, &request.password)?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/auth/verify - Create the account from a pending signup.
async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    let user = state.backend.auth().verify(&request.email, &request.code)?;
    Ok((StatusCode::CREATED, Json(user.profile())))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let auth = state.backend.auth();
    let token = auth.login(&request.email, &request.password)?;
    let user = auth.validate(&token.token)?;
    Ok(Json(LoginResponse {
        token: token.token,
        user: user.profile(),
    }))
}

/// GET /api/auth/me - Profile of the bearer token's owner.
async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<UserProfile>, AppError> {
    let token = bearer_token(&headers)?;
    let user = state.backend.auth().validate(token)?;
    Ok(Json(user.profile()))
}

/// POST /api/donations - Record a donation and return its receipt.
async fn donate(
    State(state): State<AppState>,
    Json(request): Json<DonationRequest>,
) -> Result<(StatusCode, Json<Receipt>), AppError> {
    let receipt = state.backend.process_donation(request)?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /api/donations
async fn list_donations(State(state): State<AppState>) -> Json<Vec<Donation>> {
    Json(state.backend.repository().snapshot_donations())
}

/// POST /api/inquiries
async fn create_inquiry(
    State(state): State<AppState>,
    Json(request): Json<InquiryRequest>,
) -> Result<(StatusCode, Json<AdoptionInquiry>), AppError> {
    let inquiry = state.backend.create_inquiry(request)?;
    Ok((StatusCode::CREATED, Json(inquiry)))
}

/// POST /api/bookings
async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<ServiceBooking>), AppError> {
    let booking = state.backend.create_booking(request)?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /api/services
async fn list_services(State(state): State<AppState>) -> Json<Vec<ServiceOffering>> {
    Json(state.backend.repository().services())
}

/// POST /api/contact
async fn contact(
    State(state): State<AppState>,
    Json(request): Json<ContactRequest>,
) -> Result<(StatusCode, Json<ContactMessage>), AppError> {
    let message = state.backend.submit_contact(request)?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/statistics
async fn statistics(State(state): State<AppState>) -> Json<Statistics> {
    Json(state.backend.repository().statistics())
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/pets", get(list_pets).post(create_pet))
        .route("/api/pets/{id}", get(get_pet).put(update_pet).delete(delete_pet))
        .route("/api/auth/register", post(register))
        .route("/api/auth/verify", post(verify))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/donations", get(list_donations).post(donate))
        .route("/api/inquiries", post(create_inquiry))
        .route("/api/bookings", post(create_booking))
        .route("/api/services", get(list_services))
        .route("/api/contact", post(contact))
        .route("/api/statistics", get(statistics))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pawtner_core=info,server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::var("PAWTNER_CONFIG") {
        Ok(path) => ServiceConfig::from_json(&std::fs::read_to_string(path)?)?,
        Err(_) => ServiceConfig::default(),
    };
    let backend = Backend::start(
        config,
        Arc::new(LogTransport),
        Arc::new(NullMirror),
        Arc::new(SystemClock),
    )?;
    let state = AppState {
        backend: Arc::new(backend),
    };

    let app = create_router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!("shelter API listening on http://127.0.0.1:3000");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // Dropping the last handle drains the pipelines.
    drop(state);
    Ok(())
}
