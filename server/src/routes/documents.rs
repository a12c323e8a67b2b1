//! Document store routes. All require a bearer token.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{
    handle_create_document, handle_get_document, handle_update_document, DocumentRequest,
    DocumentResponse,
};
use crate::AppState;

/// Create document routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/documents", post(create_document))
        .route("/documents/{id}", get(get_document).patch(update_document))
}

/// POST /documents - Create a document at version 1.
async fn create_document(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(request): Json<DocumentRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>)> {
    let doc = handle_create_document(&state.pool, request).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

/// GET /documents/{id}
async fn get_document(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>> {
    Ok(Json(handle_get_document(&state.pool, &id).await?))
}

/// PATCH /documents/{id} - Replace content, bumping the version.
async fn update_document(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<DocumentRequest>,
) -> Result<Json<DocumentResponse>> {
    Ok(Json(handle_update_document(&state.pool, &id, request).await?))
}
