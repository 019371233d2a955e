use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::NewPaymentLink;
use crate::error::AppError;
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}

pub async fn create_link(
    State(state): State<AppState>,
    Json(input): Json<NewPaymentLink>,
) -> Result<impl IntoResponse, AppError> {
    let created = state.links.create(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_links(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let links = state.links.list(page.limit(), page.offset()).await?;
    Ok(Json(links))
}

pub async fn get_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.links.get(id).await?))
}

pub async fn enable_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.links.enable(id).await?))
}

pub async fn disable_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.links.disable(id).await?))
}

pub async fn delete_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.links.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Manual-review queue of payments that arrived after a link's cap.
pub async fn list_flagged(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let limit = page.limit().clamp(1, crate::services::links::MAX_PAGE_SIZE);
    let flagged = state.reconciler.flagged(limit, page.offset().max(0)).await?;
    Ok(Json(flagged))
}

/// Public checkout snapshot. Counts a view.
pub async fn get_public_link(
    State(state): State<AppState>,
    Path(short_code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.flow.open_link(&short_code).await?))
}
