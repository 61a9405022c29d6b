//! API route handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::extract::ApiJson;
use super::server::AppState;
use crate::auth::AuthContext;
use crate::error::{Error, Result};
use crate::fruits::{Fruit, FruitPage, FruitUpdate, ListQuery, NewFruit};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

// Health check

pub async fn health() -> impl IntoResponse {
    Json(ApiResponse::ok("healthy"))
}

// Fruit routes

pub async fn list_fruits(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<FruitPage>>> {
    let (limit, offset) = query.resolve()?;
    let items = state.fruits.list_fruits(limit, offset).await?;
    let total = state.fruits.count_fruits().await?;

    Ok(Json(ApiResponse::ok(FruitPage {
        items,
        total,
        limit,
        offset,
    })))
}

pub async fn get_fruit(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Fruit>>> {
    let fruit = state
        .fruits
        .get_fruit(id)
        .await?
        .ok_or_else(|| Error::NotFound("Fruit".to_string()))?;
    Ok(Json(ApiResponse::ok(fruit)))
}

pub async fn create_fruit(
    State(state): State<AppState>,
    context: AuthContext,
    ApiJson(fruit): ApiJson<NewFruit>,
) -> Result<impl IntoResponse> {
    let fruit = state.fruits.create_fruit(fruit.validated()?).await?;
    tracing::info!(user_id = context.user_id, fruit_id = fruit.id, "created fruit");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(fruit))))
}

pub async fn update_fruit(
    State(state): State<AppState>,
    context: AuthContext,
    Path(id): Path<i64>,
    ApiJson(update): ApiJson<FruitUpdate>,
) -> Result<Json<ApiResponse<Fruit>>> {
    if update.is_empty() {
        return Err(Error::Validation("No fields to update".to_string()));
    }
    let fruit = state
        .fruits
        .update_fruit(id, update.validated()?)
        .await?
        .ok_or_else(|| Error::NotFound("Fruit".to_string()))?;
    tracing::info!(user_id = context.user_id, fruit_id = id, "updated fruit");
    Ok(Json(ApiResponse::ok(fruit)))
}

pub async fn delete_fruit(
    State(state): State<AppState>,
    context: AuthContext,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<String>>> {
    if !state.fruits.delete_fruit(id).await? {
        return Err(Error::NotFound("Fruit".to_string()));
    }
    tracing::info!(user_id = context.user_id, fruit_id = id, "deleted fruit");
    Ok(Json(ApiResponse::ok("deleted".to_string())))
}
