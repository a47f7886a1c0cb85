//! Per-user shopping cart, keyed by a generated item id.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{database, error::AppError, models::CartItem, state::AppState};

pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();
    let items = database::cart_items(&mut conn, &user_id).await?;

    Ok(Json(items))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItem {
    pub book_id: String,
    pub title: String,
    pub price: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

pub async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(payload): Json<AddItem>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();

    let existing = database::cart_items(&mut conn, &user_id).await?;
    if existing.iter().any(|item| item.book_id == payload.book_id) {
        return Err(AppError::Validation(
            "Item already exists in the cart".to_string(),
        ));
    }

    let item = CartItem {
        id: Uuid::new_v4().to_string(),
        user_id,
        book_id: payload.book_id,
        title: payload.title,
        price: payload.price,
        quantity: payload.quantity,
    };

    database::put_cart_item(&mut conn, &item).await?;

    Ok((StatusCode::CREATED, Json(item)))
}

#[derive(Deserialize)]
pub struct UpdateQuantity {
    pub quantity: u32,
}

pub async fn update_quantity(
    State(state): State<Arc<AppState>>,
    Path((user_id, item_id)): Path<(String, String)>,
    Json(payload): Json<UpdateQuantity>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();

    let mut item = database::cart_item(&mut conn, &user_id, &item_id)
        .await?
        .ok_or(AppError::NotFound("Item not found in user's cart"))?;

    item.quantity = payload.quantity;
    database::put_cart_item(&mut conn, &item).await?;

    Ok(Json(item))
}

pub async fn remove_from_cart(
    State(state): State<Arc<AppState>>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();

    let item = database::cart_item(&mut conn, &user_id, &item_id)
        .await?
        .ok_or(AppError::NotFound("Item not found in user's cart"))?;

    database::delete_cart_item(&mut conn, &user_id, &item_id).await?;

    Ok(Json(item))
}

pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();
    database::clear_cart(&mut conn, &user_id).await?;

    Ok(Json(json!({ "message": "Cart cleared successfully" })))
}
