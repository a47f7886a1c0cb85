//! Per-user wishlist, a plain set of book ids.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{database, error::AppError, models::Wishlist, state::AppState};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistChange {
    pub user_id: String,
    pub book_id: String,
}

pub async fn add_to_wishlist(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WishlistChange>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();

    database::wishlist_add(&mut conn, &payload.user_id, &payload.book_id).await?;
    let books = database::wishlist_books(&mut conn, &payload.user_id).await?;

    Ok(Json(Wishlist {
        user_id: payload.user_id,
        books,
    }))
}

pub async fn remove_from_wishlist(
    State(state): State<Arc<AppState>>,
    Path((user_id, book_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();

    database::wishlist_remove(&mut conn, &user_id, &book_id).await?;
    let books = database::wishlist_books(&mut conn, &user_id).await?;

    Ok(Json(Wishlist { user_id, books }))
}

pub async fn get_wishlist(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();
    let books = database::wishlist_books(&mut conn, &user_id).await?;

    Ok(Json(Wishlist { user_id, books }))
}
