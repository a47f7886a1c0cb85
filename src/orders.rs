//! Order lifecycle: creation with confirmation email, forward-only status
//! transitions, post-delivery feedback, and deletion.
//!
//! The transition and feedback rules live in [`advance`] and
//! [`attach_feedback`] as pure functions over an [`Order`]; handlers fetch
//! the document, apply the rule, and persist through a compare-and-swap so
//! two concurrent updates of the same order cannot lose a write.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::{
    auth::AuthUser,
    database,
    error::AppError,
    mailer::{order_confirmation_html, order_details_html, valid_email},
    models::{LineItem, Order, OrderStatus},
    state::AppState,
};

/// Attempts after which a repeatedly conflicting guarded write gives up.
const CAS_ATTEMPTS: usize = 4;

/// The literal order id clients send to request bulk deletion.
const BULK_DELETE_ID: &str = "delete-all";

pub fn bulk_delete_requested(order_id: &str) -> bool {
    order_id == BULK_DELETE_ID
}

/// Advances an order one step along `pending -> shipped -> delivered`.
///
/// Returns true when a transition fired. Every other combination is a
/// silent no-op: status never moves backward or skips a stage, and the
/// timestamps are stamped exactly once.
pub fn advance(order: &mut Order, requested: OrderStatus) -> bool {
    match requested {
        OrderStatus::Shipped if order.status == OrderStatus::Pending => {
            order.status = OrderStatus::Shipped;
            order.shipped_at = Some(Utc::now());
            true
        }
        OrderStatus::Delivered if order.status == OrderStatus::Shipped => {
            order.status = OrderStatus::Delivered;
            order.delivered_at = Some(Utc::now());
            true
        }
        _ => false,
    }
}

/// Sets rating and comments on the line item matching `book_id`.
///
/// Feedback is gated on delivery: the order must already be `delivered`,
/// and the book must actually be part of the order.
pub fn attach_feedback(
    order: &mut Order,
    book_id: &str,
    rating: f32,
    comments: String,
) -> Result<(), AppError> {
    let index = order
        .books
        .iter()
        .position(|book| book.book_id == book_id)
        .ok_or(AppError::NotFound("Book not found in the order"))?;

    if order.status != OrderStatus::Delivered {
        return Err(AppError::InvalidState(
            "Feedback can only be added for delivered orders",
        ));
    }

    let book = &mut order.books[index];
    book.rating = Some(rating);
    book.comments = Some(comments);

    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrder {
    pub user_id: String,
    pub user_email: String,
    pub cart: Vec<NewLineItem>,
    pub total: f64,
    pub payment_method: String,
    #[serde(default)]
    pub billing_details: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLineItem {
    pub book_id: String,
    pub title: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    pub price: f64,
}

fn default_quantity() -> u32 {
    1
}

pub async fn place_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PlaceOrder>,
) -> Result<impl IntoResponse, AppError> {
    if !valid_email(&payload.user_email) {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }

    let books = payload
        .cart
        .into_iter()
        .map(|item| LineItem {
            book_id: item.book_id,
            title: item.title,
            quantity: item.quantity,
            price: item.price,
            rating: None,
            comments: None,
        })
        .collect();

    let order = Order::new(
        payload.user_id,
        books,
        payload.total,
        payload.payment_method,
        payload.billing_details,
    );

    let mut conn = state.redis.clone();
    database::insert_order(&mut conn, &order).await?;

    // The order is durable at this point; a failed send is reported but
    // never rolls the write back.
    state
        .mailer
        .send(
            &payload.user_email,
            "Order Confirmation",
            order_confirmation_html(&order),
        )
        .await
        .map_err(|e| {
            warn!("Order confirmation email for {} not sent: {e}", order.id);
            AppError::Email("order confirmation")
        })?;

    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatus {
    pub order_id: String,
    pub status: OrderStatus,
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateStatus>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();

    for _ in 0..CAS_ATTEMPTS {
        let (old_json, mut order) = database::find_order_raw(&mut conn, &payload.order_id)
            .await?
            .ok_or(AppError::NotFound("Order not found"))?;

        if !advance(&mut order, payload.status) {
            // No-op transitions succeed with the unchanged status.
            return Ok(Json(json!({ "status": order.status })));
        }

        if database::replace_order_guarded(&mut conn, &old_json, &order).await? {
            return Ok(Json(json!({ "status": order.status })));
        }
    }

    Err(AppError::Internal(format!(
        "Status update for order {} kept conflicting",
        payload.order_id
    )))
}

pub async fn all_orders(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();
    let orders = database::all_orders(&mut conn).await?;

    if orders.is_empty() {
        return Err(AppError::NotFound("No orders found"));
    }

    Ok(Json(orders))
}

pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();

    let order = database::find_order(&mut conn, &order_id)
        .await?
        .ok_or(AppError::NotFound("Order not found"))?;

    Ok(Json(order))
}

pub async fn user_orders(
    AuthUser(_claims): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();
    let orders = database::user_orders(&mut conn, &user_id).await?;

    Ok(Json(orders))
}

/// `DELETE /{orderId}` also accepts the literal id `delete-all`, which
/// clients use to trigger bulk deletion; the dispatch happens here at the
/// boundary and the two operations stay distinct below it.
pub async fn delete_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<StatusCode, AppError> {
    if bulk_delete_requested(&order_id) {
        return delete_all_orders(State(state)).await;
    }

    let mut conn = state.redis.clone();

    if !database::delete_order(&mut conn, &order_id).await? {
        return Err(AppError::NotFound("Order not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_all_orders(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    let mut conn = state.redis.clone();
    database::delete_all_orders(&mut conn).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOrderDetails {
    pub order_id: String,
    pub user_email: String,
}

pub async fn send_order_details(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SendOrderDetails>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();

    let order = database::find_order(&mut conn, &payload.order_id)
        .await?
        .ok_or(AppError::NotFound("Order not found"))?;

    state
        .mailer
        .send(
            &payload.user_email,
            &format!("Order Details (Order ID: {})", order.id),
            order_details_html(&order),
        )
        .await
        .map_err(|e| {
            warn!("Order details email for {} not sent: {e}", order.id);
            AppError::Email("order details")
        })?;

    Ok(Json(json!({ "message": "Order details sent to email." })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFeedback {
    pub order_id: String,
    pub book_id: String,
    pub rating: f32,
    pub comments: String,
}

pub async fn add_feedback(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddFeedback>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();

    for _ in 0..CAS_ATTEMPTS {
        let (old_json, mut order) = database::find_order_raw(&mut conn, &payload.order_id)
            .await?
            .ok_or(AppError::NotFound("Order not found"))?;

        attach_feedback(
            &mut order,
            &payload.book_id,
            payload.rating,
            payload.comments.clone(),
        )?;

        if database::replace_order_guarded(&mut conn, &old_json, &order).await? {
            return Ok(Json(json!({ "message": "Feedback added successfully" })));
        }
    }

    Err(AppError::Internal(format!(
        "Feedback write for order {} kept conflicting",
        payload.order_id
    )))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{config::Config, mailer::Mailer};

    fn two_book_order() -> Order {
        Order::new(
            "user-1".to_string(),
            vec![
                LineItem {
                    book_id: "book-1".to_string(),
                    title: "Dune".to_string(),
                    quantity: 1,
                    price: 12.5,
                    rating: None,
                    comments: None,
                },
                LineItem {
                    book_id: "book-2".to_string(),
                    title: "Hyperion".to_string(),
                    quantity: 2,
                    price: 15.0,
                    rating: None,
                    comments: None,
                },
            ],
            42.5,
            "card".to_string(),
            json!({ "city": "Lafayette" }),
        )
    }

    #[test]
    fn new_orders_start_pending_with_null_timestamps() {
        let order = two_book_order();

        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.shipped_at.is_none());
        assert!(order.delivered_at.is_none());
    }

    #[test]
    fn delivered_from_pending_is_a_silent_no_op() {
        let mut order = two_book_order();

        assert!(!advance(&mut order, OrderStatus::Delivered));
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.delivered_at.is_none());
    }

    #[test]
    fn shipped_at_is_stamped_exactly_once() {
        let mut order = two_book_order();

        assert!(advance(&mut order, OrderStatus::Shipped));
        let stamped = order.shipped_at;
        assert!(stamped.is_some());

        assert!(!advance(&mut order, OrderStatus::Shipped));
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.shipped_at, stamped);
    }

    #[test]
    fn full_forward_walk_stamps_both_timestamps() {
        let mut order = two_book_order();

        assert!(advance(&mut order, OrderStatus::Shipped));
        assert!(advance(&mut order, OrderStatus::Delivered));

        assert_eq!(order.status, OrderStatus::Delivered);
        assert!(order.shipped_at.is_some());
        assert!(order.delivered_at.is_some());
    }

    #[test]
    fn status_never_moves_backward() {
        let mut order = two_book_order();
        advance(&mut order, OrderStatus::Shipped);
        advance(&mut order, OrderStatus::Delivered);
        let shipped_at = order.shipped_at;

        assert!(!advance(&mut order, OrderStatus::Shipped));
        assert!(!advance(&mut order, OrderStatus::Pending));
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.shipped_at, shipped_at);
    }

    #[test]
    fn feedback_requires_delivery() {
        let mut order = two_book_order();

        let err = attach_feedback(&mut order, "book-1", 5.0, "great".to_string()).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        advance(&mut order, OrderStatus::Shipped);
        let err = attach_feedback(&mut order, "book-1", 5.0, "great".to_string()).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn feedback_rejects_unknown_books() {
        let mut order = two_book_order();
        advance(&mut order, OrderStatus::Shipped);
        advance(&mut order, OrderStatus::Delivered);

        let err = attach_feedback(&mut order, "book-9", 4.0, "hm".to_string()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn feedback_lands_on_the_matching_line_item() {
        let mut order = two_book_order();
        advance(&mut order, OrderStatus::Shipped);
        advance(&mut order, OrderStatus::Delivered);

        attach_feedback(&mut order, "book-2", 5.0, "arrived in great shape".to_string()).unwrap();

        assert!(order.books[0].rating.is_none());
        assert_eq!(order.books[1].rating, Some(5.0));
        assert_eq!(
            order.books[1].comments.as_deref(),
            Some("arrived in great shape")
        );
    }

    #[test]
    fn only_the_bulk_delete_id_requests_bulk_deletion() {
        assert!(bulk_delete_requested("delete-all"));
        assert!(!bulk_delete_requested("delete-all "));
        assert!(!bulk_delete_requested("4cf6e3ab-7a5a-4d86-8f1c-3a43f8f2a9d1"));
        assert!(!bulk_delete_requested(""));
    }

    struct NullMailer;

    #[async_trait]
    impl Mailer for NullMailer {
        async fn send(&self, _to: &str, _subject: &str, _html: String) -> anyhow::Result<()> {
            Ok(())
        }
    }

    async fn local_state() -> Arc<AppState> {
        let config = Config {
            port: 0,
            redis_url: "redis://127.0.0.1/".to_string(),
            jwt_secret: "secret".to_string(),
            smtp_relay: String::new(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            frontend_url: String::new(),
        };

        let redis = database::init_redis(&config.redis_url).await;

        Arc::new(AppState {
            config,
            redis,
            mailer: Arc::new(NullMailer),
        })
    }

    // Needs a local Redis; run with `cargo test -- --ignored`. Wipes the
    // order keyspace.
    #[tokio::test]
    #[ignore]
    async fn bulk_delete_empties_the_store_and_listing_reports_not_found() {
        let state = local_state().await;
        let mut conn = state.redis.clone();

        database::insert_order(&mut conn, &two_book_order()).await.unwrap();
        database::insert_order(&mut conn, &two_book_order()).await.unwrap();

        let listed = database::all_orders(&mut conn).await.unwrap();
        assert!(listed.len() >= 2);

        let status = delete_order(State(state.clone()), Path("delete-all".to_string()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        assert!(database::all_orders(&mut conn).await.unwrap().is_empty());

        let response = all_orders(State(state)).await;
        assert!(matches!(response, Err(AppError::NotFound(_))));
    }

    #[test]
    fn order_documents_round_trip_through_json() {
        let mut order = two_book_order();
        advance(&mut order, OrderStatus::Shipped);

        let json = serde_json::to_string(&order).unwrap();
        let parsed: Order = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.status, OrderStatus::Shipped);
        assert_eq!(parsed.books.len(), 2);
        assert_eq!(parsed.shipped_at, order.shipped_at);
        assert!(json.contains("\"status\":\"shipped\""));
    }
}
