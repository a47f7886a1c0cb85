use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::{cart, orders, state::AppState, users, wishlist};

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api/users", user_routes())
        .nest("/api/orders", order_routes())
        .nest("/api/cart", cart_routes())
        .nest("/api/wishlists", wishlist_routes())
}

fn user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/profile", get(users::profile))
        .route("/update", put(users::update_profile))
        .route("/forgot-password", post(users::forgot_password))
        .route("/reset-password/{token}", post(users::reset_password))
}

fn order_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/place-order", post(orders::place_order))
        .route("/update-status", post(orders::update_status))
        .route("/all-orders", get(orders::all_orders))
        .route("/user-orders/{userId}", get(orders::user_orders))
        .route("/send-order-details", post(orders::send_order_details))
        .route("/add-feedback", post(orders::add_feedback))
        .route("/delete-all", delete(orders::delete_all_orders))
        .route("/{orderId}", get(orders::get_order).delete(orders::delete_order))
}

fn cart_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/add/{userId}", post(cart::add_to_cart))
        .route("/update/{userId}/{id}", put(cart::update_quantity))
        .route("/remove/{userId}/{id}", delete(cart::remove_from_cart))
        .route("/clear/{userId}", delete(cart::clear_cart))
        .route("/{userId}", get(cart::get_cart))
}

fn wishlist_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/add", post(wishlist::add_to_wishlist))
        .route(
            "/remove/{userId}/{bookId}",
            delete(wishlist::remove_from_wishlist),
        )
        .route("/get/{userId}", get(wishlist::get_wishlist))
}
