//! # Redis
//!
//! All persistence goes through Redis. Entities are JSON documents under
//! typed keys, with sets as secondary indexes for the by-user and list-all
//! queries:
//!
//! - `order:{id}` — order document; `orders:all` and `orders:user:{userId}`
//!   index the ids.
//! - `user:{id}` — user document; `user:email:{email}` maps an email to
//!   its user id for login and duplicate checks.
//! - `cart:{userId}` — hash of cart item id to item document.
//! - `wishlist:{userId}` — set of book ids.
//! - `reset:{token}` — password reset token to user id, expires after an
//!   hour.
//!
//! Updates are whole-document replaces. Order status and feedback writes
//! go through [`replace_order_guarded`], a compare-and-swap on the previous
//! document, so two concurrent updates of the same order cannot interleave
//! a read and a write.

use std::{sync::LazyLock, time::Duration};

use redis::{
    AsyncCommands, Client, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};

use crate::{
    error::AppError,
    models::{CartItem, Order, User},
};

pub async fn init_redis(redis_url: &str) -> ConnectionManager {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url).expect("Invalid Redis URL!");

    client
        .get_connection_manager_with_config(config)
        .await
        .expect("Failed to connect to Redis!")
}

const ORDERS_INDEX: &str = "orders:all";

fn order_key(id: &str) -> String {
    format!("order:{id}")
}

fn user_orders_key(user_id: &str) -> String {
    format!("orders:user:{user_id}")
}

fn user_key(id: &str) -> String {
    format!("user:{id}")
}

fn email_key(email: &str) -> String {
    format!("user:email:{email}")
}

fn cart_key(user_id: &str) -> String {
    format!("cart:{user_id}")
}

fn wishlist_key(user_id: &str) -> String {
    format!("wishlist:{user_id}")
}

fn reset_key(token: &str) -> String {
    format!("reset:{token}")
}

// SET only if the document has not changed since it was read.
static COMPARE_AND_SWAP: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            redis.call('SET', KEYS[1], ARGV[2])
            return 1
        end
        return 0
        ",
    )
});

// ---------------------------------------------------------------------------
// Orders

pub async fn insert_order(conn: &mut ConnectionManager, order: &Order) -> Result<(), AppError> {
    let json = serde_json::to_string(order)?;

    let _: () = conn.set(order_key(&order.id), json).await?;
    let _: () = conn.sadd(ORDERS_INDEX, &order.id).await?;
    let _: () = conn.sadd(user_orders_key(&order.user_id), &order.id).await?;

    Ok(())
}

pub async fn find_order(
    conn: &mut ConnectionManager,
    id: &str,
) -> Result<Option<Order>, AppError> {
    Ok(find_order_raw(conn, id).await?.map(|(_, order)| order))
}

/// Fetches an order along with the exact document string it was parsed
/// from, for use as the compare operand of a guarded replace.
pub async fn find_order_raw(
    conn: &mut ConnectionManager,
    id: &str,
) -> Result<Option<(String, Order)>, AppError> {
    let raw: Option<String> = conn.get(order_key(id)).await?;

    match raw {
        Some(json) => {
            let order = serde_json::from_str(&json)?;
            Ok(Some((json, order)))
        }
        None => Ok(None),
    }
}

/// Replaces an order document only if it still matches `old_json`.
/// Returns false when another writer got there first.
pub async fn replace_order_guarded(
    conn: &mut ConnectionManager,
    old_json: &str,
    order: &Order,
) -> Result<bool, AppError> {
    let new_json = serde_json::to_string(order)?;

    let swapped: i64 = COMPARE_AND_SWAP
        .key(order_key(&order.id))
        .arg(old_json)
        .arg(new_json)
        .invoke_async(conn)
        .await?;

    Ok(swapped == 1)
}

pub async fn all_orders(conn: &mut ConnectionManager) -> Result<Vec<Order>, AppError> {
    let ids: Vec<String> = conn.smembers(ORDERS_INDEX).await?;
    collect_orders(conn, ids).await
}

pub async fn user_orders(
    conn: &mut ConnectionManager,
    user_id: &str,
) -> Result<Vec<Order>, AppError> {
    let ids: Vec<String> = conn.smembers(user_orders_key(user_id)).await?;
    collect_orders(conn, ids).await
}

async fn collect_orders(
    conn: &mut ConnectionManager,
    ids: Vec<String>,
) -> Result<Vec<Order>, AppError> {
    let mut orders = Vec::with_capacity(ids.len());

    for id in ids {
        if let Some(order) = find_order(conn, &id).await? {
            orders.push(order);
        }
    }

    Ok(orders)
}

/// Deletes one order and its index entries. Returns false if it did not
/// exist.
pub async fn delete_order(conn: &mut ConnectionManager, id: &str) -> Result<bool, AppError> {
    let Some(order) = find_order(conn, id).await? else {
        return Ok(false);
    };

    let _: () = conn.del(order_key(id)).await?;
    let _: () = conn.srem(ORDERS_INDEX, id).await?;
    let _: () = conn.srem(user_orders_key(&order.user_id), id).await?;

    Ok(true)
}

pub async fn delete_all_orders(conn: &mut ConnectionManager) -> Result<(), AppError> {
    let ids: Vec<String> = conn.smembers(ORDERS_INDEX).await?;

    for id in ids {
        delete_order(conn, &id).await?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Users

pub async fn insert_user(conn: &mut ConnectionManager, user: &User) -> Result<(), AppError> {
    let json = serde_json::to_string(user)?;

    let _: () = conn.set(user_key(&user.id), json).await?;
    let _: () = conn.set(email_key(&user.email), &user.id).await?;

    Ok(())
}

pub async fn replace_user(conn: &mut ConnectionManager, user: &User) -> Result<(), AppError> {
    let json = serde_json::to_string(user)?;
    let _: () = conn.set(user_key(&user.id), json).await?;

    Ok(())
}

pub async fn find_user(conn: &mut ConnectionManager, id: &str) -> Result<Option<User>, AppError> {
    let raw: Option<String> = conn.get(user_key(id)).await?;
    raw.map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(AppError::from)
}

pub async fn find_user_by_email(
    conn: &mut ConnectionManager,
    email: &str,
) -> Result<Option<User>, AppError> {
    let id: Option<String> = conn.get(email_key(email)).await?;

    match id {
        Some(id) => find_user(conn, &id).await,
        None => Ok(None),
    }
}

pub async fn email_taken(conn: &mut ConnectionManager, email: &str) -> Result<bool, AppError> {
    let taken: bool = conn.exists(email_key(email)).await?;
    Ok(taken)
}

/// Moves the email index entry when a profile update changes the address.
pub async fn reindex_user_email(
    conn: &mut ConnectionManager,
    old_email: &str,
    new_email: &str,
    user_id: &str,
) -> Result<(), AppError> {
    let _: () = conn.del(email_key(old_email)).await?;
    let _: () = conn.set(email_key(new_email), user_id).await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Password reset tokens

const RESET_TOKEN_TTL_SECS: u64 = 3600;

pub async fn put_reset_token(
    conn: &mut ConnectionManager,
    token: &str,
    user_id: &str,
) -> Result<(), AppError> {
    let _: () = conn
        .set_ex(reset_key(token), user_id, RESET_TOKEN_TTL_SECS)
        .await?;

    Ok(())
}

/// Consumes a reset token, returning the user id it was issued for.
pub async fn take_reset_token(
    conn: &mut ConnectionManager,
    token: &str,
) -> Result<Option<String>, AppError> {
    let user_id: Option<String> = conn.get(reset_key(token)).await?;

    if user_id.is_some() {
        let _: () = conn.del(reset_key(token)).await?;
    }

    Ok(user_id)
}

// ---------------------------------------------------------------------------
// Cart

pub async fn cart_items(
    conn: &mut ConnectionManager,
    user_id: &str,
) -> Result<Vec<CartItem>, AppError> {
    let raw: Vec<String> = conn.hvals(cart_key(user_id)).await?;

    raw.iter()
        .map(|json| serde_json::from_str(json).map_err(AppError::from))
        .collect()
}

pub async fn cart_item(
    conn: &mut ConnectionManager,
    user_id: &str,
    item_id: &str,
) -> Result<Option<CartItem>, AppError> {
    let raw: Option<String> = conn.hget(cart_key(user_id), item_id).await?;
    raw.map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(AppError::from)
}

pub async fn put_cart_item(conn: &mut ConnectionManager, item: &CartItem) -> Result<(), AppError> {
    let json = serde_json::to_string(item)?;
    let _: () = conn.hset(cart_key(&item.user_id), &item.id, json).await?;

    Ok(())
}

pub async fn delete_cart_item(
    conn: &mut ConnectionManager,
    user_id: &str,
    item_id: &str,
) -> Result<bool, AppError> {
    let removed: i64 = conn.hdel(cart_key(user_id), item_id).await?;
    Ok(removed > 0)
}

pub async fn clear_cart(conn: &mut ConnectionManager, user_id: &str) -> Result<(), AppError> {
    let _: () = conn.del(cart_key(user_id)).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Wishlist

pub async fn wishlist_add(
    conn: &mut ConnectionManager,
    user_id: &str,
    book_id: &str,
) -> Result<(), AppError> {
    let _: () = conn.sadd(wishlist_key(user_id), book_id).await?;
    Ok(())
}

pub async fn wishlist_remove(
    conn: &mut ConnectionManager,
    user_id: &str,
    book_id: &str,
) -> Result<(), AppError> {
    let _: () = conn.srem(wishlist_key(user_id), book_id).await?;
    Ok(())
}

pub async fn wishlist_books(
    conn: &mut ConnectionManager,
    user_id: &str,
) -> Result<Vec<String>, AppError> {
    let books: Vec<String> = conn.smembers(wishlist_key(user_id)).await?;
    Ok(books)
}
