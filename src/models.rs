use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Shipment status of an order. Transitions only move forward; the guard
/// lives in [`crate::orders::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Shipped,
    Delivered,
}

/// One book entry within an order. Rating and comments stay empty until
/// feedback is attached after delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub book_id: String,
    pub title: String,
    pub quantity: u32,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub books: Vec<LineItem>,
    pub total: f64,
    pub payment_method: String,
    pub billing_details: Value,
    pub status: OrderStatus,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        user_id: String,
        books: Vec<LineItem>,
        total: f64,
        payment_method: String,
        billing_details: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            books,
            total,
            payment_method,
            billing_details,
            status: OrderStatus::Pending,
            shipped_at: None,
            delivered_at: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub profile_photo_url: Option<String>,
}

impl User {
    pub fn new(username: String, email: String, password_hash: String, role: Role) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username,
            email,
            password: password_hash,
            role,
            profile_photo_url: None,
        }
    }

    /// The response shape; the stored document keeps the password hash,
    /// responses never do.
    pub fn public(&self) -> PublicUser {
        PublicUser {
            user_id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            profile_photo_url: self.profile_photo_url.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub profile_photo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub title: String,
    pub price: f64,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Wishlist {
    pub user_id: String,
    pub books: Vec<String>,
}
