//! Outbound transactional email.
//!
//! The transport is constructed once at startup and injected through
//! [`crate::state::AppState`]; handlers only see the [`Mailer`] trait. A
//! failed send never rolls back the write that triggered it — the caller
//! reports the failure distinctly and leaves the document in place.

use async_trait::async_trait;
use lettre::{
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::info;

use crate::{
    config::Config,
    models::{LineItem, Order},
};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: String) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_relay)?
            .credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from: config.smtp_username.parse()?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html: String) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)?;

        self.transport.send(message).await?;
        info!("Email sent to {to}");

        Ok(())
    }
}

pub fn valid_email(address: &str) -> bool {
    address.parse::<Address>().is_ok()
}

pub fn order_confirmation_html(order: &Order) -> String {
    format!(
        r#"<html>
  <body>
    <h1>Order Confirmation</h1>
    <p>Thank you for your order! Here are the details:</p>
    <p style="font-weight: bold; font-size: 1.5em; color: #ff3300; border: 2px solid #ff3300; padding: 5px;">Order ID: {}</p>
    {}
    <p>Total: {}</p>
  </body>
</html>"#,
        order.id,
        line_items_table(&order.books),
        order.total,
    )
}

pub fn order_details_html(order: &Order) -> String {
    format!(
        r#"<html>
  <body>
    <h1>Order Details (Order ID: {})</h1>
    <p>Here are the details of your order:</p>
    {}
    <p>Total: {}</p>
  </body>
</html>"#,
        order.id,
        line_items_table(&order.books),
        order.total,
    )
}

pub fn password_reset_html(reset_url: &str) -> String {
    format!(
        r#"<html>
  <body>
    <h2>Password Reset Request</h2>
    <p>You've requested to reset your password. Click the link below to proceed.</p>
    <p><a href="{reset_url}">Reset Password</a></p>
    <p>If you didn't request a password reset, you can ignore this email.</p>
  </body>
</html>"#
    )
}

fn line_items_table(books: &[LineItem]) -> String {
    let rows: String = books
        .iter()
        .map(|book| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                book.title, book.quantity, book.price
            )
        })
        .collect();

    format!(
        "<table border=\"1\" cellpadding=\"8\" style=\"border-collapse: collapse; width: 100%;\">\
         <thead><tr><th>Title</th><th>Quantity</th><th>Price</th></tr></thead>\
         <tbody>{rows}</tbody></table>"
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_order() -> Order {
        Order::new(
            "user-1".to_string(),
            vec![
                LineItem {
                    book_id: "book-1".to_string(),
                    title: "The Rust Programming Language".to_string(),
                    quantity: 1,
                    price: 30.0,
                    rating: None,
                    comments: None,
                },
                LineItem {
                    book_id: "book-2".to_string(),
                    title: "Programming Pearls".to_string(),
                    quantity: 2,
                    price: 6.25,
                    rating: None,
                    comments: None,
                },
            ],
            42.5,
            "card".to_string(),
            json!({}),
        )
    }

    #[test]
    fn accepts_plain_addresses() {
        assert!(valid_email("reader@example.com"));
        assert!(valid_email("first.last@books.co.uk"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing@domain@twice.com"));
        assert!(!valid_email(""));
    }

    #[test]
    fn confirmation_contains_order_id_items_and_total() {
        let order = sample_order();
        let html = order_confirmation_html(&order);

        assert!(html.contains(&order.id));
        assert!(html.contains("The Rust Programming Language"));
        assert!(html.contains("Programming Pearls"));
        assert!(html.contains("42.5"));
    }

    #[test]
    fn reset_email_links_the_token_url() {
        let html = password_reset_html("https://shop.test/reset-password/abc123");
        assert!(html.contains("https://shop.test/reset-password/abc123"));
    }
}
