use crate::services::orders::OrderDetails;
use async_trait::async_trait;
use serde::Serialize;
use std::{fmt::Write, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{info, instrument, warn};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Notification delivery errors. These never reach API callers.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("No recipient address for order {0}")]
    MissingRecipient(String),
    #[error("Email provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Email provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Sends customer-facing order notifications.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    async fn send_order_confirmation(&self, order: &OrderDetails)
        -> Result<(), NotificationError>;
}

pub fn confirmation_subject(order: &OrderDetails) -> String {
    format!("Order Confirmation - {}", order.order_number)
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// HTML body listing each line as `name × qty  $line` followed by the total.
/// Customer and product names are escaped.
pub fn confirmation_html(order: &OrderDetails) -> String {
    let customer = order
        .user
        .as_ref()
        .map(|user| user.name.as_str())
        .unwrap_or("there");

    let mut html = String::new();
    let _ = write!(
        html,
        "<h1>Thank you for your order, {}!</h1><p>Order number: <strong>{}</strong></p><ul>",
        escape_html(customer),
        escape_html(&order.order_number)
    );
    for item in &order.items {
        let name = item.product_name.as_deref().unwrap_or("Item");
        let _ = write!(
            html,
            "<li>{} &times; {}&nbsp;&nbsp;${:.2}</li>",
            escape_html(name),
            item.quantity,
            item.line_total
        );
    }
    let _ = write!(
        html,
        "</ul><p><strong>Total: ${:.2}</strong></p>",
        order.total_amount
    );
    html
}

#[derive(Serialize)]
struct ResendEmail<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: String,
    html: String,
}

/// Transactional email through the Resend API.
#[derive(Clone)]
pub struct ResendEmailNotifier {
    client: reqwest::Client,
    api_key: String,
    from: String,
    endpoint: String,
}

impl ResendEmailNotifier {
    pub fn new(
        api_key: impl Into<String>,
        from: impl Into<String>,
    ) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            from: from.into(),
            endpoint: RESEND_API_URL.to_string(),
        })
    }
}

#[async_trait]
impl OrderNotifier for ResendEmailNotifier {
    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn send_order_confirmation(
        &self,
        order: &OrderDetails,
    ) -> Result<(), NotificationError> {
        let to = order
            .user
            .as_ref()
            .map(|user| user.email.as_str())
            .filter(|email| !email.is_empty())
            .ok_or_else(|| NotificationError::MissingRecipient(order.order_number.clone()))?;

        let email = ResendEmail {
            from: &self.from,
            to: vec![to],
            subject: confirmation_subject(order),
            html: confirmation_html(order),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&email)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        info!("Order confirmation email sent");
        Ok(())
    }
}

/// Writes confirmations to the log instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl OrderNotifier for LogNotifier {
    async fn send_order_confirmation(
        &self,
        order: &OrderDetails,
    ) -> Result<(), NotificationError> {
        info!(
            order_number = %order.order_number,
            recipient = order.user.as_ref().map(|u| u.email.as_str()).unwrap_or(""),
            items = order.items.len(),
            total = %order.total_amount,
            subject = %confirmation_subject(order),
            "Order confirmation"
        );
        Ok(())
    }
}

/// Sends the confirmation on a background task. Failures are only logged.
pub fn dispatch_order_confirmation(
    notifier: Arc<dyn OrderNotifier>,
    order: OrderDetails,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.send_order_confirmation(&order).await {
            warn!(
                order_number = %order.order_number,
                error = %e,
                "Failed to send order confirmation"
            );
        }
    })
}
