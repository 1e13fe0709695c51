use serde::Serialize;
use thiserror::Error;

use crate::routes::booking::model::Booking;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("email request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("email provider returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Confirmation,
    Cancellation,
    Reschedule,
    AdminNotice,
}

#[derive(Debug, Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: String,
    html: String,
}

#[derive(Clone)]
pub struct Mailer {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
    admin_email: String,
}

impl Mailer {
    pub fn new(
        http: reqwest::Client,
        api_url: &str,
        api_key: &str,
        from: &str,
        admin_email: &str,
    ) -> Self {
        Self {
            http,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
            admin_email: admin_email.to_string(),
        }
    }

    pub async fn send_booking_notification(
        &self,
        kind: NotificationKind,
        booking: &Booking,
        manage_url: Option<&str>,
    ) -> Result<(), EmailError> {
        let to = match kind {
            NotificationKind::AdminNotice => self.admin_email.as_str(),
            _ => booking.customer_email.as_str(),
        };
        let (subject, html) = render(kind, booking, manage_url);
        let email = OutgoingEmail {
            from: &self.from,
            to: [to],
            subject,
            html,
        };

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&email)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(EmailError::Upstream { status, body });
        }

        tracing::info!(booking_id = booking.id, ?kind, "booking notification sent");
        Ok(())
    }

    /// Sends without failing the caller; delivery problems are only logged.
    pub async fn notify(&self, kind: NotificationKind, booking: &Booking, manage_url: Option<&str>) {
        if let Err(e) = self.send_booking_notification(kind, booking, manage_url).await {
            tracing::warn!(booking_id = booking.id, ?kind, error = %e, "booking notification failed");
        }
    }
}

fn render(kind: NotificationKind, booking: &Booking, manage_url: Option<&str>) -> (String, String) {
    let name = escape_html(&booking.customer_name);
    let when = format!(
        "{} at {}",
        booking.booking_date.format("%A %-d %B %Y"),
        escape_html(&booking.booking_time)
    );
    let manage = manage_url
        .map(|url| {
            format!(
                r#"<p>Need to change something? <a href="{}">Manage your booking</a>.</p>"#,
                escape_html(url)
            )
        })
        .unwrap_or_default();

    match kind {
        NotificationKind::Confirmation => (
            "Your booking is confirmed".to_string(),
            format!("<p>Hi {name},</p><p>Your booking on {when} is confirmed.</p>{manage}"),
        ),
        NotificationKind::Cancellation => (
            "Your booking has been cancelled".to_string(),
            format!("<p>Hi {name},</p><p>Your booking on {when} has been cancelled.</p>"),
        ),
        NotificationKind::Reschedule => (
            "Your booking has been moved".to_string(),
            format!("<p>Hi {name},</p><p>Your booking is now on {when}.</p>{manage}"),
        ),
        NotificationKind::AdminNotice => (
            format!("Booking #{} {}", booking.id, booking.status),
            format!(
                "<p>Booking #{} for {name} ({}) on {when} is now <b>{}</b>.</p>",
                booking.id,
                escape_html(&booking.customer_email),
                escape_html(&booking.status)
            ),
        ),
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
