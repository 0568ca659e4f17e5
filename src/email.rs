//! Outbound alarm email over SMTP.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::EmailConfig;
use crate::error::EmailError;
use crate::platform::DeliveryStatistics;

/// Sends an HTML email to the configured recipients.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, subject: &str, html_body: &str) -> Result<(), EmailError>;
}

/// [`EmailSender`] over an implicit-TLS SMTP relay.
pub struct SmtpEmailSender {
    config: EmailConfig,
}

impl SmtpEmailSender {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, subject: &str, html_body: &str) -> Result<(), EmailError> {
        let message = build_message(&self.config, subject, html_body)?;
        let config = self.config.clone();

        // lettre's SmtpTransport is blocking.
        tokio::task::spawn_blocking(move || {
            let creds = Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            );
            let transport = SmtpTransport::relay(&config.smtp_host)
                .map_err(|e| EmailError::SendFailed(format!("SMTP relay error: {e}")))?
                .port(config.smtp_port)
                .credentials(creds)
                .build();
            transport
                .send(&message)
                .map_err(|e| EmailError::SendFailed(e.to_string()))?;
            Ok::<_, EmailError>(())
        })
        .await
        .map_err(|e| EmailError::SendFailed(format!("send task failed: {e}")))??;

        tracing::info!(
            recipients = self.config.recipients.len(),
            subject,
            "Email sent"
        );
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address.parse().map_err(|e| EmailError::InvalidAddress {
        address: address.to_string(),
        reason: format!("{e}"),
    })
}

fn build_message(config: &EmailConfig, subject: &str, html_body: &str) -> Result<Message, EmailError> {
    if config.recipients.is_empty() {
        return Err(EmailError::NoRecipients);
    }

    let mut builder = Message::builder()
        .from(parse_mailbox(&config.from_address)?)
        .subject(subject)
        .header(ContentType::TEXT_HTML);
    for recipient in &config.recipients {
        builder = builder.to(parse_mailbox(recipient)?);
    }
    builder
        .body(html_body.to_string())
        .map_err(|e| EmailError::Build(e.to_string()))
}

/// HTML body for the abnormal-shipment alarm.
pub fn render_alarm_body(stats: &DeliveryStatistics, logistics_page: &str) -> String {
    let rows = [
        ("Abnormal shipments needing attention", stats.valid_total()),
        ("Collection timeouts", stats.collect_timeout_count),
        ("Collection warnings", stats.collect_warn_count),
        ("Transit warnings", stats.collect_transport_warn_count),
        ("Transit timeouts", stats.collect_transport_timeout_count),
    ];

    let mut body = String::from(
        "<html><body>\n<h2>Logistics exception alert</h2>\n<table border=\"1\" cellpadding=\"6\">\n",
    );
    for (label, count) in rows {
        body.push_str(&format!("<tr><td>{label}</td><td>{count}</td></tr>\n"));
    }
    body.push_str("</table>\n");
    body.push_str(&format!(
        "<p>Review the shipments on the <a href=\"{}\">logistics page</a>.</p>\n",
        escape_attr(logistics_page)
    ));
    body.push_str("</body></html>\n");
    body
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn config(recipients: &[&str]) -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.example.com".into(),
            smtp_port: 465,
            username: "alerts@example.com".into(),
            password: SecretString::from("pw"),
            from_address: "alerts@example.com".into(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            subject: "Alert".into(),
            logistics_page: "https://example.com/logistics".into(),
        }
    }

    #[test]
    fn message_addresses_every_recipient() {
        let message = build_message(
            &config(&["ops@example.com", "owner@example.com"]),
            "Alert",
            "<p>hi</p>",
        )
        .unwrap();
        let to = message.envelope().to();
        assert_eq!(to.len(), 2);
        assert_eq!(to[1].to_string(), "owner@example.com");
    }

    #[test]
    fn invalid_recipient_is_reported() {
        let err = build_message(&config(&["not-an-address"]), "Alert", "").unwrap_err();
        assert!(matches!(err, EmailError::InvalidAddress { ref address, .. } if address == "not-an-address"));
    }

    #[test]
    fn no_recipients_is_an_error() {
        assert!(matches!(
            build_message(&config(&[]), "Alert", ""),
            Err(EmailError::NoRecipients)
        ));
    }

    #[test]
    fn alarm_body_reports_valid_total_and_link() {
        let stats = DeliveryStatistics {
            total: 7,
            return_reject_count: 2,
            collect_timeout_count: 3,
            ..Default::default()
        };
        let body = render_alarm_body(&stats, "https://example.com/logistics?a=1&b=2");

        assert!(body.contains("<td>Abnormal shipments needing attention</td><td>5</td>"));
        assert!(body.contains("<td>Collection timeouts</td><td>3</td>"));
        assert!(body.contains("href=\"https://example.com/logistics?a=1&amp;b=2\""));
    }
}
