//! Report delivery channels (email and chat webhook).

use async_trait::async_trait;
use aws_sdk_ses::types::{Body, Content, Destination, Message};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::info;

use crate::{Error, Result};

/// Longest insights text sent in one webhook block.
pub const WEBHOOK_TEXT_LIMIT: usize = 3000;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// What a channel receives for one scheduled report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPayload {
    pub title: String,
    pub insights: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, report: &ReportPayload) -> Result<()>;
}

/// Slack-style incoming webhook.
pub struct WebhookChannel {
    http: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }
}

/// Block-kit message for a report.
pub fn slack_payload(report: &ReportPayload) -> serde_json::Value {
    json!({
        "text": report.title,
        "blocks": [
            {
                "type": "section",
                "text": {"type": "mrkdwn", "text": format!("*{}*", report.title)}
            },
            {
                "type": "section",
                "text": {"type": "mrkdwn", "text": truncate_chars(&report.insights, WEBHOOK_TEXT_LIMIT)}
            }
        ]
    })
}

/// At most `max` characters of `text`, never splitting a character.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn deliver(&self, report: &ReportPayload) -> Result<()> {
        let response = self
            .http
            .post(&self.url)
            .json(&slack_payload(report))
            .timeout(WEBHOOK_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Delivery(format!("Failed to send Slack message: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Delivery(format!(
                "Slack webhook failed: {}",
                response.status()
            )));
        }

        info!(title = %report.title, "Report posted to Slack");
        Ok(())
    }
}

/// Email via AWS SES.
pub struct EmailChannel {
    ses: aws_sdk_ses::Client,
    from: String,
    to: String,
}

impl EmailChannel {
    pub fn new(ses: aws_sdk_ses::Client, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            ses,
            from: from.into(),
            to: to.into(),
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// HTML body for a report email.
pub fn render_email_html(report: &ReportPayload) -> String {
    format!(
        r#"
        <!DOCTYPE html>
        <html>
        <head><meta charset="UTF-8"></head>
        <body style="font-family: sans-serif; padding: 20px;">
            <h2>{}</h2>
            <p style="color: #666;">Generated {}</p>
            <div>{}</div>
            <hr>
            <p style="color: #666; font-size: 12px;">
                Sent by Marketing Insights
            </p>
        </body>
        </html>
        "#,
        escape_html(&report.title),
        report.timestamp.format("%Y-%m-%d %H:%M UTC"),
        escape_html(&report.insights).replace('\n', "<br>")
    )
}

#[async_trait]
impl DeliveryChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, report: &ReportPayload) -> Result<()> {
        let content = |data: String| {
            Content::builder()
                .data(data)
                .charset("UTF-8")
                .build()
                .map_err(|e| Error::Delivery(format!("Failed to build email content: {}", e)))
        };

        let subject = content(report.title.clone())?;
        let body = Body::builder()
            .html(content(render_email_html(report))?)
            .text(content(report.insights.clone())?)
            .build();
        let message = Message::builder().subject(subject).body(body).build();
        let destination = Destination::builder().to_addresses(&self.to).build();

        let result = self
            .ses
            .send_email()
            .source(&self.from)
            .destination(destination)
            .message(message)
            .send()
            .await
            .map_err(|e| Error::Delivery(format!("Failed to send email: {}", e)))?;

        info!(message_id = result.message_id(), to = %self.to, "Report emailed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload(insights: &str) -> ReportPayload {
        ReportPayload {
            title: "Weekly Marketing Report".into(),
            insights: insights.into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 3000), "short");
        let long = "é".repeat(3500);
        assert_eq!(truncate_chars(&long, WEBHOOK_TEXT_LIMIT).chars().count(), 3000);
    }

    #[test]
    fn test_slack_payload_shape() {
        let value = slack_payload(&payload("**Summary**"));
        assert_eq!(value["text"], "Weekly Marketing Report");
        assert_eq!(value["blocks"][0]["text"]["text"], "*Weekly Marketing Report*");
        assert_eq!(value["blocks"][1]["text"]["type"], "mrkdwn");
        assert_eq!(value["blocks"][1]["text"]["text"], "**Summary**");
    }

    #[test]
    fn test_email_html_escapes_insights() {
        let html = render_email_html(&payload("Spend <$500> & grow\nNext line"));
        assert!(html.contains("Spend &lt;$500&gt; &amp; grow<br>Next line"));
        assert!(html.contains("<h2>Weekly Marketing Report</h2>"));
    }

    #[tokio::test]
    async fn test_webhook_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/T000/B000/XXX"))
            .and(body_partial_json(serde_json::json!({"text": "Weekly Marketing Report"})))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(reqwest::Client::new(), format!("{}/services/T000/B000/XXX", server.uri()));
        channel.deliver(&payload("insights")).await.unwrap();
    }

    #[tokio::test]
    async fn test_webhook_rejection_is_a_delivery_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no_service"))
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(reqwest::Client::new(), server.uri());
        let err = channel.deliver(&payload("insights")).await.unwrap_err();
        assert!(matches!(err, Error::Delivery(_)));
    }
}
