//! Transactional email delivery.
//!
//! A secondary, best-effort side channel: callers must never let a send
//! failure roll back or fail the mutation that triggered it.

use async_trait::async_trait;
use aws_sdk_ses::primitives::Blob;
use aws_sdk_ses::types::{Body, Content, Destination, Message};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::{Error, Result};

/// Optional binary attachment (e.g. a rendered report).
#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    pub attachment: Option<EmailAttachment>,
}

impl EmailMessage {
    /// Standard platform shell around a plain-text body.
    pub fn from_notification(to: &str, title: &str, body: &str) -> Self {
        let html_body = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"></head>
<body style="font-family: sans-serif; padding: 20px;">
    <h2>{}</h2>
    <p>{}</p>
    <hr>
    <p style="color: #666; font-size: 12px;">
        Sent by PlayLocal
    </p>
</body>
</html>
"#,
            title,
            body.replace('\n', "<br>")
        );

        Self {
            to: to.to_string(),
            subject: title.to_string(),
            html_body,
            text_body: body.to_string(),
            attachment: None,
        }
    }
}

/// Mail relay contract. Returns an opaque delivery identifier.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<String>;
}

pub struct SesMailer {
    client: aws_sdk_ses::Client,
    from_email: String,
}

impl SesMailer {
    pub fn new(client: aws_sdk_ses::Client, from_email: String) -> Self {
        Self { client, from_email }
    }

    pub async fn from_env(from_email: String) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_ses::Client::new(&config), from_email)
    }

    fn content(data: &str) -> Result<Content> {
        Content::builder()
            .data(data)
            .charset("UTF-8")
            .build()
            .map_err(|e| Error::Dependency(format!("Failed to build email content: {}", e)))
    }

    async fn send_plain(&self, message: &EmailMessage) -> Result<String> {
        let body = Body::builder()
            .html(Self::content(&message.html_body)?)
            .text(Self::content(&message.text_body)?)
            .build();

        let ses_message = Message::builder()
            .subject(Self::content(&message.subject)?)
            .body(body)
            .build();

        let destination = Destination::builder().to_addresses(&message.to).build();

        let result = self
            .client
            .send_email()
            .source(&self.from_email)
            .destination(destination)
            .message(ses_message)
            .send()
            .await
            .map_err(|e| Error::Dependency(format!("Failed to send email: {}", e)))?;

        Ok(result.message_id().to_string())
    }

    async fn send_with_attachment(&self, message: &EmailMessage) -> Result<String> {
        let raw = build_mime(&self.from_email, message);

        let raw_message = aws_sdk_ses::types::RawMessage::builder()
            .data(Blob::new(raw.into_bytes()))
            .build()
            .map_err(|e| Error::Dependency(format!("Failed to build raw email: {}", e)))?;

        let result = self
            .client
            .send_raw_email()
            .source(&self.from_email)
            .destinations(&message.to)
            .raw_message(raw_message)
            .send()
            .await
            .map_err(|e| Error::Dependency(format!("Failed to send email: {}", e)))?;

        Ok(result.message_id().to_string())
    }
}

#[async_trait]
impl Mailer for SesMailer {
    async fn send(&self, message: &EmailMessage) -> Result<String> {
        if message.attachment.is_some() {
            self.send_with_attachment(message).await
        } else {
            self.send_plain(message).await
        }
    }
}

/// multipart/mixed MIME document: alternative text/html bodies plus one
/// base64 attachment.
fn build_mime(from: &str, message: &EmailMessage) -> String {
    let mixed = "playlocal-mixed";
    let alt = "playlocal-alt";

    let mut out = String::new();
    out.push_str(&format!("From: {}\r\n", from));
    out.push_str(&format!("To: {}\r\n", message.to));
    out.push_str(&format!("Subject: {}\r\n", message.subject));
    out.push_str("MIME-Version: 1.0\r\n");
    out.push_str(&format!(
        "Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n",
        mixed
    ));

    out.push_str(&format!("--{}\r\n", mixed));
    out.push_str(&format!(
        "Content-Type: multipart/alternative; boundary=\"{}\"\r\n\r\n",
        alt
    ));
    out.push_str(&format!("--{}\r\n", alt));
    out.push_str("Content-Type: text/plain; charset=UTF-8\r\n\r\n");
    out.push_str(&message.text_body);
    out.push_str("\r\n");
    out.push_str(&format!("--{}\r\n", alt));
    out.push_str("Content-Type: text/html; charset=UTF-8\r\n\r\n");
    out.push_str(&message.html_body);
    out.push_str("\r\n");
    out.push_str(&format!("--{}--\r\n", alt));

    if let Some(attachment) = &message.attachment {
        out.push_str(&format!("--{}\r\n", mixed));
        out.push_str(&format!(
            "Content-Type: {}; name=\"{}\"\r\n",
            attachment.content_type, attachment.file_name
        ));
        out.push_str(&format!(
            "Content-Disposition: attachment; filename=\"{}\"\r\n",
            attachment.file_name
        ));
        out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");

        let encoded = BASE64.encode(&attachment.data);
        for chunk in encoded.as_bytes().chunks(76) {
            out.push_str(&String::from_utf8_lossy(chunk));
            out.push_str("\r\n");
        }
    }

    out.push_str(&format!("--{}--\r\n", mixed));
    out
}
