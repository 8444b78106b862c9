use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use hyper::{Body, Client, Method, Request};
use thiserror::Error;
use tracing::info;

use crate::infrastructure::config::CredentialProvider;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("mail credentials missing")]
    MissingCredentials,

    #[error("mail transport error: {0}")]
    Transport(String),

    #[error("mail rejected: HTTP {0}")]
    Rejected(u16),
}

/// Everything the notifier needs to mail a copy of the receipt back to
/// the signer. Owned data so it can ride in a spawned task.
#[derive(Debug, Clone)]
pub struct ReceiptMail {
    pub to: String,
    pub submitter_name: String,
    pub identifier: String,
    pub item_category: String,
    pub submitted_at: String,
    pub content_hash: String,
    pub filename: String,
    pub pdf: Vec<u8>,
}

/// Best-effort side channel. The pipeline never lets a notifier failure
/// surface in the primary result.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_receipt(&self, mail: &ReceiptMail) -> Result<(), NotifyError>;
}

/// Mails the receipt through a Gmail-style HTTP relay: a raw RFC 2822
/// message, base64url-encoded, POSTed with a Bearer token.
pub struct GmailRelay {
    client: Client<hyper::client::HttpConnector>,
    api_base: String,
    credentials: Arc<CredentialProvider>,
}

impl GmailRelay {
    pub fn new(api_base: String, credentials: Arc<CredentialProvider>) -> Self {
        Self {
            client: Client::new(),
            api_base,
            credentials,
        }
    }

    /// RFC 2047 B-encoding for non-ASCII subjects.
    fn encode_subject(subject: &str) -> String {
        format!(
            "=?UTF-8?B?{}?=",
            base64::engine::general_purpose::STANDARD.encode(subject.as_bytes())
        )
    }

    /// multipart/mixed message: UTF-8 text part plus the PDF attachment.
    pub fn build_mime(mail: &ReceiptMail) -> String {
        let std_b64 = &base64::engine::general_purpose::STANDARD;
        let boundary = format!("----boundary_{}", uuid::Uuid::new_v4().simple());
        let subject = Self::encode_subject(&format!("線上簽收單 - {}", mail.item_category));

        let body_text = format!(
            "您好 {name}，\r\n\r\n您的線上簽收已完成，詳細資訊如下：\r\n\r\n\
             簽收項目:{item}\r\n學號:{id}\r\n簽收時間:{at}\r\nPDF雜湊值:{hash}\r\n\r\n\
             PDF簽收單已附加於本信件中。\r\n\r\n謝謝您的使用！\r\n\r\n---\r\n線上簽收系統",
            name = mail.submitter_name,
            item = mail.item_category,
            id = mail.identifier,
            at = mail.submitted_at,
            hash = mail.content_hash,
        );

        [
            format!("To: {}", mail.to),
            format!("Subject: {subject}"),
            "MIME-Version: 1.0".to_string(),
            format!("Content-Type: multipart/mixed; boundary=\"{boundary}\""),
            String::new(),
            format!("--{boundary}"),
            "Content-Type: text/plain; charset=UTF-8".to_string(),
            "Content-Transfer-Encoding: base64".to_string(),
            String::new(),
            std_b64.encode(body_text.as_bytes()),
            String::new(),
            format!("--{boundary}"),
            "Content-Type: application/pdf".to_string(),
            format!("Content-Disposition: attachment; filename=\"{}\"", mail.filename),
            "Content-Transfer-Encoding: base64".to_string(),
            String::new(),
            std_b64.encode(&mail.pdf),
            String::new(),
            format!("--{boundary}--"),
        ]
        .join("\r\n")
    }
}

#[async_trait]
impl Notifier for GmailRelay {
    async fn send_receipt(&self, mail: &ReceiptMail) -> Result<(), NotifyError> {
        let token = self
            .credentials
            .access_token()
            .ok_or(NotifyError::MissingCredentials)?;

        let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(Self::build_mime(mail).as_bytes());
        let payload = serde_json::json!({ "raw": raw });

        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("{}/gmail/v1/users/me/messages/send", self.api_base))
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }

        info!(to = %mail.to, "receipt mailed");
        Ok(())
    }
}
