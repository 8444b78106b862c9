use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::Submission;

/// Reference to an artifact persisted in the blob store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifact {
    #[serde(rename = "fileId")]
    pub file_id: String,
    pub url: String,
}

/// One append-only row in the system of record. Rows are never updated
/// or deleted; at most one row exists per
/// `(entry_date, identifier, item_category)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRow {
    pub id: String,
    pub entry_date: String,
    pub entry_time: String,
    pub submitter_name: String,
    pub identifier: String,
    pub item_category: String,
    pub submitter_email: String,
    pub artifact_filename: String,
    pub artifact_url: String,
    pub content_hash: Option<String>,
}

impl LedgerRow {
    pub fn new(
        submission: &Submission,
        filename: &str,
        artifact: &StoredArtifact,
        content_hash: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entry_date: entry_date(&submission.submitted_at),
            entry_time: submission.submitted_at.format("%H:%M:%S").to_string(),
            submitter_name: submission.submitter_name.clone(),
            identifier: submission.identifier.clone(),
            item_category: submission.item_category.clone(),
            submitter_email: submission.submitter_email.clone(),
            artifact_filename: filename.to_string(),
            artifact_url: artifact.url.clone(),
            content_hash: Some(content_hash.to_string()),
        }
    }
}

/// Calendar-date dedup key in the fixed organizational timezone.
pub fn entry_date(at: &DateTime<FixedOffset>) -> String {
    at.format("%Y/%m/%d").to_string()
}

/// Artifact naming scheme: `identifier_name_timestamp.pdf`.
pub fn artifact_filename(submission: &Submission) -> String {
    format!(
        "{}_{}_{}.pdf",
        submission.identifier,
        submission.submitter_name,
        submission.submitted_at.timestamp_millis()
    )
}

/// SHA-256 of the rendered document, hex encoded.
pub fn content_hash(pdf: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pdf);
    format!("{:x}", hasher.finalize())
}

/// What a successful submission hands back to the client.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub file_id: String,
    pub url: String,
    pub hash: String,
    pub filename: String,
}
