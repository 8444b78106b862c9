use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{FixedOffset, Utc};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::application::types::{ResponseCode, ResponseData};
use crate::domain::{
    artifact_filename, content_hash, entry_date, IdentityError, IdentityPolicy, LedgerRow,
    StoredArtifact, Submission, SubmissionReceipt, ValidationError, ValidationRules,
};
use crate::infrastructure::ledger::{Ledger, LedgerError};
use crate::infrastructure::mailer::{Notifier, ReceiptMail};
use crate::infrastructure::render::DocumentRenderer;
use crate::infrastructure::storage::{ArtifactStore, StoreError};

use super::types::SubmitRequest;

/// Deployment-level knobs the pipeline consults on every submission.
#[derive(Debug, Clone)]
pub struct PipelinePolicy {
    pub identity: IdentityPolicy,
    pub rules: ValidationRules,
    /// Default item label when the form does not send one.
    pub item_category: String,
    pub tz: FixedOffset,
    pub call_timeout: Duration,
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("{message}")]
    AuthRequired {
        message: String,
        auth_url: Option<String>,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{message}")]
    Duplicate {
        message: String,
        existing: Option<StoredArtifact>,
    },

    #[error("{stage} failed: {cause}")]
    Tool { stage: &'static str, cause: String },
}

impl From<IdentityError> for SubmitError {
    fn from(e: IdentityError) -> Self {
        SubmitError::AuthRequired {
            message: e.to_string(),
            auth_url: None,
        }
    }
}

impl SubmitError {
    pub fn code(&self) -> ResponseCode {
        match self {
            SubmitError::AuthRequired { .. } => ResponseCode::AuthRequired,
            SubmitError::Validation(_) => ResponseCode::ValidationError,
            SubmitError::Duplicate { .. } => ResponseCode::Duplicate,
            SubmitError::Tool { .. } => ResponseCode::ToolError,
        }
    }

    /// The user-facing message plus whatever context the front-end can
    /// act on (auth redirect, the already-stored artifact).
    pub fn into_parts(self) -> (ResponseCode, String, Option<ResponseData>) {
        let code = self.code();
        match self {
            SubmitError::AuthRequired { message, auth_url } => {
                let data = auth_url.map(|auth_url| ResponseData {
                    auth_url: Some(auth_url),
                    ..ResponseData::default()
                });
                (code, message, data)
            }
            SubmitError::Validation(e) => (code, e.to_string(), None),
            SubmitError::Duplicate { message, existing } => {
                let data = existing.map(|existing| ResponseData {
                    existing: Some(existing),
                    ..ResponseData::default()
                });
                (code, message, data)
            }
            SubmitError::Tool { cause, .. } => {
                (code, format!("儲存檔案時發生錯誤: {cause}"), None)
            }
        }
    }
}

fn duplicate_from_row(item_category: &str, row: Option<LedgerRow>) -> SubmitError {
    SubmitError::Duplicate {
        message: format!("此學號今日已簽收「{item_category}」"),
        existing: row.map(|row| StoredArtifact {
            file_id: row.id,
            url: row.artifact_url,
        }),
    }
}

/// The submission pipeline: validate, check identity, preflight the
/// store, render, upload, append to the ledger, then mail a copy.
///
/// Ordering matters. The duplicate pre-check runs before the expensive
/// render so repeat submitters get a fast answer; the unique index in
/// the ledger still decides any race the pre-check misses. The ledger
/// append is the commit point, and the mail is fired after it so a mail
/// outage can never lose a recorded submission.
pub struct SubmitUseCase {
    // The SQLite connection is Send but not Sync; the mutex makes the
    // use case shareable from the server's worker threads. Lock scopes
    // never span an await.
    ledger: Mutex<Box<dyn Ledger>>,
    renderer: Arc<dyn DocumentRenderer>,
    store: Arc<dyn ArtifactStore>,
    notifier: Option<Arc<dyn Notifier>>,
    policy: PipelinePolicy,
}

impl SubmitUseCase {
    pub fn new(
        ledger: Box<dyn Ledger>,
        renderer: Arc<dyn DocumentRenderer>,
        store: Arc<dyn ArtifactStore>,
        notifier: Option<Arc<dyn Notifier>>,
        policy: PipelinePolicy,
    ) -> Self {
        Self {
            ledger: Mutex::new(ledger),
            renderer,
            store,
            notifier,
            policy,
        }
    }

    fn find_entry(
        &self,
        date: &str,
        identifier: &str,
        item_category: &str,
    ) -> Result<Option<LedgerRow>, SubmitError> {
        let ledger = self.ledger.lock().map_err(|_| SubmitError::Tool {
            stage: "ledger",
            cause: "ledger lock poisoned".to_string(),
        })?;
        ledger
            .find_entry(date, identifier, item_category)
            .map_err(|e| SubmitError::Tool {
                stage: "ledger",
                cause: e.to_string(),
            })
    }

    fn append(&self, row: &LedgerRow) -> Result<Result<(), LedgerError>, SubmitError> {
        let ledger = self.ledger.lock().map_err(|_| SubmitError::Tool {
            stage: "ledger",
            cause: "ledger lock poisoned".to_string(),
        })?;
        Ok(ledger.append(row))
    }

    #[tracing::instrument(skip_all, fields(identifier = %request.student_id))]
    pub async fn execute(
        &self,
        request: SubmitRequest,
    ) -> Result<SubmissionReceipt, SubmitError> {
        let email = self.policy.identity.verify(request.user_email.as_deref())?;

        let item_category = request
            .sign_item
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.policy.item_category);

        let submission = Submission::new(
            &request.name,
            &request.student_id,
            &request.signature_data_url,
            item_category,
            request.consent,
            email,
            &self.policy.rules,
            Utc::now().with_timezone(&self.policy.tz),
        )?;

        // Configuration problems surface here, before any work is done.
        match self.store.ensure_ready() {
            Ok(()) => {}
            Err(StoreError::MissingCredentials { auth_url }) => {
                return Err(SubmitError::AuthRequired {
                    message: "尚未完成雲端授權，請先授權後再試".to_string(),
                    auth_url: Some(auth_url),
                });
            }
            Err(e) => {
                return Err(SubmitError::Tool {
                    stage: "store",
                    cause: e.to_string(),
                })
            }
        }

        let date = entry_date(&submission.submitted_at);
        let existing =
            self.find_entry(&date, &submission.identifier, &submission.item_category)?;
        if existing.is_some() {
            return Err(duplicate_from_row(&submission.item_category, existing));
        }

        let pdf = self.renderer.render(&submission).map_err(|e| {
            error!(error = %e, "document render failed");
            SubmitError::Tool {
                stage: "render",
                cause: e.to_string(),
            }
        })?;
        let hash = content_hash(&pdf);
        let filename = artifact_filename(&submission);

        let artifact = match timeout(
            self.policy.call_timeout,
            self.store.upload(&filename, "application/pdf", &pdf),
        )
        .await
        {
            Ok(Ok(artifact)) => artifact,
            Ok(Err(StoreError::MissingCredentials { auth_url })) => {
                return Err(SubmitError::AuthRequired {
                    message: "尚未完成雲端授權，請先授權後再試".to_string(),
                    auth_url: Some(auth_url),
                });
            }
            Ok(Err(e)) => {
                error!(error = %e, %filename, "artifact upload failed");
                return Err(SubmitError::Tool {
                    stage: "upload",
                    cause: e.to_string(),
                });
            }
            Err(_) => {
                error!(%filename, "artifact upload timed out");
                return Err(SubmitError::Tool {
                    stage: "upload",
                    cause: "timed out".to_string(),
                });
            }
        };

        let row = LedgerRow::new(&submission, &filename, &artifact, &hash);
        match self.append(&row)? {
            Ok(()) => {}
            Err(LedgerError::DuplicateEntry) => {
                // Lost a race with a concurrent submission. The artifact
                // just uploaded is orphaned; the recorded one wins.
                warn!(
                    identifier = %submission.identifier,
                    orphaned = %artifact.file_id,
                    "concurrent duplicate, keeping the first recorded entry"
                );
                let winner = self
                    .find_entry(&date, &submission.identifier, &submission.item_category)
                    .unwrap_or(None);
                return Err(duplicate_from_row(&submission.item_category, winner));
            }
            Err(e) => {
                error!(error = %e, artifact = %artifact.file_id, "ledger append failed");
                return Err(SubmitError::Tool {
                    stage: "ledger",
                    cause: e.to_string(),
                });
            }
        }

        info!(
            identifier = %submission.identifier,
            item = %submission.item_category,
            file_id = %artifact.file_id,
            "submission recorded"
        );

        if let Some(notifier) = &self.notifier {
            let notifier = Arc::clone(notifier);
            let call_timeout = self.policy.call_timeout;
            let mail = ReceiptMail {
                to: submission.submitter_email.clone(),
                submitter_name: submission.submitter_name.clone(),
                identifier: submission.identifier.clone(),
                item_category: submission.item_category.clone(),
                submitted_at: submission.submitted_at.format("%Y/%m/%d %H:%M:%S").to_string(),
                content_hash: hash.clone(),
                filename: filename.clone(),
                pdf,
            };
            // Best effort. The submission is already recorded; a mail
            // failure must not change the response.
            tokio::spawn(async move {
                match timeout(call_timeout, notifier.send_receipt(&mail)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(to = %mail.to, error = %e, "receipt mail failed"),
                    Err(_) => warn!(to = %mail.to, "receipt mail timed out"),
                }
            });
        }

        Ok(SubmissionReceipt {
            file_id: artifact.file_id,
            url: artifact.url,
            hash,
            filename,
        })
    }
}
