mod identity;
mod receipt;
mod submission;

pub use identity::{IdentityError, IdentityPolicy};
pub use receipt::{
    artifact_filename, content_hash, entry_date, LedgerRow, StoredArtifact, SubmissionReceipt,
};
pub use submission::{
    SignatureImage, Submission, ValidationError, ValidationRules, MAX_NAME_CHARS,
    MAX_SIGNATURE_BYTES, MIN_SIGNATURE_BYTES,
};
