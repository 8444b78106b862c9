use chrono::{DateTime, FixedOffset};
use thiserror::Error;

/// Signature payload bounds, applied to the byte size implied by the
/// base64 data (inclusive at both ends). The lower bound guards against
/// blank or near-blank canvases, the upper one against oversized uploads.
pub const MIN_SIGNATURE_BYTES: usize = 10_000;
pub const MAX_SIGNATURE_BYTES: usize = 5_000_000;

pub const MAX_NAME_CHARS: usize = 50;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("所有欄位皆為必填")]
    MissingField,

    #[error("姓名長度超過上限")]
    NameTooLong,

    #[error("學號格式錯誤")]
    BadIdentifier,

    #[error("簽名資料格式錯誤")]
    BadSignature,

    #[error("簽名內容過小，請重新簽名")]
    SignatureTooSmall,

    #[error("簽名內容過大")]
    SignatureTooLarge,
}

/// Field rules that vary per deployed form variant.
#[derive(Debug, Clone)]
pub struct ValidationRules {
    /// Accepted identifier prefix letters. The general shape is one
    /// uppercase letter plus nine digits; which letters a deployment
    /// accepts is configuration.
    pub id_prefixes: Vec<char>,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            id_prefixes: vec!['J'],
        }
    }
}

/// A signature drawn on the client canvas, carried as a base64 data URL.
#[derive(Debug, Clone)]
pub struct SignatureImage {
    base64: String,
}

impl SignatureImage {
    /// Parse a `data:image/...;base64,` URL. Only the shape is checked
    /// here; the image itself is decoded at render time.
    pub fn from_data_url(data_url: &str) -> Result<Self, ValidationError> {
        let rest = data_url
            .strip_prefix("data:image/")
            .ok_or(ValidationError::BadSignature)?;
        let (_, b64) = rest
            .split_once(";base64,")
            .ok_or(ValidationError::BadSignature)?;
        if b64.is_empty() {
            return Err(ValidationError::BadSignature);
        }
        Ok(Self {
            base64: b64.to_string(),
        })
    }

    /// Byte size implied by the base64 length, accounting for padding,
    /// without decoding the payload.
    pub fn decoded_len(&self) -> usize {
        let padding = self.base64.bytes().rev().take_while(|&b| b == b'=').count();
        (self.base64.len() * 3 / 4).saturating_sub(padding)
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.decode(self.base64.as_bytes())
    }
}

/// A validated submission, ready for rendering and persistence.
///
/// `submitted_at` is server-assigned in the fixed organizational timezone;
/// it is the source of truth for the dedup date, never client input.
#[derive(Debug, Clone)]
pub struct Submission {
    pub submitter_name: String,
    pub identifier: String,
    pub item_category: String,
    pub submitter_email: String,
    pub signature: SignatureImage,
    pub submitted_at: DateTime<FixedOffset>,
}

impl Submission {
    /// Validate raw form fields into a submission. Checks run in the
    /// fixed order the front-end relies on, stopping at the first failure.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        identifier: &str,
        signature_data_url: &str,
        item_category: &str,
        consent: bool,
        verified_email: String,
        rules: &ValidationRules,
        submitted_at: DateTime<FixedOffset>,
    ) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() || identifier.is_empty() || signature_data_url.is_empty() || !consent {
            return Err(ValidationError::MissingField);
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(ValidationError::NameTooLong);
        }
        if !identifier_ok(identifier, &rules.id_prefixes) {
            return Err(ValidationError::BadIdentifier);
        }

        let signature = SignatureImage::from_data_url(signature_data_url)?;
        let estimated = signature.decoded_len();
        if estimated < MIN_SIGNATURE_BYTES {
            return Err(ValidationError::SignatureTooSmall);
        }
        if estimated > MAX_SIGNATURE_BYTES {
            return Err(ValidationError::SignatureTooLarge);
        }

        Ok(Self {
            submitter_name: name.to_string(),
            identifier: identifier.to_string(),
            item_category: item_category.to_string(),
            submitter_email: verified_email,
            signature,
            submitted_at,
        })
    }
}

fn identifier_ok(id: &str, prefixes: &[char]) -> bool {
    let mut chars = id.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    if !first.is_ascii_uppercase() || !prefixes.contains(&first) {
        return false;
    }
    let mut digits = 0;
    for c in chars {
        if !c.is_ascii_digit() {
            return false;
        }
        digits += 1;
    }
    digits == 9
}
