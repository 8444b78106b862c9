use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("請先以 Google 帳戶登入")]
    Missing,

    #[error("只允許特定組織的帳號使用")]
    DomainNotAllowed,
}

/// Domain allow-list for submitter emails.
///
/// The allow-list is deployment configuration, not submission logic: an
/// empty list disables the domain check entirely (one deployed variant
/// runs without it).
#[derive(Debug, Clone, Default)]
pub struct IdentityPolicy {
    allowed_domains: Vec<String>,
}

impl IdentityPolicy {
    pub fn new(allowed_domains: Vec<String>) -> Self {
        let allowed_domains = allowed_domains
            .into_iter()
            .map(|d| d.trim().trim_start_matches('@').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { allowed_domains }
    }

    pub fn is_enforced(&self) -> bool {
        !self.allowed_domains.is_empty()
    }

    /// Verify the caller-supplied identity assertion and return the
    /// normalized (trimmed, lowercased) email.
    pub fn verify(&self, email: Option<&str>) -> Result<String, IdentityError> {
        let email = email
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(IdentityError::Missing)?
            .to_ascii_lowercase();

        if self.allowed_domains.is_empty() {
            return Ok(email);
        }

        match email.rsplit_once('@') {
            Some((user, domain)) if !user.is_empty() && self.allowed_domains.iter().any(|d| d == domain) => {
                Ok(email)
            }
            _ => Err(IdentityError::DomainNotAllowed),
        }
    }
}
