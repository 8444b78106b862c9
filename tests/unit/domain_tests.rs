use base64::Engine;
use chrono::{FixedOffset, TimeZone};
use signoff::domain::{
    artifact_filename, content_hash, entry_date, IdentityError, IdentityPolicy, LedgerRow,
    StoredArtifact, Submission, ValidationRules,
};

fn tz() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

fn signature_data_url(bytes: usize) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(vec![0u8; bytes]);
    format!("data:image/png;base64,{b64}")
}

fn sample_submission() -> Submission {
    Submission::new(
        "王小明",
        "J123456789",
        &signature_data_url(12_000),
        "停車證",
        true,
        "student@nkust.edu.tw".to_string(),
        &ValidationRules::default(),
        tz().with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
    )
    .unwrap()
}

#[test]
fn test_entry_date_uses_fixed_offset() {
    let at = tz().with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    assert_eq!(entry_date(&at), "2024/01/02");
}

#[test]
fn test_entry_date_rolls_over_at_local_midnight() {
    // 20:00 UTC on Jan 1 is already Jan 2 at UTC+8
    let utc = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
    let local = utc.with_timezone(&tz());
    assert_eq!(entry_date(&local), "2024/01/02");
}

#[test]
fn test_artifact_filename_format() {
    let submission = sample_submission();
    let filename = artifact_filename(&submission);
    assert!(filename.starts_with("J123456789_王小明_"));
    assert!(filename.ends_with(".pdf"));
    let millis: i64 = filename
        .trim_start_matches("J123456789_王小明_")
        .trim_end_matches(".pdf")
        .parse()
        .unwrap();
    assert_eq!(millis, submission.submitted_at.timestamp_millis());
}

#[test]
fn test_ledger_row_carries_submission_fields() {
    let submission = sample_submission();
    let artifact = StoredArtifact {
        file_id: "f-1".to_string(),
        url: "http://store/f-1".to_string(),
    };
    let row = LedgerRow::new(&submission, "a.pdf", &artifact, "deadbeef");

    assert!(!row.id.is_empty());
    assert_eq!(row.entry_date, "2024/01/02");
    assert_eq!(row.entry_time, "03:04:05");
    assert_eq!(row.submitter_name, "王小明");
    assert_eq!(row.identifier, "J123456789");
    assert_eq!(row.item_category, "停車證");
    assert_eq!(row.submitter_email, "student@nkust.edu.tw");
    assert_eq!(row.artifact_filename, "a.pdf");
    assert_eq!(row.artifact_url, "http://store/f-1");
    assert_eq!(row.content_hash.as_deref(), Some("deadbeef"));
}

#[test]
fn test_content_hash_matches_known_vector() {
    // sha256 of the empty input
    assert_eq!(
        content_hash(b""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn test_identity_policy_normalizes_email() {
    let policy = IdentityPolicy::new(vec!["NKUST.edu.tw".to_string()]);
    assert_eq!(
        policy.verify(Some("  Student@NKUST.EDU.TW ")).unwrap(),
        "student@nkust.edu.tw"
    );
}

#[test]
fn test_identity_policy_rejects_foreign_domain() {
    let policy = IdentityPolicy::new(vec!["nkust.edu.tw".to_string()]);
    assert!(matches!(
        policy.verify(Some("someone@gmail.com")),
        Err(IdentityError::DomainNotAllowed)
    ));
}

#[test]
fn test_identity_policy_requires_email() {
    let policy = IdentityPolicy::new(vec![]);
    assert!(matches!(policy.verify(None), Err(IdentityError::Missing)));
}
