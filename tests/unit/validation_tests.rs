use base64::Engine;
use chrono::{FixedOffset, TimeZone};
use signoff::domain::{Submission, ValidationError, ValidationRules};

fn now() -> chrono::DateTime<FixedOffset> {
    FixedOffset::east_opt(8 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
        .unwrap()
}

fn signature_data_url(bytes: usize) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(vec![0u8; bytes]);
    format!("data:image/png;base64,{b64}")
}

fn submit(
    name: &str,
    identifier: &str,
    signature: &str,
    consent: bool,
) -> Result<Submission, ValidationError> {
    Submission::new(
        name,
        identifier,
        signature,
        "停車證",
        consent,
        "x@example.com".to_string(),
        &ValidationRules::default(),
        now(),
    )
}

#[test]
fn test_valid_submission_passes() {
    let result = submit("王小明", "J123456789", &signature_data_url(12_000), true);
    assert!(result.is_ok());
}

#[test]
fn test_missing_fields_rejected() {
    let sig = signature_data_url(12_000);
    assert!(matches!(
        submit("", "J123456789", &sig, true),
        Err(ValidationError::MissingField)
    ));
    assert!(matches!(
        submit("   ", "J123456789", &sig, true),
        Err(ValidationError::MissingField)
    ));
    assert!(matches!(
        submit("王小明", "", &sig, true),
        Err(ValidationError::MissingField)
    ));
    assert!(matches!(
        submit("王小明", "J123456789", "", true),
        Err(ValidationError::MissingField)
    ));
}

#[test]
fn test_consent_required() {
    assert!(matches!(
        submit("王小明", "J123456789", &signature_data_url(12_000), false),
        Err(ValidationError::MissingField)
    ));
}

#[test]
fn test_name_length_limit() {
    let sig = signature_data_url(12_000);
    let fifty = "王".repeat(50);
    assert!(submit(&fifty, "J123456789", &sig, true).is_ok());

    let fifty_one = "王".repeat(51);
    assert!(matches!(
        submit(&fifty_one, "J123456789", &sig, true),
        Err(ValidationError::NameTooLong)
    ));
}

#[test]
fn test_identifier_prefix_not_in_rules_rejected() {
    let sig = signature_data_url(12_000);
    assert!(matches!(
        submit("王小明", "A123456789", &sig, true),
        Err(ValidationError::BadIdentifier)
    ));
    assert!(matches!(
        submit("王小明", "J12345678", &sig, true),
        Err(ValidationError::BadIdentifier)
    ));
    assert!(matches!(
        submit("王小明", "J12345678X", &sig, true),
        Err(ValidationError::BadIdentifier)
    ));
}

#[test]
fn test_identifier_prefixes_are_configurable() {
    let rules = ValidationRules {
        id_prefixes: vec!['A', 'J'],
    };
    let result = Submission::new(
        "王小明",
        "A123456789",
        &signature_data_url(12_000),
        "停車證",
        true,
        "x@example.com".to_string(),
        &rules,
        now(),
    );
    assert!(result.is_ok());
}

#[test]
fn test_signature_must_be_image_data_url() {
    assert!(matches!(
        submit("王小明", "J123456789", "not-a-data-url", true),
        Err(ValidationError::BadSignature)
    ));
    assert!(matches!(
        submit("王小明", "J123456789", "data:text/plain;base64,QUFBQQ==", true),
        Err(ValidationError::BadSignature)
    ));
}

#[test]
fn test_signature_size_bounds_are_inclusive() {
    // one byte under the floor fails, the floor itself passes
    assert!(matches!(
        submit("王小明", "J123456789", &signature_data_url(9_999), true),
        Err(ValidationError::SignatureTooSmall)
    ));
    assert!(submit("王小明", "J123456789", &signature_data_url(10_000), true).is_ok());

    assert!(matches!(
        submit("王小明", "J123456789", &signature_data_url(5_000_001), true),
        Err(ValidationError::SignatureTooLarge)
    ));
}

#[test]
fn test_validation_messages_are_user_facing() {
    let err = submit("王小明", "J123456789", &signature_data_url(1), true).unwrap_err();
    assert_eq!(err.to_string(), "簽名內容過小，請重新簽名");
}
