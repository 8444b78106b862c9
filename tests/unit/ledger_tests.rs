use signoff::infrastructure::ledger::{Ledger, LedgerError, SqliteLedger};
use signoff::domain::LedgerRow;

fn row(entry_date: &str, identifier: &str, item_category: &str) -> LedgerRow {
    LedgerRow {
        id: uuid::Uuid::new_v4().to_string(),
        entry_date: entry_date.to_string(),
        entry_time: "03:04:05".to_string(),
        submitter_name: "王小明".to_string(),
        identifier: identifier.to_string(),
        item_category: item_category.to_string(),
        submitter_email: "x@example.com".to_string(),
        artifact_filename: "a.pdf".to_string(),
        artifact_url: "http://store/a.pdf".to_string(),
        content_hash: Some("deadbeef".to_string()),
    }
}

#[test]
fn test_append_and_find() {
    let ledger = SqliteLedger::open_in_memory().unwrap();
    ledger
        .append(&row("2024/01/02", "J123456789", "停車證"))
        .unwrap();

    let found = ledger
        .find_entry("2024/01/02", "J123456789", "停車證")
        .unwrap()
        .unwrap();
    assert_eq!(found.submitter_name, "王小明");
    assert_eq!(found.content_hash.as_deref(), Some("deadbeef"));
}

#[test]
fn test_find_missing_returns_none() {
    let ledger = SqliteLedger::open_in_memory().unwrap();
    let found = ledger
        .find_entry("2024/01/02", "J123456789", "停車證")
        .unwrap();
    assert!(found.is_none());
}

#[test]
fn test_duplicate_key_rejected() {
    let ledger = SqliteLedger::open_in_memory().unwrap();
    ledger
        .append(&row("2024/01/02", "J123456789", "停車證"))
        .unwrap();

    // same dedup key, different row id
    let result = ledger.append(&row("2024/01/02", "J123456789", "停車證"));
    assert!(matches!(result, Err(LedgerError::DuplicateEntry)));
    assert_eq!(ledger.count_entries().unwrap(), 1);
}

#[test]
fn test_different_item_is_not_a_duplicate() {
    let ledger = SqliteLedger::open_in_memory().unwrap();
    ledger
        .append(&row("2024/01/02", "J123456789", "停車證"))
        .unwrap();
    ledger
        .append(&row("2024/01/02", "J123456789", "學生證"))
        .unwrap();
    assert_eq!(ledger.count_entries().unwrap(), 2);
}

#[test]
fn test_different_date_is_not_a_duplicate() {
    let ledger = SqliteLedger::open_in_memory().unwrap();
    ledger
        .append(&row("2024/01/02", "J123456789", "停車證"))
        .unwrap();
    ledger
        .append(&row("2024/01/03", "J123456789", "停車證"))
        .unwrap();
    assert_eq!(ledger.count_entries().unwrap(), 2);
}

#[test]
fn test_schema_survives_reopen() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap().to_string();

    {
        let ledger = SqliteLedger::open(&path).unwrap();
        ledger
            .append(&row("2024/01/02", "J123456789", "停車證"))
            .unwrap();
    }

    let ledger = SqliteLedger::open(&path).unwrap();
    assert_eq!(ledger.count_entries().unwrap(), 1);
    assert!(ledger
        .find_entry("2024/01/02", "J123456789", "停車證")
        .unwrap()
        .is_some());
}
