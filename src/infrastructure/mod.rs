pub mod config;
pub mod ledger;
pub mod mailer;
pub mod render;
pub mod storage;
