mod domain_tests;
mod ledger_tests;
mod render_tests;
mod validation_tests;
