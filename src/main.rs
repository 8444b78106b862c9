use std::convert::Infallible;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Server};
use tracing::info;
use tracing_subscriber::EnvFilter;

use signoff::handlers::{handle_request, AppContext};
use signoff::infrastructure::config::Config;
use signoff::infrastructure::ledger::{Ledger, SqliteLedger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    // Fail fast if the ledger cannot be opened; a submission service
    // with no system of record must not come up.
    let ledger = SqliteLedger::open(&config.ledger_path)?;
    info!(
        path = %config.ledger_path,
        entries = ledger.count_entries()?,
        "ledger opened"
    );
    drop(ledger);

    let addr = config.bind_addr;
    let ctx = Arc::new(AppContext::from_config(config)?);

    let make_service = make_service_fn(move |_conn| {
        let ctx = Arc::clone(&ctx);
        async move {
            Ok::<_, Infallible>(service_fn(move |request: Request<Body>| {
                let ctx = Arc::clone(&ctx);
                async move { Ok::<_, Infallible>(handle_request(ctx, request).await) }
            }))
        }
    });

    info!(%addr, "signoff service listening");
    Server::bind(&addr).serve(make_service).await?;

    Ok(())
}
