//! Assembly entry point: a live telemetry session printing arriving rows
//!
//! Usage: `drivescope [config.json] [key...]`
//! With no arguments, connects to the default local endpoints and watches
//! the `speed` and `rpm` measurements.

use anyhow::Result;
use tracing::info;

use ds_core::{FeedMode, TimeseriesPoint};
use ds_data::{FeedSession, SessionConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config = if args.first().map(|arg| arg.ends_with(".json")).unwrap_or(false) {
        SessionConfig::from_file(args.remove(0))?
    } else {
        SessionConfig::default()
    };
    let keys = if args.is_empty() {
        vec!["speed".to_owned(), "rpm".to_owned()]
    } else {
        args
    };

    let session = FeedSession::new(config);
    let feed = session.create_feed(FeedMode::Live, None)?;
    feed.initialize(&keys).await?;
    info!(keys = ?keys, "live session running, ctrl-c to stop");

    let subscription = feed.measurements().subscribe(|point: &TimeseriesPoint| {
        info!(
            timestamp = point.timestamp,
            values = point.values.len(),
            "live row"
        );
    });

    tokio::signal::ctrl_c().await?;

    drop(subscription);
    feed.close();
    session.shutdown().await;
    Ok(())
}
