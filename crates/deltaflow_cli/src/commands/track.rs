//! Track command implementation.

use super::{cancel_on_ctrl_c, probe, TrackArgs};
use deltaflow_engine::{SyncError, Tracker};
use tracing::info;

/// Runs the track command.
pub fn run(args: &TrackArgs, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let client = args.server.client()?;
    if !args.sync.skip_probe {
        probe::check(&client, &args.server.service_root_url, &args.sync.min_version)?;
    }

    let config = args
        .sync
        .tracker_config(&args.server, verbose)
        .with_poll_interval_secs(args.interval);
    let tracker = Tracker::new(config, client)?;

    let config = tracker.config();
    info!(
        collection = %config.collection,
        sink = %config.sink_url,
        interval = ?config.poll_interval,
        "tracking collection"
    );
    cancel_on_ctrl_c(tracker.cancel_token());

    let result = match &args.from {
        Some(link) => tracker.track_from(link),
        None => tracker.track(),
    };

    match result {
        Ok(summary) => {
            println!(
                "Tracking stopped after {} polls: {} pages, {} records in {:.1}s",
                summary.polls,
                summary.pages,
                summary.records,
                summary.duration.as_secs_f64()
            );
            Ok(())
        }
        Err(SyncError::Cancelled) => {
            let stats = tracker.stats();
            println!(
                "Tracking cancelled after {} polls: {} pages, {} records",
                stats.polls, stats.pages, stats.records_forwarded
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
