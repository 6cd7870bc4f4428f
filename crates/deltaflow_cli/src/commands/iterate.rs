//! Iterate command implementation.

use super::{cancel_on_ctrl_c, probe, IterateArgs};
use deltaflow_engine::{SyncError, Tracker};

/// Runs the iterate command.
pub fn run(args: &IterateArgs, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let client = args.server.client()?;
    if !args.sync.skip_probe {
        probe::check(&client, &args.server.service_root_url, &args.sync.min_version)?;
    }

    let tracker = Tracker::new(args.sync.tracker_config(&args.server, verbose), client)?;
    cancel_on_ctrl_c(tracker.cancel_token());

    match tracker.iterate() {
        Ok(summary) => {
            println!(
                "Read {} pages, {} records in {:.1}s",
                summary.pages,
                summary.records,
                summary.duration.as_secs_f64()
            );
            Ok(())
        }
        Err(SyncError::Cancelled) => {
            println!("Iteration cancelled");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
