//! Probe command implementation.

use super::ProbeArgs;
use deltaflow_engine::{parse_service_root, probe_version, HttpClient, SyncError, SyncResult};

/// Runs the probe command.
pub fn run(args: &ProbeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let client = args.server.client()?;
    match check(&client, &args.server.service_root_url, &args.min_version) {
        Ok(version) => {
            println!("Server version: {version}");
            println!("✓ Change tracking supported (>= {})", args.min_version);
            Ok(())
        }
        Err(SyncError::UnsupportedServer { version, minimum }) => {
            println!("Server version: {version}");
            println!("✗ Change tracking requires at least {minimum}");
            Err("Unsupported server".into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Checks that the server at `service_root` is at least `minimum`.
pub fn check<C: HttpClient>(client: &C, service_root: &str, minimum: &str) -> SyncResult<String> {
    let root = parse_service_root(service_root)?;
    probe_version(client, &root, minimum)
}
