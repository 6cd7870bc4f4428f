//! Server version probe.

use crate::error::{SyncError, SyncResult};
use crate::transport::HttpClient;
use tracing::info;
use url::Url;

/// Path of the product version resource, relative to the service root.
pub const PRODUCT_VERSION_PATH: &str = "Configuration/ProductVersion/$value";

/// Oldest server version that supports change tracking on transaction logs.
pub const MIN_TRACKING_VERSION: &str = "10.2.20500";

/// Number of leading characters of the version that are compared.
const VERSION_PREFIX_LEN: usize = 10;

/// Fetches the server's product version and checks it against `minimum`.
///
/// Versions are compared on their first ten characters, lexically, which is
/// how the server formats them (`11.0.00000.918` and similar).
pub fn probe_version<C: HttpClient + ?Sized>(
    client: &C,
    service_root: &Url,
    minimum: &str,
) -> SyncResult<String> {
    let url = service_root
        .join(PRODUCT_VERSION_PATH)
        .map_err(|e| SyncError::InvalidConfig(format!("cannot build version url: {e}")))?;
    let version = client.get_text(url.as_str())?.trim().to_string();
    info!(%version, "server product version");

    if version_prefix(&version) < version_prefix(minimum) {
        return Err(SyncError::UnsupportedServer {
            version,
            minimum: minimum.into(),
        });
    }
    Ok(version)
}

fn version_prefix(version: &str) -> &str {
    match version.char_indices().nth(VERSION_PREFIX_LEN) {
        Some((end, _)) => &version[..end],
        None => version,
    }
}
