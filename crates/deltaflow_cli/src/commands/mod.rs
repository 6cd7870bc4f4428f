//! CLI command implementations.

pub mod iterate;
pub mod probe;
pub mod sink;
pub mod track;

use clap::{Args, ValueEnum};
use deltaflow_engine::{
    Auth, CancelToken, ClientConfig, ReqwestClient, SyncResult, TrackerConfig,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SINK_URL, MIN_TRACKING_VERSION,
};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Collection tracked when none is given.
pub const DEFAULT_COLLECTION: &str = "TransactionLogEntries";

/// How credentials are presented to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthMode {
    /// Native authentication (HTTP basic).
    #[value(alias = "TM1", alias = "basic")]
    Tm1,
    /// CAM namespace authentication.
    #[value(alias = "CAM")]
    Cam,
}

/// Connection options shared by every command that talks to the server.
#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    /// Service root URL, e.g. https://tm1:8010/api/v1/
    #[arg(long, env = "DELTAFLOW_SERVICE_ROOT_URL")]
    pub service_root_url: String,

    /// User name; no credentials are sent without one
    #[arg(long, env = "DELTAFLOW_USER")]
    pub user: Option<String>,

    /// Password
    #[arg(long, env = "DELTAFLOW_PASSWORD", hide_env_values = true, default_value = "")]
    pub password: String,

    /// Authentication mode
    #[arg(long, value_enum, env = "DELTAFLOW_AUTH", default_value = "tm1")]
    pub auth: AuthMode,

    /// CAM namespace, used with `--auth cam`
    #[arg(long, env = "DELTAFLOW_CAM_NAMESPACE", default_value = "")]
    pub cam_namespace: String,

    /// Verify TLS certificates instead of accepting any
    #[arg(long, env = "DELTAFLOW_VERIFY_TLS")]
    pub verify_tls: bool,

    /// Request timeout in seconds; unset lets bodies stream indefinitely
    #[arg(long, env = "DELTAFLOW_TIMEOUT")]
    pub timeout: Option<u64>,
}

impl ServerArgs {
    /// Builds the credentials from the options.
    pub fn auth(&self) -> Auth {
        let Some(user) = self.user.clone() else {
            return Auth::None;
        };
        match self.auth {
            AuthMode::Tm1 => Auth::Basic {
                user,
                password: self.password.clone(),
            },
            AuthMode::Cam => Auth::CamNamespace {
                user,
                password: self.password.clone(),
                namespace: self.cam_namespace.clone(),
            },
        }
    }

    /// Builds the HTTP client configuration.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new()
            .with_auth(self.auth())
            .with_accept_invalid_certs(!self.verify_tls);
        if let Some(secs) = self.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        config
    }

    /// Builds the HTTP client.
    pub fn client(&self) -> SyncResult<ReqwestClient> {
        ReqwestClient::new(&self.client_config())
    }
}

/// Options for the outbound side and the poll loop.
#[derive(Debug, Clone, Args)]
pub struct SyncArgs {
    /// Collection path relative to the service root
    #[arg(long, default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    /// URL that receives the re-streamed records
    #[arg(long, env = "DELTAFLOW_SINK_URL", default_value = DEFAULT_SINK_URL)]
    pub sink_url: String,

    /// Skip the server version check
    #[arg(long)]
    pub skip_probe: bool,

    /// Minimum server version required for change tracking
    #[arg(long, default_value = MIN_TRACKING_VERSION)]
    pub min_version: String,
}

impl SyncArgs {
    /// Builds the tracker configuration.
    pub fn tracker_config(&self, server: &ServerArgs, verbose: bool) -> TrackerConfig {
        TrackerConfig::new(server.service_root_url.clone(), self.collection.clone())
            .with_sink_url(self.sink_url.clone())
            .with_verbose(verbose)
    }
}

/// Arguments of the `track` command.
#[derive(Debug, Clone, Args)]
pub struct TrackArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    #[command(flatten)]
    pub sync: SyncArgs,

    /// Seconds between delta polls; values below 1 select the default
    #[arg(long, env = "DELTAFLOW_INTERVAL", default_value_t = DEFAULT_POLL_INTERVAL_SECS as i64, allow_negative_numbers = true)]
    pub interval: i64,

    /// Resume from a previously saved delta or next link
    #[arg(long)]
    pub from: Option<String>,
}

/// Arguments of the `iterate` command.
#[derive(Debug, Clone, Args)]
pub struct IterateArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    #[command(flatten)]
    pub sync: SyncArgs,
}

/// Arguments of the `probe` command.
#[derive(Debug, Clone, Args)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Minimum server version required for change tracking
    #[arg(long, default_value = MIN_TRACKING_VERSION)]
    pub min_version: String,
}

/// Arguments of the `sink` command.
#[derive(Debug, Clone, Args)]
pub struct SinkArgs {
    /// Address to listen on
    #[arg(long, env = "DELTAFLOW_SINK_ADDR", default_value = "0.0.0.0:12345")]
    pub addr: String,
}

/// Cancels `token` when the process receives Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancelToken) {
    let spawned = thread::Builder::new()
        .name("deltaflow-signal".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!(error = %e, "cannot listen for Ctrl-C");
                    return;
                }
            };
            if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
                info!("interrupted, stopping");
                token.cancel();
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "cannot listen for Ctrl-C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(user: Option<&str>, auth: AuthMode) -> ServerArgs {
        ServerArgs {
            service_root_url: "https://tm1:8010/api/v1/".into(),
            user: user.map(Into::into),
            password: "apple".into(),
            auth,
            cam_namespace: "LDAP".into(),
            verify_tls: false,
            timeout: None,
        }
    }

    #[test]
    fn no_user_means_no_credentials() {
        assert_eq!(server(None, AuthMode::Cam).auth(), Auth::None);
    }

    #[test]
    fn auth_modes() {
        assert_eq!(
            server(Some("admin"), AuthMode::Tm1).auth(),
            Auth::Basic {
                user: "admin".into(),
                password: "apple".into()
            }
        );
        assert_eq!(
            server(Some("admin"), AuthMode::Cam).auth(),
            Auth::CamNamespace {
                user: "admin".into(),
                password: "apple".into(),
                namespace: "LDAP".into()
            }
        );
    }

    #[test]
    fn client_config_accepts_invalid_certs_by_default() {
        let config = server(None, AuthMode::Tm1).client_config();
        assert!(config.accept_invalid_certs);
        assert!(config.timeout.is_none());
    }
}
