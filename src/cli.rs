use clap::{Parser, ValueEnum};
use dataverse_exporter::config::ConfigOverrides;
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const SSO_STAGE_ENV: &str = "USE_SSO_STAGE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthMode {
    /// In-cluster OpenShift auth (pull secret + cluster ID)
    Openshift,
    /// SSO service-account auth
    Sso,
    /// Explicit token and identity
    Manual,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Openshift => write!(f, "openshift"),
            AuthMode::Sso => write!(f, "sso"),
            AuthMode::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    #[value(name = "DEBUG")]
    Debug,
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARNING")]
    Warning,
    #[value(name = "ERROR")]
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "dataverse-exporter",
    version,
    about = "Lightspeed to Dataverse data exporter",
    long_about = "Collects feedback and transcript JSON files from a data directory, \
                  packs them into gzip tarballs and uploads them to the ingress service."
)]
pub struct Cli {
    /// Authentication mode
    #[arg(long, value_enum, default_value_t = AuthMode::Manual)]
    pub mode: AuthMode,

    /// Path to YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory containing data to export
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Service identifier for the data export
    #[arg(long)]
    pub service_id: Option<String>,

    /// URL of the ingress server to send data to
    #[arg(long)]
    pub ingress_server_url: Option<String>,

    /// Authentication token for the ingress server (manual mode)
    #[arg(long, env = "INGRESS_SERVER_AUTH_TOKEN", hide_env_values = true)]
    pub ingress_server_auth_token: Option<String>,

    /// Identity identifier for the data export
    #[arg(long)]
    pub identity_id: Option<String>,

    /// Collection interval in seconds (0 = run once and exit)
    #[arg(long)]
    pub collection_interval: Option<u64>,

    /// Connection timeout for the ingress server in seconds
    #[arg(long)]
    pub ingress_connection_timeout: Option<u64>,

    /// Retry interval in seconds when collection fails
    #[arg(long)]
    pub retry_interval: Option<u64>,

    /// Do not clean up files after successful send
    #[arg(long)]
    pub no_cleanup: bool,

    /// Subdirectories to collect from (space-separated); all when omitted
    #[arg(long, num_args = 0..)]
    pub allowed_subdirs: Option<Vec<String>>,

    /// Logging level
    #[arg(long, value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Colored multi-line log output
    #[arg(long)]
    pub rich_logs: bool,

    /// SSO client ID (sso mode)
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: Option<String>,

    /// SSO client secret (sso mode)
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Use the stage SSO and API environment (also selected by USE_SSO_STAGE)
    #[arg(long)]
    pub sso_stage: bool,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    pub print_config_and_exit: bool,
}

impl Cli {
    /// Stage is selected by the flag or by `USE_SSO_STAGE` being set at all.
    pub fn use_sso_stage(&self) -> bool {
        stage_requested(self.sso_stage, env::var_os(SSO_STAGE_ENV))
    }

    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            data_dir: self.data_dir.clone(),
            service_id: self.service_id.clone(),
            ingress_server_url: self.ingress_server_url.clone(),
            ingress_server_auth_token: self.ingress_server_auth_token.clone(),
            identity_id: self.identity_id.clone(),
            collection_interval: self.collection_interval,
            ingress_connection_timeout: self.ingress_connection_timeout,
            retry_interval: self.retry_interval,
            no_cleanup: self.no_cleanup,
            allowed_subdirs: self.allowed_subdirs.clone(),
        }
    }
}

fn stage_requested(flag: bool, env_value: Option<OsString>) -> bool {
    flag || env_value.is_some()
}

/// Logs go to stderr so `--print-config-and-exit` output stays clean.
pub fn init_logging(level: LogLevel, rich: bool) {
    // HTTP client internals are only interesting when explicitly asked for
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},hyper=warn,hyper_util=warn,reqwest=warn,h2=warn,rustls=warn",
            level.directive()
        ))
    });

    if rich {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .pretty()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true)
            .init();
    }
}
