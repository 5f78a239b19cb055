mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{AuthMode, Cli};
use dataverse_exporter::auth::{
    AuthError, CredentialProvider, OpenShiftCredentials, SsoCredentials, SsoEnv,
    StaticCredentials,
};
use dataverse_exporter::config::{FileConfig, DEFAULT_IDENTITY_ID};
use dataverse_exporter::{
    CollectorLoop, ExportError, IngressClient, ServiceConfig, ShutdownKind, ShutdownSignal,
    StopReason,
};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    cli::init_logging(cli.log_level, cli.rich_logs);

    tracing::info!("Starting Lightspeed to Dataverse exporter (mode: {})", cli.mode);

    let mode = cli.mode;
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_failure(&e, mode);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let file = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            FileConfig::load(path)?
        }
        None => FileConfig::default(),
    };

    let provider = credential_provider(&cli, &file)?;
    let credentials = provider.credentials().await?;

    let config = ServiceConfig::resolve(&cli.overrides(), &file, Some(&credentials))?;

    if cli.print_config_and_exit {
        tracing::info!("Printing resolved configuration");
        println!("{}", config.to_json_pretty()?);
        return Ok(());
    }

    let shutdown = ShutdownSignal::new();
    install_signal_handlers(shutdown.clone());

    let client = IngressClient::from_config(&config).context("Failed to create ingress client")?;
    let collector = CollectorLoop::new(config, client, shutdown);

    match collector.run().await? {
        StopReason::Completed => tracing::info!("Single collection cycle finished"),
        StopReason::Shutdown => tracing::info!("Exporter shut down gracefully"),
        StopReason::Interrupted => tracing::info!("Exporter stopped by user"),
    }
    Ok(())
}

fn credential_provider(cli: &Cli, file: &FileConfig) -> Result<Box<dyn CredentialProvider>> {
    let provider: Box<dyn CredentialProvider> = match cli.mode {
        AuthMode::Openshift => Box::new(OpenShiftCredentials::from_cluster()?),
        AuthMode::Sso => {
            let (Some(client_id), Some(client_secret)) = (&cli.client_id, &cli.client_secret)
            else {
                anyhow::bail!("Must specify client id and secret when using sso auth");
            };
            let env = if cli.use_sso_stage() {
                SsoEnv::Stage
            } else {
                SsoEnv::Prod
            };
            Box::new(SsoCredentials::new(
                client_id.clone(),
                client_secret.clone(),
                cli.identity_id.clone(),
                env,
            )?)
        }
        AuthMode::Manual => {
            let token = cli
                .ingress_server_auth_token
                .clone()
                .or_else(|| file.ingress_server_auth_token.clone())
                .unwrap_or_default();
            let identity = cli
                .identity_id
                .clone()
                .or_else(|| file.identity_id.clone())
                .unwrap_or_else(|| DEFAULT_IDENTITY_ID.to_string());
            Box::new(StaticCredentials::new(token, identity)?)
        }
    };
    Ok(provider)
}

/// SIGTERM asks for a final collection; Ctrl-C exits right away.
fn install_signal_handlers(shutdown: ShutdownSignal) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let terminate = shutdown.clone();
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    while stream.recv().await.is_some() {
                        tracing::info!("Shutdown requested, will perform final collection and exit");
                        terminate.request(ShutdownKind::Terminate);
                    }
                });
            }
            Err(e) => tracing::warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping without final collection");
            shutdown.request(ShutdownKind::Interrupt);
        }
    });
}

fn report_failure(err: &anyhow::Error, mode: AuthMode) {
    let auth_error = err.downcast_ref::<AuthError>().or_else(|| {
        match err.downcast_ref::<ExportError>() {
            Some(ExportError::Auth(e)) => Some(e),
            _ => None,
        }
    });

    if let Some(e) = auth_error {
        tracing::error!("Authentication failed: {}", e);
        match mode {
            AuthMode::Openshift => tracing::info!(
                "Ensure the application is running in an OpenShift cluster with proper permissions"
            ),
            AuthMode::Sso => tracing::info!(
                "Ensure CLIENT_ID and CLIENT_SECRET envvars are set to valid SSO service account credentials"
            ),
            AuthMode::Manual => {
                tracing::info!("Provide valid --ingress-server-auth-token and --identity-id")
            }
        }
        return;
    }

    match err.downcast_ref::<ExportError>() {
        Some(ExportError::Config(msg)) => tracing::error!("Invalid config: {}", msg),
        _ => tracing::error!("Error running exporter: {:#}", err),
    }
}
