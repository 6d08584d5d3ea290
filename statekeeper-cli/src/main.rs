use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use statekeeper_core::config::{decode_backend, filter_provider_only_keys};
use statekeeper_core::provisioner::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_INTERVAL};
use statekeeper_core::{
    BackendRecord, BackendSchema, CancelToken, ProvisionOptions, ProvisionReport, ReconcileError,
    Reconciler, RemoteState, StorageProvider, VersioningPolicy, VersioningStatus, WaitPolicy,
};
use statekeeper_provider_azurerm::{AzureRm, AzureRmClient};
use statekeeper_provider_s3::{S3, S3Provider};
use statekeeper_state::LocalMetadata;

#[derive(Parser)]
#[command(name = "statekeeper")]
#[command(about = "Keeps remote state backends in line with their configuration", long_about = None)]
struct Cli {
    /// Working directory holding the .terraform metadata
    #[arg(short = 'C', long, global = true, default_value = ".")]
    chdir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether the backend must be re-initialized
    Check {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Provision the backend storage and print the backend init arguments
    Init {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Print the configuration forwarded to the backend (no remote calls)
    Args {
        #[command(flatten)]
        input: InputArgs,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Path to the remote_state JSON file
    #[arg(long, short, default_value = "remote_state.json")]
    config: PathBuf,
}

#[derive(Args)]
struct EngineArgs {
    /// Enable versioning when it is disabled instead of warning
    #[arg(long, env = "STATEKEEPER_ENFORCE_VERSIONING")]
    enforce_versioning: bool,

    /// Existence checks after creating the storage resource
    #[arg(long, env = "STATEKEEPER_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Seconds between existence checks
    #[arg(long, env = "STATEKEEPER_RETRY_INTERVAL", default_value_t = DEFAULT_RETRY_INTERVAL.as_secs())]
    retry_interval: u64,

    /// Give up after this many seconds
    #[arg(long, env = "STATEKEEPER_TIMEOUT")]
    timeout: Option<u64>,
}

impl EngineArgs {
    fn options(&self) -> ProvisionOptions {
        ProvisionOptions {
            wait: WaitPolicy {
                max_attempts: self.max_attempts,
                interval: Duration::from_secs(self.retry_interval),
            },
            versioning: if self.enforce_versioning {
                VersioningPolicy::Enforce
            } else {
                VersioningPolicy::Warn
            },
        }
    }

    fn cancel_token(&self) -> CancelToken {
        match self.timeout {
            Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
            None => CancelToken::new(),
        }
    }
}

/// What to do once a reconciler for the backend exists
enum Action {
    Check,
    Init(ProvisionOptions, CancelToken),
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { input } => run(&cli.chdir, &input.config, Action::Check).await,
        Commands::Init { input, engine } => {
            let action = Action::Init(engine.options(), engine.cancel_token());
            run(&cli.chdir, &input.config, action).await
        }
        Commands::Args { input } => run_args(&cli.chdir, &input.config),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Load a remote_state block from JSON, relative to the working directory
fn load_remote_state(chdir: &Path, path: &Path) -> anyhow::Result<RemoteState> {
    let path = chdir.join(path);
    let content =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let remote_state = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(remote_state)
}

/// Provisioning-only keys of a backend type
fn provider_only_keys(backend: &str) -> Result<&'static [&'static str], ReconcileError> {
    match backend {
        "azurerm" => Ok(AzureRm::PROVIDER_ONLY_KEYS),
        "s3" => Ok(S3::PROVIDER_ONLY_KEYS),
        other => Err(ReconcileError::UnsupportedBackend(other.to_string())),
    }
}

fn run_args(chdir: &Path, config: &Path) -> anyhow::Result<()> {
    let remote_state = load_remote_state(chdir, config)?;
    let keys = provider_only_keys(&remote_state.backend)?;
    let filtered = filter_provider_only_keys(&remote_state.config, keys);
    println!("{}", serde_json::to_string_pretty(&filtered)?);
    Ok(())
}

async fn run(chdir: &Path, config: &Path, action: Action) -> anyhow::Result<()> {
    let remote_state = load_remote_state(chdir, config)?;
    let existing = LocalMetadata::new(chdir).backend_record()?;

    match remote_state.backend.as_str() {
        "azurerm" => {
            let backend = decode_backend::<AzureRm>(&remote_state.config)?;
            let client = AzureRmClient::from_backend(&backend)
                .map_err(|e| ReconcileError::remote("create Azure client", e))?;
            execute(Reconciler::<AzureRm, _>::new(client), &remote_state, existing, action).await
        }
        "s3" => {
            let backend = decode_backend::<S3>(&remote_state.config)?;
            let provider = S3Provider::from_backend(&backend).await;
            execute(Reconciler::<S3, _>::new(provider), &remote_state, existing, action).await
        }
        other => Err(ReconcileError::UnsupportedBackend(other.to_string()).into()),
    }
}

async fn execute<S, P>(
    reconciler: Reconciler<S, P>,
    remote_state: &RemoteState,
    existing: Option<BackendRecord>,
    action: Action,
) -> anyhow::Result<()>
where
    S: BackendSchema,
    P: StorageProvider<S>,
{
    match action {
        Action::Check => {
            let needed = reconciler
                .needs_initialization(remote_state, existing.as_ref())
                .await?;
            print_reinit(needed);
        }
        Action::Init(options, cancel) => {
            let reconciler = reconciler.with_options(options).with_cancel_token(cancel);
            let result = reconciler.reconcile(remote_state, existing.as_ref()).await?;
            print_report(&result.report);
            print_reinit(result.needs_reinit);
            println!("{}", serde_json::to_string_pretty(&result.init_args)?);
        }
    }
    Ok(())
}

fn print_reinit(needed: bool) {
    if needed {
        println!("{}", "Backend needs initialization".yellow().bold());
    } else {
        println!("{}", "Backend is up to date".green().bold());
    }
}

fn print_report(report: &ProvisionReport) {
    if report.created {
        println!("{} storage resource created", "+".green().bold());
    }
    if report.secured {
        println!("{} security settings updated", "~".yellow().bold());
    }
    match report.versioning {
        VersioningStatus::Enabled => println!("{} versioning enabled", "~".yellow().bold()),
        VersioningStatus::Disabled => {
            println!("{} versioning is disabled", "!".red().bold())
        }
        VersioningStatus::AlreadyEnabled | VersioningStatus::Skipped => {}
    }
    if report.labels_applied {
        println!("{} tags applied", "~".yellow().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_only_keys_dispatch() {
        assert!(provider_only_keys("azurerm").unwrap().contains(&"tags"));
        assert!(provider_only_keys("s3").unwrap().contains(&"s3_bucket_tags"));
        assert!(matches!(
            provider_only_keys("gcs"),
            Err(ReconcileError::UnsupportedBackend(name)) if name == "gcs"
        ));
    }

    #[test]
    fn test_load_remote_state() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(
            temp_dir.path().join("remote_state.json"),
            r#"{"backend": "azurerm", "config": {"storage_account_name": "acct1", "tags": {"env": "prod"}}}"#,
        )
        .unwrap();

        let remote_state =
            load_remote_state(temp_dir.path(), Path::new("remote_state.json")).unwrap();
        assert_eq!(remote_state.backend, "azurerm");
        assert!(!remote_state.disable_init);
        assert_eq!(remote_state.config.len(), 2);
    }

    #[test]
    fn test_load_remote_state_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = load_remote_state(temp_dir.path(), Path::new("missing.json")).unwrap_err();
        assert!(err.to_string().starts_with("Failed to read"));
    }

    #[test]
    fn test_engine_args_options() {
        let cli = Cli::parse_from([
            "statekeeper",
            "init",
            "--enforce-versioning",
            "--max-attempts",
            "3",
            "--retry-interval",
            "1",
        ]);

        match cli.command {
            Commands::Init { engine, .. } => {
                let options = engine.options();
                assert_eq!(options.versioning, VersioningPolicy::Enforce);
                assert_eq!(options.wait.max_attempts, 3);
                assert_eq!(options.wait.interval, Duration::from_secs(1));
            }
            _ => panic!("Expected init command"),
        }
    }
}
