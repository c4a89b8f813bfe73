//! browser-control CLI.
//!
//! Exit codes: 0 success, 1 runtime failure, 2 validation or configuration
//! failure.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use browser_control::{config, ControlError, ErrorCode, Server};

#[derive(Parser)]
#[command(
    name = "browser-control",
    version,
    about = "Pooled browser sessions behind authenticated tool dispatch"
)]
struct Cli {
    /// Path to a flat JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the server in the foreground until interrupted.
    Start,
    /// Signal a running daemon (via its PID file) to stop.
    Stop,
    /// Stop the daemon, then start in the foreground.
    Restart,
    /// Report whether the daemon is running.
    Status,
    /// Inspect or manage sessions of a local transient instance.
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
    /// Show, edit, or validate the configuration file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Evaluate one health view locally.
    Health {
        #[command(subcommand)]
        view: HealthView,
    },
    /// Print a metrics snapshot.
    Metrics {
        /// Refresh every two seconds until interrupted.
        #[arg(long)]
        watch: bool,
    },
    /// Create the artifact directories and a starter configuration file.
    Setup,
}

#[derive(Subcommand)]
enum SessionsCommand {
    List,
    Kill { id: String },
    Cleanup,
}

#[derive(Subcommand)]
enum ConfigCommand {
    Show,
    Edit,
    Validate,
}

#[derive(Subcommand)]
enum HealthView {
    Liveness,
    Readiness,
    Startup,
}

fn exit_code_for(err: &ControlError) -> ExitCode {
    match err.code() {
        ErrorCode::Validation => ExitCode::from(2),
        _ => ExitCode::from(1),
    }
}

fn init_tracing(level: config::LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("browser_control={}", level.as_str())));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn default_config_path() -> PathBuf {
    PathBuf::from("browser-control.json")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let load = match config::load(cli.config.as_deref()) {
        Ok(load) => load,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(2);
        }
    };
    init_tracing(load.config.log_level);

    let result = match cli.command {
        Command::Start => run_server(load).await,
        Command::Stop => stop_daemon(&load),
        Command::Restart => match stop_daemon(&load) {
            Ok(_) => run_server(load).await,
            Err(err) => Err(err),
        },
        Command::Status => status(&load),
        Command::Sessions { command } => sessions(load, command).await,
        Command::Config { command } => config_command(cli.config.as_deref(), load, command),
        Command::Health { view } => health(load, view).await,
        Command::Metrics { watch } => metrics(load, watch).await,
        Command::Setup => setup(cli.config.as_deref(), &load),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            error!(%err, "command failed");
            eprintln!("error: {err}");
            exit_code_for(&err)
        }
    }
}

async fn run_server(load: config::ConfigLoad) -> Result<ExitCode, ControlError> {
    let pid_file = load.config.pid_file.clone();
    if let Some(path) = &pid_file {
        std::fs::write(path, std::process::id().to_string())
            .map_err(|err| ControlError::internal(format!("cannot write PID file: {err}")))?;
    }

    let server = Server::start(load).await?;
    info!(tools = server.tool_names().len(), "serving; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| ControlError::internal(format!("signal handler failed: {err}")))?;

    server.shutdown().await;
    if let Some(path) = &pid_file {
        let _ = std::fs::remove_file(path);
    }
    Ok(ExitCode::SUCCESS)
}

fn read_pid(load: &config::ConfigLoad) -> Result<u32, ControlError> {
    let path = load
        .config
        .pid_file
        .clone()
        .unwrap_or_else(|| PathBuf::from("browser-control.pid"));
    let body = std::fs::read_to_string(&path).map_err(|err| {
        ControlError::internal(format!("no PID file at {}: {err}", path.display()))
    })?;
    body.trim()
        .parse()
        .map_err(|_| ControlError::internal(format!("PID file {} is corrupt", path.display())))
}

#[cfg(unix)]
fn signal_pid(pid: u32, check_only: bool) -> bool {
    let mut cmd = std::process::Command::new("kill");
    if check_only {
        cmd.arg("-0");
    }
    cmd.arg(pid.to_string())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn signal_pid(_pid: u32, _check_only: bool) -> bool {
    false
}

fn stop_daemon(load: &config::ConfigLoad) -> Result<ExitCode, ControlError> {
    let pid = read_pid(load)?;
    if signal_pid(pid, false) {
        println!("sent termination signal to {pid}");
        Ok(ExitCode::SUCCESS)
    } else {
        Err(ControlError::internal(format!(
            "process {pid} is not running"
        )))
    }
}

fn status(load: &config::ConfigLoad) -> Result<ExitCode, ControlError> {
    match read_pid(load) {
        Ok(pid) if signal_pid(pid, true) => {
            println!("running (pid {pid})");
            Ok(ExitCode::SUCCESS)
        }
        Ok(pid) => {
            println!("not running (stale PID file for {pid})");
            Ok(ExitCode::from(1))
        }
        Err(_) => {
            println!("not running");
            Ok(ExitCode::from(1))
        }
    }
}

/// Assemble a transient in-process instance for the local inspection
/// commands. No sessions are prewarmed and nothing is left running.
async fn transient_server(
    mut load: config::ConfigLoad,
) -> Result<std::sync::Arc<Server>, ControlError> {
    load.config.pool.min_size = 0;
    load.config.pool.prewarm_count = 0;
    Server::start(load).await
}

async fn sessions(
    load: config::ConfigLoad,
    command: SessionsCommand,
) -> Result<ExitCode, ControlError> {
    let server = transient_server(load).await?;
    let outcome = match command {
        SessionsCommand::List => {
            let rows = server.sessions().list();
            println!("{}", serde_json::to_string_pretty(&rows).unwrap_or_default());
            Ok(ExitCode::SUCCESS)
        }
        SessionsCommand::Kill { id } => {
            if server.sessions().destroy_session(&id).await {
                println!("killed {id}");
                Ok(ExitCode::SUCCESS)
            } else {
                Err(ControlError::SessionNotFound { id })
            }
        }
        SessionsCommand::Cleanup => {
            server.pool().force_cleanup().await;
            println!("cleanup complete");
            Ok(ExitCode::SUCCESS)
        }
    };
    server.shutdown_with_deadline(Duration::from_secs(1)).await;
    outcome
}

fn config_command(
    path: Option<&std::path::Path>,
    load: config::ConfigLoad,
    command: ConfigCommand,
) -> Result<ExitCode, ControlError> {
    match command {
        ConfigCommand::Show => {
            // Secret material never leaves the process; keys show as
            // prefixes only.
            let auth = &load.config.auth;
            let api_keys: Vec<_> = auth
                .api_keys
                .iter()
                .map(|k| {
                    serde_json::json!({
                        "key_prefix": browser_control::auth::key_prefix(&k.key),
                        "identity": k.identity,
                        "roles": k.roles,
                    })
                })
                .collect();
            let shown = serde_json::json!({
                "BROWSER_TYPE": load.config.browser_type,
                "HEADLESS": load.config.headless,
                "MAX_CONCURRENT_SESSIONS": load.config.max_concurrent_sessions,
                "SESSION_TIMEOUT": load.config.session_timeout.as_millis() as u64,
                "LOG_LEVEL": load.config.log_level,
                "PORT": load.config.port,
                "WEBDRIVER_ENDPOINT": load.config.webdriver_endpoint,
                "AUTH_ENABLED": auth.enabled,
                "AUTH_PROVIDERS": auth.providers,
                "API_KEYS": api_keys,
                "BEARER_CONFIGURED": auth.bearer.is_some(),
            });
            println!("{}", serde_json::to_string_pretty(&shown).unwrap_or_default());
            Ok(ExitCode::SUCCESS)
        }
        ConfigCommand::Validate => {
            load.config.validate()?;
            for issue in &load.issues {
                println!("note: {issue}");
            }
            println!("configuration is valid");
            Ok(ExitCode::SUCCESS)
        }
        ConfigCommand::Edit => {
            let path = path
                .map(std::path::Path::to_path_buf)
                .unwrap_or_else(default_config_path);
            let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
            let status = std::process::Command::new(editor)
                .arg(&path)
                .status()
                .map_err(|err| ControlError::internal(format!("cannot launch editor: {err}")))?;
            if status.success() {
                // Re-validate what the operator wrote.
                config::load(Some(&path))?;
                Ok(ExitCode::SUCCESS)
            } else {
                Err(ControlError::internal("editor exited with failure"))
            }
        }
    }
}

async fn health(load: config::ConfigLoad, view: HealthView) -> Result<ExitCode, ControlError> {
    let server = transient_server(load).await?;
    let report = match view {
        HealthView::Liveness => server.health().liveness().await,
        HealthView::Readiness => server.health().readiness().await,
        HealthView::Startup => server.health().startup().await,
    };
    println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
    let code = match report.status {
        browser_control::HealthStatus::Unhealthy => ExitCode::from(1),
        _ => ExitCode::SUCCESS,
    };
    server.shutdown_with_deadline(Duration::from_secs(1)).await;
    Ok(code)
}

async fn metrics(load: config::ConfigLoad, watch: bool) -> Result<ExitCode, ControlError> {
    let server = transient_server(load).await?;
    loop {
        let snapshot = serde_json::json!({
            "pool": server.pool().counts(),
            "sessions": server.sessions().metrics(),
            "in_flight": server.lifecycle().in_flight(),
        });
        println!("{}", serde_json::to_string_pretty(&snapshot).unwrap_or_default());
        if !watch {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(2)) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    server.shutdown_with_deadline(Duration::from_secs(1)).await;
    Ok(ExitCode::SUCCESS)
}

fn setup(
    path: Option<&std::path::Path>,
    load: &config::ConfigLoad,
) -> Result<ExitCode, ControlError> {
    let artifact_base = load
        .config
        .artifact_base
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    for dir in ["screenshots", "pagecache", "reports"] {
        let path = artifact_base.join("browser-control").join(dir);
        std::fs::create_dir_all(&path)
            .map_err(|err| ControlError::internal(format!("cannot create {path:?}: {err}")))?;
        println!("created {}", path.display());
    }

    let config_path = path
        .map(std::path::Path::to_path_buf)
        .unwrap_or_else(default_config_path);
    if config_path.exists() {
        println!("configuration file {} already exists", config_path.display());
    } else {
        let starter = serde_json::json!({
            "BROWSER_TYPE": "chromium",
            "HEADLESS": true,
            "MAX_CONCURRENT_SESSIONS": 10,
            "SESSION_TIMEOUT": 300000,
            "LOG_LEVEL": "info",
            "PORT": 3333,
            "WEBDRIVER_ENDPOINT": "http://localhost:4444",
            "AUTH_ENABLED": false
        });
        std::fs::write(
            &config_path,
            serde_json::to_string_pretty(&starter).unwrap_or_default(),
        )
        .map_err(|err| ControlError::internal(format!("cannot write starter config: {err}")))?;
        println!("wrote {}", config_path.display());
    }
    Ok(ExitCode::SUCCESS)
}
