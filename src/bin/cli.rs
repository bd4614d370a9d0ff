//! clawbridge CLI
//!
//! Command-line front end for discovery, connectivity checks, dataset
//! fetches, agent creation and diagnostics against a gateway.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use console::style;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use clawbridge::config::{self, Config, LogFormat};
use clawbridge::{
    run_diagnostics, Bridge, CliAdapter, ConnectionConfig, CreateAgentRequest, DatasetSpec, Diagnostics, VERSION,
};

#[derive(Parser)]
#[command(
    name = "clawbridge",
    author = "OpenAgent Contributors",
    version = VERSION,
    about = "clawbridge - talk to an agent gateway over whatever transport answers",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Gateway address (http, https, ws, wss or bare host:port)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Gateway token (a leading "Bearer " is ignored)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Gateway password
    #[arg(long, global = true)]
    password: Option<String>,

    /// Session key for tool invocations
    #[arg(long, global = true)]
    session_key: Option<String>,

    /// Connection timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Config file to load instead of the default location
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Do not fall back to the local gateway binary
    #[arg(long, global = true)]
    no_cli: bool,

    /// Print raw JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover gateway version, model, agents and channels
    Discover,

    /// Check whether the gateway accepts our credentials
    Check,

    /// List agents
    Agents,

    /// Fetch a named dataset (agents, channels, sessions, skills, ...)
    Dataset {
        /// Dataset name
        name: String,
        /// Extra JSON arguments for the query
        #[arg(long)]
        args: Option<String>,
    },

    /// Create an agent
    CreateAgent {
        /// Agent name
        name: String,
        /// Workspace directory
        #[arg(long)]
        workspace: Option<String>,
        /// Default model
        #[arg(long, short)]
        model: Option<String>,
        /// Identity emoji
        #[arg(long)]
        emoji: Option<String>,
    },

    /// Narrate a connection attempt step by step
    Diagnose {
        /// Overall deadline in milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,
    },

    /// Show or validate the effective configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets omitted)
    Show,
    /// Report configuration errors and warnings
    Validate,
    /// Write the effective configuration to the config file
    Save,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load(&cli.global)?;

    init_logging(&config);
    debug!("clawbridge {} against {}", VERSION, config.gateway.url);

    let conn = config.gateway.connection();
    let json = cli.global.json;

    match cli.command {
        Commands::Discover => discover(&conn, json).await,
        Commands::Check => check(&config, &conn, json).await,
        Commands::Agents => dataset(&config, &conn, DatasetSpec::named("agents"), json).await,
        Commands::Dataset { name, args } => {
            let mut spec = DatasetSpec::named(&name);
            if let Some(args) = args {
                let args = serde_json::from_str(&args).context("--args must be valid JSON")?;
                spec = spec.with_args(args);
            }
            dataset(&config, &conn, spec, json).await
        }
        Commands::CreateAgent {
            name,
            workspace,
            model,
            emoji,
        } => {
            let request = CreateAgentRequest {
                name,
                workspace,
                model,
                emoji,
            };
            create_agent(&config, &conn, &request, json).await
        }
        Commands::Diagnose { deadline_ms } => {
            let mut settings = config.diagnostics.clone();
            if let Some(ms) = deadline_ms {
                settings.timeout = Duration::from_millis(ms);
            }
            diagnose(&conn, &settings, json).await
        }
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => show_config(&config),
            ConfigAction::Validate => validate(&config),
            ConfigAction::Save => save(&config, cli.global.config.as_deref()),
        },
    }
}

/// Defaults < file < environment < flags
fn load(global: &GlobalArgs) -> anyhow::Result<Config> {
    let mut config = match global.config {
        Some(ref path) => {
            let mut config = config::load_config_from_path(path)?;
            config::apply_env_overrides(&mut config);
            config
        }
        None => config::load_config()?,
    };

    if let Some(ref url) = global.url {
        config.gateway.url = url.clone();
    }
    if let Some(ref token) = global.token {
        config.gateway.token = token.clone().into();
    }
    if let Some(ref password) = global.password {
        config.gateway.password = Some(password.clone().into());
    }
    if let Some(ref key) = global.session_key {
        config.gateway.session_key = key.clone();
    }
    if let Some(ms) = global.timeout_ms {
        config.gateway.timeout = Duration::from_millis(ms);
    }
    if global.no_cli {
        config.cli.enabled = false;
    }
    Ok(config)
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,clawbridge=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.with_target(false).init(),
    }
}

fn bridge(config: &Config, conn: &ConnectionConfig) -> anyhow::Result<Bridge> {
    let cli = config.cli.enabled.then(|| CliAdapter::new(config.cli.clone()));
    Ok(Bridge::new(conn, cli)?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    if diagnostics.is_empty() {
        return;
    }
    println!();
    println!("{}", style("Diagnostics").dim());
    for line in diagnostics.lines() {
        println!("  {}", style(line).dim());
    }
}

async fn discover(conn: &ConnectionConfig, json: bool) -> anyhow::Result<()> {
    let info = clawbridge::discover(conn).await;
    if json {
        return print_json(&info);
    }

    println!("{}", style("Gateway").bold().cyan());
    println!("  URL:      {}", conn.http_base());
    println!("  Version:  {}", info.version);
    if let Some(uptime) = info.uptime {
        println!("  Uptime:   {}s", uptime);
    }
    if let Some(ref model) = info.model {
        println!("  Model:    {}", model);
    }
    if let Some(ref provider) = info.provider {
        println!("  Provider: {}", provider);
    }
    if let Some(count) = info.agent_count {
        println!("  Agents:   {}", count);
    }
    if let Some(count) = info.channel_count {
        println!("  Channels: {}", count);
    }
    match info.error {
        Some(ref error) => println!("\n  {} {}", style("✗").red(), error),
        None => println!("\n  {} discovery complete", style("✓").green()),
    }
    print_diagnostics(&info.diagnostics);
    Ok(())
}

async fn check(config: &Config, conn: &ConnectionConfig, json: bool) -> anyhow::Result<()> {
    let result = bridge(config, conn)?.check_connection().await;
    if json {
        print_json(&result)?;
    } else if result.success {
        println!("{} Connected and authenticated", style("✓").green());
    } else if result.connected {
        println!(
            "{} Gateway answered but the call failed: {}",
            style("!").yellow(),
            result.error.as_deref().unwrap_or("unknown error")
        );
    } else {
        println!(
            "{} Not connected: {}",
            style("✗").red(),
            result.error.as_deref().unwrap_or("unknown error")
        );
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn dataset(config: &Config, conn: &ConnectionConfig, spec: DatasetSpec, json: bool) -> anyhow::Result<()> {
    let name = spec.name.clone();
    let result = bridge(config, conn)?.fetch_dataset(&spec).await;
    if json {
        print_json(&result)?;
    } else {
        if result.success {
            println!(
                "{} {} {} via {}",
                style("✓").green(),
                result.count,
                name,
                style(&result.source).cyan()
            );
            for item in &result.items {
                println!("  - {}", item_label(item));
            }
        } else {
            println!(
                "{} Could not fetch {}: {}",
                style("✗").red(),
                name,
                result.error_details.as_deref().unwrap_or("unknown error")
            );
        }
        print_diagnostics(&result.diagnostics);
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn item_label(item: &serde_json::Value) -> String {
    ["name", "id", "agentId", "key"]
        .iter()
        .find_map(|key| item.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| item.to_string())
}

async fn create_agent(
    config: &Config,
    conn: &ConnectionConfig,
    request: &CreateAgentRequest,
    json: bool,
) -> anyhow::Result<()> {
    let result = bridge(config, conn)?.create_agent(request).await;
    if json {
        print_json(&result)?;
    } else {
        if result.created {
            println!(
                "{} Created agent {}{}",
                style("✓").green(),
                request.name,
                result
                    .agent_id
                    .as_deref()
                    .map(|id| format!(" ({})", id))
                    .unwrap_or_default()
            );
        } else {
            println!(
                "{} Could not create agent {}: {}",
                style("✗").red(),
                request.name,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        print_diagnostics(&result.diagnostics);
    }

    if !result.created {
        std::process::exit(1);
    }
    Ok(())
}

async fn diagnose(
    conn: &ConnectionConfig,
    settings: &clawbridge::config::DiagnosticsConfig,
    json: bool,
) -> anyhow::Result<()> {
    let report = run_diagnostics(conn, settings).await;
    if json {
        return print_json(&report);
    }

    println!("{} {}", style("Diagnostics run").bold().cyan(), style(report.run_id).dim());
    println!("  HTTP:   {}", report.http_url);
    println!("  Socket: {}", report.ws_url);
    println!();
    for line in report.lines() {
        println!("  {}", line);
    }
    println!();

    let mark = |ok: bool| if ok { style("✓").green() } else { style("✗").red() };
    println!("  {} socket", mark(report.socket.success));
    println!("  {} http", mark(report.http.success));
    if report.timed_out {
        println!("  {} stopped at the {:?} deadline", style("!").yellow(), settings.timeout);
    }
    println!(
        "  took {}ms",
        (report.finished_at - report.started_at).num_milliseconds()
    );
    Ok(())
}

fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("{}", style("Configuration").bold().cyan());
    println!("  File:     {}", config::config_path().display());
    println!("  Gateway:  {}", config.gateway.url);
    println!(
        "  Token:    {}",
        if config.gateway.connection().has_token() {
            style("set").green()
        } else {
            style("not set").yellow()
        }
    );
    println!("  Session:  {}", config.gateway.session_key);
    println!("  Timeout:  {:?} (calls {:?})", config.gateway.timeout, config.gateway.call_timeout);
    println!(
        "  CLI:      {}",
        if config.cli.enabled {
            config.cli.command.clone().unwrap_or_else(|| config.cli.binary.clone())
        } else {
            "disabled".to_string()
        }
    );
    println!("  Log:      {} ({:?})", config.log.level, config.log.format);
    Ok(())
}

fn validate(config: &Config) -> anyhow::Result<()> {
    let result = config::validate_config(config);

    for issue in &result.errors {
        println!("{} {}: {}", style("✗").red(), issue.path, issue.message);
        if let Some(ref suggestion) = issue.suggestion {
            println!("    {}", style(suggestion).dim());
        }
    }
    for issue in &result.warnings {
        println!("{} {}: {}", style("!").yellow(), issue.path, issue.message);
        if let Some(ref suggestion) = issue.suggestion {
            println!("    {}", style(suggestion).dim());
        }
    }

    if !result.valid {
        bail!("configuration has {} error(s)", result.errors.len());
    }
    println!("{} Configuration is valid", style("✓").green());
    Ok(())
}

fn save(config: &Config, path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let path = path.map(PathBuf::from).unwrap_or_else(config::config_path);
    config::save_config(config, &path)?;
    println!("{} Saved {}", style("✓").green(), path.display());
    Ok(())
}
