use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::mpsc::unbounded_channel;
use tunehub_core::{init_logging, AppDirs, Config, LogLevel};
use tunehub_plugin::LoadReport;
use tunehub_runtime::{serve, Hub, Transport};

#[derive(Debug, Parser)]
#[command(name = "tunehub", version, about = "Music hub runtime")]
struct Cli {
    /// Config file (defaults to config.toml in the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Plugins directory override (takes precedence over config)
    #[arg(long, global = true)]
    plugins_dir: Option<PathBuf>,
    /// Log level override: trace, debug, info, warn or error
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve JSON-lines requests on stdin, frames on stdout (the default)
    Serve,
    /// Plugin management commands
    #[command(subcommand)]
    Plugins(PluginsCommand),
}

#[derive(Debug, Subcommand)]
enum PluginsCommand {
    /// Load every plugin and list what it registered
    List,
}

/// Configuration after command-line overrides.
#[derive(Debug)]
struct Settings {
    config: Config,
    plugins_dir: PathBuf,
}

impl Cli {
    fn settings(&self, dirs: &AppDirs) -> Result<Settings> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load_or_default(dirs)?,
        };
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        let plugins_dir = self
            .plugins_dir
            .clone()
            .unwrap_or_else(|| config.plugins_dir(dirs));
        Ok(Settings {
            config,
            plugins_dir,
        })
    }
}

fn start_hub(settings: &Settings) -> Result<(Hub, LoadReport)> {
    let hub = Hub::from_config(&settings.config)?;
    hub.register_builtin(files_plugin::manifest(), files_plugin::register)
        .context("failed to register the built-in files plugin")?;
    let report = hub.load_plugins(&settings.plugins_dir);
    for (dir, err) in &report.errors {
        tracing::warn!(path = %dir.display(), error = %err, "plugin skipped");
    }
    Ok((hub, report))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = AppDirs::discover()?;
    let settings = cli.settings(&dirs)?;
    let _logging = init_logging(&settings.config.logging, &dirs)?;

    tracing::info!(
        config_dir = %dirs.config_dir().display(),
        plugins_dir = %settings.plugins_dir.display(),
        "starting tunehub"
    );
    let (hub, report) = start_hub(&settings)?;

    match cli.command {
        Some(Command::Plugins(PluginsCommand::List)) => print_plugins(&hub, &report),
        Some(Command::Serve) | None => run_stdio(&hub)?,
    }
    Ok(())
}

fn run_stdio(hub: &Hub) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .context("failed to build the transport runtime")?;
    let (frames, rx) = unbounded_channel();
    let transport = Transport::new(hub.browsers().clone(), hub.playback().clone(), frames);
    runtime.block_on(serve(tokio::io::stdin(), tokio::io::stdout(), transport, rx))?;
    tracing::info!("input closed, shutting down");
    Ok(())
}

fn print_plugins(hub: &Hub, report: &LoadReport) {
    println!("Plugins:");
    println!("  - files (built-in)");
    for name in &report.loaded {
        println!("  - {name}");
    }
    for (dir, err) in &report.errors {
        println!("  ! {}: {err}", dir.display());
    }

    println!("Browsers:");
    for (id, info) in hub.browsers().list() {
        println!("  - {id}: {}", info.name);
    }
    println!("Players:");
    for (id, info) in hub.playback().players().list() {
        println!("  - {id}: {}", info.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["tunehub"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["tunehub", "plugins", "list", "--log-level", "debug"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Plugins(PluginsCommand::List))
        ));
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        assert!(Cli::try_parse_from(["tunehub", "--log-level", "loud"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let root = tempfile::tempdir().unwrap();
        let dirs = AppDirs::from_root(root.path());
        let config_path = root.path().join("custom.toml");
        std::fs::write(
            &config_path,
            r#"
plugins_dir = "/from/config"

[logging]
level = "warn"
"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "tunehub",
            "--config",
            config_path.to_str().unwrap(),
            "--log-level",
            "trace",
        ])
        .unwrap();
        let settings = cli.settings(&dirs).unwrap();
        assert_eq!(settings.config.logging.level, LogLevel::Trace);
        assert_eq!(settings.plugins_dir, PathBuf::from("/from/config"));

        let cli = Cli::try_parse_from(["tunehub", "--plugins-dir", "/from/flag"]).unwrap();
        let settings = cli.settings(&dirs).unwrap();
        assert_eq!(settings.plugins_dir, PathBuf::from("/from/flag"));
        assert_eq!(settings.config.logging.level, LogLevel::Info);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let dirs = AppDirs::from_root(root.path());
        let cli = Cli::try_parse_from(["tunehub", "--config", "/no/such/config.toml"]).unwrap();
        assert!(cli.settings(&dirs).is_err());
    }

    #[test]
    fn hub_starts_with_builtin_files_plugin() {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings {
            config: Config::default(),
            plugins_dir: root.path().join("plugins"),
        };
        let (hub, report) = start_hub(&settings).unwrap();
        assert!(report.loaded.is_empty());
        assert!(report.is_clean());
        assert!(hub.browsers().has(files_plugin::BROWSER_ID));
        assert!(hub.playback().players().has(files_plugin::PLAYER_ID));
    }
}
