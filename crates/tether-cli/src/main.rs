//! Tether - resumable file-transfer server
//!
//! Serves files over TCP and UDP to clients that identify themselves on connect, and picks
//! interrupted transfers back up when the same client reconnects.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tether_config::{Config, ConfigLoader};
use tether_server::Server;
use tracing::info;

/// Tether - resumable file-transfer server
#[derive(Parser)]
#[command(
    name = "tether",
    version = env!("CARGO_PKG_VERSION"),
    about = "Resumable TCP/UDP file-transfer server",
    long_about = "Tether serves files to clients that declare an identity when they connect.\n\
                  Commands arrive one per line over TCP; files move over TCP or UDP, and a\n\
                  transfer whose link breaks resumes when the same client connects again."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - errors only
    #[arg(short, long)]
    quiet: bool,

    /// Verbose mode - informational logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server
    Serve(ServeArgs),
    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
        /// Output format
        #[arg(long, value_enum, default_value = "toml")]
        format: FormatArg,
    },
}

#[derive(clap::Args, Default)]
struct ServeArgs {
    /// Address to bind both sockets to
    #[arg(short, long)]
    bind: Option<String>,
    /// TCP port
    #[arg(short, long)]
    port: Option<u16>,
    /// UDP port, defaults to the TCP port
    #[arg(long)]
    udp_port: Option<u16>,
    /// Directory relative file names resolve against
    #[arg(short, long)]
    root: Option<PathBuf>,
    /// Seconds an interrupted transfer waits for its client
    #[arg(long)]
    reconnect_timeout: Option<u64>,
}

impl ServeArgs {
    fn apply(self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.server.bind_addr = bind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if self.udp_port.is_some() {
            config.server.udp_port = self.udp_port;
        }
        if let Some(root) = self.root {
            config.server.file_root = root;
        }
        if let Some(secs) = self.reconnect_timeout {
            config.transfer.reconnect_timeout_secs = secs;
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FormatArg {
    Toml,
    Yaml,
    Json,
}

impl FormatArg {
    fn file_name(self) -> &'static Path {
        Path::new(match self {
            FormatArg::Toml => "tether.toml",
            FormatArg::Yaml => "tether.yaml",
            FormatArg::Json => "tether.json",
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    init_logging(&config, cli.debug, cli.quiet, cli.verbose);

    match cli.command {
        Commands::Serve(args) => serve_command(config, args),
        Commands::Config { default, format } => config_command(config, default, format),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => ConfigLoader::load_default().context("Failed to load configuration"),
    }
}

fn log_level(config: &Config, debug: bool, quiet: bool, verbose: bool) -> &str {
    if debug {
        "debug"
    } else if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        &config.logging.level
    }
}

fn init_logging(config: &Config, debug: bool, quiet: bool, verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = log_level(config, debug, quiet, verbose);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json_format {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .init();
    }
}

fn serve_command(mut config: Config, args: ServeArgs) -> Result<()> {
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!("Tether v{} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Serving files from {} (reconnect window {}s)",
        config.server.file_root.display(),
        config.transfer.reconnect_timeout_secs
    );

    let mut server = Server::bind(&config).context("Failed to start server")?;
    server.run()
}

fn config_command(config: Config, default: bool, format: FormatArg) -> Result<()> {
    let config = if default { Config::default() } else { config };
    let rendered = ConfigLoader::render(&config, format.file_name())
        .context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::try_parse_from([
            "tether",
            "serve",
            "--bind",
            "0.0.0.0",
            "--port",
            "7100",
            "--udp-port",
            "7101",
            "--root",
            "/srv/files",
            "--reconnect-timeout",
            "5",
        ])
        .unwrap();

        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.server.bind_addr, "0.0.0.0");
        assert_eq!(config.server.port, 7100);
        assert_eq!(config.server.udp_port, Some(7101));
        assert_eq!(config.server.file_root, PathBuf::from("/srv/files"));
        assert_eq!(config.transfer.reconnect_timeout_secs, 5);
    }

    #[test]
    fn test_serve_without_overrides_keeps_config() {
        let mut config = Config::default();
        config.server.port = 7300;
        ServeArgs::default().apply(&mut config);

        assert_eq!(config.server.port, 7300);
        assert_eq!(config.server.udp_port, None);
    }

    #[rstest]
    #[case(true, false, false, "debug")]
    #[case(false, false, true, "info")]
    #[case(false, true, false, "error")]
    #[case(false, false, false, "warn")]
    fn test_log_level(
        #[case] debug: bool,
        #[case] quiet: bool,
        #[case] verbose: bool,
        #[case] expected: &str,
    ) {
        let mut config = Config::default();
        config.logging.level = "warn".to_string();

        assert_eq!(log_level(&config, debug, quiet, verbose), expected);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nport = 7400").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 7400);
    }

    #[test]
    fn test_load_missing_config_fails() {
        assert!(load_config(Some(Path::new("/nonexistent/tether.toml"))).is_err());
    }

    #[test]
    fn test_config_formats() {
        let cli = Cli::try_parse_from(["tether", "config", "--default", "--format", "yaml"]).unwrap();
        let Commands::Config { default, format } = cli.command else {
            panic!("expected config");
        };

        assert!(default);
        assert_eq!(format, FormatArg::Yaml);
        assert_eq!(format.file_name(), Path::new("tether.yaml"));
    }
}
