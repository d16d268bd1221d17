use std::{fmt, io::IsTerminal, net::SocketAddr, path::PathBuf, str::FromStr};

use clap::{Parser, ValueEnum};
use config::Config;
use logforth::filter::EnvFilter;

/// Crates whose logs follow `--log`. Everything else logs warnings and up.
const WORKSPACE_CRATES: [&str; 4] = ["switchyard", "server", "config", "llm"];

#[derive(Debug, Parser)]
#[command(name = "Switchyard", version, long_about = concat!("Switchyard v", env!("CARGO_PKG_VERSION")))]
pub struct Args {
    /// IP address on which the server will listen for incoming connections.
    /// Default: 127.0.0.1:8000
    #[arg(short, long, env = "SWITCHYARD_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,
    /// Path to the TOML configuration file
    #[arg(long, short, env = "SWITCHYARD_CONFIG_PATH", default_value = "./switchyard.toml")]
    pub config: PathBuf,
    /// Validate the configuration file, print what looks wrong and exit
    #[arg(long)]
    pub check: bool,
    /// Log level of the switchyard crates
    #[arg(long = "log", env = "SWITCHYARD_LOG", default_value_t = LogLevel::default())]
    pub log_level: LogLevel,
    /// Set the style of log output
    #[arg(long, env = "SWITCHYARD_LOG_STYLE", default_value_t = LogStyle::default())]
    pub log_style: LogStyle,
}

impl Args {
    /// Loads the configuration file, or starts from a clean slate when it does not exist.
    pub fn config(&self) -> anyhow::Result<Config> {
        if !self.config.exists() {
            log::info!(
                "No configuration found at {}, starting without services",
                self.config.display()
            );

            return Ok(Config::default());
        }

        Config::load(&self.config)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogStyle {
    /// Colorized text, used as the default with TTY output
    Color,
    /// Standard text, used as the default with non-TTY output
    Text,
    /// JSON objects
    Json,
}

impl Default for LogStyle {
    fn default() -> Self {
        if std::io::stdout().is_terminal() {
            LogStyle::Color
        } else {
            LogStyle::Text
        }
    }
}

impl fmt::Display for LogStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogStyle::Color => "color",
            LogStyle::Text => "text",
            LogStyle::Json => "json",
        })
    }
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub(crate) enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directives(self) -> String {
        if self == LogLevel::Off {
            return "off".to_string();
        }

        WORKSPACE_CRATES
            .iter()
            .fold(String::from("warn"), |acc, krate| format!("{acc},{krate}={self}"))
    }

    pub fn env_filter(self) -> EnvFilter {
        EnvFilter::from_str(&self.directives()).expect("log level directives are always valid")
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        })
    }
}
