//! Command-line interface for robo-console.
//!
//! Uses lexopt for minimal binary size overhead (~34KB).

use std::ffi::OsString;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Command-line arguments.
///
/// Unset options fall through to the environment, the config file and
/// finally the defaults.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Host address to bind to.
    pub host: Option<IpAddr>,
    /// Port to listen on.
    pub port: Option<u16>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Do not write a banner on connect.
    pub no_banner: bool,
    /// Evaluation bound in seconds (0 disables).
    pub eval_timeout: Option<u64>,
    /// Shutdown bound in seconds (0 waits forever).
    pub shutdown_timeout: Option<u64>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('H') | Long("host") => {
                let value: String = parser.value()?.parse()?;
                result.host = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("host", value))?,
                );
            }
            Short('p') | Long("port") => {
                let value: String = parser.value()?.parse()?;
                result.port = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("port", value))?,
                );
            }
            Short('b') | Long("bind") => {
                let value: String = parser.value()?.parse()?;
                let addr: SocketAddr = value
                    .parse()
                    .map_err(|_| ArgsError::InvalidValue("bind", value))?;
                result.host = Some(addr.ip());
                result.port = Some(addr.port());
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Long("no-banner") => {
                result.no_banner = true;
            }
            Long("eval-timeout") => {
                let value: String = parser.value()?.parse()?;
                result.eval_timeout = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("eval-timeout", value))?,
                );
            }
            Long("shutdown-timeout") => {
                let value: String = parser.value()?.parse()?;
                result.shutdown_timeout = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("shutdown-timeout", value))?,
                );
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"robo-console {version}
Remote interactive console for a live control process

USAGE:
    robo-console [OPTIONS]

OPTIONS:
    -H, --host <ADDR>            Host address to bind [default: 0.0.0.0]
    -p, --port <PORT>            Port to listen on [default: 13501]
    -b, --bind <ADDR:PORT>       Host and port in one argument
    -c, --config <FILE>          Path to configuration file (JSON)
    -l, --log-level <LVL>        Log level (error, warn, info, debug, trace)
        --no-banner              Do not greet clients with a banner
        --eval-timeout <SECS>    Bound on one evaluation, 0 disables [default: 30]
        --shutdown-timeout <SECS>
                                 Bound on closing open consoles, 0 waits forever [default: 5]
    -h, --help                   Print help
    -V, --version                Print version

ENVIRONMENT VARIABLES:
    ROBO_CONSOLE_HOST       Host address (overrides config)
    ROBO_CONSOLE_PORT       Port number (overrides config)
    ROBO_CONSOLE_LOG_LEVEL  Log level (overrides config)
    RUST_LOG                Alternative log level setting

EXAMPLES:
    # Start with defaults (0.0.0.0:13501)
    robo-console

    # Loopback only, then attach with netcat
    robo-console -b 127.0.0.1:13501
    nc 127.0.0.1 13501

    # Start with config file
    robo-console -c /etc/robo-console.json
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("robo-console {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
