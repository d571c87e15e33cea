//! # CLI
//!
//! This module defines the command-line interface of `callwire` using `clap`.
//!
//! It is responsible for parsing user input and performing validation (e.g., ensuring headers
//! are `key:value` and timeouts carry a unit).
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "callwire", version, about = "gRPC server and client for streaming calls")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the calculator, greet and blog services on one endpoint
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// callwire serve --config callwire.json --addr 127.0.0.1:50051
    /// ```
    Serve(ServeArgs),

    /// Perform one call against a running server
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// callwire call http://localhost:50051 calc sum 3 10
    /// callwire call http://localhost:50051 --timeout 1s greet deadline Ada
    /// ```
    Call(CallArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Path to a JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to listen on, overrides the configuration file
    #[arg(long)]
    pub addr: Option<SocketAddr>,

    /// PEM certificate chain of the server
    #[arg(long, requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key of the server
    #[arg(long, requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Do not register the reflection service
    #[arg(long)]
    pub no_reflection: bool,
}

#[derive(Args)]
pub struct CallArgs {
    /// The server URL to connect to (e.g. http://localhost:50051)
    pub url: String,

    /// PEM trust bundle used to verify the server certificate
    #[arg(long)]
    pub ca: Option<PathBuf>,

    /// Server name to verify, when it differs from the URL host
    #[arg(long)]
    pub domain: Option<String>,

    /// Deadline of the call (e.g. 500ms, 2s, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    #[command(subcommand)]
    pub target: Target,
}

#[derive(Subcommand)]
pub enum Target {
    /// Calculator service
    Calc {
        #[command(subcommand)]
        op: CalcCommand,
    },
    /// Greet service
    Greet {
        #[command(subcommand)]
        op: GreetCommand,
    },
    /// Blog service
    Blog {
        #[command(subcommand)]
        op: BlogCommand,
    },
}

#[derive(Subcommand)]
pub enum CalcCommand {
    /// Add two numbers (unary)
    Sum {
        #[arg(allow_negative_numbers = true)]
        first: i64,
        #[arg(allow_negative_numbers = true)]
        second: i64,
    },
    /// Decompose a number into prime factors (server streaming)
    Primes {
        #[arg(allow_negative_numbers = true)]
        number: i64,
    },
    /// Average of a sequence of numbers (client streaming)
    Average {
        #[arg(allow_negative_numbers = true)]
        numbers: Vec<i64>,
    },
    /// Running maximum of a sequence of numbers (bidirectional streaming)
    Max {
        #[arg(required = true, allow_negative_numbers = true)]
        numbers: Vec<i64>,
    },
    /// Square root of a number (unary)
    Sqrt {
        #[arg(allow_negative_numbers = true)]
        number: i64,
    },
}

#[derive(Subcommand)]
pub enum GreetCommand {
    /// Greet once (unary)
    Hello { name: String },
    /// Greet repeatedly (server streaming)
    Many { name: String },
    /// Greet everyone at once (client streaming)
    Long {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Greet everyone one by one (bidirectional streaming)
    Everyone {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Greet after a slow computation that honours the deadline (unary)
    Deadline { name: String },
}

#[derive(Args)]
pub struct BlogFields {
    #[arg(long)]
    pub author: String,
    #[arg(long)]
    pub title: String,
    #[arg(long, default_value = "")]
    pub content: String,
}

#[derive(Subcommand)]
pub enum BlogCommand {
    /// Create a blog post
    Create(BlogFields),
    /// Read a blog post by id
    Read { id: String },
    /// Replace the fields of a blog post
    Update {
        id: String,
        #[command(flatten)]
        fields: BlogFields,
    },
    /// Delete a blog post by id
    Delete { id: String },
    /// Stream every blog post (server streaming)
    List,
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| "Format must be 'key:value'".to_string())
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("Missing unit in '{value}'. Expected one of ms, s, m, h"))?;
    let (amount, unit) = value.split_at(split);

    let amount: u64 = amount
        .parse()
        .map_err(|e| format!("Invalid duration '{value}': {e}"))?;

    let seconds = |factor: u64| {
        amount
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("Duration '{value}' is too large"))
    };

    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => seconds(60),
        "h" => seconds(60 * 60),
        _ => Err(format!("Unknown unit '{unit}'. Expected one of ms, s, m, h")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("2s"), Ok(Duration::from_secs(2)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("3d").is_err());
        assert!(parse_duration(&format!("{}h", u64::MAX)).is_err());
        assert!(parse_duration(&format!("{}m", u64::MAX / 2)).is_err());
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("x-id: 42"),
            Ok(("x-id".to_string(), "42".to_string()))
        );
        assert!(parse_header("no-colon").is_err());
    }

    #[test]
    fn test_call_with_negative_numbers() {
        let cli = Cli::try_parse_from([
            "callwire",
            "call",
            "http://localhost:50051",
            "--timeout",
            "1s",
            "calc",
            "sqrt",
            "-1",
        ])
        .unwrap();

        let Commands::Call(args) = cli.command else {
            panic!("expected a call command");
        };
        assert_eq!(args.timeout, Some(Duration::from_secs(1)));
        assert!(matches!(
            args.target,
            Target::Calc { op: CalcCommand::Sqrt { number: -1 } }
        ));
    }

    #[test]
    fn test_serve_requires_both_tls_files() {
        assert!(Cli::try_parse_from(["callwire", "serve", "--tls-cert", "server.crt"]).is_err());
        assert!(
            Cli::try_parse_from([
                "callwire",
                "serve",
                "--tls-cert",
                "server.crt",
                "--tls-key",
                "server.pem"
            ])
            .is_ok()
        );
    }
}
