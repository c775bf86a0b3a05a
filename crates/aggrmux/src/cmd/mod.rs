use std::path::PathBuf;
use std::time::Duration;

use aggrmux_client::ClientConfig;
use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod bench;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a test aggregation server that echoes DATA frames.
    Serve(ServeArgs),
    /// Send one HTTP request through the multiplexer and print the response.
    Send(SendArgs),
    /// Fire many requests through the multiplexer and report throughput.
    Bench(BenchArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Bench(args) => bench::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where to connect and how long calls may wait.
#[derive(Args, Debug, Clone)]
pub struct EndpointArgs {
    /// Aggregation server host.
    #[arg(long, env = "AGGRMUX_HOST", default_value = "127.0.0.1")]
    pub host: String,
    /// Logical data port requests are addressed to.
    #[arg(long, env = "AGGRMUX_PORT", default_value_t = 8080)]
    pub port: u16,
    /// Aggregation port to connect to.
    #[arg(long, env = "AGGRMUX_AGGR_PORT", default_value_t = 9191)]
    pub aggr_port: u16,
    /// Receive timeout per call; must be a multiple of --tick (e.g. 15s, 600ms).
    #[arg(long, default_value = "15s")]
    pub timeout: String,
    /// Timeout sweep interval (e.g. 5s, 200ms).
    #[arg(long, default_value = "5s")]
    pub tick: String,
}

impl EndpointArgs {
    pub fn client_config(&self) -> CliResult<ClientConfig> {
        let config = ClientConfig::new(self.host.clone(), self.port, self.aggr_port)
            .with_receive_timeout(parse_duration(&self.timeout)?)
            .with_sweep_interval(parse_duration(&self.tick)?);
        config
            .validate()
            .map_err(|err| crate::exit::client_error("invalid settings", err))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (e.g. 127.0.0.1:9191).
    pub addr: String,
    /// Accept requests but never answer them.
    #[arg(long)]
    pub silent: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// HTTP method.
    #[arg(long, short = 'X', default_value = "GET")]
    pub method: String,
    /// Request URI.
    #[arg(long, default_value = "/")]
    pub uri: String,
    /// Extra header, `Name: value` (repeatable).
    #[arg(long = "header", short = 'H', value_name = "HEADER")]
    pub headers: Vec<String>,
    /// Raw string body.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read body from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct BenchArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Number of requests to send.
    #[arg(long, short = 'n', default_value_t = 1000)]
    pub requests: u64,
    /// Body size in bytes.
    #[arg(long, default_value_t = 64)]
    pub size: usize,
    /// Correlation slots (128..=8191).
    #[arg(long, default_value_t = aggrmux_client::MAX_SLOTS)]
    pub slots: usize,
    /// Lower the load ceiling by this percentage before sending (10..=90).
    #[arg(long, value_name = "PERCENT")]
    pub decrease_load: Option<u32>,
    /// HTTP method.
    #[arg(long, short = 'X', default_value = "POST")]
    pub method: String,
    /// Request URI.
    #[arg(long, default_value = "/echo")]
    pub uri: String,
    /// Count a response as ok only if it echoes the request bytes.
    #[arg(long)]
    pub verify: bool,
    /// Report results to /TestStats/AddStats under this test name.
    #[arg(long, value_name = "TEST_NAME")]
    pub report: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Split `Name: value` into its parts.
pub fn parse_header(raw: &str) -> CliResult<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| CliError::new(USAGE, format!("header must be `Name: value`: {raw}")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::new(USAGE, format!("header name is empty: {raw}")));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn parse_header_splits_on_first_colon() {
        assert_eq!(
            parse_header("Accept: text/plain").unwrap(),
            ("Accept".to_string(), "text/plain".to_string())
        );
        assert_eq!(
            parse_header("X-Url:http://a:1").unwrap(),
            ("X-Url".to_string(), "http://a:1".to_string())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn endpoint_rejects_uneven_timeout() {
        let endpoint = EndpointArgs {
            host: "127.0.0.1".to_string(),
            port: 8080,
            aggr_port: 9191,
            timeout: "1200ms".to_string(),
            tick: "500ms".to_string(),
        };
        let err = endpoint.client_config().unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
