mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "aggrmux", version, about = "Request aggregation multiplexer CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "aggrmux",
            "send",
            "--aggr-port",
            "9191",
            "-X",
            "POST",
            "--uri",
            "/echo",
            "-H",
            "Accept: */*",
            "--data",
            "hello",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.endpoint.aggr_port, 9191);
                assert_eq!(args.method, "POST");
                assert_eq!(args.headers, vec!["Accept: */*".to_string()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_body_args() {
        let err = Cli::try_parse_from([
            "aggrmux",
            "send",
            "--data",
            "hello",
            "--file",
            "/tmp/body.bin",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_bench_subcommand() {
        let cli = Cli::try_parse_from([
            "aggrmux",
            "bench",
            "-n",
            "200",
            "--slots",
            "128",
            "--timeout",
            "600ms",
            "--tick",
            "200ms",
            "--verify",
        ])
        .expect("bench args should parse");

        match cli.command {
            Command::Bench(args) => {
                assert_eq!(args.requests, 200);
                assert_eq!(args.slots, 128);
                assert!(args.verify);
                assert_eq!(args.endpoint.timeout, "600ms");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from(["aggrmux", "serve", "127.0.0.1:0", "--silent"])
            .expect("serve args should parse");
        assert!(matches!(cli.command, Command::Serve(ref args) if args.silent));
    }
}
