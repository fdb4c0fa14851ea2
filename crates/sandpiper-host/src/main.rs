//! Sandpiper host - runs one sandboxed script session on the terminal.
//!
//! The program arrives base64-encoded (`--b64`, or the first line of stdin)
//! or as a plain source file (`--file`). Remaining stdin lines answer the
//! script's `input()` calls. Program output goes to stdout; the error record
//! of a failed run goes to stderr as one JSON line.

mod bridge;
mod source;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, anyhow};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sandpiper_eval::{
    DEFAULT_RECURSION_LIMIT, Outcome, RuntimeBridge, SESSION_STACK_SIZE, Session, SessionConfig,
};
use sandpiper_parser::ast_dump::dump_module;

use crate::bridge::StdioBridge;

const EXIT_FAULTED: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "sandpiper")]
#[command(about = "Run an interactive script in the Sandpiper sandbox")]
#[command(version)]
struct Args {
    /// Base64-encoded program source
    #[arg(long, value_name = "BASE64", conflicts_with = "file")]
    b64: Option<String>,

    /// Program source file (plain UTF-8)
    #[arg(short, long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Maximum depth of script function calls
    #[arg(long, value_name = "N", default_value_t = DEFAULT_RECURSION_LIMIT)]
    recursion_limit: usize,

    /// Maximum number of executed statements
    #[arg(long, value_name = "N")]
    step_limit: Option<u64>,

    /// Log filter, e.g. `debug` or `sandpiper_eval=trace` (overrides RUST_LOG)
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,

    /// Print the rewritten syntax tree and exit
    #[arg(long)]
    dump_ast: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr so the program's stdout stays clean.
    let filter = match &args.log {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("sandpiper: {:#}", e);
            ExitCode::from(EXIT_USAGE)
        }
    }
}

/// Run the session on a dedicated thread with a single-threaded runtime.
fn run(args: Args) -> anyhow::Result<ExitCode> {
    let session = std::thread::Builder::new()
        .name("sandpiper-session".to_string())
        .stack_size(SESSION_STACK_SIZE)
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to start runtime")?;
            let result = runtime.block_on(execute(args));
            // A read blocked on stdin cannot be cancelled; don't wait for it.
            runtime.shutdown_background();
            result
        })
        .context("failed to spawn session thread")?;

    session
        .join()
        .map_err(|_| anyhow!("session thread panicked"))?
}

async fn execute(args: Args) -> anyhow::Result<ExitCode> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let source = match (&args.b64, &args.file) {
        (Some(encoded), _) => source::decode_base64(encoded)?,
        (None, Some(path)) => source::read_file(path)?,
        (None, None) => {
            let encoded = lines
                .next_line()
                .await
                .context("failed to read stdin")?
                .context("no program given on stdin")?;
            source::decode_base64(&encoded)?
        }
    };

    let bridge = StdioBridge::new(lines);

    if args.dump_ast {
        return match sandpiper_parser::transform(&source) {
            Ok(module) => {
                print!("{}", dump_module(&module));
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => {
                bridge.report_error(&sandpiper_eval::from_parse_error(&err));
                Ok(ExitCode::from(EXIT_FAULTED))
            }
        };
    }

    let config = SessionConfig::new()
        .recursion_limit(args.recursion_limit)
        .step_limit(args.step_limit);
    let mut session = Session::with_config(bridge, config);
    let cancel = session.cancel_token();

    let running = session.run(&source);
    tokio::pin!(running);
    let outcome = tokio::select! {
        outcome = &mut running => outcome,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    info!("interrupted, cancelling session");
                    cancel.cancel();
                }
                Err(err) => warn!(%err, "failed to listen for Ctrl-C"),
            }
            running.await
        }
    };

    Ok(ExitCode::from(exit_status(&outcome?)))
}

fn exit_status(outcome: &Outcome) -> u8 {
    match outcome {
        Outcome::Completed => 0,
        Outcome::Faulted(_) | Outcome::Rejected(_) => EXIT_FAULTED,
        Outcome::Cancelled => EXIT_CANCELLED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use sandpiper_eval::ErrorRecord;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["sandpiper"]);
        assert_eq!(args.recursion_limit, DEFAULT_RECURSION_LIMIT);
        assert_eq!(args.step_limit, None);
        assert!(args.b64.is_none() && args.file.is_none());
        assert!(!args.dump_ast);
    }

    #[test]
    fn test_b64_conflicts_with_file() {
        let result = Args::try_parse_from(["sandpiper", "--b64", "cGFzcw==", "--file", "x.py"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_exit_codes() {
        let record = ErrorRecord {
            message: "x".to_string(),
            kind: "ValueError".to_string(),
            line: 1,
            frames: vec![],
        };
        assert_eq!(exit_status(&Outcome::Completed), 0);
        assert_eq!(exit_status(&Outcome::Faulted(record.clone())), 1);
        assert_eq!(exit_status(&Outcome::Rejected(record)), 1);
        assert_eq!(exit_status(&Outcome::Cancelled), 130);
    }
}
