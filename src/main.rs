//! batchrpc - issue a batch of JSON-RPC 2.0 calls to a stdio server
//!
//! Command-line usage:
//!   batchrpc --call subtract=[42,23] --call 'add={"a":24,"b":32}' -- ./server
//!   batchrpc --notify log='["hello"]' --no-wait -- ./server --flag
//!
//! Every call is issued in the same turn, so the server receives one batch.
//! Responses are only correlated when they come back as individual objects;
//! a server that answers a batch with a JSON array gets its replies dropped
//! and the calls time out. The bundled `echo_server` replies per element.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use batchrpc::jsonrpc::{ChildProcessChannel, Client, LocalSpawner, Params, RequestOptions};
use clap::Parser;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// CLI application configuration
#[derive(Parser, Debug)]
#[command(
    name = "batchrpc",
    version,
    about = "Send batched JSON-RPC 2.0 calls to a stdio server",
    long_about = "Send batched JSON-RPC 2.0 calls to a stdio server.\n\n\
        All calls leave as one batch. Replies must come back as individual \
        response objects: array-shaped (batched) replies are dropped, and the \
        calls they answer count as failures once --timeout-ms expires."
)]
struct Cli {
    /// Call expecting a response: METHOD or METHOD=PARAMS (JSON array or object)
    #[arg(long = "call", value_name = "METHOD[=PARAMS]")]
    calls: Vec<String>,

    /// Fire-and-forget call, sent after the --call entries
    #[arg(long = "notify", value_name = "METHOD[=PARAMS]")]
    notifications: Vec<String>,

    /// Do not wait for responses
    #[arg(long)]
    no_wait: bool,

    /// How long to wait for all responses
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,

    /// Server command
    server: String,

    /// Server arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    server_args: Vec<String>,
}

/// Parse `METHOD[=PARAMS]`
fn parse_call(spec: &str) -> Result<(String, Option<Params>)> {
    let (method, params) = match spec.split_once('=') {
        Some((method, raw)) => {
            let value: Value = serde_json::from_str(raw)
                .with_context(|| format!("Invalid JSON params for '{}': {}", method, raw))?;
            match Params::try_from(value) {
                Ok(params) => (method, Some(params)),
                Err(other) => bail!(
                    "Params for '{}' must be a JSON array or object, got: {}",
                    method,
                    other
                ),
            }
        }
        None => (spec, None),
    };

    if method.is_empty() {
        bail!("Empty method name in '{}'", spec);
    }
    Ok((method.to_string(), params))
}

/// Issue all calls in one turn and collect the responses.
/// Returns the number of calls that came back with an error.
async fn run(cli: Cli) -> Result<usize> {
    let calls = cli
        .calls
        .iter()
        .map(|spec| parse_call(spec))
        .collect::<Result<Vec<_>>>()?;
    let notifications = cli
        .notifications
        .iter()
        .map(|spec| parse_call(spec))
        .collect::<Result<Vec<_>>>()?;

    let channel = Rc::new(
        ChildProcessChannel::spawn(&cli.server, &cli.server_args)
            .with_context(|| format!("Failed to spawn server: {}", cli.server))?,
    );
    let client = Client::new(channel.clone(), LocalSpawner);

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<bool>();
    let expected = calls.len();

    for (method, params) in calls {
        let done_tx = done_tx.clone();
        let name = method.clone();
        let options = RequestOptions::new()
            .params(params)
            .on_outcome(move |outcome| {
                let ok = match outcome {
                    Ok(result) => {
                        println!("{} => {}", name, result);
                        true
                    }
                    Err(e) => {
                        eprintln!("{} failed: {}", name, e);
                        false
                    }
                };
                let _ = done_tx.send(ok);
            });
        client.request(&method, options)?;
    }
    for (method, params) in notifications {
        client.request(&method, RequestOptions::new().params(params))?;
    }
    drop(done_tx);

    // フラッシュタスクに制御を渡す
    tokio::task::yield_now().await;

    let failures = Rc::new(Cell::new(0));
    if !cli.no_wait && expected > 0 {
        let counted = failures.clone();
        let collect = async move {
            let mut received = 0;
            while received < expected {
                match done_rx.recv().await {
                    Some(ok) => {
                        received += 1;
                        if !ok {
                            counted.set(counted.get() + 1);
                        }
                    }
                    None => break,
                }
            }
            received
        };

        match timeout(Duration::from_millis(cli.timeout_ms), collect).await {
            Ok(received) if received == expected => {}
            Ok(received) => {
                log::warn!("Only {} of {} responses received", received, expected);
                failures.set(failures.get() + expected - received);
            }
            Err(_) => {
                log::warn!("Timed out waiting for responses");
                failures.set(failures.get() + client.pending_count());
            }
        }
    }

    channel.shutdown().await.context("Failed to shut down server")?;
    Ok(failures.get())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    let local = tokio::task::LocalSet::new();

    let failures = local.block_on(&runtime, run(cli))?;
    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
