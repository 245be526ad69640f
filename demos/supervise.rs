// Demos are allowed to use expect/unwrap for simplicity
#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Lokinet Supervisor Demo
//!
//! Starts a daemon, streams its lifecycle events, and shuts it down on
//! Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! # Supervise the installed lokinet (needs root/admin)
//! cargo run --example supervise -- /usr/bin/lokinet
//!
//! # Any long-running program works for a dry run
//! cargo run --example supervise -- --no-elevation /bin/sleep 600
//!
//! # Load settings from a TOML file
//! cargo run --example supervise -- --config lokinet-supervisor.toml
//!
//! # More detail
//! RUST_LOG=debug cargo run --example supervise -- --no-elevation /bin/sleep 600
//! ```

use lokinet_supervisor::prelude::*;
use tokio::signal;
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!("Lokinet Supervisor Demo");
    println!();
    println!("Usage: supervise [OPTIONS] <EXECUTABLE> [ARGS]...");
    println!("       supervise --config <FILE>");
    println!();
    println!("Options:");
    println!("  --config <FILE>   Load supervisor settings from TOML");
    println!("  --no-elevation    Do not require root/admin privileges");
    println!("  -h, --help        Print this help");
}

fn parse_config(args: &[String]) -> Result<Option<SupervisorConfig>, Box<dyn std::error::Error>> {
    if let Some(pos) = args.iter().position(|a| a == "--config") {
        let path = args.get(pos + 1).ok_or("--config needs a file")?;
        return Ok(Some(SupervisorConfig::load(path)?));
    }

    let no_elevation = args.iter().any(|a| a == "--no-elevation");
    let mut rest = args.iter().filter(|a| a.as_str() != "--no-elevation");
    let Some(executable) = rest.next() else {
        return Ok(None);
    };

    Ok(Some(
        SupervisorConfig::new(executable)
            .with_args(rest.cloned())
            .with_require_elevation(!no_elevation),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }
    let Some(config) = parse_config(&args)? else {
        print_help();
        return Ok(());
    };

    let supervisor = native_supervisor(config)?;
    let mut events = supervisor.subscribe();

    let identity = supervisor.start().await?;
    println!("[START] {} running as {identity}", supervisor.config().name);

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                println!("[EVENT] #{} {} -> {} ({:?})", event.sequence, event.from, event.to, event.cause);
                if event.cause.is_unexpected_exit() {
                    println!("[EXIT] daemon exited on its own");
                    break;
                }
            }
            _ = signal::ctrl_c() => {
                println!("[SIGNAL] Ctrl+C, shutting down");
                match supervisor.shutdown().await {
                    Ok(()) => println!("[STOP] daemon stopped"),
                    Err(e) => println!("[STOP] shutdown failed: {e}"),
                }
                break;
            }
        }
    }

    println!("[DONE] final state: {}", supervisor.state());
    println!("{}", supervisor.events_json()?);
    Ok(())
}
