//! townhall: JSON-lines co-process for a meeting and polling UI.
//!
//! Usage: townhall serve [--ephemeral]

use std::io::{self, Write};

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use townhall::{protocol, Config, Session};

const USAGE: &str = "Usage: townhall serve [--ephemeral]";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // stdout carries the protocol; logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) != Some("serve") {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }
    let mut ephemeral = false;
    for arg in &args[1..] {
        match arg.as_str() {
            "--ephemeral" => ephemeral = true,
            other => {
                eprintln!("Unknown argument: {}\n{}", other, USAGE);
                std::process::exit(1);
            }
        }
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load config: {:#}, using defaults", e);
            Config::default()
        }
    };

    let mut session = Session::from_config(config, ephemeral)?;
    session.start().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<Value>(&line) {
            Ok(cmd) => protocol::handle(&mut session, &cmd).await,
            Err(e) => json!({"error": e.to_string(), "kind": "validation"}),
        };

        serde_json::to_writer(&mut out, &resp)?;
        out.write_all(b"\n")?;
        out.flush()?;
    }

    if session.current_meeting().is_some() {
        session.leave().await?;
    }
    Ok(())
}
