//! `admin-agent` — run one admin request from the command line.
//!
//! Usage: `admin-agent [--config <path>] [request.json]`
//!
//! Reads `{"messages": [...]}` from the file, or from stdin when no file is
//! given, and prints the response JSON on stdout. Logs go to stderr unless
//! `logging.log_dir` is configured.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use admin_agent::agent_core::AdminRequest;
use admin_agent::inference::config::{load_config, load_or_default};
use admin_agent::inference::AgentConfig;
use admin_agent::{build_agent, logging};

struct Args {
    config: Option<PathBuf>,
    input: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        input: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            _ if args.input.is_some() => bail!("only one request file can be given"),
            _ => args.input = Some(PathBuf::from(&arg)),
        }
    }
    Ok(args)
}

fn load_agent_config(args: &Args) -> Result<AgentConfig> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_or_default(&std::env::current_dir()?)?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    let config = tracing::subscriber::with_default(logging::bootstrap_subscriber(), || {
        load_agent_config(&args)
    })?;
    logging::init_tracing(&config.logging).context("failed to initialize logging")?;

    let raw = match &args.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read request from stdin")?;
            buf
        }
    };
    let request: AdminRequest = serde_json::from_str(&raw).context("invalid request JSON")?;

    let agent = build_agent(config)?;
    let response = agent.handle(request.messages).await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
