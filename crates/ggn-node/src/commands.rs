use std::fs::File;
use std::io::{self, Write};

use anyhow::Context;
use colored::Colorize;
use ggn_store::Store;
use tracing::warn;

use crate::cli::*;
use crate::config::NodeConfig;
use crate::node;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    }
    .with_overrides(cli.listen, cli.root);

    match cli.command {
        Command::Serve(args) => cmd_serve(&config, args).await,
        Command::Send(args) => cmd_send(&config, args).await,
        Command::Store(args) => cmd_store(&config, args),
        Command::Config => cmd_config(&config),
    }
}

async fn cmd_serve(config: &NodeConfig, args: ServeArgs) -> anyhow::Result<()> {
    let transport = node::build_transport(config);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
        }
    };
    let received = node::run(&transport, &args.peers, shutdown).await?;
    println!("{} Node stopped after {} messages", "✓".green().bold(), received.to_string().bold());
    Ok(())
}

async fn cmd_send(config: &NodeConfig, args: SendArgs) -> anyhow::Result<()> {
    let transport = node::build_transport(config);
    let peer = transport
        .dial(&args.addr)
        .await
        .with_context(|| format!("failed to dial {}", args.addr))?;
    let sent = node::send_message(&peer, &config.decoder, args.message.as_bytes()).await;
    transport.close().await;
    sent.with_context(|| format!("failed to send to {}", args.addr))?;
    println!(
        "{} Sent {} bytes to {}",
        "✓".green().bold(),
        args.message.len(),
        args.addr.bold()
    );
    Ok(())
}

fn cmd_store(config: &NodeConfig, args: StoreArgs) -> anyhow::Result<()> {
    let store = Store::new(config.store.clone()).context("invalid store configuration")?;
    match args.action {
        StoreAction::Put { key, source } => {
            let written = if source == "-" {
                store.write_stream(&key, &mut io::stdin().lock())?
            } else {
                let mut file = File::open(&source).with_context(|| format!("failed to open {source}"))?;
                store.write_stream(&key, &mut file)?
            };
            println!("{} Stored {} ({} bytes)", "✓".green().bold(), key.yellow(), written);
        }
        StoreAction::Get { key } => {
            let mut object = store.open(&key)?;
            let mut stdout = io::stdout().lock();
            io::copy(&mut object, &mut stdout).context("failed to write object to stdout")?;
            stdout.flush()?;
        }
        StoreAction::Has { key } => {
            if store.has(&key)? {
                println!("{} {}", key.yellow(), "present".green());
            } else {
                println!("{} {}", key.yellow(), "absent".red());
            }
        }
        StoreAction::Delete { key } => {
            store.delete(&key)?;
            println!("{} Deleted {}", "✓".green().bold(), key.yellow());
        }
        StoreAction::Path { key } => {
            let path_key = store.path_key(&key)?;
            println!("{}", store.full_path(&key)?.display());
            println!("  shard: {}", path_key.first_path_name().cyan());
        }
        StoreAction::Clear => {
            store.clear()?;
            println!("{} Cleared {}", "✓".green().bold(), store.root().display());
        }
    }
    Ok(())
}

fn cmd_config(config: &NodeConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
