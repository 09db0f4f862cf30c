//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `geoip_region` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - Serving HTTP, or one-shot lookups
//!
//! All core functionality is implemented in the library crate.

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderMap;
use clap::Parser;

use geoip_region::config::{load_settings, Cli, Command, COUNTRY_CODE_VARIABLE};
use geoip_region::handler::{GeoIpHandler, ProvisionContext, Provisioner, RequestHandler};
use geoip_region::initialization::{init_logger_with, init_pool, load_dotenv};
use geoip_region::resolver::{parse_client_ip, strip_port};
use geoip_region::server;

#[tokio::main]
async fn main() -> Result<()> {
    // Lets GEOIP_ACCOUNT_ID / GEOIP_API_KEY live in .env
    load_dotenv();

    let cli = Cli::parse();
    init_logger_with(cli.log_level.clone().into(), cli.log_format.clone())
        .context("Failed to initialize logger")?;

    if let Err(e) = run(cli).await {
        eprintln!("geoip_region error: {:#}", e);
        process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli.config)
        .await
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    let ctx = ProvisionContext::maxmind(init_pool())?;
    let handler = GeoIpHandler::provision(settings, &ctx)
        .await
        .context("Failed to provision GeoIP handler")?;

    match cli.command {
        Some(Command::Lookup { addresses }) => lookup(&handler, &addresses),
        None => {
            let handler = Arc::new(handler);
            server::serve(&cli.listen, server::router(handler, &cli.body)).await
        }
    }
}

fn lookup(handler: &GeoIpHandler, addresses: &[String]) -> Result<()> {
    for address in addresses {
        let peer = parse_client_ip(address)
            .map(|ip| std::net::SocketAddr::new(ip, 0))
            .ok();
        if peer.is_none() {
            println!("{}\t(unparseable)", strip_port(address));
            continue;
        }
        let variables = handler.handle(&HeaderMap::new(), peer)?;
        println!(
            "{}\t{}",
            address,
            variables.get(COUNTRY_CODE_VARIABLE).unwrap_or("")
        );
    }
    Ok(())
}
