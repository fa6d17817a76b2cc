//! Serve command - run the local OAuth proxy.

use std::net::SocketAddr;

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, style};
use tollgate_oauth::{ProxyConfig, ProxyServer};

use super::Context;

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = tollgate_oauth::proxy::DEFAULT_BIND_ADDR)]
    pub bind: SocketAddr,

    /// Disable permissive CORS headers
    #[arg(long)]
    pub no_cors: bool,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let runtime = ctx.load()?;
    let client = runtime.client();

    let config = ProxyConfig {
        bind_addr: args.bind,
        enable_cors: !args.no_cors,
    };
    let server = ProxyServer::new(config, client, runtime.registry.clone());

    if !ctx.json_output {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Tollgate OAuth Proxy").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {} http://{}", dim.apply_to("Listening:"), args.bind);
        for destination in runtime.registry.iter() {
            println!(
                "  {} http://{}/{}/ -> {}",
                dim.apply_to("Route:    "),
                args.bind,
                destination.id,
                destination.url_prefix
            );
        }
        println!();
        println!("  {}", dim.apply_to("Press Ctrl-C to stop"));
        println!();
    }

    server
        .run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Cannot listen for Ctrl-C; stopping");
            }
            tracing::info!("Shutting down OAuth proxy");
        })
        .await
        .context("Proxy server failed")?;

    Ok(())
}
