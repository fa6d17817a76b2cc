//! Request command - send one HTTP request through the interceptor.

use anyhow::{Context as _, Result, bail};
use clap::Args;
use console::Style;
use reqwest::Method;
use serde::Serialize;

use super::Context;

/// Arguments for the request command.
#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Target URL
    pub url: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Extra header as 'Name: value' (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Request body
    #[arg(short, long)]
    pub data: Option<String>,
}

#[derive(Debug, Serialize)]
struct RequestOutput {
    status: u16,
    authenticated: Option<String>,
    body: String,
}

/// Run the request command.
pub async fn run(args: RequestArgs, ctx: &Context) -> Result<()> {
    let runtime = ctx.load()?;
    let client = runtime.client();

    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method '{}'", args.method))?;

    let mut builder = client.request(method, &args.url);
    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        builder = builder.header(name, value);
    }
    if let Some(data) = args.data {
        builder = builder.body(data);
    }
    let request = builder.build().context("Failed to build request")?;

    let authenticated = runtime
        .registry
        .match_url(request.url().as_str())
        .map(|d| d.id.clone());
    match &authenticated {
        Some(id) => tracing::debug!(destination = %id, "Request matches OAuth provider"),
        None => tracing::debug!("Request matches no provider; sending unauthenticated"),
    }

    let response = client.execute(request).await?;
    let status = response.status();
    let body = response.text().await.context("Failed to read response body")?;

    if ctx.json_output {
        let output = RequestOutput {
            status: status.as_u16(),
            authenticated,
            body,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let status_style = if status.is_success() {
        Style::new().green()
    } else {
        Style::new().red()
    };
    eprintln!("{}", status_style.apply_to(status));
    println!("{}", body);
    Ok(())
}

/// Split `Name: value` into its parts.
fn parse_header(raw: &str) -> Result<(&str, &str)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("Invalid header '{}': expected 'Name: value'", raw);
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("Invalid header '{}': empty name", raw);
    }
    Ok((name, value.trim()))
}
