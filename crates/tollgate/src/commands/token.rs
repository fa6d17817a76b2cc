//! Token command - acquire an access token for one provider.

use anyhow::{Result, anyhow};
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use super::Context;

/// Arguments for the token command.
#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Provider id from the config
    pub provider: String,

    /// Print the access token instead of a redacted form
    #[arg(long)]
    pub show: bool,
}

#[derive(Debug, Serialize)]
struct TokenOutput {
    provider: String,
    token_type: String,
    access_token: String,
    expires_at: String,
}

/// Run the token command.
pub async fn run(args: TokenArgs, ctx: &Context) -> Result<()> {
    let runtime = ctx.load()?;
    let destination = runtime
        .registry
        .get(&args.provider)
        .ok_or_else(|| anyhow!("Unknown provider '{}'", args.provider))?;

    let token = runtime
        .tokens
        .acquire(&destination.id, &destination.oauth)
        .await?;

    let access_token = if args.show {
        token.access_token.clone()
    } else {
        mask(&token.access_token)
    };

    if ctx.json_output {
        let output = TokenOutput {
            provider: destination.id.clone(),
            token_type: token.token_type.clone(),
            access_token,
            expires_at: token.expires_at.to_rfc3339(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let status = runtime.tokens.status(&destination.id);

    println!();
    println!("{}", style(format!("Token for {}", destination.id)).bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("  {} {}", dim.apply_to("Type:   "), token.token_type);
    println!("  {} {}", dim.apply_to("Token:  "), access_token);
    println!(
        "  {} {} ({})",
        dim.apply_to("Expires:"),
        token.expires_at.to_rfc3339(),
        status.expires_in_display(runtime.tokens.now())
    );
    println!();
    Ok(())
}

fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "****".to_string()
    }
}
