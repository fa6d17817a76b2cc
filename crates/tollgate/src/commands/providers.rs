//! Providers command - list configured OAuth destinations.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use super::Context;

/// Arguments for the providers command.
#[derive(Args, Debug)]
pub struct ProvidersArgs {
    /// Also list the config locations that were searched
    #[arg(long)]
    pub searched: bool,
}

#[derive(Debug, Serialize)]
struct ProviderOutput {
    id: String,
    base_url: String,
    token_url: String,
    scope: Option<String>,
}

#[derive(Debug, Serialize)]
struct SkippedOutput {
    id: String,
    reason: String,
}

#[derive(Debug, Serialize)]
struct ProvidersOutput {
    source: Option<String>,
    providers: Vec<ProviderOutput>,
    skipped: Vec<SkippedOutput>,
    warnings: Vec<String>,
}

/// Run the providers command.
pub async fn run(args: ProvidersArgs, ctx: &Context) -> Result<()> {
    let runtime = ctx.load()?;

    let output = ProvidersOutput {
        source: runtime
            .loaded
            .source
            .as_ref()
            .map(|p| p.display().to_string()),
        providers: runtime
            .registry
            .iter()
            .map(|d| ProviderOutput {
                id: d.id.clone(),
                base_url: d.url_prefix.clone(),
                token_url: d.oauth.token_url.to_string(),
                scope: d.oauth.scope.clone(),
            })
            .collect(),
        skipped: runtime
            .registry
            .skipped()
            .iter()
            .map(|s| SkippedOutput {
                id: s.id.clone(),
                reason: s.reason.clone(),
            })
            .collect(),
        warnings: runtime.loaded.warnings.clone(),
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let yellow = Style::new().yellow();

    println!();
    println!("{}", style("OAuth Providers").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    match &output.source {
        Some(source) => println!("  {} {}", dim.apply_to("Config:"), source),
        None => println!("  {} none found", dim.apply_to("Config:")),
    }
    if args.searched {
        for path in &runtime.loaded.searched {
            println!("  {} {}", dim.apply_to("Searched:"), path.display());
        }
    }
    println!();

    if output.providers.is_empty() {
        println!("  No OAuth providers configured; requests pass through unchanged.");
    }
    for provider in &output.providers {
        println!("  {}", style(&provider.id).bold());
        println!("    {} {}", dim.apply_to("Base URL: "), provider.base_url);
        println!("    {} {}", dim.apply_to("Token URL:"), provider.token_url);
        if let Some(scope) = &provider.scope {
            println!("    {} {}", dim.apply_to("Scope:    "), scope);
        }
    }

    if !output.skipped.is_empty() {
        println!();
        println!("{}", yellow.apply_to("Skipped:"));
        for skipped in &output.skipped {
            println!("  {:<16} {}", skipped.id, dim.apply_to(&skipped.reason));
        }
    }

    if ctx.verbose && !output.warnings.is_empty() {
        println!();
        println!("{}", yellow.apply_to("Warnings:"));
        for warning in &output.warnings {
            println!("  {}", warning);
        }
    }

    println!();
    Ok(())
}
