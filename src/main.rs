// Copyright 2026 Formscout Contributors
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code, unused_imports)]

use anyhow::Result;
use clap::{Parser, Subcommand};

mod discovery;
mod driver;
mod error;
mod hints;
mod humanize;
mod navigator;
mod profiles;
mod progress;

use discovery::orchestrator::{DiscoveryEngine, DiscoveryRequest};
use hints::WarmHints;

#[derive(Parser)]
#[command(
    name = "formscout",
    about = "Adaptive form discovery for registration sites",
    version,
    after_help = "The discover command drives a headless Chromium against a live site.\n\
                  It assumes the session needs no login; authenticated flows embed the\n\
                  library and supply their own page handle."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover prerequisite gates and the signup form schema for a program
    Discover {
        /// Provider identifier (see `formscout providers`)
        provider: String,
        /// Program reference (id or slug)
        program: String,
        /// Base URL of the site (e.g. "https://blackhawk.skiclubpro.team")
        #[arg(long)]
        base_url: String,
    },
    /// Check the environment (Chromium availability)
    Doctor,
    /// List known providers and their prerequisite gates
    Providers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "formscout=debug"
    } else {
        "formscout=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Discover {
            provider,
            program,
            base_url,
        } => run_discover(provider, program, base_url, cli.json).await,
        Commands::Doctor => run_doctor(cli.json),
        Commands::Providers => run_providers(cli.json),
    }
}

async fn run_discover(
    provider: String,
    program: String,
    base_url: String,
    json: bool,
) -> Result<()> {
    let chromium = driver::chromium::ChromiumDriver::new().await?;
    let mut page = chromium.new_page().await?;

    let engine = DiscoveryEngine::new();
    let request = DiscoveryRequest {
        provider,
        program_ref: program,
        base_url,
    };

    let outcome = engine
        .discover(&mut page, &request, &WarmHints::default())
        .await;
    page.close().await?;
    let result = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("run {}", result.run_id);
    println!("prerequisites: {:?}", result.prereq_status);
    for check in &result.prerequisites {
        println!("  {:<16} {:?}: {}", check.id, check.status, check.message);
        for field in &check.fields {
            println!("    - {} ({:?}, required={})", field.id, field.field_type, field.required);
        }
    }
    println!(
        "program form: {} field(s), stopped: {:?} (confidence {:.2})",
        result.program_fields.len(),
        result.stop_reason,
        result.confidence_program
    );
    for field in &result.program_fields {
        println!(
            "  - {:<24} {:?} required={} steps={:?}",
            field.id, field.field_type, field.required, field.seen_at_steps
        );
    }
    if let Some(evidence) = &result.stop_evidence {
        println!(
            "guardrail: {:?} at {} ({})",
            evidence.reason,
            evidence.url,
            evidence.button_text.as_deref().unwrap_or("page markers")
        );
    }
    println!("urls visited: {}", result.urls_visited.len());
    if !discovery::orchestrator::schema_is_usable(&result) {
        println!("note: low-confidence schema; retry or fall back to manual entry");
    }
    Ok(())
}

fn run_doctor(json: bool) -> Result<()> {
    let chromium = driver::chromium::find_chromium();
    if json {
        println!(
            "{}",
            serde_json::json!({
                "chromium": chromium.as_ref().map(|p| p.display().to_string()),
                "ok": chromium.is_some(),
            })
        );
        return Ok(());
    }
    match chromium {
        Some(path) => println!("chromium: {}", path.display()),
        None => {
            println!("chromium: NOT FOUND");
            println!("Set FORMSCOUT_CHROMIUM_PATH or install google-chrome/chromium on PATH.");
        }
    }
    Ok(())
}

fn run_providers(json: bool) -> Result<()> {
    let providers = profiles::known_providers();
    if json {
        let entries: Vec<_> = providers
            .iter()
            .filter_map(|id| profiles::provider_profile(id).map(|p| (id, p)))
            .map(|(id, p)| {
                serde_json::json!({
                    "id": id,
                    "label": p.label,
                    "prerequisites": p.prerequisites.iter().map(|d| d.id.clone()).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for id in providers {
        let Some(profile) = profiles::provider_profile(id) else {
            continue;
        };
        println!("{id} ({})", profile.label);
        for gate in &profile.prerequisites {
            println!(
                "  {:<16} paths: {}",
                gate.id,
                gate.candidate_paths.join(", ")
            );
        }
    }
    Ok(())
}
