//! CLI command implementations.

use std::collections::BTreeMap;

use console::style;
use serde::Serialize;
use tokio::sync::mpsc;

use super::progress;
use crate::config::Settings;
use crate::runner::{Interrupt, RunEvent, RunOptions, RunOutcome, RunSummary, Runner};
use crate::sites::{SiteDescriptor, SiteRegistry};

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

pub fn cmd_list(registry: &SiteRegistry) -> anyhow::Result<()> {
    if registry.is_empty() {
        println!("{} No sites configured", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Exhibitor Directories").bold());
    println!("{}", "-".repeat(100));
    println!(
        "{:<15} {:<26} {:<16} {:<8} Listing",
        "ID", "Name", "Strategy", "Engine"
    );
    println!("{}", "-".repeat(100));

    for site in registry.iter() {
        println!(
            "{:<15} {:<26} {:<16} {:<8} {}",
            site.id,
            truncate(&site.name, 25),
            site.pagination.strategy(),
            site.engine.as_str(),
            truncate(&site.listing_url, 60)
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct SitesTable<'a> {
    sites: BTreeMap<&'a str, &'a SiteDescriptor>,
}

pub fn cmd_show(registry: &SiteRegistry, id: &str) -> anyhow::Result<()> {
    let site = registry.get(id)?;
    let table = SitesTable {
        sites: BTreeMap::from([(site.id.as_str(), site)]),
    };
    print!("{}", toml::to_string_pretty(&table)?);
    Ok(())
}

pub fn cmd_validate(registry: &SiteRegistry, ids: &[String]) -> anyhow::Result<()> {
    let sites: Vec<&SiteDescriptor> = if ids.is_empty() {
        registry.iter().collect()
    } else {
        ids.iter()
            .map(|id| registry.get(id))
            .collect::<Result<_, _>>()?
    };

    let mut invalid = 0;
    for site in &sites {
        match site.validate() {
            Ok(()) => println!("{} {}", style("✓").green(), site.id),
            Err(e) => {
                invalid += 1;
                println!("{} {}", style("✗").red(), site.id);
                println!("  {} {}", style("→").dim(), e);
            }
        }
    }

    if invalid > 0 {
        anyhow::bail!("{} of {} sites are invalid", invalid, sites.len());
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let elapsed = summary.elapsed().num_seconds();
    let glyph = match summary.outcome {
        RunOutcome::Completed => style("✓").green(),
        RunOutcome::Interrupted | RunOutcome::LimitReached => style("!").yellow(),
        RunOutcome::Failed(_) => style("✗").red(),
    };
    println!(
        "{} {}: {} rows saved to {} ({} pages, {} skipped, {}s, {})",
        glyph,
        summary.site,
        summary.persisted,
        summary.output.display(),
        summary.pages,
        summary.skipped,
        elapsed,
        summary.outcome
    );
    if summary.saved > summary.persisted && !summary.outcome.is_failure() {
        println!(
            "  {} {} duplicates removed",
            style("→").dim(),
            summary.saved - summary.persisted
        );
    }
}

pub async fn cmd_run(
    settings: &Settings,
    registry: &SiteRegistry,
    ids: &[String],
    all: bool,
    options: RunOptions,
) -> anyhow::Result<()> {
    let sites: Vec<&SiteDescriptor> = if all {
        registry.iter().collect()
    } else {
        ids.iter()
            .map(|id| registry.get(id))
            .collect::<Result<_, _>>()?
    };

    if sites.is_empty() {
        anyhow::bail!("No sites given. Use 'expocrawl list' to see known sites, or --all");
    }
    if options.output.is_some() && sites.len() > 1 {
        anyhow::bail!("--output can only be used with a single site");
    }

    let interrupt = Interrupt::new();
    let listener = interrupt.listen_ctrl_c();
    let mut failed = Vec::new();

    for site in sites {
        if interrupt.is_triggered() {
            break;
        }
        if let Err(e) = site.validate() {
            println!("{} {}", style("✗").red(), e);
            failed.push(site.id.clone());
            continue;
        }

        println!(
            "{} Walking {} ({}, {})",
            style("→").cyan(),
            site.name,
            site.pagination.strategy(),
            site.engine.as_str()
        );

        let (event_tx, event_rx) = mpsc::channel::<RunEvent>(100);
        let renderer = tokio::spawn(progress::render(event_rx));

        let summary = Runner::new(site, settings, options.clone())
            .with_events(event_tx)
            .with_interrupt(interrupt.clone())
            .execute()
            .await;

        if let Err(e) = renderer.await {
            tracing::warn!("Progress renderer failed: {}", e);
        }
        print_summary(&summary);

        if summary.outcome.is_failure() {
            failed.push(summary.site.clone());
        }
        if summary.outcome == RunOutcome::Interrupted {
            break;
        }
    }
    listener.abort();

    if !failed.is_empty() {
        anyhow::bail!("Failed: {}", failed.join(", "));
    }
    Ok(())
}
