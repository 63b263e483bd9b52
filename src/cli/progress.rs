//! Console rendering of run events.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::runner::RunEvent;

/// Consume events until the runner drops its sender.
pub async fn render(mut events: mpsc::Receiver<RunEvent>) {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut saved = 0usize;
    let mut skipped = 0usize;
    let mut page = 0u32;

    while let Some(event) = events.recv().await {
        match event {
            RunEvent::Started { site, output } => {
                pb.set_message(format!("Loading {} -> {}", site, output.display()));
            }
            RunEvent::PageLoaded { page: number, items } => {
                page = number;
                pb.set_message(format!(
                    "Page {}: {} items ({} saved, {} skipped)",
                    page, items, saved, skipped
                ));
            }
            RunEvent::ItemSaved { order, name, .. } => {
                saved = order;
                pb.set_message(format!(
                    "Page {}: #{} {} ({} skipped)",
                    page, order, name, skipped
                ));
            }
            RunEvent::ItemSkipped {
                page,
                position,
                identity,
                reason,
            } => {
                skipped += 1;
                pb.println(format!(
                    "{} Skipped page {} item {} ({}): {}",
                    style("!").yellow(),
                    page,
                    position,
                    identity,
                    reason
                ));
            }
            RunEvent::Checkpoint { records, path } => {
                pb.println(format!(
                    "  {} Checkpoint: {} records -> {}",
                    style("→").dim(),
                    records,
                    path.display()
                ));
            }
            RunEvent::Finished { .. } => {
                pb.finish_and_clear();
            }
        }
    }
    pb.finish_and_clear();
}
