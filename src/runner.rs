//! Run orchestration.
//!
//! A run walks one site's listing, enriches each item when the site has
//! detail pages, and hands records to the checkpointing sink. Whatever ends
//! the walk (completion, a fatal error, a panic, the item limit, or an
//! interrupt), the sink persists once more and the session is shut down
//! before the summary is returned. Progress goes out as [`RunEvent`]s; the
//! runner itself never prints.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{Settings, Timing};
use crate::enricher::DetailEnricher;
use crate::extract::{ItemError, ListingItem};
use crate::models::{columns, ExhibitorRecord};
use crate::session::{open_session, panic_message, BrowserSession};
use crate::sink::{CheckpointSink, SinkError};
use crate::sites::SiteDescriptor;
use crate::walker::{ListingWalker, WalkError};

/// Shared stop flag, observed between items.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Trigger on the first Ctrl-C.
    pub fn listen_ctrl_c(&self) -> JoinHandle<()> {
        let flag = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; stopping after the current item");
                flag.trigger();
            }
        })
    }
}

/// Per-run options from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Stop after this many saved records.
    pub limit: Option<usize>,
    /// Visit detail pages when the site has them.
    pub details: bool,
    /// Overrides the site and global checkpoint interval.
    pub checkpoint_interval: Option<usize>,
    /// Overrides the site's primary output file.
    pub output: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            limit: None,
            details: true,
            checkpoint_interval: None,
            output: None,
        }
    }
}

/// Progress events emitted during a run.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Started {
        site: String,
        output: PathBuf,
    },
    PageLoaded {
        page: u32,
        items: usize,
    },
    ItemSaved {
        order: usize,
        page: u32,
        position: usize,
        name: String,
    },
    ItemSkipped {
        page: u32,
        position: usize,
        identity: String,
        reason: String,
    },
    Checkpoint {
        records: usize,
        path: PathBuf,
    },
    Finished {
        records: usize,
    },
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Interrupted,
    LimitReached,
    Failed(String),
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed(_))
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Interrupted => write!(f, "interrupted"),
            RunOutcome::LimitReached => write!(f, "limit reached"),
            RunOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Result of one site run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub site: String,
    pub output: PathBuf,
    pub pages: u32,
    /// Records collected (before deduplication).
    pub saved: usize,
    pub skipped: usize,
    /// Rows in the final output file.
    pub persisted: usize,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

#[derive(Debug, Default)]
struct Tally {
    pages: u32,
    skipped: usize,
}

pub struct Runner<'a> {
    site: &'a SiteDescriptor,
    settings: &'a Settings,
    options: RunOptions,
    events: Option<mpsc::Sender<RunEvent>>,
    interrupt: Interrupt,
}

impl<'a> Runner<'a> {
    pub fn new(site: &'a SiteDescriptor, settings: &'a Settings, options: RunOptions) -> Self {
        Self {
            site,
            settings,
            options,
            events: None,
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_events(mut self, tx: mpsc::Sender<RunEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Primary output path for this run.
    pub fn output_path(&self) -> PathBuf {
        self.options
            .output
            .clone()
            .unwrap_or_else(|| self.settings.output_dir.join(self.site.output_file()))
    }

    async fn emit(&self, event: RunEvent) {
        if let Some(ref tx) = self.events {
            if tx.send(event).await.is_err() {
                debug!("Event receiver dropped");
            }
        }
    }

    fn build_sink(&self, path: PathBuf) -> Result<CheckpointSink, SinkError> {
        let interval = self
            .options
            .checkpoint_interval
            .or(self.site.output.checkpoint_interval)
            .unwrap_or(self.settings.checkpoint_interval);
        let dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| self.settings.output_dir.clone());

        let mut sink = CheckpointSink::new(path, self.site.columns())?
            .missing_value(self.settings.missing_value.as_str())
            .checkpoint_every(interval)
            .dedup_by(self.site.output.dedup_by.clone());
        for secondary in &self.site.output.secondary {
            sink = sink.with_secondary(dir.join(secondary.replace("{id}", &self.site.id)))?;
        }
        Ok(sink)
    }

    /// Open the site's session and run.
    pub async fn execute(self) -> RunSummary {
        match open_session(self.site, self.settings).await {
            Ok(mut session) => self.run(session.as_mut()).await,
            Err(e) => {
                error!(site = %self.site.id, "Failed to open session: {}", e);
                let started_at = Utc::now();
                let output = self.output_path();
                self.emit(RunEvent::Started {
                    site: self.site.id.clone(),
                    output: output.clone(),
                })
                .await;
                let persisted = match self.build_sink(output.clone()) {
                    Ok(mut sink) => sink.finish().unwrap_or_else(|e| {
                        warn!("Final save failed: {}", e);
                        0
                    }),
                    Err(e) => {
                        warn!("Output unavailable: {}", e);
                        0
                    }
                };
                self.emit(RunEvent::Finished { records: persisted }).await;
                RunSummary {
                    site: self.site.id.clone(),
                    output,
                    pages: 0,
                    saved: 0,
                    skipped: 0,
                    persisted,
                    outcome: RunOutcome::Failed(e.to_string()),
                    started_at,
                    finished_at: Utc::now(),
                }
            }
        }
    }

    /// Run against an already open session, then shut it down.
    pub async fn run(self, session: &mut dyn BrowserSession) -> RunSummary {
        let started_at = Utc::now();
        let output = self.output_path();
        info!(site = %self.site.id, output = %output.display(), "Starting run");
        self.emit(RunEvent::Started {
            site: self.site.id.clone(),
            output: output.clone(),
        })
        .await;

        let mut tally = Tally::default();
        let (mut outcome, saved, persisted) = match self.build_sink(output.clone()) {
            Ok(mut sink) => {
                let walked = AssertUnwindSafe(self.walk(session, &mut sink, &mut tally))
                    .catch_unwind()
                    .await;
                let mut outcome = match walked {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => {
                        error!(site = %self.site.id, "Walk failed: {}", e);
                        RunOutcome::Failed(e.to_string())
                    }
                    Err(panic) => {
                        let message = panic_message(panic);
                        error!(site = %self.site.id, "Walk panicked: {}", message);
                        RunOutcome::Failed(format!("panic: {}", message))
                    }
                };
                let persisted = match sink.finish() {
                    Ok(rows) => rows,
                    Err(e) => {
                        error!(site = %self.site.id, "Final save failed: {}", e);
                        if !outcome.is_failure() {
                            outcome = RunOutcome::Failed(format!("final save failed: {}", e));
                        }
                        0
                    }
                };
                (outcome, sink.len(), persisted)
            }
            Err(e) => (RunOutcome::Failed(e.to_string()), 0, 0),
        };

        if let Err(e) = session.shutdown().await {
            warn!("Session shutdown failed: {}", e);
        }
        info!(
            site = %self.site.id,
            pages = tally.pages,
            saved,
            skipped = tally.skipped,
            "Run {}",
            outcome
        );
        self.emit(RunEvent::Finished { records: persisted }).await;

        RunSummary {
            site: self.site.id.clone(),
            output,
            pages: tally.pages,
            saved,
            skipped: tally.skipped,
            persisted,
            outcome,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn limit_reached(&self, sink: &CheckpointSink) -> bool {
        self.options.limit.is_some_and(|limit| sink.len() >= limit)
    }

    async fn walk(
        &self,
        session: &mut dyn BrowserSession,
        sink: &mut CheckpointSink,
        tally: &mut Tally,
    ) -> Result<RunOutcome, WalkError> {
        let timing: Timing = self.settings.timing.with_overrides(&self.site.timing);
        let missing = self.settings.missing_value.as_str();
        let mut walker = ListingWalker::new(self.site, timing.clone(), missing, self.options.details)?;
        let enricher = self
            .site
            .detail
            .as_ref()
            .filter(|_| self.options.details)
            .map(|detail| DetailEnricher::new(detail, &timing, missing));

        loop {
            if self.interrupt.is_triggered() {
                return Ok(RunOutcome::Interrupted);
            }
            if self.limit_reached(sink) {
                return Ok(RunOutcome::LimitReached);
            }
            let Some(page) = walker.next_page(session).await? else {
                break;
            };
            tally.pages += 1;
            info!(site = %self.site.id, page = page.number, items = page.items.len(), "Page loaded");
            self.emit(RunEvent::PageLoaded {
                page: page.number,
                items: page.items.len(),
            })
            .await;

            for item in page.items {
                if self.interrupt.is_triggered() {
                    return Ok(RunOutcome::Interrupted);
                }
                if self.limit_reached(sink) {
                    return Ok(RunOutcome::LimitReached);
                }

                let item = match item {
                    Ok(item) => item,
                    Err(skipped) => {
                        warn!(
                            page = page.number,
                            position = skipped.position,
                            "Skipping '{}': {}",
                            skipped.identity,
                            skipped.error
                        );
                        tally.skipped += 1;
                        self.emit(RunEvent::ItemSkipped {
                            page: page.number,
                            position: skipped.position,
                            identity: skipped.identity,
                            reason: skipped.error.to_string(),
                        })
                        .await;
                        continue;
                    }
                };

                let position = item.position;
                let identity = item.identity.clone();
                let record = match self
                    .build_record(session, sink, enricher.as_ref(), page.number, item)
                    .await
                {
                    Ok(record) => record,
                    Err(error) => {
                        warn!(
                            page = page.number,
                            position, "Skipping '{}': {}", identity, error
                        );
                        tally.skipped += 1;
                        self.emit(RunEvent::ItemSkipped {
                            page: page.number,
                            position,
                            identity,
                            reason: error.to_string(),
                        })
                        .await;
                        continue;
                    }
                };

                let order = sink.len() + 1;
                let checkpointed = match sink.push(record) {
                    Ok(done) => done,
                    Err(e) => {
                        warn!("Checkpoint failed: {}", e);
                        false
                    }
                };
                debug!(order, page = page.number, position, "Saved '{}'", identity);
                self.emit(RunEvent::ItemSaved {
                    order,
                    page: page.number,
                    position,
                    name: identity,
                })
                .await;
                if checkpointed {
                    self.emit(RunEvent::Checkpoint {
                        records: sink.len(),
                        path: sink.path().to_path_buf(),
                    })
                    .await;
                }
            }
        }
        Ok(RunOutcome::Completed)
    }

    async fn build_record(
        &self,
        session: &mut dyn BrowserSession,
        sink: &CheckpointSink,
        enricher: Option<&DetailEnricher<'_>>,
        page: u32,
        item: ListingItem,
    ) -> Result<ExhibitorRecord, ItemError> {
        let missing = sink.missing();
        let mut record = sink.new_record();
        record.set(columns::ORDER, (sink.len() + 1).to_string());
        record.set(columns::PAGE, page.to_string());
        record.set(columns::POSITION, item.position.to_string());
        record.merge(item.fields, missing);

        if let (Some(enricher), Some(detail)) = (enricher, self.site.detail.as_ref()) {
            match item.detail_url {
                Some(url) => {
                    record.set(&detail.link.column, url.as_str());
                    let values = enricher
                        .enrich(session, &url)
                        .await
                        .map_err(|e| ItemError::Detail(e.to_string()))?;
                    record.merge(values, missing);
                }
                None => debug!("No detail link for '{}'", item.identity),
            }
        }
        Ok(record)
    }
}
