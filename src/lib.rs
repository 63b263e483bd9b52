//! expocrawl - declarative exhibitor-directory walker.
//!
//! Walks paginated or infinitely-scrolling trade-show exhibitor listings,
//! optionally enriches each exhibitor from its detail page, and writes the
//! collected rows to a spreadsheet with periodic checkpoints.

pub mod cli;
pub mod config;
pub mod enricher;
pub mod extract;
pub mod models;
pub mod runner;
pub mod session;
pub mod sink;
pub mod sites;
pub mod wait;
pub mod walker;

pub use config::{Config, Settings, Timing};
pub use models::ExhibitorRecord;
pub use runner::{RunEvent, RunOutcome, RunSummary};
pub use session::BrowserSession;
pub use sink::CheckpointSink;
pub use sites::SiteDescriptor;
