pub mod issue_builder;
pub mod labels;
pub mod ledger;
pub mod media;
pub mod migration;
pub mod renderer;

pub use crate::domain::ports::{IssueSink, Pipeline, SourceTracker, Storage};
pub use crate::utils::error::Result;
pub use issue_builder::{IssueBuilder, StatusRule};
pub use labels::LabelAllowList;
pub use ledger::MigrationLedger;
pub use media::MediaCorrelator;
pub use migration::{MigrationEngine, Migrator};
pub use renderer::DocumentRenderer;
