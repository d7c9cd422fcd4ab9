pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{GithubClient, JiraSource, LocalStorage, RateLimiter};
pub use config::MigrationConfig;
pub use core::{DocumentRenderer, IssueBuilder, MediaCorrelator, MigrationEngine, Migrator};
pub use utils::error::{MigrationError, Result};
