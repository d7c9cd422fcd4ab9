//! 匯入 API 的寫入端：限流、重試、非同步工作輪詢與留言分批。

pub mod client;
pub mod models;
pub mod rate_limiter;

pub use client::{ClientSettings, GithubClient, ImportSettings, RetryPolicy};
pub use models::{ImportJob, ImportJobState};
pub use rate_limiter::{RateLimiter, RequestKind};
