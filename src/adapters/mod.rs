// 外部系統的具體實作：HTTP、檔案儲存、來源追蹤系統與匯入端
pub mod github;
pub mod http;
pub mod jira;
pub mod storage;

pub use github::{GithubClient, RateLimiter, RequestKind};
pub use http::{ApiResponse, Auth, HttpTransport, ReqwestTransport};
pub use jira::JiraSource;
pub use storage::LocalStorage;
