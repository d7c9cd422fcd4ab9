use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "tracker-migrate")]
#[command(about = "Migrate Jira issues into a GitHub repository through the import API")]
pub struct CliArgs {
    /// 遷移設定檔 (TOML)
    #[arg(short, long, env = "TRACKER_MIGRATE_CONFIG", default_value = "migrate.toml")]
    pub config: PathBuf,

    /// 覆寫設定檔中的 JQL 查詢
    #[arg(long)]
    pub jql: Option<String>,

    #[arg(long, help = "Convert issues and print them without importing")]
    pub dry_run: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub log_json: bool,
}
