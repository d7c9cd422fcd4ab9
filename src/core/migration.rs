use crate::core::issue_builder::IssueBuilder;
use crate::core::ledger::MigrationLedger;
use crate::domain::model::{
    FailedIssue, MigratedIssue, MigrationReport, PreparedBatch, SourceBundle,
};
use crate::domain::ports::{IssueSink, Pipeline, SourceTracker, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 來源 → 轉換 → 匯入，一次處理一個 issue
pub struct Migrator<S, K, St>
where
    S: SourceTracker,
    K: IssueSink,
    St: Storage,
{
    source: S,
    sink: K,
    builder: IssueBuilder,
    ledger: MigrationLedger<St>,
    jql: String,
    shutdown: Arc<AtomicBool>,
}

impl<S, K, St> Migrator<S, K, St>
where
    S: SourceTracker,
    K: IssueSink,
    St: Storage,
{
    pub fn new(
        source: S,
        sink: K,
        builder: IssueBuilder,
        ledger: MigrationLedger<St>,
        jql: impl Into<String>,
    ) -> Self {
        Self {
            source,
            sink,
            builder,
            ledger,
            jql: jql.into(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 關閉訊號只在 issue 之間檢查，不會中斷進行中的匯入或輪詢
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn ledger(&self) -> &MigrationLedger<St> {
        &self.ledger
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    async fn remember(&self, source_key: &str, issue_number: u64) {
        if let Err(e) = self.ledger.record(source_key, issue_number).await {
            tracing::error!(
                "❌ {} was imported as #{} but the ledger could not be written: {}",
                source_key,
                issue_number,
                e
            );
        }
    }
}

#[async_trait]
impl<S, K, St> Pipeline for Migrator<S, K, St>
where
    S: SourceTracker,
    K: IssueSink,
    St: Storage,
{
    async fn extract(&self) -> Result<Vec<SourceBundle>> {
        let issues = self.source.fetch_issues(&self.jql).await?;
        let mut bundles = Vec::with_capacity(issues.len());

        for issue in issues {
            if self.ledger.get(&issue.key).await.is_some() {
                // 已遷移，不必再抓留言
                bundles.push(SourceBundle {
                    issue,
                    comments: Vec::new(),
                    export: None,
                });
                continue;
            }

            let comments = self.source.fetch_comments(&issue.key).await?;
            let export = if comments.is_empty() {
                None
            } else {
                Some(self.source.fetch_issue_export(&issue.key).await?)
            };
            tracing::debug!("📥 {}: {} comment(s)", issue.key, comments.len());

            bundles.push(SourceBundle {
                issue,
                comments,
                export,
            });
        }

        Ok(bundles)
    }

    async fn transform(&self, data: Vec<SourceBundle>) -> Result<PreparedBatch> {
        let mut batch = PreparedBatch::default();

        for bundle in data {
            let key = bundle.issue.key.clone();
            if let Some(issue_number) = self.ledger.get(&key).await {
                batch.skipped.push(MigratedIssue {
                    source_key: key,
                    issue_number,
                });
                continue;
            }

            match self.builder.build(&bundle) {
                Ok(import) => batch.imports.push(import),
                Err(e) => {
                    tracing::warn!("⚠️ Cannot convert {}: {}", key, e);
                    batch.failures.push(FailedIssue {
                        source_key: key,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(batch)
    }

    async fn load(&self, batch: PreparedBatch) -> Result<MigrationReport> {
        let mut report = MigrationReport {
            skipped: batch.skipped,
            failed: batch.failures,
            ..Default::default()
        };

        let mut pending = batch.imports.into_iter();
        for import in pending.by_ref() {
            if self.shutdown_requested() {
                tracing::warn!("🛑 Shutdown requested, stopping before {}", import.source_key);
                report.not_attempted.push(import.source_key);
                break;
            }

            if let Some(issue_number) = self.ledger.get(&import.source_key).await {
                report.skipped.push(MigratedIssue {
                    source_key: import.source_key,
                    issue_number,
                });
                continue;
            }

            match self.sink.submit_import(&import).await {
                Ok(issue_number) => {
                    self.remember(&import.source_key, issue_number).await;
                    report.migrated.push(MigratedIssue {
                        source_key: import.source_key,
                        issue_number,
                    });
                }
                Err(e) => match e.created_issue() {
                    // issue 已建立：寫入 ledger 避免重跑時重複建立，並標記為不完整
                    Some(issue_number) => {
                        tracing::warn!(
                            "⚠️ {} was imported as #{} but is incomplete: {}",
                            import.source_key,
                            issue_number,
                            e
                        );
                        self.remember(&import.source_key, issue_number).await;
                        report.incomplete.push(FailedIssue {
                            source_key: import.source_key.clone(),
                            reason: e.to_string(),
                        });
                        report.migrated.push(MigratedIssue {
                            source_key: import.source_key,
                            issue_number,
                        });
                    }
                    None => {
                        tracing::error!(
                            "❌ Failed to import {} ({:?}): {}",
                            import.source_key,
                            e.category(),
                            e
                        );
                        report.failed.push(FailedIssue {
                            source_key: import.source_key,
                            reason: e.to_string(),
                        });
                    }
                },
            }
        }
        report
            .not_attempted
            .extend(pending.map(|import| import.source_key));

        Ok(report)
    }
}

pub struct MigrationEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> MigrationEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// 只做 extract + transform，不寫入目標平台
    pub async fn prepare(&self) -> Result<PreparedBatch> {
        tracing::info!("🔎 Extracting source issues...");
        let bundles = self.pipeline.extract().await?;
        tracing::info!("📦 Extracted {} issue(s)", bundles.len());

        tracing::info!("🔄 Converting issues...");
        let batch = self.pipeline.transform(bundles).await?;
        tracing::info!(
            "🔄 {} ready, {} already migrated, {} failed to convert",
            batch.imports.len(),
            batch.skipped.len(),
            batch.failures.len()
        );
        Ok(batch)
    }

    pub async fn run(&self) -> Result<MigrationReport> {
        tracing::info!("🚀 Starting migration");

        let batch = self.prepare().await?;

        tracing::info!("📤 Importing {} issue(s)...", batch.imports.len());
        let report = self.pipeline.load(batch).await?;

        tracing::info!(
            "🏁 Migration finished: {} migrated, {} skipped, {} failed, {} not attempted",
            report.migrated.len(),
            report.skipped.len(),
            report.failed.len(),
            report.not_attempted.len()
        );
        for failure in &report.failed {
            tracing::warn!("   ❌ {}: {}", failure.source_key, failure.reason);
        }

        Ok(report)
    }
}
