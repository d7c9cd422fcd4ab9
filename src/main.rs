use anyhow::Context;
use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracker_migrate::adapters::{GithubClient, JiraSource, LocalStorage, ReqwestTransport};
use tracker_migrate::config::{CliArgs, MigrationConfig};
use tracker_migrate::core::{
    DocumentRenderer, IssueBuilder, LabelAllowList, MigrationEngine, MigrationLedger, Migrator,
    SourceTracker,
};
use tracker_migrate::domain::model::MigrationReport;
use tracker_migrate::utils::error::{ErrorSeverity, MigrationError, Result};
use tracker_migrate::utils::{logger, validation::Validate};

type LiveMigrator =
    Migrator<JiraSource<ReqwestTransport>, GithubClient<ReqwestTransport>, LocalStorage>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // 初始化日誌
    if args.log_json {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("Starting tracker-migrate with {}", args.config.display());

    let mut config = MigrationConfig::from_file(&args.config).unwrap_or_else(|e| exit_with(&e));
    if let Some(jql) = &args.jql {
        config.source.jql = jql.clone();
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        exit_with(&e);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let migrator = build_migrator(&config, Arc::clone(&shutdown))
        .await
        .unwrap_or_else(|e| exit_with(&e));
    let engine = MigrationEngine::new(migrator);

    if args.dry_run {
        let batch = engine.prepare().await.unwrap_or_else(|e| exit_with(&e));
        for import in &batch.imports {
            let issue = serde_json::to_string_pretty(&import.issue)
                .with_context(|| format!("cannot serialize {}", import.source_key))?;
            println!("===== {} ({} comments) =====", import.source_key, import.comments.len());
            println!("{}", issue);
        }
        for failure in &batch.failures {
            println!("❌ {}: {}", failure.source_key, failure.reason);
        }
        println!(
            "🔎 Dry run: {} ready, {} already migrated, {} failed to convert",
            batch.imports.len(),
            batch.skipped.len(),
            batch.failures.len()
        );
        return Ok(());
    }

    // Ctrl-C 只設定旗標，進行中的 issue 會完成後才停止
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("🛑 Interrupt received, finishing the current issue before stopping");
            flag.store(true, Ordering::SeqCst);
        }
    });

    match engine.run().await {
        Ok(report) => {
            print_report(&report);
            if !report.is_clean() {
                // 部分失敗：修正後重新執行即可，ledger 會跳過已完成的 issue
                std::process::exit(2);
            }
        }
        Err(e) => exit_with(&e),
    }

    Ok(())
}

async fn build_migrator(config: &MigrationConfig, shutdown: Arc<AtomicBool>) -> Result<LiveMigrator> {
    let source = JiraSource::with_basic_auth(
        &config.source.base_url,
        &config.source.user,
        &config.source.api_token,
        config.source.page_size,
    )?;

    let limiter = Arc::new(config.rate_limiter());
    let sink = GithubClient::with_token(&config.sink.token, limiter, config.client_settings())?;
    // 看板名稱錯誤應在匯入前就失敗
    if let Some(project_id) = sink.project_id().await? {
        tracing::info!("📋 Imported issues will be added to project {}", project_id);
    }

    let labels = match &config.mapping.label_allow_list {
        Some(path) => LabelAllowList::from_path(path)?,
        None => LabelAllowList::allow_all(),
    };

    let custom_field_names = if config.mapping.custom_fields.is_empty() {
        Default::default()
    } else {
        source.fetch_custom_fields().await?
    };

    let builder = IssueBuilder::new(DocumentRenderer::new(&config.source.base_url))
        .with_labels(labels)
        .with_assignees(config.mapping.assignees.clone())
        .with_status_rules(config.mapping.status.clone())
        .with_custom_fields(
            config.mapping.custom_fields.clone(),
            custom_field_names,
            config.mapping.custom_fields_heading.clone(),
        )
        .with_max_body_chars(config.import.max_body_chars);

    let ledger_path = Path::new(&config.ledger.path);
    let ledger_dir = ledger_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let ledger_file = ledger_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| MigrationError::InvalidConfigValueError {
            field: "ledger.path".to_string(),
            value: config.ledger.path.clone(),
            reason: "Ledger path must name a file".to_string(),
        })?;
    let ledger = MigrationLedger::load(LocalStorage::new(ledger_dir), ledger_file).await?;

    Ok(Migrator::new(source, sink, builder, ledger, &config.source.jql).with_shutdown(shutdown))
}

fn print_report(report: &MigrationReport) {
    println!("✅ Migrated: {}", report.migrated.len());
    for issue in &report.migrated {
        println!("   {} → #{}", issue.source_key, issue.issue_number);
    }
    println!("⏭️  Already migrated: {}", report.skipped.len());
    println!("❌ Failed: {}", report.failed.len());
    for failure in &report.failed {
        println!("   {}: {}", failure.source_key, failure.reason);
    }
    if !report.incomplete.is_empty() {
        println!("⚠️  Created but incomplete: {}", report.incomplete.len());
        for issue in &report.incomplete {
            println!("   {}: {}", issue.source_key, issue.reason);
        }
    }
    if !report.not_attempted.is_empty() {
        println!(
            "🛑 Not attempted: {} ({})",
            report.not_attempted.len(),
            report.not_attempted.join(", ")
        );
    }
}

fn exit_with(e: &MigrationError) -> ! {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ Migration failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    // 輸出用戶友好的錯誤信息
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code)
}
