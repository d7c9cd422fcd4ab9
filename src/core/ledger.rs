use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// 已遷移 issue 的紀錄：來源 key → 目標 issue 編號
///
/// 每次成功匯入後立即寫回，重新執行時跳過已存在的 key。
pub struct MigrationLedger<S: Storage> {
    storage: S,
    path: String,
    entries: Mutex<BTreeMap<String, u64>>,
}

impl<S: Storage> MigrationLedger<S> {
    pub async fn load(storage: S, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let entries = if storage.exists(&path).await {
            let data = storage.read_file(&path).await?;
            let entries: BTreeMap<String, u64> = serde_json::from_slice(&data)?;
            tracing::info!("📒 Ledger {} has {} migrated issue(s)", path, entries.len());
            entries
        } else {
            tracing::info!("📒 Starting a new ledger at {}", path);
            BTreeMap::new()
        };

        Ok(Self {
            storage,
            path,
            entries: Mutex::new(entries),
        })
    }

    pub async fn get(&self, source_key: &str) -> Option<u64> {
        self.entries.lock().await.get(source_key).copied()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn record(&self, source_key: &str, issue_number: u64) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(source_key.to_string(), issue_number);
        let data = serde_json::to_vec_pretty(&*entries)?;
        self.storage.write_file(&self.path, &data).await
    }
}
