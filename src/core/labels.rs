use crate::utils::error::{MigrationError, Result};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

const LABELS_COLUMN: &str = "Labels";

/// 目標平台允許的標籤清單
///
/// 比對不分大小寫，回傳清單中的原始寫法；沒有清單時保留所有來源標籤。
#[derive(Debug, Clone, Default)]
pub struct LabelAllowList {
    entries: Option<Vec<String>>,
}

impl LabelAllowList {
    pub fn allow_all() -> Self {
        Self { entries: None }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let column = csv_reader
            .headers()?
            .iter()
            .position(|h| h.trim() == LABELS_COLUMN)
            .ok_or_else(|| MigrationError::ValidationError {
                message: format!("label allow-list has no '{}' column", LABELS_COLUMN),
            })?;

        let mut entries = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            if let Some(label) = record.get(column).map(str::trim).filter(|l| !l.is_empty()) {
                entries.push(label.to_string());
            }
        }

        tracing::debug!("🏷️ Loaded {} allowed labels", entries.len());
        Ok(Self {
            entries: Some(entries),
        })
    }

    pub fn entry_count(&self) -> Option<usize> {
        self.entries.as_ref().map(Vec::len)
    }

    /// 依清單順序回傳符合的標籤
    pub fn filter(&self, source_labels: &[String]) -> Vec<String> {
        let Some(entries) = &self.entries else {
            return source_labels.to_vec();
        };

        let wanted: HashSet<String> = source_labels.iter().map(|l| l.to_lowercase()).collect();
        let matched: Vec<String> = entries
            .iter()
            .filter(|entry| wanted.contains(&entry.to_lowercase()))
            .cloned()
            .collect();

        if !source_labels.is_empty() && matched.is_empty() {
            tracing::warn!(
                "⚠️ None of the labels {:?} are in the allow-list",
                source_labels
            );
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_matching_is_case_insensitive_and_keeps_list_casing() {
        let csv = "Labels,Description\nFrontend,UI work\nNeeds-Triage,\nDatabase,db\n";
        let allow = LabelAllowList::from_reader(csv.as_bytes()).unwrap();

        assert_eq!(allow.entry_count(), Some(3));
        assert_eq!(
            allow.filter(&labels(&["database", "frontend", "random"])),
            labels(&["Frontend", "Database"])
        );
        assert!(allow.filter(&labels(&["random"])).is_empty());
    }

    #[test]
    fn test_missing_column_is_rejected() {
        let err = LabelAllowList::from_reader("Name\nfoo\n".as_bytes()).unwrap_err();
        assert!(matches!(err, MigrationError::ValidationError { .. }));
    }

    #[test]
    fn test_allow_all_passes_labels_through() {
        let allow = LabelAllowList::allow_all();
        assert_eq!(allow.filter(&labels(&["a", "B"])), labels(&["a", "B"]));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("labels.csv");
        std::fs::write(&path, "Labels\nbackend\n").unwrap();

        let allow = LabelAllowList::from_path(&path).unwrap();
        assert_eq!(allow.filter(&labels(&["BACKEND"])), labels(&["backend"]));
    }
}
