use crate::utils::error::{MigrationError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};

/// 目標平台固定的時間格式（UTC，精確到秒）
pub const SINK_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// 將來源時間（含小數秒與數字時區，如 `2021-01-22T11:11:47.758+0100`）轉為 UTC 秒級格式
pub fn normalize_timestamp(value: &str) -> Result<String> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(format_utc(dt.with_timezone(&Utc)));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(format_utc(dt.with_timezone(&Utc)));
    }

    // 沒有時區資訊時視為 UTC
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| format_utc(naive.and_utc()))
        .map_err(|e| MigrationError::InvalidTimestamp {
            value: value.to_string(),
            message: e.to_string(),
        })
}

fn format_utc(dt: DateTime<Utc>) -> String {
    dt.format(SINK_TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_offset_is_converted_to_utc() {
        assert_eq!(
            normalize_timestamp("2021-01-22T11:11:47.758+0100").unwrap(),
            "2021-01-22T10:11:47Z"
        );
    }

    #[test]
    fn test_negative_offset_crosses_day_boundary() {
        assert_eq!(
            normalize_timestamp("2023-12-31T22:30:00.001-0230").unwrap(),
            "2024-01-01T01:00:00Z"
        );
    }

    #[test]
    fn test_missing_offset_is_treated_as_utc() {
        assert_eq!(
            normalize_timestamp("2020-05-01T08:00:00.999").unwrap(),
            "2020-05-01T08:00:00Z"
        );
    }

    #[test]
    fn test_rfc3339_input_is_accepted() {
        assert_eq!(
            normalize_timestamp("2022-03-04T05:06:07Z").unwrap(),
            "2022-03-04T05:06:07Z"
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = normalize_timestamp("yesterday").unwrap_err();
        assert!(matches!(err, MigrationError::InvalidTimestamp { .. }));
    }
}
