use anyhow::Result;
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use std::fs;
use std::path::Path;

/// 删除早于保留期的日志文件, 返回删除的文件数
///
/// 只处理 `<prefix>.<YYYY-MM-DD>.log` 形式的文件, 其他文件不受影响.
pub fn cleanup_logs(directory: &Path, prefix: &str, retention_days: i64) -> Result<usize> {
    if !directory.exists() {
        return Ok(0);
    }

    let today = Local::now().date_naive();
    let cutoff = today - ChronoDuration::days(retention_days.max(0));

    let mut removed = 0;
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some(date) = parse_log_name(&file_name, prefix) else {
            continue;
        };
        if date < cutoff && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }

    Ok(removed)
}

fn parse_log_name(file_name: &str, prefix: &str) -> Option<NaiveDate> {
    let with_prefix = file_name.strip_prefix(prefix)?;
    let with_dot = with_prefix.strip_prefix('.')?;
    let date_part = with_dot.strip_suffix(".log")?;
    parse_date(date_part)
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}
