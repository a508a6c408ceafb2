//! JSON Lines result log.
//!
//! One [`ResultRecord`] object per line, UTF-8, appended through the same
//! [`AppendLog`] discipline as the checkpoint logs. Older runs sometimes wrote
//! a JSON array per line; [`read_result_log`] accepts both and normalises to a
//! flat list.

use crate::checkpoint::{AppendLog, AppendMark};
use crate::error::{BatchError, CommitError};
use crate::output::ResultRecord;
use serde_json::Value;
use std::io;
use std::path::Path;
use tracing::warn;

/// Append-only writer for result records.
#[derive(Debug)]
pub struct ResultSink {
    log: AppendLog,
}

impl ResultSink {
    pub async fn open(path: &Path) -> Result<Self, BatchError> {
        let (log, _) = AppendLog::open(path)
            .await
            .map_err(|source| BatchError::LogOpenFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self { log })
    }

    pub fn path(&self) -> &Path {
        self.log.path()
    }

    /// Serialise and durably append one record.
    pub async fn append(&self, record: &ResultRecord) -> Result<AppendMark, CommitError> {
        let line = serde_json::to_string(record)?;
        self.log
            .append_line(&line)
            .await
            .map_err(|source| CommitError::ResultAppend {
                path: self.log.path().to_path_buf(),
                source,
            })
    }

    /// Take back the record appended at `mark` if it is still the last line.
    pub async fn retract(&self, mark: AppendMark) -> io::Result<bool> {
        self.log.retract(mark).await
    }

    #[cfg(test)]
    pub(crate) fn log(&self) -> &AppendLog {
        &self.log
    }
}

/// Records read back from a result log.
#[derive(Debug, Default)]
pub struct ResultLogContents {
    pub records: Vec<ResultRecord>,
    /// Non-empty lines that were not an object or array of objects.
    pub malformed_lines: usize,
}

/// Read every record in a result log.
///
/// Each line may hold one object or an array of objects. Lines that do not
/// parse, and array elements without a string `pnr`, are skipped and
/// counted. A missing file reads as empty.
pub async fn read_result_log(path: &Path) -> io::Result<ResultLogContents> {
    let text = match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ResultLogContents::default()),
        Err(e) => return Err(e),
    };
    Ok(parse_result_lines(&text))
}

fn parse_result_lines(text: &str) -> ResultLogContents {
    let mut out = ResultLogContents::default();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let values = match serde_json::from_str::<Value>(line) {
            Ok(Value::Array(items)) => items,
            Ok(obj @ Value::Object(_)) => vec![obj],
            Ok(_) | Err(_) => {
                warn!(line = lineno + 1, "Skipping malformed result line");
                out.malformed_lines += 1;
                continue;
            }
        };
        for value in values {
            match serde_json::from_value::<ResultRecord>(value) {
                Ok(rec) => out.records.push(rec),
                Err(_) => {
                    warn!(line = lineno + 1, "Skipping result without pnr");
                    out.malformed_lines += 1;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::DocumentId;
    use tempfile::TempDir;

    #[tokio::test]
    async fn append_then_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("FullText.jsonl");
        let sink = ResultSink::open(&path).await.unwrap();
        sink.append(&ResultRecord::new(&DocumentId::new("CN1A")).with_field("description", "正文"))
            .await
            .unwrap();
        sink.append(&ResultRecord::new(&DocumentId::new("CN2B")).with_field("description", "x"))
            .await
            .unwrap();

        let contents = read_result_log(&path).await.unwrap();
        assert_eq!(contents.records.len(), 2);
        assert_eq!(contents.records[0].field("description"), Some("正文"));
        assert_eq!(contents.malformed_lines, 0);
    }

    #[test]
    fn accepts_object_or_array_per_line() {
        let text = concat!(
            "{\"pnr\":\"CN1A\",\"left\":\"a\",\"right\":\"b\"}\n",
            "[{\"pnr\":\"CN2B\",\"left\":\"c\"},{\"pnr\":\"CN3C\"}]\n",
            "\n",
            "not json\n",
            "[{\"nopnr\":1}]\n",
            "42\n",
        );
        let c = parse_result_lines(text);
        let ids: Vec<&str> = c.records.iter().map(|r| r.pnr.as_str()).collect();
        assert_eq!(ids, ["CN1A", "CN2B", "CN3C"]);
        assert_eq!(c.malformed_lines, 3);
    }

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let c = read_result_log(&dir.path().join("nope.jsonl")).await.unwrap();
        assert!(c.records.is_empty());
    }
}
