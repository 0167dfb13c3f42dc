// Copyright 2024 svcdash Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Newest-first CSV audit log with a byte bound

use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use svcdash_core::{write_atomic, ActionKind, FileLock, ServiceDeclaration};
use tokio::sync::Mutex;

use crate::dispatcher::Selector;
use crate::monitor::StatusChange;
use crate::{ServerError, ServerResult};

/// First line of every action log
pub const LOG_HEADER: &str = "timestamp,user,ip,action,name,service_name,systemd_name,port,result\n";

/// One audited action or status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub ip: String,
    pub action: ActionKind,
    pub name: String,
    pub service_name: String,
    pub systemd_name: String,
    pub port: u16,
    pub result: String,
}

impl ActionLogEntry {
    pub fn new(
        user: impl Into<String>,
        ip: impl Into<String>,
        action: ActionKind,
        result: impl Into<String>,
    ) -> Self {
        ActionLogEntry {
            timestamp: Utc::now(),
            user: user.into(),
            ip: ip.into(),
            action,
            name: String::new(),
            service_name: String::new(),
            systemd_name: String::new(),
            port: 0,
            result: result.into(),
        }
    }

    /// Target identity taken from a resolved declaration
    pub fn with_declaration(mut self, decl: &ServiceDeclaration) -> Self {
        self.name = decl.name.clone();
        self.service_name = decl.service_name.clone().unwrap_or_default();
        self.systemd_name = decl.systemd_name.clone().unwrap_or_default();
        self.port = decl.port;
        self
    }

    /// Target identity as requested, for selectors that resolved to nothing
    pub fn with_selector(mut self, selector: &Selector) -> Self {
        self.name = selector.name.clone().unwrap_or_default();
        self.service_name = selector.service_name.clone().unwrap_or_default();
        self.systemd_name = selector.systemd_name.clone().unwrap_or_default();
        self.port = selector.port.unwrap_or(0);
        self
    }

    /// Entry recorded by the monitor when a service flips
    pub fn status_change(change: &StatusChange) -> Self {
        ActionLogEntry {
            timestamp: change.at,
            user: "monitor".to_string(),
            ip: "127.0.0.1".to_string(),
            action: ActionKind::Status,
            name: change.name.clone(),
            service_name: change.unit.clone(),
            systemd_name: change.unit.clone(),
            port: change.port,
            result: change.state_label().to_string(),
        }
    }

    /// One CSV row including the trailing newline
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{}\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            escape_csv(&self.user),
            escape_csv(&self.ip),
            escape_csv(self.action.as_str()),
            escape_csv(&self.name),
            escape_csv(&self.service_name),
            escape_csv(&self.systemd_name),
            self.port,
            escape_csv(&self.result),
        )
    }
}

/// Quote a CSV field when needed.
///
/// Line breaks inside a field become spaces so every entry stays on one
/// physical line.
pub fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        let escaped = field.replace('"', "\"\"").replace(['\r', '\n'], " ");
        format!("\"{}\"", escaped)
    } else {
        field.to_string()
    }
}

/// Insert `line` directly after the header of `existing`.
///
/// Works on raw bytes so rows in other encodings survive untouched.
/// Content whose first line is not a `timestamp,...` header is discarded. With a
/// positive `max_bytes` the oldest rows are cut so the result fits, always
/// on a line boundary; the header itself is never cut.
pub fn prepend_entry(existing: Option<&[u8]>, line: &str, max_bytes: u64) -> Vec<u8> {
    let old_body = existing
        .filter(|content| content.starts_with(b"timestamp,"))
        .and_then(|content| {
            let newline = content.iter().position(|b| *b == b'\n')?;
            Some(&content[newline + 1..])
        })
        .unwrap_or(&[]);

    let mut body = Vec::with_capacity(line.len() + old_body.len() + 1);
    body.extend_from_slice(line.as_bytes());
    if !line.ends_with('\n') {
        body.push(b'\n');
    }
    body.extend_from_slice(old_body);

    let max = usize::try_from(max_bytes).unwrap_or(usize::MAX);
    if max > 0 && LOG_HEADER.len() + body.len() > max {
        body.truncate(max.saturating_sub(LOG_HEADER.len()));
        match body.iter().rposition(|b| *b == b'\n') {
            Some(idx) => body.truncate(idx + 1),
            None => body.clear(),
        }
    }

    let mut content = Vec::with_capacity(LOG_HEADER.len() + body.len());
    content.extend_from_slice(LOG_HEADER.as_bytes());
    content.extend_from_slice(&body);
    content
}

/// Audit log file.
///
/// Appends are serialized within the process by a mutex and across
/// processes by an exclusive lock on `<path>.lock`; the log is re-read only
/// once both are held.
#[derive(Debug)]
pub struct ActionLog {
    path: PathBuf,
    max_bytes: u64,
    lock: Mutex<()>,
}

impl ActionLog {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        ActionLog {
            path: path.into(),
            max_bytes,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub async fn append(&self, entry: &ActionLogEntry) -> ServerResult<()> {
        let _guard = self.lock.lock().await;
        let _file_lock = FileLock::acquire(&self.path)
            .await
            .map_err(|e| ServerError::persistence(&self.path, e))?;

        let existing = match tokio::fs::read(&self.path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(ServerError::persistence(&self.path, e)),
        };

        let content = prepend_entry(existing.as_deref(), &entry.to_csv_line(), self.max_bytes);
        write_atomic(&self.path, &content)
            .await
            .map_err(|e| ServerError::persistence(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(name: &str, result: &str) -> ActionLogEntry {
        let mut entry = ActionLogEntry::new("admin", "10.0.0.7", ActionKind::Start, result);
        entry.timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        entry.with_declaration(&ServiceDeclaration::new(name).with_systemd_name("app.service").with_port(8080))
    }

    #[test]
    fn test_csv_line_format() {
        assert_eq!(
            entry("app", "ok").to_csv_line(),
            "2024-05-01T12:30:00Z,admin,10.0.0.7,start,app,,app.service,8080,ok\n"
        );
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("two\nlines"), "\"two lines\"");
    }

    #[test]
    fn test_prepend_is_newest_first() {
        let first = prepend_entry(None, "1\n", 0);
        let second = prepend_entry(Some(first.as_slice()), "2\n", 0);
        assert_eq!(second, format!("{}2\n1\n", LOG_HEADER).into_bytes());
    }

    #[test]
    fn test_foreign_content_is_replaced() {
        let content = prepend_entry(Some(b"garbage\nmore garbage\n".as_slice()), "1\n", 0);
        assert_eq!(content, format!("{}1\n", LOG_HEADER).into_bytes());
    }

    #[test]
    fn test_bound_drops_oldest_on_line_boundary() {
        let mut content = prepend_entry(None, "aaaa\n", 0);
        content = prepend_entry(Some(content.as_slice()), "bbbb\n", 0);
        let bound = (LOG_HEADER.len() + 12) as u64;
        let content = prepend_entry(Some(content.as_slice()), "cccc\n", bound);

        assert_eq!(content, format!("{}cccc\nbbbb\n", LOG_HEADER).into_bytes());
    }

    #[test]
    fn test_header_survives_tiny_bound() {
        let content = prepend_entry(None, "entry\n", 10);
        assert_eq!(content, LOG_HEADER.as_bytes());
    }

    #[test]
    fn test_non_utf8_rows_are_kept() {
        let mut existing = LOG_HEADER.as_bytes().to_vec();
        existing.extend_from_slice(b"2024-05-01T12:00:00Z,admin,10.0.0.7,start,Caf\xe9,,,80,ok\n");
        existing.extend_from_slice(b"2024-05-01T11:00:00Z,admin,10.0.0.7,stop,db,,,5432,ok\n");

        let content = prepend_entry(Some(existing.as_slice()), "newest\n", 0);

        let mut expected = LOG_HEADER.as_bytes().to_vec();
        expected.extend_from_slice(b"newest\n");
        expected.extend_from_slice(&existing[LOG_HEADER.len()..]);
        assert_eq!(content, expected);
    }

    #[tokio::test]
    async fn test_append_keeps_latin1_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut existing = LOG_HEADER.as_bytes().to_vec();
        existing.extend_from_slice(b"2024-05-01T12:00:00Z,admin,10.0.0.7,start,Caf\xe9,,,80,ok\n");
        existing.extend_from_slice(b"2024-05-01T11:00:00Z,admin,10.0.0.7,stop,db,,,5432,ok\n");
        std::fs::write(&path, &existing).unwrap();

        ActionLog::new(&path, 0).append(&entry("app", "ok")).await.unwrap();

        let content = std::fs::read(&path).unwrap();
        let rows: Vec<&[u8]> = content.split(|b| *b == b'\n').filter(|l| !l.is_empty()).collect();
        assert_eq!(rows.len(), 4);
        assert!(rows[2].ends_with(b"Caf\xe9,,,80,ok"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_separate_instances_do_not_lose_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let logs = [
            std::sync::Arc::new(ActionLog::new(&path, 0)),
            std::sync::Arc::new(ActionLog::new(&path, 0)),
        ];

        let mut tasks = Vec::new();
        for (writer, log) in logs.iter().enumerate() {
            for i in 0..100 {
                let log = std::sync::Arc::clone(log);
                tasks.push(tokio::spawn(async move {
                    log.append(&entry(&format!("writer{}-{}", writer, i), "ok")).await
                }));
            }
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(LOG_HEADER));
        assert_eq!(content.lines().skip(1).count(), 200);
    }

    #[tokio::test]
    async fn test_repeated_appends_respect_bound() {
        let dir = tempfile::tempdir().unwrap();
        let max_bytes = 400;
        let log = ActionLog::new(dir.path().join("log.csv"), max_bytes);

        for i in 0..50 {
            let result = if i % 3 == 0 { "error: exit status 1, \"stderr\"".to_string() } else { "ok".to_string() };
            log.append(&entry(&format!("service-{}", i), &result)).await.unwrap();

            let content = std::fs::read_to_string(log.path()).unwrap();
            assert!(content.len() as u64 <= max_bytes);
            assert!(content.starts_with(LOG_HEADER));
            assert!(content.ends_with('\n'));
            for line in content.lines().skip(1) {
                assert!(line.starts_with("2024-05-01T12:30:00Z,admin,"), "{}", line);
                assert!(line.ends_with(",ok") || line.ends_with("\"\"stderr\"\"\""), "{}", line);
            }
        }

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.lines().nth(1).unwrap().contains("service-49"));
    }
}
