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

//! Atomic status snapshot file

use std::path::{Path, PathBuf};
use svcdash_core::{write_atomic, FileLock, ServiceStatus};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{ServerError, ServerResult};

/// Persists the current status list for external readers.
///
/// Writers sharing one `SnapshotWriter` are serialized by a mutex, and
/// writers in other instances or processes by the `<path>.lock` file lock,
/// so the shared `.tmp` file is never written by two writers at once.
#[derive(Debug)]
pub struct SnapshotWriter {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SnapshotWriter {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, statuses: &[ServiceStatus]) -> ServerResult<()> {
        let data = serde_json::to_vec_pretty(statuses)?;
        let _guard = self.write_lock.lock().await;
        let _file_lock = FileLock::acquire(&self.path)
            .await
            .map_err(|e| ServerError::persistence(&self.path, e))?;
        write_atomic(&self.path, &data)
            .await
            .map_err(|e| ServerError::persistence(&self.path, e))?;
        debug!("Wrote {} statuses to {}", statuses.len(), self.path.display());
        Ok(())
    }
}

/// Read a snapshot file back
pub async fn load_snapshot(path: &Path) -> ServerResult<Vec<ServiceStatus>> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| ServerError::persistence(path, e))?;
    Ok(serde_json::from_slice(&data)?)
}
