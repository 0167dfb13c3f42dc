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

//! # svcdash Server
//!
//! Status polling, snapshot and audit persistence, and permission-gated
//! start/stop dispatch on top of a platform [`ServiceBackend`].
//!
//! [`ServiceBackend`]: svcdash_platform::ServiceBackend

pub mod action_log;
pub mod control;
pub mod dispatcher;
pub mod monitor;
pub mod snapshot;

pub use action_log::*;
pub use control::*;
pub use dispatcher::*;
pub use monitor::*;
pub use snapshot::*;

use std::path::{Path, PathBuf};
use svcdash_core::SvcError;

/// Server result type
pub type ServerResult<T> = Result<T, ServerError>;

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Persistence error at {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] SvcError),
}

impl ServerError {
    pub fn persistence(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        ServerError::Persistence {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
