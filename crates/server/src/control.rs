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

//! Operator request facade: dispatch, audit, refresh

use std::sync::Arc;
use tracing::warn;

use crate::action_log::ActionLogEntry;
use crate::dispatcher::{ControlAction, DispatchError, Dispatcher, Selector};
use crate::monitor::StatusMonitor;

/// A start/stop request together with who asked for it
#[derive(Debug, Clone)]
pub struct ControlRequest {
    pub action: ControlAction,
    pub selector: Selector,
    pub user: String,
    pub ip: String,
}

impl ControlRequest {
    pub fn new(action: ControlAction, selector: Selector) -> Self {
        ControlRequest {
            action,
            selector,
            user: String::new(),
            ip: String::new(),
        }
    }

    pub fn with_origin(mut self, user: impl Into<String>, ip: impl Into<String>) -> Self {
        self.user = user.into();
        self.ip = ip.into();
        self
    }
}

pub struct ControlService {
    monitor: Arc<StatusMonitor>,
    dispatcher: Dispatcher,
    background_refresh: bool,
}

impl ControlService {
    pub fn new(monitor: Arc<StatusMonitor>) -> Self {
        let dispatcher = Dispatcher::new(monitor.backend().clone());
        ControlService {
            monitor,
            dispatcher,
            background_refresh: true,
        }
    }

    /// Skip the background pass after a successful action. For short-lived
    /// callers that refresh themselves before the runtime goes away.
    pub fn without_background_refresh(mut self) -> Self {
        self.background_refresh = false;
        self
    }

    pub fn monitor(&self) -> &Arc<StatusMonitor> {
        &self.monitor
    }

    /// Dispatch `request` and audit the outcome, whatever it is.
    ///
    /// A successful action also triggers a background monitoring pass unless
    /// disabled; the caller does not wait for it.
    pub async fn handle(&self, request: ControlRequest) -> Result<(), DispatchError> {
        let report = self
            .dispatcher
            .dispatch(request.action, &request.selector, self.monitor.declarations())
            .await;

        let entry = ActionLogEntry::new(
            request.user.as_str(),
            request.ip.as_str(),
            request.action.into(),
            report.result_string(),
        );
        let entry = match report.target {
            Some(decl) => entry.with_declaration(decl),
            None => entry.with_selector(&request.selector),
        };
        if let Err(e) = self.monitor.action_log().append(&entry).await {
            warn!("Failed to record {} action: {}", request.action, e);
        }

        if report.outcome.is_ok() && self.background_refresh {
            let monitor = self.monitor.clone();
            tokio::spawn(async move {
                monitor.run_cycle().await;
            });
        }

        report.outcome
    }
}
