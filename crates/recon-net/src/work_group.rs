// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Supervises a named set of tasks that share a single "break the
//! connection" action: on any task failure the action fires immediately,
//! unblocking sibling tasks stuck in I/O, and the group joins everything
//! before reporting.

use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;

pub type BreakAction = Arc<dyn Fn() + Send + Sync>;

pub struct WorkGroup {
    break_action: BreakAction,
    set: JoinSet<(String, anyhow::Result<()>)>,
}

impl WorkGroup {
    pub fn new(break_action: BreakAction) -> Self {
        Self {
            break_action,
            set: JoinSet::new(),
        }
    }

    pub fn spawn<F>(&mut self, name: impl Into<String>, fut: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        self.set.spawn(async move { (name, fut.await) });
    }

    /// Awaits every task, invoking the break action as soon as any task
    /// fails (including a panic), then joins the rest. Returns only after
    /// all tasks have terminated.
    pub async fn join(mut self) -> WorkGroupOutcome {
        let mut exceptions = Vec::new();
        while let Some(res) = self.set.join_next().await {
            match res {
                Ok((name, Ok(()))) => {
                    tracing::debug!(task = %name, "work group task completed");
                }
                Ok((name, Err(e))) => {
                    tracing::warn!(task = %name, error = %e, "work group task failed");
                    exceptions.push((name, e.to_string()));
                    (self.break_action)();
                }
                Err(join_err) => {
                    tracing::warn!(error = %join_err, "work group task panicked");
                    exceptions.push(("<unnamed>".to_string(), join_err.to_string()));
                    (self.break_action)();
                }
            }
        }
        WorkGroupOutcome { exceptions }
    }
}

#[derive(Debug, Default)]
pub struct WorkGroupOutcome {
    exceptions: Vec<(String, String)>,
}

impl WorkGroupOutcome {
    pub fn has_exceptions(&self) -> bool {
        !self.exceptions.is_empty()
    }

    pub fn exceptions(&self) -> &[(String, String)] {
        &self.exceptions
    }
}
