// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! The teacher-side parallel structure tracking per-node send state and
//! learner acks: each node the teacher intends to send is wrapped in a
//! shadow entry. When a shadow entry learns the learner already has it, the
//! wrapper recursively marks the entire subtree cancelled (BFS across the
//! shadow children added so far).

use crate::view::View;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub struct ShadowEntry<V: View> {
    pub node: V::Handle,
    responded: AtomicBool,
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Arc<ShadowEntry<V>>>>,
}

impl<V: View> ShadowEntry<V> {
    pub fn new(node: V::Handle) -> Self {
        Self {
            node,
            responded: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
            children: Mutex::new(Vec::new()),
        }
    }

    pub fn add_child(&self, child: Arc<ShadowEntry<V>>) {
        self.children.lock().push(child);
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn responded(&self) -> bool {
        self.responded.load(Ordering::Acquire)
    }

    /// Records the learner's `QueryResponse` for this entry. If the learner
    /// already has it, recursively cancels every shadow child added so far
    /// (a BFS over the shadow-children list).
    pub fn set_response(self: &Arc<Self>, already_have: bool) {
        self.responded.store(true, Ordering::Release);
        if already_have {
            self.mark_learner_has_it();
        }
        self.notify.notify_waiters();
    }

    fn mark_learner_has_it(self: &Arc<Self>) {
        self.cancelled.store(true, Ordering::Release);
        let children: Vec<_> = self.children.lock().clone();
        for child in children {
            child.mark_learner_has_it();
        }
    }

    pub async fn wait_for_response(&self) {
        if !self.responded() {
            self.notify.notified().await;
        }
    }
}
