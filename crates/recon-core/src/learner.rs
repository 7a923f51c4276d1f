// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! The learner side of a reconnect: consumes the teacher's lesson stream in
//! the exact order it predicts, splicing each adopted node into the tree
//! being assembled and answering with a `QueryResponse` per child hash.

use crate::lesson::{ExpectedLesson, Lesson, QueryResponse};
use crate::view::View;
use recon_types::ReconnectError;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Consumes lessons from `lessons_rx`, answers on `responses_tx`, and
/// returns the fully assembled root once the expected-lesson queue drains.
///
/// `max_nodes` bounds the total number of queue entries ever created,
/// guarding against an adversarial or buggy teacher inflating the queue
/// without limit.
pub async fn run_learner<V: View + 'static>(
    view: Arc<V>,
    previous_root: Option<V::Handle>,
    mut lessons_rx: mpsc::UnboundedReceiver<Lesson>,
    responses_tx: mpsc::UnboundedSender<QueryResponse>,
    max_nodes: u64,
) -> Result<V::Handle, ReconnectError> {
    let mut queue: VecDeque<ExpectedLesson<V::Handle>> = VecDeque::new();
    queue.push_back(ExpectedLesson {
        parent_handle: None,
        position_in_parent: 0,
        original_child: previous_root,
        already_present: false,
    });
    let mut enqueued: u64 = 1;
    let mut new_root: Option<V::Handle> = None;

    while let Some(expected) = queue.pop_front() {
        let lesson = lessons_rx
            .recv()
            .await
            .ok_or_else(|| ReconnectError::TransportFailure {
                cause: "lesson stream closed before queue drained".to_string(),
            })?;

        let (new_child, child_hashes) = match lesson {
            Lesson::UpToDateLesson => (expected.original_child.clone(), Vec::new()),
            Lesson::CustomViewRootLesson { class_id } => {
                let basis = expected
                    .original_child
                    .clone()
                    .filter(|oc| view.class_id(oc) == class_id);
                queue.push_front(ExpectedLesson {
                    parent_handle: expected.parent_handle.clone(),
                    position_in_parent: expected.position_in_parent,
                    original_child: basis,
                    already_present: false,
                });
                continue;
            }
            Lesson::NodeLesson {
                class_id,
                version,
                is_internal,
                payload,
                child_hashes,
            } => {
                // Reaching a NodeLesson at all means the teacher judged this
                // position stale against the learner's previous tree, so the
                // node is always rebuilt from the lesson's own payload —
                // never spliced back in from `expected.original_child` (see
                // DESIGN.md).
                let handle = if is_internal {
                    let placeholder_children = vec![None; child_hashes.len()];
                    let handle = view.new_internal(class_id, version, placeholder_children)?;
                    view.mark_for_initialization(&handle);
                    handle
                } else {
                    view.new_leaf(class_id, version, payload)?
                };
                (Some(handle), child_hashes)
            }
        };

        match &expected.parent_handle {
            None => new_root = new_child.clone(),
            Some(parent) => view.set_child(parent, expected.position_in_parent, new_child.clone())?,
        }

        for (i, hash) in child_hashes.into_iter().enumerate() {
            let original_child_i = expected
                .original_child
                .as_ref()
                .and_then(|oc| view.get_child(oc, i));
            let already_have = original_child_i
                .as_ref()
                .and_then(|c| view.hash_of(c))
                .map(|h| h == hash)
                .unwrap_or(false);

            responses_tx
                .send(QueryResponse { already_have })
                .map_err(|_| ReconnectError::TransportFailure {
                    cause: "response channel closed".to_string(),
                })?;

            enqueued += 1;
            if enqueued > max_nodes {
                return Err(ReconnectError::NodeLimitExceeded {
                    max: max_nodes,
                    observed: enqueued,
                });
            }

            queue.push_back(ExpectedLesson {
                parent_handle: new_child.clone(),
                position_in_parent: i,
                original_child: original_child_i,
                already_present: already_have,
            });
        }
    }

    let root = new_root.ok_or_else(|| ReconnectError::MerkleSerializationError {
        reason: "teacher produced no root".to_string(),
        node: "<root>".to_string(),
    })?;

    initialize_bottom_up(view.as_ref(), &root);
    view.finalize_hash(&root)?;
    Ok(root)
}

fn initialize_bottom_up<V: View>(view: &V, node: &V::Handle) {
    if !view.is_internal(node) {
        return;
    }
    for i in 0..view.child_count(node) {
        if let Some(child) = view.get_child(node, i) {
            initialize_bottom_up(view, &child);
        }
    }
    if view.needs_initialization(node) {
        view.initialize(node);
        view.clear_needs_initialization(node);
    }
}
