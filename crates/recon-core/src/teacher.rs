// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! The teacher side of a reconnect: walks its tree depth-first, left to
//! right, offering each node to the learner and skipping subtrees the
//! learner already has.

use crate::lesson::{Lesson, QueryResponse};
use crate::shadow::ShadowEntry;
use crate::view::View;
use recon_types::ReconnectError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Runs a full reconnect session as the teacher: one shared lesson/response
/// channel pair, custom-view subtrees handled inline (so that, externally,
/// a custom subtree always finishes before its surrounding siblings are
/// sent — the serial-across-subtrees, parallel-within-one guarantee).
pub async fn run_teacher<V: View + 'static>(
    view: Arc<V>,
    root: V::Handle,
    lessons_tx: mpsc::UnboundedSender<Lesson>,
    responses_rx: mpsc::UnboundedReceiver<QueryResponse>,
    max_ack_delay: Duration,
) -> Result<(), ReconnectError> {
    let awaiting: Arc<parking_lot::Mutex<std::collections::VecDeque<Arc<ShadowEntry<V>>>>> =
        Arc::new(parking_lot::Mutex::new(std::collections::VecDeque::new()));

    let receiver_awaiting = awaiting.clone();
    let receiver_handle = tokio::spawn(async move {
        let mut rx = responses_rx;
        while let Some(resp) = rx.recv().await {
            let entry = receiver_awaiting.lock().pop_front();
            if let Some(entry) = entry {
                entry.set_response(resp.already_have);
            }
        }
    });

    let root_shadow = Arc::new(ShadowEntry::new(root));
    let result = send_node(
        view.as_ref(),
        root_shadow,
        &lessons_tx,
        &awaiting,
        max_ack_delay,
        true,
    )
    .await;

    drop(lessons_tx);
    receiver_handle.abort();
    result
}

fn send_node<'a, V: View>(
    view: &'a V,
    shadow: Arc<ShadowEntry<V>>,
    lessons_tx: &'a mpsc::UnboundedSender<Lesson>,
    awaiting: &'a Arc<parking_lot::Mutex<std::collections::VecDeque<Arc<ShadowEntry<V>>>>>,
    max_ack_delay: Duration,
    is_subtree_root: bool,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ReconnectError>> + Send + 'a>>
{
    Box::pin(async move {
        if !is_subtree_root {
            if shadow.cancelled() {
                send_lesson(lessons_tx, Lesson::UpToDateLesson)?;
                return Ok(());
            }
            if !shadow.responded() {
                let _ = tokio::time::timeout(max_ack_delay, shadow.wait_for_response()).await;
            }
            if shadow.cancelled() {
                send_lesson(lessons_tx, Lesson::UpToDateLesson)?;
                return Ok(());
            }
        }

        let node = shadow.node.clone();

        if !is_subtree_root {
            if let Some(custom_class_id) = view.custom_view_class_id(&node) {
                send_lesson(
                    lessons_tx,
                    Lesson::CustomViewRootLesson {
                        class_id: custom_class_id,
                    },
                )?;
                return send_node(view, shadow, lessons_tx, awaiting, max_ack_delay, true).await;
            }
        }

        let is_internal = view.is_internal(&node);
        if !is_internal {
            send_lesson(
                lessons_tx,
                Lesson::NodeLesson {
                    class_id: view.class_id(&node),
                    version: view.version(&node),
                    is_internal: false,
                    payload: view.serialize_payload(&node),
                    child_hashes: Vec::new(),
                },
            )?;
            return Ok(());
        }

        let child_count = view.child_count(&node);
        let mut children = Vec::with_capacity(child_count);
        let mut child_hashes = Vec::with_capacity(child_count);
        for i in 0..child_count {
            let child = view.get_child(&node, i);
            let hash = child
                .as_ref()
                .and_then(|c| view.hash_of(c))
                .unwrap_or(recon_types::Hash48::NULL);
            child_hashes.push(hash);
            children.push(child);
        }

        // Register every present child for an eventual QueryResponse before
        // the lesson itself goes out, so the receiver task can never race
        // ahead of the awaiting queue.
        let mut child_shadows: Vec<Option<Arc<ShadowEntry<V>>>> = Vec::with_capacity(child_count);
        for child in &children {
            match child {
                Some(c) => {
                    let entry = Arc::new(ShadowEntry::new(c.clone()));
                    shadow.add_child(entry.clone());
                    awaiting.lock().push_back(entry.clone());
                    child_shadows.push(Some(entry));
                }
                None => child_shadows.push(None),
            }
        }

        send_lesson(
            lessons_tx,
            Lesson::NodeLesson {
                class_id: view.class_id(&node),
                version: view.version(&node),
                is_internal: true,
                payload: view.serialize_payload(&node),
                child_hashes,
            },
        )?;

        for entry in child_shadows.into_iter().flatten() {
            send_node(view, entry, lessons_tx, awaiting, max_ack_delay, false).await?;
        }

        Ok(())
    })
}

fn send_lesson(
    tx: &mpsc::UnboundedSender<Lesson>,
    lesson: Lesson,
) -> Result<(), ReconnectError> {
    tx.send(lesson).map_err(|_| ReconnectError::TransportFailure {
        cause: "lesson channel closed".to_string(),
    })
}
