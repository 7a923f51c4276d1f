// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! Computes the Merkle root hash either synchronously or over a worker
//! pool, with deterministic output regardless of parallelism.

use crate::node::Node;
use parking_lot::Mutex;
use recon_types::{hash::HashBuilder, Hash48, ReconnectError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn compute_leaf_hash(node: &Node) -> Hash48 {
    HashBuilder::new()
        .update_u64(node.class_id())
        .update_u32(node.version())
        .update_bytes(node.payload().unwrap_or(&[]))
        .finish()
}

fn compute_internal_hash(node: &Node, children: &[Option<Arc<Node>>]) -> Hash48 {
    let mut builder = HashBuilder::new();
    builder
        .update_u64(node.class_id())
        .update_u32(node.version())
        .update_u32(children.len() as u32);
    for child in children {
        let h = child.as_ref().and_then(|c| c.hash()).unwrap_or(Hash48::NULL);
        builder.update_hash(&h);
    }
    builder.finish()
}

/// Synchronous reverse-BFS / post-order hashing: recurses into children
/// before computing a node's own hash, skipping already-hashed and
/// self-hashing nodes. Concurrent mutation of a node is prevented by the
/// per-node lock in `Node::hash_once_with`.
pub fn hash_sync(node: &Arc<Node>) -> Result<Hash48, ReconnectError> {
    if let Some(h) = node.hash() {
        return Ok(h);
    }
    if node.is_leaf() {
        return node.hash_once_with(|| Ok(compute_leaf_hash(node)));
    }
    let children = node.children_snapshot();
    for child in children.iter().flatten() {
        hash_sync(child)?;
    }
    node.hash_once_with(|| Ok(compute_internal_hash(node, &children)))
}

/// Deterministic xorshift64, seeded by worker index, used only to decide a
/// non-canonical visitation order for workers `1..W-1` — never to decide
/// hash values, so the final root hash stays deterministic regardless of worker count.
fn pseudo_shuffle(mut order: Vec<usize>, seed: u64) -> Vec<usize> {
    let mut state = seed.wrapping_mul(2_685_821_657_736_338_717).wrapping_add(1);
    if state == 0 {
        state = 0x9E3779B97F4A7C15;
    }
    for i in (1..order.len()).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let j = (state as usize) % (i + 1);
        order.swap(i, j);
    }
    order
}

/// One worker's traversal. Worker 0 walks deterministically and always
/// completes; workers `1..W-1` walk a pseudo-random order and abort as soon
/// as they observe that some worker has already finished (`active < total`),
/// trusting worker 0 to cover whatever they left unhashed.
fn traverse(
    node: &Arc<Node>,
    worker_id: usize,
    active: &AtomicUsize,
    total_workers: usize,
) -> Result<(), ReconnectError> {
    if worker_id != 0 && active.load(Ordering::Acquire) < total_workers {
        return Ok(());
    }
    if node.hash().is_some() {
        return Ok(());
    }
    if node.is_leaf() {
        node.hash_once_with(|| Ok(compute_leaf_hash(node)))?;
        return Ok(());
    }
    let children = node.children_snapshot();
    let mut order: Vec<usize> = (0..children.len()).collect();
    if worker_id != 0 {
        order = pseudo_shuffle(order, worker_id as u64);
    }
    for idx in order {
        if let Some(child) = &children[idx] {
            traverse(child, worker_id, active, total_workers)?;
        }
        if worker_id != 0 && active.load(Ordering::Acquire) < total_workers {
            return Ok(());
        }
    }
    node.hash_once_with(|| Ok(compute_internal_hash(node, &children)))?;
    Ok(())
}

/// Spawns `workers` tasks over a scoped thread pool to hash `node`'s tree.
/// The output hash is bitwise identical to `hash_sync` regardless of
/// `workers`: every node is hashed exactly once thanks to the per-node
/// lock, and worker 0's deterministic traversal guarantees full coverage
/// even if every other worker aborts early.
pub fn hash_parallel(node: &Arc<Node>, workers: usize) -> Result<Hash48, ReconnectError> {
    if let Some(h) = node.hash() {
        return Ok(h);
    }
    let workers = workers.max(1);
    let active = AtomicUsize::new(workers);
    let results: Mutex<Vec<Result<(), ReconnectError>>> = Mutex::new(Vec::with_capacity(workers));

    std::thread::scope(|scope| {
        for worker_id in 0..workers {
            let active = &active;
            let results = &results;
            let node = node;
            scope.spawn(move || {
                let outcome = traverse(node, worker_id, active, workers);
                active.fetch_sub(1, Ordering::AcqRel);
                results.lock().push(outcome);
            });
        }
    });

    for outcome in results.into_inner() {
        outcome?;
    }
    node.hash().ok_or_else(|| ReconnectError::IllegalChildHash {
        reason: "root was not hashed by any worker".to_string(),
    })
}

/// Outcome of recomputing and comparing a single node's hash in checking
/// mode.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CheckOutcome {
    Match,
    Mismatch { expected: Hash48, actual: Hash48 },
    NullHash,
}

/// Checking mode: traverses `root` and for each non-self-hashing node
/// recomputes its hash from its (already-checked) children and compares it
/// to the stored value, reporting every outcome via `on_result`. Null-hash
/// nodes are reported as mismatches. Internal nodes with any not-yet-hashed
/// child are skipped, since their own hash is not yet meaningful to verify.
pub fn check_hashes<F>(root: &Arc<Node>, on_result: &mut F)
where
    F: FnMut(&Arc<Node>, CheckOutcome),
{
    if root.is_internal() {
        let children = root.children_snapshot();
        for child in children.iter().flatten() {
            check_hashes(child, on_result);
        }
        let any_unhashed = children
            .iter()
            .any(|c| matches!(c, Some(n) if n.hash().is_none()));
        if any_unhashed {
            return;
        }
        match root.hash() {
            None => on_result(root, CheckOutcome::NullHash),
            Some(stored) => {
                let recomputed = compute_internal_hash(root, &children);
                if recomputed == stored {
                    on_result(root, CheckOutcome::Match);
                } else {
                    on_result(
                        root,
                        CheckOutcome::Mismatch {
                            expected: stored,
                            actual: recomputed,
                        },
                    );
                }
            }
        }
        return;
    }
    if root.is_self_hashing() {
        return;
    }
    match root.hash() {
        None => on_result(root, CheckOutcome::NullHash),
        Some(stored) => {
            let recomputed = compute_leaf_hash(root);
            if recomputed == stored {
                on_result(root, CheckOutcome::Match);
            } else {
                on_result(
                    root,
                    CheckOutcome::Mismatch {
                        expected: stored,
                        actual: recomputed,
                    },
                );
            }
        }
    }
}
