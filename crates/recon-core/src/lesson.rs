// Copyright (c) Kanari Network
// SPDX-License-Identifier: Apache-2.0

//! The tagged messages exchanged between teacher and learner.

use recon_types::Hash48;

/// Teacher -> learner. Lesson variant tag precedes the payload on the wire:
/// 0 = NodeLesson(internal), 1 = NodeLesson(leaf), 2 = UpToDateLesson,
/// 3 = CustomViewRootLesson.
#[derive(Debug, Clone)]
pub enum Lesson {
    /// Payload for an internal or leaf node plus, for an internal node, the
    /// hashes of its children so the learner can answer in one round.
    NodeLesson {
        class_id: u64,
        version: u32,
        is_internal: bool,
        payload: Vec<u8>,
        child_hashes: Vec<Hash48>,
    },
    /// Signal that the learner's corresponding child is fine; nothing
    /// follows.
    UpToDateLesson,
    /// Root of a subtree that must be synchronized with a different view;
    /// the learner switches view at that frontier.
    CustomViewRootLesson { class_id: u64 },
}

/// Learner -> teacher, in the same order the teacher asked.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct QueryResponse {
    pub already_have: bool,
}

/// A learner-side prediction of the next incoming lesson's splice target.
#[derive(Debug, Clone)]
pub struct ExpectedLesson<H> {
    pub parent_handle: Option<H>,
    pub position_in_parent: usize,
    pub original_child: Option<H>,
    pub already_present: bool,
}
