//! Answer grouping reconciler
//!
//! Merges AI-proposed groupings with facilitator-issued manual edits while
//! holding the invariant that every answer id of the question sits in
//! exactly one bucket: one group or ungrouped.

use super::Engine;
use crate::ai::GroupingProposal;
use crate::error::{collaborator_error_msg, EngineError, EngineResult, GROUP_FAILED};
use crate::protocol::ServerMessage;
use crate::rooms::Scope;
use crate::types::*;
use std::collections::HashSet;

/// Below this many answers, thematic grouping is not meaningful; the
/// collaborator is bypassed and every answer lands in one catch-all group.
const MIN_ANSWERS_FOR_AI_GROUPING: usize = 4;

const SMALL_SAMPLE_GROUP_NAME: &str = "All Responses";

impl Engine {
    /// Produce a grouping for a question's answers.
    ///
    /// Small samples are grouped locally and broadcast at once. Otherwise
    /// the AI collaborator runs detached: reconciled proposals go out as
    /// `AnswersGrouped` to everyone, failures as `Error` to the
    /// facilitator group only. The facilitator retries by issuing the
    /// command again; there is no automatic retry.
    pub async fn group_answers(
        &self,
        connection_id: &ConnectionId,
        question_id: QuestionId,
    ) -> EngineResult<()> {
        let ctx = self.facilitator_ctx(connection_id).await?;
        let meeting_id = ctx.meeting_id;

        let answers = self.repo.answers_for_question(&question_id).await?;

        if answers.len() < MIN_ANSWERS_FOR_AI_GROUPING {
            let grouping = Grouping {
                question_id: question_id.clone(),
                groups: vec![AnswerGroup {
                    id: ulid::Ulid::new().to_string(),
                    name: SMALL_SAMPLE_GROUP_NAME.to_string(),
                    answer_ids: answers.iter().map(|a| a.id.clone()).collect(),
                }],
                ungrouped: Vec::new(),
            };
            self.store_grouping(&meeting_id, grouping.clone()).await;
            self.router
                .publish(
                    &meeting_id,
                    Scope::All,
                    ServerMessage::AnswersGrouped { grouping },
                )
                .await;
            return Ok(());
        }

        let ai = self.ai.clone().ok_or(EngineError::AiUnavailable)?;

        let engine = self.clone();
        tokio::spawn(async move {
            let question = match engine.repo.question_text(&question_id).await {
                Ok(text) => text.unwrap_or_default(),
                Err(e) => {
                    tracing::warn!(%question_id, error = %e, "question text lookup failed");
                    String::new()
                }
            };

            match ai.group_answers(&question, &answers).await {
                Ok(proposal) => {
                    let grouping = reconcile(&question_id, &answers, proposal);
                    engine.store_grouping(&meeting_id, grouping.clone()).await;
                    engine
                        .router
                        .publish(
                            &meeting_id,
                            Scope::All,
                            ServerMessage::AnswersGrouped { grouping },
                        )
                        .await;
                }
                Err(e) => {
                    tracing::warn!(%meeting_id, %question_id, error = %e, "grouping failed");
                    engine
                        .router
                        .publish(
                            &meeting_id,
                            Scope::Facilitators,
                            ServerMessage::Error {
                                code: GROUP_FAILED.to_string(),
                                msg: collaborator_error_msg(&e),
                            },
                        )
                        .await;
                }
            }
        });

        Ok(())
    }

    /// Move an answer into a group, or back to ungrouped when `target` is
    /// `None`
    pub async fn move_answer(
        &self,
        connection_id: &ConnectionId,
        question_id: QuestionId,
        answer_id: AnswerId,
        target: Option<GroupId>,
    ) -> EngineResult<Grouping> {
        self.edit_grouping(connection_id, question_id, |grouping| {
            // Only ids the question actually holds may move
            let held = grouping
                .groups
                .iter()
                .flat_map(|g| g.answer_ids.iter())
                .chain(grouping.ungrouped.iter())
                .any(|id| *id == answer_id);
            if !held {
                return Err(EngineError::AnswerNotFound(answer_id.clone()));
            }

            if let Some(group_id) = &target {
                if !grouping.groups.iter().any(|g| g.id == *group_id) {
                    return Err(EngineError::GroupNotFound(group_id.clone()));
                }
            }

            detach_answer(grouping, &answer_id);
            match &target {
                Some(group_id) => {
                    let group = grouping
                        .groups
                        .iter_mut()
                        .find(|g| g.id == *group_id)
                        .expect("target group checked above");
                    group.answer_ids.push(answer_id.clone());
                }
                None => grouping.ungrouped.push(answer_id.clone()),
            }
            Ok(())
        })
        .await
    }

    pub async fn create_group(
        &self,
        connection_id: &ConnectionId,
        question_id: QuestionId,
        name: String,
        initial_answer_ids: Vec<AnswerId>,
    ) -> EngineResult<Grouping> {
        self.edit_grouping(connection_id, question_id, |grouping| {
            // Only ids the question actually holds may seed the group
            let known: HashSet<AnswerId> = grouping
                .groups
                .iter()
                .flat_map(|g| g.answer_ids.iter().cloned())
                .chain(grouping.ungrouped.iter().cloned())
                .collect();

            let mut members = Vec::new();
            for answer_id in initial_answer_ids {
                if known.contains(&answer_id) {
                    detach_answer(grouping, &answer_id);
                    members.push(answer_id);
                }
            }

            grouping.groups.push(AnswerGroup {
                id: ulid::Ulid::new().to_string(),
                name: name.clone(),
                answer_ids: members,
            });
            Ok(())
        })
        .await
    }

    pub async fn rename_group(
        &self,
        connection_id: &ConnectionId,
        question_id: QuestionId,
        group_id: GroupId,
        name: String,
    ) -> EngineResult<Grouping> {
        self.edit_grouping(connection_id, question_id, |grouping| {
            let group = grouping
                .groups
                .iter_mut()
                .find(|g| g.id == group_id)
                .ok_or_else(|| EngineError::GroupNotFound(group_id.clone()))?;
            group.name = name.clone();
            Ok(())
        })
        .await
    }

    /// Delete a group; its answers return to ungrouped
    pub async fn delete_group(
        &self,
        connection_id: &ConnectionId,
        question_id: QuestionId,
        group_id: GroupId,
    ) -> EngineResult<Grouping> {
        self.edit_grouping(connection_id, question_id, |grouping| {
            let index = grouping
                .groups
                .iter()
                .position(|g| g.id == group_id)
                .ok_or_else(|| EngineError::GroupNotFound(group_id.clone()))?;
            let removed = grouping.groups.remove(index);
            grouping.ungrouped.extend(removed.answer_ids);
            Ok(())
        })
        .await
    }

    /// Shared shape of every manual edit: load (or initialize) the
    /// grouping under the meeting lock, apply the edit, store, broadcast
    /// the full re-validated state so no client needs merge logic.
    async fn edit_grouping<F>(
        &self,
        connection_id: &ConnectionId,
        question_id: QuestionId,
        edit: F,
    ) -> EngineResult<Grouping>
    where
        F: FnOnce(&mut Grouping) -> EngineResult<()>,
    {
        let ctx = self.facilitator_ctx(connection_id).await?;
        let meeting_id = ctx.meeting_id;

        let lock = self.meeting_lock(&meeting_id).await;
        let _guard = lock.lock().await;

        let mut grouping = match self.grouping_for(&question_id).await {
            Some(grouping) => grouping,
            // First manual edit without a prior AI pass starts from
            // everything-ungrouped
            None => {
                let answers = self.repo.answers_for_question(&question_id).await?;
                Grouping {
                    question_id: question_id.clone(),
                    groups: Vec::new(),
                    ungrouped: answers.iter().map(|a| a.id.clone()).collect(),
                }
            }
        };

        edit(&mut grouping)?;
        debug_assert!(holds_invariant(&grouping));

        self.store_grouping(&meeting_id, grouping.clone()).await;
        self.router
            .publish(
                &meeting_id,
                Scope::All,
                ServerMessage::GroupsUpdated {
                    grouping: grouping.clone(),
                },
            )
            .await;

        Ok(grouping)
    }
}

/// Remove an answer id from whichever bucket currently holds it
fn detach_answer(grouping: &mut Grouping, answer_id: &AnswerId) {
    for group in &mut grouping.groups {
        group.answer_ids.retain(|id| id != answer_id);
    }
    grouping.ungrouped.retain(|id| id != answer_id);
}

/// Merge an untrusted collaborator proposal into a valid grouping: ids not
/// belonging to the question are discarded, duplicate assignments resolve
/// first-group-wins in proposal order, and every unassigned valid id lands
/// in ungrouped.
pub(crate) fn reconcile(
    question_id: &QuestionId,
    answers: &[Answer],
    proposal: GroupingProposal,
) -> Grouping {
    let valid: HashSet<&AnswerId> = answers.iter().map(|a| &a.id).collect();
    let mut assigned: HashSet<AnswerId> = HashSet::new();
    let mut groups = Vec::new();

    for proposed in proposal.groups {
        let mut answer_ids = Vec::new();
        for answer_id in proposed.answer_ids {
            if valid.contains(&answer_id) && assigned.insert(answer_id.clone()) {
                answer_ids.push(answer_id);
            }
        }
        groups.push(AnswerGroup {
            id: ulid::Ulid::new().to_string(),
            name: proposed.name,
            answer_ids,
        });
    }

    let ungrouped = answers
        .iter()
        .map(|a| a.id.clone())
        .filter(|id| !assigned.contains(id))
        .collect();

    Grouping {
        question_id: question_id.clone(),
        groups,
        ungrouped,
    }
}

/// Every answer id appears exactly once across all buckets
fn holds_invariant(grouping: &Grouping) -> bool {
    let mut seen = HashSet::new();
    grouping
        .groups
        .iter()
        .flat_map(|g| g.answer_ids.iter())
        .chain(grouping.ungrouped.iter())
        .all(|id| seen.insert(id))
}
