//! Question lifecycle state machine
//!
//! Phases move `Waiting -> Answering -> Revealed -> Waiting` until the
//! facilitator ends the meeting. Every transition is facilitator-initiated
//! and gated on the connection's admission for this exact meeting.

use super::Engine;
use crate::error::{collaborator_error_msg, EngineError, EngineResult, SUMMARIZE_FAILED};
use crate::protocol::{AnswerInfo, ServerMessage};
use crate::rooms::Scope;
use crate::types::*;
use chrono::{Duration as ChronoDuration, Utc};

impl Engine {
    /// Open a question for answers. Valid from any phase.
    ///
    /// Effects in order: clear answered for the new question, set the
    /// current question id, set `Answering`, set or clear the advisory
    /// timer, broadcast `QuestionStarted`. The timer carries no
    /// enforcement; the only authoritative close is `reveal_answers`.
    pub async fn start_question(
        &self,
        connection_id: &ConnectionId,
        question_id: QuestionId,
        time_limit_seconds: Option<u64>,
    ) -> EngineResult<()> {
        let ctx = self.facilitator_ctx(connection_id).await?;
        let meeting_id = ctx.meeting_id;

        let lock = self.meeting_lock(&meeting_id).await;
        let _guard = lock.lock().await;

        self.sessions.clear_answered(&meeting_id).await?;
        self.sessions
            .set_current_question(&meeting_id, question_id.clone())
            .await?;
        self.sessions.set_phase(&meeting_id, Phase::Answering).await?;

        let deadline = match time_limit_seconds {
            Some(seconds) => {
                let deadline = Utc::now() + ChronoDuration::seconds(seconds as i64);
                self.sessions.set_timer(&meeting_id, deadline).await?;
                Some(deadline)
            }
            None => {
                self.sessions.clear_timer(&meeting_id).await?;
                None
            }
        };

        tracing::info!(%meeting_id, %question_id, ?deadline, "question started");

        self.router
            .publish(
                &meeting_id,
                Scope::All,
                ServerMessage::QuestionStarted {
                    question_id,
                    deadline: deadline.map(|d| d.to_rfc3339()),
                    server_now: Utc::now().to_rfc3339(),
                },
            )
            .await;

        Ok(())
    }

    /// Close the question and reveal its answers.
    ///
    /// Only valid while `Answering` and only for the current question; a
    /// stale reveal for a superseded question is rejected rather than
    /// silently accepted, which would double-broadcast.
    ///
    /// `AnswersRevealed` goes out synchronously; summarization runs as a
    /// detached task afterwards so participants see answers regardless of
    /// collaborator latency or failure. The ordering is load-bearing.
    pub async fn reveal_answers(
        &self,
        connection_id: &ConnectionId,
        question_id: QuestionId,
    ) -> EngineResult<()> {
        let ctx = self.facilitator_ctx(connection_id).await?;
        let meeting_id = ctx.meeting_id;

        let lock = self.meeting_lock(&meeting_id).await;
        let answers = {
            let _guard = lock.lock().await;

            let session = self.sessions.get(&meeting_id).await?;
            if session.phase != Phase::Answering {
                return Err(EngineError::InvalidTransition(format!(
                    "cannot reveal from {:?}",
                    session.phase
                )));
            }
            if session.current_question_id.as_ref() != Some(&question_id) {
                return Err(EngineError::StaleReveal);
            }

            self.sessions.set_phase(&meeting_id, Phase::Revealed).await?;
            self.sessions.clear_timer(&meeting_id).await?;

            let answers = self.repo.answers_for_question(&question_id).await?;

            self.router
                .publish(
                    &meeting_id,
                    Scope::All,
                    ServerMessage::AnswersRevealed {
                        question_id: question_id.clone(),
                        answers: answers.iter().map(AnswerInfo::from).collect(),
                    },
                )
                .await;

            answers
        };

        tracing::info!(%meeting_id, %question_id, answer_count = answers.len(), "answers revealed");

        // Summarize off the hot path. The task outlives the triggering
        // connection: a reconnecting facilitator rejoining the facilitator
        // group still receives the result.
        if let Some(ai) = self.ai.clone() {
            let engine = self.clone();
            tokio::spawn(async move {
                let question = match engine.repo.question_text(&question_id).await {
                    Ok(text) => text.unwrap_or_default(),
                    Err(e) => {
                        tracing::warn!(%question_id, error = %e, "question text lookup failed");
                        String::new()
                    }
                };

                match ai.summarize(&question, &answers).await {
                    Ok(summary) => {
                        engine
                            .router
                            .publish(
                                &meeting_id,
                                Scope::Facilitators,
                                ServerMessage::SummaryReady {
                                    question_id,
                                    summary,
                                },
                            )
                            .await;
                    }
                    Err(e) => {
                        tracing::warn!(%meeting_id, %question_id, error = %e, "summarization failed");
                        engine
                            .router
                            .publish(
                                &meeting_id,
                                Scope::Facilitators,
                                ServerMessage::Error {
                                    code: SUMMARIZE_FAILED.to_string(),
                                    msg: collaborator_error_msg(&e),
                                },
                            )
                            .await;
                    }
                }
            });
        }

        Ok(())
    }

    /// Move on after a reveal. The question pointer itself is tracked by
    /// the presentation layer; the engine only resets the phase.
    pub async fn next_question(&self, connection_id: &ConnectionId, index: u32) -> EngineResult<()> {
        let ctx = self.facilitator_ctx(connection_id).await?;
        let meeting_id = ctx.meeting_id;

        let lock = self.meeting_lock(&meeting_id).await;
        let _guard = lock.lock().await;

        let session = self.sessions.get(&meeting_id).await?;
        if session.phase != Phase::Revealed {
            return Err(EngineError::InvalidTransition(format!(
                "next question requires revealed phase, session is {:?}",
                session.phase
            )));
        }

        self.sessions.set_phase(&meeting_id, Phase::Waiting).await?;

        self.router
            .publish(&meeting_id, Scope::All, ServerMessage::NextQuestion { index })
            .await;

        Ok(())
    }

    /// End the meeting from any phase. Clears every session key and drops
    /// grouping state; afterwards the meeting id behaves as if no session
    /// ever existed.
    pub async fn end_meeting(&self, connection_id: &ConnectionId) -> EngineResult<()> {
        let ctx = self.facilitator_ctx(connection_id).await?;
        let meeting_id = ctx.meeting_id;

        {
            let lock = self.meeting_lock(&meeting_id).await;
            let _guard = lock.lock().await;
            self.sessions.clear(&meeting_id).await?;
        }
        self.drop_meeting_lock(&meeting_id).await;
        self.drop_groupings(&meeting_id).await;

        self.router
            .publish(&meeting_id, Scope::All, ServerMessage::MeetingEnded)
            .await;
        self.router.close(&meeting_id).await;

        tracing::info!(%meeting_id, "meeting ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{engine, engine_with_ai, StubAi};
    use crate::ai::GroupingProposal;
    use crate::error::EngineError;
    use crate::protocol::ServerMessage;
    use crate::rooms::Scope;
    use crate::types::Phase;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn start_question_sets_phase_and_deadline() {
        let (engine, repo) = engine();
        repo.add_question("q1", "What should we improve?").await;
        let fac = engine.admit_facilitator("m1".to_string()).await.unwrap();

        engine
            .start_question(&fac.connection_id, "q1".to_string(), Some(60))
            .await
            .unwrap();

        let session = engine.sessions.get(&"m1".to_string()).await.unwrap();
        assert_eq!(session.phase, Phase::Answering);
        assert_eq!(session.current_question_id.as_deref(), Some("q1"));
        assert!(session.timer_deadline.is_some());
    }

    #[tokio::test]
    async fn start_question_without_limit_clears_timer() {
        let (engine, repo) = engine();
        repo.add_question("q1", "one").await;
        repo.add_question("q2", "two").await;
        let fac = engine.admit_facilitator("m1".to_string()).await.unwrap();

        engine
            .start_question(&fac.connection_id, "q1".to_string(), Some(60))
            .await
            .unwrap();
        engine
            .start_question(&fac.connection_id, "q2".to_string(), None)
            .await
            .unwrap();

        let session = engine.sessions.get(&"m1".to_string()).await.unwrap();
        assert!(session.timer_deadline.is_none());
    }

    #[tokio::test]
    async fn participants_cannot_drive_transitions() {
        let (engine, _repo) = engine();
        let part = engine
            .admit_participant("m1".to_string(), "Al".to_string())
            .await
            .unwrap();

        let result = engine
            .start_question(&part.connection_id, "q1".to_string(), None)
            .await;
        assert!(matches!(result, Err(EngineError::Unauthorized)));
    }

    #[tokio::test]
    async fn stale_reveal_is_rejected() {
        let (engine, repo) = engine();
        repo.add_question("q1", "one").await;
        repo.add_question("q2", "two").await;
        let fac = engine.admit_facilitator("m1".to_string()).await.unwrap();

        engine
            .start_question(&fac.connection_id, "q1".to_string(), None)
            .await
            .unwrap();
        engine
            .start_question(&fac.connection_id, "q2".to_string(), None)
            .await
            .unwrap();

        let result = engine
            .reveal_answers(&fac.connection_id, "q1".to_string())
            .await;
        assert!(matches!(result, Err(EngineError::StaleReveal)));

        // q2 stays open
        let session = engine.sessions.get(&"m1".to_string()).await.unwrap();
        assert_eq!(session.phase, Phase::Answering);
        assert_eq!(session.current_question_id.as_deref(), Some("q2"));
    }

    #[tokio::test]
    async fn reveal_outside_answering_is_invalid() {
        let (engine, _repo) = engine();
        let fac = engine.admit_facilitator("m1".to_string()).await.unwrap();

        let result = engine
            .reveal_answers(&fac.connection_id, "q1".to_string())
            .await;
        assert!(matches!(result, Err(EngineError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn reveal_broadcast_precedes_summary() {
        let proposal = GroupingProposal::default();
        let (engine, repo) =
            engine_with_ai(Arc::new(StubAi::ok("common themes", proposal)));
        repo.add_question("q1", "What should we improve?").await;

        let fac = engine.admit_facilitator("m1".to_string()).await.unwrap();
        let part = engine
            .admit_participant("m1".to_string(), "Al".to_string())
            .await
            .unwrap();

        let mut all_rx = engine.router.subscribe(&"m1".to_string(), Scope::All).await;
        let mut fac_rx = engine
            .router
            .subscribe(&"m1".to_string(), Scope::Facilitators)
            .await;

        engine
            .start_question(&fac.connection_id, "q1".to_string(), None)
            .await
            .unwrap();
        engine
            .submit_answer(&part.connection_id, "q1".to_string(), "tests".to_string())
            .await
            .unwrap();
        engine
            .reveal_answers(&fac.connection_id, "q1".to_string())
            .await
            .unwrap();

        // Wait for the summary on the facilitator channel; the reveal must
        // already be sitting in the "all" channel by then, even though the
        // stub completes nearly instantly.
        let summary = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match fac_rx.recv().await.unwrap() {
                    ServerMessage::SummaryReady { summary, .. } => break summary,
                    _ => continue,
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(summary, "common themes");

        let mut saw_reveal = false;
        while let Ok(msg) = all_rx.try_recv() {
            if matches!(msg, ServerMessage::AnswersRevealed { .. }) {
                saw_reveal = true;
                break;
            }
        }
        assert!(saw_reveal, "AnswersRevealed must precede SummaryReady");
    }

    #[tokio::test]
    async fn summarizer_failure_reports_to_facilitators_only() {
        let (engine, repo) = engine_with_ai(Arc::new(StubAi::failing()));
        repo.add_question("q1", "anything").await;

        let fac = engine.admit_facilitator("m1".to_string()).await.unwrap();
        let part = engine
            .admit_participant("m1".to_string(), "Al".to_string())
            .await
            .unwrap();

        let mut fac_rx = engine
            .router
            .subscribe(&"m1".to_string(), Scope::Facilitators)
            .await;

        engine
            .start_question(&fac.connection_id, "q1".to_string(), None)
            .await
            .unwrap();
        engine
            .submit_answer(&part.connection_id, "q1".to_string(), "x".to_string())
            .await
            .unwrap();
        engine
            .reveal_answers(&fac.connection_id, "q1".to_string())
            .await
            .unwrap();

        let err = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match fac_rx.recv().await.unwrap() {
                    ServerMessage::Error { code, .. } => break code,
                    _ => continue,
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(err, "SUMMARIZE_FAILED");

        // The reveal itself still completed
        let session = engine.sessions.get(&"m1".to_string()).await.unwrap();
        assert_eq!(session.phase, Phase::Revealed);
    }

    #[tokio::test]
    async fn next_question_requires_revealed() {
        let (engine, repo) = engine();
        repo.add_question("q1", "one").await;
        let fac = engine.admit_facilitator("m1".to_string()).await.unwrap();

        let result = engine.next_question(&fac.connection_id, 1).await;
        assert!(matches!(result, Err(EngineError::InvalidTransition(_))));

        engine
            .start_question(&fac.connection_id, "q1".to_string(), None)
            .await
            .unwrap();
        engine
            .reveal_answers(&fac.connection_id, "q1".to_string())
            .await
            .unwrap();

        engine.next_question(&fac.connection_id, 1).await.unwrap();
        let session = engine.sessions.get(&"m1".to_string()).await.unwrap();
        assert_eq!(session.phase, Phase::Waiting);
    }

    #[tokio::test]
    async fn end_meeting_clears_everything() {
        let (engine, repo) = engine();
        repo.add_question("q1", "one").await;
        let fac = engine.admit_facilitator("m1".to_string()).await.unwrap();
        engine
            .admit_participant("m1".to_string(), "Al".to_string())
            .await
            .unwrap();
        engine
            .start_question(&fac.connection_id, "q1".to_string(), Some(30))
            .await
            .unwrap();

        engine.end_meeting(&fac.connection_id).await.unwrap();

        // Behaves as if no session ever existed
        let session = engine.sessions.get(&"m1".to_string()).await.unwrap();
        assert_eq!(session.phase, Phase::Waiting);
        assert!(session.participants.is_empty());
        assert!(session.current_question_id.is_none());
    }
}
