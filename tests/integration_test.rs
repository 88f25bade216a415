use async_trait::async_trait;
use plenum::ai::{AiResult, GroupingProposal, ProposedGroup, Summarizer};
use plenum::engine::Engine;
use plenum::error::EngineError;
use plenum::protocol::{ClientMessage, ServerMessage};
use plenum::repo::MemoryMeetingRepo;
use plenum::rooms::Scope;
use plenum::store::{MemorySessionStore, SessionStore, StoreError, StoreResult};
use plenum::types::{Answer, MeetingId, ParticipantId, Phase, QuestionId, Session};
use plenum::ws::handlers::handle_message;
use std::sync::Arc;
use std::time::Duration;

struct EchoAi;

#[async_trait]
impl Summarizer for EchoAi {
    async fn summarize(&self, _question: &str, answers: &[Answer]) -> AiResult<String> {
        Ok(format!("{} answers summarized", answers.len()))
    }

    async fn group_answers(
        &self,
        _question: &str,
        answers: &[Answer],
    ) -> AiResult<GroupingProposal> {
        // Put the first two answers in one theme, leave the rest out
        Ok(GroupingProposal {
            groups: vec![ProposedGroup {
                name: "First Theme".to_string(),
                answer_ids: answers.iter().take(2).map(|a| a.id.clone()).collect(),
            }],
        })
    }
}

fn engine_with(repo: Arc<MemoryMeetingRepo>, ai: Option<Arc<dyn Summarizer>>) -> Engine {
    Engine::new(Arc::new(MemorySessionStore::new()), repo, ai)
}

async fn seeded_repo() -> Arc<MemoryMeetingRepo> {
    let repo = Arc::new(MemoryMeetingRepo::new());
    repo.add_question("q1", "What should we improve?").await;
    repo.add_question("q2", "What went well?").await;
    repo
}

/// End-to-end flow for one question: admissions, answering, reveal with
/// summary, grouping, next question, meeting end.
#[tokio::test]
async fn test_full_session_flow() {
    let repo = seeded_repo().await;
    let engine = engine_with(repo.clone(), Some(Arc::new(EchoAi)));

    // 1. Facilitator and two participants join
    let fac = engine.admit_facilitator("m1".to_string()).await.unwrap();
    assert_eq!(fac.session.phase, Phase::Waiting);

    let alice = engine
        .admit_participant("m1".to_string(), "Alice".to_string())
        .await
        .unwrap();
    let bob = engine
        .admit_participant("m1".to_string(), "Bob".to_string())
        .await
        .unwrap();

    let mut all_rx = engine.router.subscribe(&"m1".to_string(), Scope::All).await;
    let mut fac_rx = engine
        .router
        .subscribe(&"m1".to_string(), Scope::Facilitators)
        .await;

    // 2. Facilitator opens the question with a time limit
    engine
        .start_question(&fac.connection_id, "q1".to_string(), Some(60))
        .await
        .unwrap();
    match all_rx.recv().await.unwrap() {
        ServerMessage::QuestionStarted {
            question_id,
            deadline,
            ..
        } => {
            assert_eq!(question_id, "q1");
            assert!(deadline.is_some());
        }
        other => panic!("expected QuestionStarted, got {other:?}"),
    }

    // 3. Both participants answer; progress counts up
    engine
        .submit_answer(&alice.connection_id, "q1".to_string(), "docs".to_string())
        .await
        .unwrap();
    engine
        .submit_answer(&bob.connection_id, "q1".to_string(), "tests".to_string())
        .await
        .unwrap();

    let mut last_progress = (0, 0);
    while let Ok(msg) = all_rx.try_recv() {
        if let ServerMessage::AnswerProgress {
            answered_count,
            total_count,
        } = msg
        {
            // Counts are monotonically non-decreasing
            assert!(answered_count >= last_progress.0);
            last_progress = (answered_count, total_count);
        }
    }
    assert_eq!(last_progress, (2, 2));

    // 4. Reveal: answers broadcast synchronously, summary follows to the
    // facilitator group
    engine
        .reveal_answers(&fac.connection_id, "q1".to_string())
        .await
        .unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let ServerMessage::SummaryReady { summary, .. } = fac_rx.recv().await.unwrap() {
                break summary;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(summary, "2 answers summarized");

    let mut revealed_answers = None;
    while let Ok(msg) = all_rx.try_recv() {
        if let ServerMessage::AnswersRevealed { answers, .. } = msg {
            revealed_answers = Some(answers);
        }
    }
    let revealed = revealed_answers.expect("AnswersRevealed must be delivered before the summary");
    assert_eq!(revealed.len(), 2);

    // 5. Small sample grouping bypasses the collaborator entirely
    engine
        .group_answers(&fac.connection_id, "q1".to_string())
        .await
        .unwrap();
    let grouping = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let ServerMessage::AnswersGrouped { grouping } = all_rx.recv().await.unwrap() {
                break grouping;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(grouping.groups.len(), 1);
    assert_eq!(grouping.groups[0].name, "All Responses");
    assert_eq!(grouping.groups[0].answer_ids.len(), 2);
    assert!(grouping.ungrouped.is_empty());

    // 6. Next question resets the phase
    engine.next_question(&fac.connection_id, 1).await.unwrap();
    let session = engine.sessions.get(&"m1".to_string()).await.unwrap();
    assert_eq!(session.phase, Phase::Waiting);

    // 7. End meeting wipes the session
    engine.end_meeting(&fac.connection_id).await.unwrap();
    let session = engine.sessions.get(&"m1".to_string()).await.unwrap();
    assert!(session.participants.is_empty());
    assert_eq!(session.phase, Phase::Waiting);
}

#[tokio::test]
async fn test_duplicate_name_scenario() {
    let repo = seeded_repo().await;
    let engine = engine_with(repo, None);

    let first = engine
        .admit_participant("m1".to_string(), "Al".to_string())
        .await
        .unwrap();

    let second = engine
        .admit_participant("m1".to_string(), "Al".to_string())
        .await;
    match second {
        Err(EngineError::DuplicateName(name)) => assert_eq!(name, "Al"),
        other => panic!("expected DuplicateName, got {other:?}"),
    }

    // First Al unaffected
    assert!(engine.connection(&first.connection_id).await.is_some());
    let session = engine.sessions.get(&"m1".to_string()).await.unwrap();
    assert_eq!(session.participants.len(), 1);
}

#[tokio::test]
async fn test_stale_reveal_scenario() {
    let repo = seeded_repo().await;
    let engine = engine_with(repo, None);
    let fac = engine.admit_facilitator("m1".to_string()).await.unwrap();

    engine
        .start_question(&fac.connection_id, "q1".to_string(), None)
        .await
        .unwrap();
    engine
        .start_question(&fac.connection_id, "q2".to_string(), None)
        .await
        .unwrap();

    let delayed = engine
        .reveal_answers(&fac.connection_id, "q1".to_string())
        .await;
    assert!(matches!(delayed, Err(EngineError::StaleReveal)));

    let session = engine.sessions.get(&"m1".to_string()).await.unwrap();
    assert_eq!(session.phase, Phase::Answering);
    assert_eq!(session.current_question_id.as_deref(), Some("q2"));
}

#[tokio::test]
async fn test_retract_to_zero_scenario() {
    let repo = seeded_repo().await;
    let engine = engine_with(repo, None);
    let fac = engine.admit_facilitator("m1".to_string()).await.unwrap();
    let part = engine
        .admit_participant("m1".to_string(), "Al".to_string())
        .await
        .unwrap();

    engine
        .start_question(&fac.connection_id, "q1".to_string(), None)
        .await
        .unwrap();

    // Two answers under multi-answer mode
    let a1 = engine
        .submit_answer(&part.connection_id, "q1".to_string(), "one".to_string())
        .await
        .unwrap();
    let a2 = engine
        .submit_answer(&part.connection_id, "q1".to_string(), "two".to_string())
        .await
        .unwrap();

    engine
        .retract_answer(&part.connection_id, "q1".to_string(), a1.id)
        .await
        .unwrap();
    let session = engine.sessions.get(&"m1".to_string()).await.unwrap();
    assert_eq!(session.answered.len(), 1, "one answer left, still counted");

    engine
        .retract_answer(&part.connection_id, "q1".to_string(), a2.id)
        .await
        .unwrap();
    let session = engine.sessions.get(&"m1".to_string()).await.unwrap();
    assert!(session.answered.is_empty());
}

#[tokio::test]
async fn test_ai_grouping_reconciliation() {
    let repo = seeded_repo().await;
    let engine = engine_with(repo.clone(), Some(Arc::new(EchoAi)));
    let fac = engine.admit_facilitator("m1".to_string()).await.unwrap();

    let mut connections = Vec::new();
    for i in 0..5 {
        let part = engine
            .admit_participant("m1".to_string(), format!("p{i}"))
            .await
            .unwrap();
        connections.push(part.connection_id);
    }

    engine
        .start_question(&fac.connection_id, "q1".to_string(), None)
        .await
        .unwrap();
    for conn in &connections {
        engine
            .submit_answer(conn, "q1".to_string(), "an idea".to_string())
            .await
            .unwrap();
    }
    engine
        .reveal_answers(&fac.connection_id, "q1".to_string())
        .await
        .unwrap();

    let mut all_rx = engine.router.subscribe(&"m1".to_string(), Scope::All).await;
    engine
        .group_answers(&fac.connection_id, "q1".to_string())
        .await
        .unwrap();

    let grouping = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let ServerMessage::AnswersGrouped { grouping } = all_rx.recv().await.unwrap() {
                break grouping;
            }
        }
    })
    .await
    .unwrap();

    // EchoAi groups the first two answers, the other three stay ungrouped
    assert_eq!(grouping.groups.len(), 1);
    assert_eq!(grouping.groups[0].answer_ids.len(), 2);
    assert_eq!(grouping.ungrouped.len(), 3);

    // Manual follow-up edit keeps everyone in exactly one bucket
    let group_id = grouping.groups[0].id.clone();
    let moved = engine
        .move_answer(
            &fac.connection_id,
            "q1".to_string(),
            grouping.ungrouped[0].clone(),
            Some(group_id),
        )
        .await
        .unwrap();
    assert_eq!(moved.groups[0].answer_ids.len(), 3);
    assert_eq!(moved.ungrouped.len(), 2);
}

#[tokio::test]
async fn test_concurrent_submissions_final_count() {
    let repo = seeded_repo().await;
    let engine = engine_with(repo, None);
    let fac = engine.admit_facilitator("m1".to_string()).await.unwrap();

    let n = 24;
    let mut connections = Vec::new();
    for i in 0..n {
        let part = engine
            .admit_participant("m1".to_string(), format!("p{i}"))
            .await
            .unwrap();
        connections.push(part.connection_id);
    }

    engine
        .start_question(&fac.connection_id, "q1".to_string(), None)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for conn in connections {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .submit_answer(&conn, "q1".to_string(), "here".to_string())
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let session = engine.sessions.get(&"m1".to_string()).await.unwrap();
    assert_eq!(session.answered.len(), n);
}

#[tokio::test]
async fn test_handler_dispatch_over_protocol() {
    let repo = seeded_repo().await;
    let engine = engine_with(repo, None);
    let fac = engine.admit_facilitator("m1".to_string()).await.unwrap();
    let part = engine
        .admit_participant("m1".to_string(), "Al".to_string())
        .await
        .unwrap();

    // Facilitator opens q1 via the wire protocol
    let response = handle_message(
        ClientMessage::StartQuestion {
            question_id: "q1".to_string(),
            time_limit_seconds: None,
        },
        &fac.connection_id,
        &engine,
    )
    .await;
    assert!(response.is_none());

    // Participant answers via the wire protocol
    let response = handle_message(
        ClientMessage::SubmitAnswer {
            question_id: "q1".to_string(),
            text: "ship smaller changes".to_string(),
        },
        &part.connection_id,
        &engine,
    )
    .await;
    assert!(response.is_none());

    // Participant tries a facilitator command
    let response = handle_message(
        ClientMessage::EndMeeting,
        &part.connection_id,
        &engine,
    )
    .await;
    match response {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "UNAUTHORIZED"),
        other => panic!("expected Error, got {other:?}"),
    }
}

/// Session store that refuses every operation, standing in for an
/// unreachable backing store
struct DownSessionStore;

#[async_trait]
impl SessionStore for DownSessionStore {
    async fn get(&self, _: &MeetingId) -> StoreResult<Session> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn set_phase(&self, _: &MeetingId, _: Phase) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn set_current_question(&self, _: &MeetingId, _: QuestionId) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn add_participant(&self, _: &MeetingId, _: ParticipantId) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn remove_participant(&self, _: &MeetingId, _: &ParticipantId) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn mark_answered(&self, _: &MeetingId, _: ParticipantId) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn unmark_answered(&self, _: &MeetingId, _: &ParticipantId) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn clear_answered(&self, _: &MeetingId) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn set_timer(&self, _: &MeetingId, _: chrono::DateTime<chrono::Utc>) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn clear_timer(&self, _: &MeetingId) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn clear(&self, _: &MeetingId) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn test_store_outage_fails_loudly() {
    let repo = seeded_repo().await;
    let engine = Engine::new(Arc::new(DownSessionStore), repo, None);

    // Admission reads the snapshot and must surface the outage instead of
    // handing back a default session
    let result = engine.admit_facilitator("m1".to_string()).await;
    match result {
        Err(EngineError::StoreUnavailable(msg)) => assert!(msg.contains("connection refused")),
        other => panic!("expected StoreUnavailable, got {:?}", other.map(|_| ())),
    }
}
