//! End-to-end lifecycle tests
//!
//! Drive meetings and sessions through the service against a real SQLite
//! database and check what ends up stored.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use consulta_core::{
    ConsultationService, Database, DocumentDraft, DocumentGenerator, DocumentType, Error,
    GenerationRequest, ManualClock, MeetingFilter, MeetingRepository, MeetingStatus,
    NewConversation, NewRequirement, ParticipantDraft, RandomIds, RequirementPriority, SequentialIds,
    SessionFilter, SessionPolicy, SessionRepository, SessionStatus, SessionType, Speaker,
};
use tempfile::TempDir;
use uuid::Uuid;

const AGENT: Uuid = Uuid::from_u128(0xA6E7);

struct Harness {
    service: ConsultationService<Database>,
    clock: Arc<ManualClock>,
}

fn harness_with(db: Database, policy: SessionPolicy) -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 5, 12, 14, 0, 0).unwrap(),
    ));
    let service = ConsultationService::new(
        db,
        clock.clone(),
        Arc::new(SequentialIds::new()),
        policy,
    );
    Harness { service, clock }
}

fn in_memory() -> Harness {
    let db = Database::open_in_memory().unwrap();
    db.migrate().unwrap();
    harness_with(db, SessionPolicy::default())
}

/// Echoes the request back as a markdown outline
struct OutlineGenerator;

impl DocumentGenerator for OutlineGenerator {
    fn generate(&self, request: &GenerationRequest) -> consulta_core::Result<DocumentDraft> {
        let mut body = format!("# {}\n", request.document_type);
        for req in &request.requirements {
            body.push_str(&format!("- [{}] {}\n", req.priority, req.title));
        }
        Ok(DocumentDraft {
            document_type: request.document_type,
            title: format!("{} outline", request.session_type),
            reference: format!("mem://{}/{}", request.session_id, request.document_type),
            content: Some(body),
        })
    }
}

// ============================================
// Meeting scenarios
// ============================================

#[test]
fn test_meeting_scenario() {
    let h = in_memory();
    let meeting = h.service.create_meeting("https://meet/x", None, None).unwrap();
    assert_eq!(meeting.status(), MeetingStatus::Waiting);

    let started = h.service.start_meeting(meeting.id()).unwrap();
    assert_eq!(started.status(), MeetingStatus::Active);
    assert!(started.started_at().is_some());

    let p1 = ParticipantDraft::new(h.service.ids(), "p1");
    let p1 = h.service.join_meeting(meeting.id(), p1).unwrap();
    let roster = h.service.meeting(meeting.id()).unwrap();
    assert_eq!(roster.active_participants().len(), 1);
    assert_eq!(roster.active_participants()[0].id, p1.id);

    let err = h.service.start_meeting(meeting.id()).unwrap_err();
    assert!(err.is_invalid_transition());

    h.clock.advance(Duration::minutes(45));
    let ended = h.service.end_meeting(meeting.id()).unwrap();
    assert_eq!(ended.status(), MeetingStatus::Ended);
    assert!(ended.ended_at().is_some());

    let err = h.service.cancel_meeting(meeting.id()).unwrap_err();
    assert!(err.is_invalid_transition());

    let stored = h
        .service
        .repository()
        .load_meeting(meeting.id())
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), MeetingStatus::Ended);
    assert_eq!(stored.duration(h.clock.as_ref()), Duration::minutes(45));
}

#[test]
fn test_remove_unknown_participant_keeps_roster() {
    let h = in_memory();
    let meeting = h.service.create_meeting("https://meet/roster", None, None).unwrap();
    h.service.start_meeting(meeting.id()).unwrap();
    for name in ["a", "b"] {
        let draft = ParticipantDraft::new(h.service.ids(), name);
        h.service.join_meeting(meeting.id(), draft).unwrap();
    }
    let before = h.service.meeting(meeting.id()).unwrap();

    let err = h
        .service
        .leave_meeting(meeting.id(), Uuid::from_u128(999_999))
        .unwrap_err();
    assert!(err.is_not_found());

    let after = h.service.meeting(meeting.id()).unwrap();
    assert_eq!(after.participants(), before.participants());
}

#[test]
fn test_double_leave_restamps() {
    let h = in_memory();
    let meeting = h.service.create_meeting("https://meet/leave", None, None).unwrap();
    h.service.start_meeting(meeting.id()).unwrap();
    let p = h
        .service
        .join_meeting(meeting.id(), ParticipantDraft::new(h.service.ids(), "Kim"))
        .unwrap();

    h.clock.advance(Duration::minutes(1));
    h.service.leave_meeting(meeting.id(), p.id).unwrap();
    h.clock.advance(Duration::minutes(1));
    h.service.leave_meeting(meeting.id(), p.id).unwrap();

    let stored = h
        .service
        .repository()
        .load_meeting(meeting.id())
        .unwrap()
        .unwrap();
    let entry = stored.find_participant(p.id).unwrap();
    assert!(!entry.is_active);
    assert_eq!(entry.left_at, Some(h.clock_now()));
}

// ============================================
// Session scenarios
// ============================================

#[test]
fn test_session_scenario() {
    let h = in_memory();
    let meeting = h.service.create_meeting("https://meet/s", None, None).unwrap();
    let session = h
        .service
        .open_session(meeting.id(), AGENT, Some(SessionType::DevelopmentConsultation))
        .unwrap();
    let id = session.id();

    assert!(h.service.complete_session(id).unwrap_err().is_invalid_transition());
    h.service.start_session(id).unwrap();
    h.service.pause_session(id).unwrap();

    let err = h
        .service
        .record_turn(id, NewConversation::new(Speaker::User, "t"))
        .unwrap_err();
    assert!(err.is_invalid_state());

    h.service.resume_session(id).unwrap();
    let turn = h
        .service
        .record_turn(id, NewConversation::new(Speaker::User, "t"))
        .unwrap();
    assert_eq!(turn.sequence_number, 1);

    h.clock.advance(Duration::minutes(20));
    let completed = h.service.complete_session(id).unwrap();
    assert_eq!(completed.status(), SessionStatus::Completed);
    let completed_at = completed.completed_at().unwrap();
    assert_eq!(
        completed.duration(h.clock.as_ref()),
        completed_at - completed.created_at()
    );
    assert_eq!(completed.duration(h.clock.as_ref()), Duration::minutes(20));
}

#[test]
fn test_fail_never_fails() {
    let h = in_memory();
    let meeting = h.service.create_meeting("https://meet/fail", None, None).unwrap();

    let open = |steps: &[&str]| {
        let id = h.service.open_session(meeting.id(), AGENT, None).unwrap().id();
        for step in steps {
            let result = match *step {
                "start" => h.service.start_session(id),
                "pause" => h.service.pause_session(id),
                _ => unreachable!(),
            };
            result.unwrap();
        }
        id
    };

    for steps in [&[][..], &["start"][..], &["start", "pause"][..]] {
        let id = open(steps);
        let failed = h.service.fail_session(id).unwrap();
        assert_eq!(failed.status(), SessionStatus::Failed);
        assert!(failed.completed_at().is_none());

        let stored = h.service.repository().load_session(id).unwrap().unwrap();
        assert_eq!(stored.status(), SessionStatus::Failed);
    }
}

#[test]
fn test_ledger_dense_across_pause_cycles() {
    let h = in_memory();
    let meeting = h.service.create_meeting("https://meet/dense", None, None).unwrap();
    let id = h.service.open_session(meeting.id(), AGENT, None).unwrap().id();
    h.service.start_session(id).unwrap();

    for round in 0..3 {
        for i in 0..4 {
            h.service
                .record_turn(
                    id,
                    NewConversation::new(Speaker::Agent, format!("r{round} t{i}")),
                )
                .unwrap();
        }
        h.service.pause_session(id).unwrap();
        assert!(h
            .service
            .record_turn(id, NewConversation::new(Speaker::User, "dropped"))
            .is_err());
        h.service.resume_session(id).unwrap();
    }

    let stored = h.service.repository().load_session(id).unwrap().unwrap();
    let numbers: Vec<u32> = stored
        .conversations()
        .iter()
        .map(|c| c.sequence_number)
        .collect();
    assert_eq!(numbers, (1..=12).collect::<Vec<u32>>());

    for n in [0, 1, 5, 12, 50] {
        let latest = h.service.latest_turns(id, n).unwrap();
        let expected = &stored.conversations()[12 - n.min(12)..];
        assert_eq!(latest.as_slice(), expected);
    }
}

#[test]
fn test_requirement_filters_preserve_order() {
    let h = in_memory();
    let meeting = h.service.create_meeting("https://meet/req", None, None).unwrap();
    let id = h.service.open_session(meeting.id(), AGENT, None).unwrap().id();

    let plan = [
        ("SSO", "security", RequirementPriority::Critical),
        ("CSV export", "reporting", RequirementPriority::Low),
        ("Audit trail", "security", RequirementPriority::High),
        ("Dashboards", "reporting", RequirementPriority::High),
        ("2FA", "security", RequirementPriority::Critical),
    ];
    for (title, category, priority) in plan {
        h.service
            .record_requirement(
                id,
                NewRequirement::new(h.service.ids(), title, category, priority),
            )
            .unwrap();
    }

    let session = h.service.session(id).unwrap();
    let titles = |reqs: Vec<&consulta_core::Requirement>| -> Vec<String> {
        reqs.iter().map(|r| r.title.clone()).collect()
    };

    assert_eq!(
        titles(session.requirements_by_category("security")),
        vec!["SSO", "Audit trail", "2FA"]
    );
    assert_eq!(
        titles(session.requirements_by_priority(RequirementPriority::High)),
        vec!["Audit trail", "Dashboards"]
    );
    assert!(session.requirements_by_category("legal").is_empty());

    let groups: Vec<RequirementPriority> = session
        .requirements_grouped_by_priority()
        .into_iter()
        .map(|(p, _)| p)
        .collect();
    assert_eq!(
        groups,
        vec![
            RequirementPriority::Critical,
            RequirementPriority::High,
            RequirementPriority::Low
        ]
    );
}

// ============================================
// Documents and persistence
// ============================================

#[test]
fn test_generated_document_is_stored() {
    let h = in_memory();
    let meeting = h.service.create_meeting("https://meet/doc", None, None).unwrap();
    let id = h
        .service
        .open_session(meeting.id(), AGENT, Some(SessionType::ArchitectureReview))
        .unwrap()
        .id();
    h.service
        .record_requirement(
            id,
            NewRequirement::new(h.service.ids(), "Queue", "backend", RequirementPriority::High),
        )
        .unwrap();

    let doc = h
        .service
        .generate_document(id, DocumentType::Architecture, &OutlineGenerator)
        .unwrap();
    assert_eq!(doc.title, "architecture_review outline");
    assert_eq!(
        doc.content_hash.as_deref(),
        Some(consulta_core::content_hash("# architecture\n- [high] Queue\n").as_str())
    );

    let stored = h.service.repository().load_session(id).unwrap().unwrap();
    assert_eq!(stored.documents_of_type(DocumentType::Architecture).len(), 1);
    assert!(stored.documents_of_type(DocumentType::Estimate).is_empty());
}

#[test]
fn test_state_survives_restart() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("consulta.db");

    let (meeting_id, session_id) = {
        let db = Database::open(&path).unwrap();
        db.migrate().unwrap();
        let h = harness_with(db, SessionPolicy::default());
        let meeting = h.service.create_meeting("https://meet/restart", None, None).unwrap();
        h.service.start_meeting(meeting.id()).unwrap();
        let session = h.service.open_session(meeting.id(), AGENT, None).unwrap();
        h.service.start_session(session.id()).unwrap();
        h.service
            .record_turn(session.id(), NewConversation::new(Speaker::User, "first"))
            .unwrap();
        (meeting.id(), session.id())
    };

    let db = Database::open(&path).unwrap();
    db.migrate().unwrap();
    let h = harness_with(db, SessionPolicy::default());

    // Ids from the fresh generator would collide; only reads and appends here
    let turn = h
        .service
        .record_turn(session_id, NewConversation::new(Speaker::Agent, "second"))
        .unwrap();
    assert_eq!(turn.sequence_number, 2);
    assert!(h.service.meeting(meeting_id).unwrap().is_active());

    let sessions = h
        .service
        .list_sessions(&SessionFilter {
            meeting_id: Some(meeting_id),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].conversations().len(), 2);

    let active = h
        .service
        .list_meetings(&MeetingFilter {
            status: Some(MeetingStatus::Active),
            limit: None,
        })
        .unwrap();
    assert_eq!(active.len(), 1);
}

fn open_file(path: &std::path::PathBuf) -> Database {
    let db = Database::open(path).unwrap();
    db.migrate().unwrap();
    db
}

#[test]
fn test_two_services_on_one_database_lose_nothing() {
    consulta_core::logging::init_test();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("consulta.db");

    let a = harness_with(open_file(&path), SessionPolicy::default());
    let b = ConsultationService::new(
        open_file(&path),
        a.clock.clone(),
        Arc::new(RandomIds),
        SessionPolicy::default(),
    );

    let meeting = a.service.create_meeting("https://meet/shared", None, None).unwrap();
    a.service.start_meeting(meeting.id()).unwrap();
    let id = a.service.open_session(meeting.id(), AGENT, None).unwrap().id();
    a.service.start_session(id).unwrap();

    // b caches both entities before a moves them on
    assert_eq!(b.session(id).unwrap().status(), SessionStatus::Active);
    assert!(b.meeting(meeting.id()).unwrap().is_active());

    let first = a
        .service
        .record_turn(id, NewConversation::new(Speaker::User, "from a"))
        .unwrap();
    let second = b
        .record_turn(id, NewConversation::new(Speaker::Agent, "from b"))
        .unwrap();
    assert_eq!(first.sequence_number, 1);
    assert_eq!(second.sequence_number, 2);

    // a's copy is now behind b's write
    let completed = a.service.complete_session(id).unwrap();
    assert_eq!(completed.conversations().len(), 2);

    // b's copy is behind a's completion; the requirement lands, the status holds
    b.record_requirement(
        id,
        NewRequirement::new(&RandomIds, "Audit trail", "security", RequirementPriority::High),
    )
    .unwrap();
    let late = b
        .record_turn(id, NewConversation::new(Speaker::User, "too late"))
        .unwrap_err();
    assert!(late.is_invalid_state());

    let stored = b.repository().load_session(id).unwrap().unwrap();
    let texts: Vec<&str> = stored.conversations().iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["from a", "from b"]);
    assert_eq!(stored.status(), SessionStatus::Completed);
    assert!(stored.completed_at().is_some());
    assert_eq!(stored.requirements().len(), 1);

    a.service.end_meeting(meeting.id()).unwrap();
    let err = b
        .join_meeting(meeting.id(), ParticipantDraft::new(&RandomIds, "Late guest"))
        .unwrap_err();
    assert!(err.is_invalid_state());
    let stored = b.repository().load_meeting(meeting.id()).unwrap().unwrap();
    assert_eq!(stored.status(), MeetingStatus::Ended);
    assert!(stored.participants().is_empty());
}

#[test]
fn test_live_meeting_policy_blocks_start() {
    let db = Database::open_in_memory().unwrap();
    db.migrate().unwrap();
    let h = harness_with(
        db,
        SessionPolicy {
            require_live_meeting: true,
            ..Default::default()
        },
    );
    let meeting = h.service.create_meeting("https://meet/policy", None, None).unwrap();
    let id = h.service.open_session(meeting.id(), AGENT, None).unwrap().id();

    match h.service.start_session(id) {
        Err(Error::InvalidState { entity, status, .. }) => {
            assert_eq!(entity, "meeting");
            assert_eq!(status, "waiting");
        }
        other => panic!("expected InvalidState, got {:?}", other.map(|s| s.status())),
    }
}

impl Harness {
    fn clock_now(&self) -> chrono::DateTime<Utc> {
        use consulta_core::Clock;
        self.clock.now()
    }
}
