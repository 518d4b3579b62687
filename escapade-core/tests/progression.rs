use escapade_core::{
    CourseConfig, EscapeEngine, ManualClock, MemoryStore, Profile, ProfileField, ProgressError,
    ProgressState, PuzzleContent, QuestionKind, QuestionSpec, StageId,
};

const STAGE_ANSWERS: [(StageId, [(&str, &str); 3]); 4] = [
    (
        StageId::Stage1,
        [("q1", "DNA"), ("q2", "Thymine"), ("q3", "double helix")],
    ),
    (StageId::Stage2, [("q1", "TAC"), ("q2", "Nucleus"), ("q3", "3")]),
    (
        StageId::Stage3,
        [("q1", "Homozygous"), ("q2", "1/4"), ("q3", "Mendel")],
    ),
    (
        StageId::Stage4,
        [("q1", "mutation"), ("q2", "Meiosis"), ("q3", "46")],
    ),
];

fn engine(store: &MemoryStore, clock: &ManualClock) -> EscapeEngine<MemoryStore, ManualClock> {
    EscapeEngine::new(
        store.clone(),
        clock.clone(),
        CourseConfig::default(),
        PuzzleContent::bundled().unwrap(),
    )
    .unwrap()
}

fn profile(group: i64) -> Profile {
    Profile {
        display_name: "Barbara".into(),
        cohort_label: "Period 3".into(),
        cohort_year: 2026,
        group_number: group,
    }
}

fn solve_stage(engine: &mut EscapeEngine<MemoryStore, ManualClock>, stage: StageId) {
    let (_, answers) = STAGE_ANSWERS
        .iter()
        .find(|(s, _)| *s == stage)
        .expect("stage has answers");
    for (id, answer) in answers {
        let eval = engine.evaluate(stage, id, answer).unwrap();
        assert!(eval.correct, "{stage}:{id} should accept {answer:?}");
    }
}

#[test]
fn clearing_stage_one_unlocks_stage_two() {
    let store = MemoryStore::new();
    let clock = ManualClock::starting_at(10_000);
    let mut engine = engine(&store, &clock);
    engine.start_session(&profile(3)).unwrap();

    engine.enter_stage(StageId::Stage1).unwrap();
    solve_stage(&mut engine, StageId::Stage1);
    clock.advance(90_000);
    let transition = engine.attempt_finalize_stage(StageId::Stage1).unwrap();

    assert_eq!(transition.unlocked, Some(StageId::Stage2));
    assert_eq!(transition.timing.duration_ms, Some(90_000));
    let view = engine.current_stage_view();
    assert!(view.stage_unlock.stage2);
    assert_eq!(view.state, ProgressState::Stage(StageId::Stage2));
    assert_eq!(view.percent_complete, 25);
}

#[test]
fn unattempted_question_blocks_finalize() {
    let store = MemoryStore::new();
    let clock = ManualClock::starting_at(0);
    let mut engine = engine(&store, &clock);
    engine.start_session(&profile(1)).unwrap();

    engine.evaluate(StageId::Stage1, "q1", "DNA").unwrap();
    engine.evaluate(StageId::Stage1, "q2", "Thymine").unwrap();
    let err = engine.attempt_finalize_stage(StageId::Stage1).unwrap_err();

    assert_eq!(
        err,
        ProgressError::Incomplete {
            stage: StageId::Stage1,
            missing: vec!["q3".into()],
        }
    );
    assert!(err.is_recoverable());
    assert!(!engine.current_stage_view().stage_unlock.stage2);
}

#[test]
fn latest_attempt_decides_finalize() {
    let store = MemoryStore::new();
    let clock = ManualClock::starting_at(0);
    let mut engine = engine(&store, &clock);
    engine.start_session(&profile(1)).unwrap();
    solve_stage(&mut engine, StageId::Stage1);

    // A wrong re-submission after a correct one counts.
    engine.evaluate(StageId::Stage1, "q2", "Uracil").unwrap();
    assert!(matches!(
        engine.attempt_finalize_stage(StageId::Stage1),
        Err(ProgressError::Unsolved { .. })
    ));
    assert!(!engine.current_stage_view().stage_unlock.stage2);

    engine.evaluate(StageId::Stage1, "q2", "Thymine").unwrap();
    engine.attempt_finalize_stage(StageId::Stage1).unwrap();
    assert!(engine.current_stage_view().stage_unlock.stage2);
}

#[test]
fn ordinals_count_every_evaluation() {
    let store = MemoryStore::new();
    let clock = ManualClock::starting_at(0);
    let mut engine = engine(&store, &clock);
    engine.start_session(&profile(7)).unwrap();

    for answer in ["RNA", "Protein", "DNA", "DNA"] {
        clock.advance(1);
        engine.evaluate(StageId::Stage1, "q1", answer).unwrap();
    }
    let ordinals: Vec<u32> = engine
        .attempts_for(StageId::Stage1, "q1")
        .iter()
        .map(|r| r.attempt_ordinal)
        .collect();
    assert_eq!(ordinals, [1, 2, 3, 4]);
}

#[test]
fn case_sensitivity_follows_question() {
    let store = MemoryStore::new();
    let clock = ManualClock::starting_at(0);
    let mut engine = engine(&store, &clock);
    engine.start_session(&profile(2)).unwrap();

    let mut spec = QuestionSpec {
        id: "code".into(),
        prompt: "Enter the code".into(),
        kind: QuestionKind::Text,
        options: None,
        correct_answer: "RPQ".into(),
        case_sensitive: false,
    };
    assert!(engine.evaluate_against(StageId::Stage1, &spec, "rpq").unwrap().correct);
    assert!(engine.evaluate_against(StageId::Stage1, &spec, "  rpq ").unwrap().correct);
    spec.case_sensitive = true;
    assert!(!engine.evaluate_against(StageId::Stage1, &spec, "rpq").unwrap().correct);
    assert_eq!(engine.attempts_for(StageId::Stage1, "code").len(), 3);
}

#[test]
fn full_run_completes_and_publishes() {
    let store = MemoryStore::new();
    let clock = ManualClock::starting_at(0);
    let mut engine = engine(&store, &clock);
    engine.start_session(&profile(5)).unwrap();

    for stage in StageId::ALL {
        engine.enter_stage(stage).unwrap();
        solve_stage(&mut engine, stage);
        clock.advance(1_000);
        engine.attempt_finalize_stage(stage).unwrap();
    }

    let view = engine.current_stage_view();
    assert_eq!(view.state, ProgressState::Complete);
    assert_eq!(view.percent_complete, 100);
    assert_eq!(view.reward_symbol.as_deref(), Some("G"));

    let pool = engine.current_pool();
    assert_eq!(pool.len(), 1);
    let record = pool.record_for(5).expect("group 5 published");
    assert_eq!(record.contributor_name, "Barbara");
    assert!(engine.drain_warnings().is_empty());
}

#[test]
fn unlocks_stay_set_while_revisiting() {
    let store = MemoryStore::new();
    let clock = ManualClock::starting_at(0);
    let mut engine = engine(&store, &clock);
    engine.start_session(&profile(8)).unwrap();
    solve_stage(&mut engine, StageId::Stage1);
    engine.attempt_finalize_stage(StageId::Stage1).unwrap();
    solve_stage(&mut engine, StageId::Stage2);
    engine.attempt_finalize_stage(StageId::Stage2).unwrap();

    // Going back to stage 1 and answering wrong does not relock anything.
    engine.evaluate(StageId::Stage1, "q1", "RNA").unwrap();
    assert!(engine.attempt_finalize_stage(StageId::Stage1).is_err());
    let unlocks = engine.current_stage_view().stage_unlock;
    assert!(unlocks.stage2 && unlocks.stage3);

    engine.end_session();
    assert_eq!(engine.current_stage_view().state, ProgressState::NoSession);
    assert!(!engine.current_stage_view().stage_unlock.stage2);
}

#[test]
fn invalid_profile_reports_each_field() {
    let store = MemoryStore::new();
    let clock = ManualClock::starting_at(0);
    let mut engine = engine(&store, &clock);
    let bad = Profile {
        display_name: "  ".into(),
        cohort_label: String::new(),
        cohort_year: 1850,
        group_number: 0,
    };
    let err = engine.start_session(&bad).unwrap_err();
    let fields: Vec<ProfileField> = err.field_errors().iter().map(|e| e.field).collect();
    assert_eq!(
        fields,
        [
            ProfileField::DisplayName,
            ProfileField::CohortLabel,
            ProfileField::CohortYear,
            ProfileField::GroupNumber,
        ]
    );
    assert!(engine.current_session().is_none());
}

#[test]
fn restart_mints_a_new_session() {
    let store = MemoryStore::new();
    let clock = ManualClock::starting_at(500);
    let mut engine = engine(&store, &clock);
    let first = engine.start_session(&profile(4)).unwrap();
    solve_stage(&mut engine, StageId::Stage1);
    let second = engine.start_session(&profile(4)).unwrap();

    assert_ne!(first.session_id, second.session_id);
    assert!(second.started_at > first.started_at);
    assert!(engine.attempts_for(StageId::Stage1, "q1").is_empty());
}
