use escapade_core::{
    ContentSource, KeyValueStore, MemoryStore, PuzzleContent, QuestionKind, StageId,
    StoredContent, constants::KEY_PUZZLE_CONTENT,
};

#[test]
fn bundled_content_covers_every_stage() {
    let content = PuzzleContent::bundled().unwrap();
    for stage in StageId::ALL {
        let questions = content.questions_for(stage, None);
        assert_eq!(questions.len(), 3, "{stage} should have three locks");
        for question in questions {
            assert!(!question.prompt.trim().is_empty());
            assert!(question.accepts(&question.correct_answer));
            if question.kind == QuestionKind::Choice {
                let options = question.options.as_ref().expect("choice has options");
                assert!(options.len() >= 2);
            }
        }
    }
    assert!(content.groups.is_empty());
}

#[test]
fn bundled_content_serializes_with_authoring_field_names() {
    let content = PuzzleContent::bundled().unwrap();
    let value = serde_json::to_value(&content).unwrap();
    let first = &value["stages"]["stage1"][0];
    assert!(first.get("correctAnswer").is_some());
    assert!(first.get("caseSensitive").is_some());
    assert_eq!(first["kind"], "choice");
}

#[test]
fn stored_content_overrides_and_partitions_by_group() {
    let store = MemoryStore::new();
    store
        .set(
            KEY_PUZZLE_CONTENT,
            r#"{
                "stages": {
                    "stage1": [{"id": "a", "prompt": "Say hi", "kind": "text", "correctAnswer": "hi"}]
                },
                "groups": {
                    "4": {
                        "stage1": [{"id": "b", "prompt": "Say yo", "kind": "text", "correctAnswer": "yo", "caseSensitive": true}]
                    }
                }
            }"#,
        )
        .unwrap();
    let content = StoredContent::new(store.clone()).load_content().unwrap();
    assert_eq!(content.questions_for(StageId::Stage1, Some(1))[0].id, "a");
    assert_eq!(content.questions_for(StageId::Stage1, Some(4))[0].id, "b");
    assert!(content.questions_for(StageId::Stage2, Some(4)).is_empty());
    assert!(!content.question(StageId::Stage1, Some(4), "b").unwrap().accepts("YO"));
}

#[test]
fn broken_stored_content_falls_back_to_bundled() {
    let store = MemoryStore::new();
    store
        .set(
            KEY_PUZZLE_CONTENT,
            r#"{"stages": {"stage1": [{"id": "x", "prompt": "?", "kind": "choice", "options": ["a"], "correctAnswer": "b"}]}}"#,
        )
        .unwrap();
    let content = StoredContent::new(store).load_content().unwrap();
    assert_eq!(content, PuzzleContent::bundled().unwrap());
}
