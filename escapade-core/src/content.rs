//! Read-only puzzle content: per-stage question definitions and the answer
//! evaluation policy.
//!
//! Content is authored elsewhere and published under `config.puzzleContent`;
//! the core only ever reads it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::convert::Infallible;
use thiserror::Error;

use crate::constants::KEY_PUZZLE_CONTENT;
use crate::persist::{KeyValueStore, read_json};
use crate::stage::StageId;

const BUNDLED_CONTENT: &str = include_str!("../data/puzzle_content.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Choice,
    Text,
}

/// One question ("lock") inside a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSpec {
    pub id: String,
    pub prompt: String,
    pub kind: QuestionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub correct_answer: String,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl QuestionSpec {
    /// Decide whether `submitted` answers this question.
    ///
    /// Choice answers must equal the correct option exactly. Text answers are
    /// trimmed on both sides, then compared exactly or case-insensitively per
    /// `case_sensitive`. There is no partial credit.
    #[must_use]
    pub fn accepts(&self, submitted: &str) -> bool {
        match self.kind {
            QuestionKind::Choice => submitted == self.correct_answer,
            QuestionKind::Text => {
                let given = submitted.trim();
                let expected = self.correct_answer.trim();
                if self.case_sensitive {
                    given == expected
                } else {
                    given.to_lowercase() == expected.to_lowercase()
                }
            }
        }
    }
}

/// Problems found while validating authored content.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContentError {
    #[error("puzzle content JSON invalid: {0}")]
    Parse(String),
    #[error("{stage} has a question with an empty id")]
    EmptyId { stage: StageId },
    #[error("{stage} defines question `{id}` more than once")]
    DuplicateId { stage: StageId, id: String },
    #[error("{stage}/{id}: choice question needs options containing its correct answer")]
    ChoiceWithoutAnswer { stage: StageId, id: String },
}

type StageQuestions = BTreeMap<StageId, Vec<QuestionSpec>>;

/// Question definitions for every stage, optionally partitioned per group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleContent {
    #[serde(default)]
    pub stages: StageQuestions,
    /// Per-group replacements for whole stages.
    #[serde(default)]
    pub groups: BTreeMap<u32, StageQuestions>,
}

impl PuzzleContent {
    /// Parse and validate content JSON.
    ///
    /// # Errors
    ///
    /// Returns `ContentError` if the JSON is malformed or the content is inconsistent.
    pub fn from_json(json: &str) -> Result<Self, ContentError> {
        let content: Self =
            serde_json::from_str(json).map_err(|err| ContentError::Parse(err.to_string()))?;
        content.validate()?;
        Ok(content)
    }

    /// Content shipped with the crate.
    ///
    /// # Errors
    ///
    /// Returns `ContentError` if the embedded JSON is invalid.
    pub fn bundled() -> Result<Self, ContentError> {
        Self::from_json(BUNDLED_CONTENT)
    }

    /// Check ids are unique per stage and choice questions are answerable.
    ///
    /// # Errors
    ///
    /// Returns the first `ContentError` found.
    pub fn validate(&self) -> Result<(), ContentError> {
        let partitions = std::iter::once(&self.stages).chain(self.groups.values());
        for stages in partitions {
            for (stage, questions) in stages {
                validate_stage(*stage, questions)?;
            }
        }
        Ok(())
    }

    /// Questions `group` must solve in `stage`.
    #[must_use]
    pub fn questions_for(&self, stage: StageId, group: Option<u32>) -> &[QuestionSpec] {
        group
            .and_then(|g| self.groups.get(&g))
            .and_then(|stages| stages.get(&stage))
            .or_else(|| self.stages.get(&stage))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn question(
        &self,
        stage: StageId,
        group: Option<u32>,
        question_id: &str,
    ) -> Option<&QuestionSpec> {
        self.questions_for(stage, group)
            .iter()
            .find(|q| q.id == question_id)
    }
}

fn validate_stage(stage: StageId, questions: &[QuestionSpec]) -> Result<(), ContentError> {
    let mut seen = HashSet::new();
    for question in questions {
        if question.id.trim().is_empty() {
            return Err(ContentError::EmptyId { stage });
        }
        if !seen.insert(question.id.as_str()) {
            return Err(ContentError::DuplicateId {
                stage,
                id: question.id.clone(),
            });
        }
        if question.kind == QuestionKind::Choice {
            let answerable = question
                .options
                .as_ref()
                .is_some_and(|opts| opts.contains(&question.correct_answer));
            if !answerable {
                return Err(ContentError::ChoiceWithoutAnswer {
                    stage,
                    id: question.id.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Trait for abstracting where puzzle content comes from.
/// Platform-specific implementations may provide their own.
pub trait ContentSource {
    type Error: std::error::Error + 'static;

    /// Load the current puzzle content.
    ///
    /// # Errors
    ///
    /// Returns an error if content cannot be produced.
    fn load_content(&self) -> Result<PuzzleContent, Self::Error>;
}

impl ContentSource for PuzzleContent {
    type Error = Infallible;

    fn load_content(&self) -> Result<PuzzleContent, Self::Error> {
        Ok(self.clone())
    }
}

/// The content embedded in the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledContent;

impl ContentSource for BundledContent {
    type Error = ContentError;

    fn load_content(&self) -> Result<PuzzleContent, Self::Error> {
        PuzzleContent::bundled()
    }
}

/// Content published by the authoring tool into the shared store, falling
/// back to the bundled set when nothing usable is stored.
#[derive(Debug, Clone)]
pub struct StoredContent<S> {
    store: S,
}

impl<S: KeyValueStore> StoredContent<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: KeyValueStore> ContentSource for StoredContent<S> {
    type Error = ContentError;

    fn load_content(&self) -> Result<PuzzleContent, Self::Error> {
        match read_json::<_, PuzzleContent>(&self.store, KEY_PUZZLE_CONTENT) {
            Ok(Some(content)) => match content.validate() {
                Ok(()) => return Ok(content),
                Err(err) => log::warn!("stored puzzle content rejected: {err}"),
            },
            Ok(None) => log::debug!("no stored puzzle content; using bundled set"),
            Err(err) => log::warn!("{err}; using bundled puzzle content"),
        }
        PuzzleContent::bundled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;

    fn text(answer: &str, case_sensitive: bool) -> QuestionSpec {
        QuestionSpec {
            id: "q".into(),
            prompt: "?".into(),
            kind: QuestionKind::Text,
            options: None,
            correct_answer: answer.into(),
            case_sensitive,
        }
    }

    #[test]
    fn text_answers_respect_case_policy() {
        assert!(text("RPQ", false).accepts("rpq"));
        assert!(!text("RPQ", true).accepts("rpq"));
        assert!(text("RPQ", true).accepts("  RPQ\n"));
        assert!(!text("RPQ", false).accepts("RP"));
    }

    #[test]
    fn choice_answers_need_exact_match() {
        let q = QuestionSpec {
            kind: QuestionKind::Choice,
            options: Some(vec!["DNA".into(), "RNA".into()]),
            ..text("DNA", false)
        };
        assert!(q.accepts("DNA"));
        assert!(!q.accepts("dna"));
        assert!(!q.accepts(" DNA"));
    }

    #[test]
    fn group_partitions_override_whole_stages() {
        let json = r#"{
            "stages": {"stage1": [{"id": "a", "prompt": "p", "kind": "text", "correctAnswer": "x"}]},
            "groups": {"3": {"stage1": [
                {"id": "b", "prompt": "p", "kind": "text", "correctAnswer": "y"},
                {"id": "c", "prompt": "p", "kind": "text", "correctAnswer": "z"}
            ]}}
        }"#;
        let content = PuzzleContent::from_json(json).unwrap();
        assert_eq!(content.questions_for(StageId::Stage1, None).len(), 1);
        assert_eq!(content.questions_for(StageId::Stage1, Some(3)).len(), 2);
        assert_eq!(content.questions_for(StageId::Stage1, Some(4))[0].id, "a");
        assert!(content.questions_for(StageId::Stage2, Some(3)).is_empty());
        assert!(content.question(StageId::Stage1, Some(3), "a").is_none());
    }

    #[test]
    fn validation_rejects_unanswerable_choice_and_duplicates() {
        let bad_choice = r#"{"stages": {"stage2": [
            {"id": "a", "prompt": "p", "kind": "choice", "options": ["x"], "correctAnswer": "y"}
        ]}}"#;
        assert!(matches!(
            PuzzleContent::from_json(bad_choice),
            Err(ContentError::ChoiceWithoutAnswer { stage: StageId::Stage2, .. })
        ));
        let dupes = r#"{"stages": {"stage1": [
            {"id": "a", "prompt": "p", "kind": "text", "correctAnswer": "y"},
            {"id": "a", "prompt": "p", "kind": "text", "correctAnswer": "z"}
        ]}}"#;
        assert!(matches!(
            PuzzleContent::from_json(dupes),
            Err(ContentError::DuplicateId { .. })
        ));
    }

    #[test]
    fn stored_content_falls_back_to_bundled() {
        let store = MemoryStore::new();
        let source = StoredContent::new(store.clone());
        let bundled = PuzzleContent::bundled().unwrap();
        assert_eq!(source.load_content().unwrap(), bundled);

        store.set(KEY_PUZZLE_CONTENT, "[broken").unwrap();
        assert_eq!(source.load_content().unwrap(), bundled);

        store
            .set(
                KEY_PUZZLE_CONTENT,
                r#"{"stages": {"stage1": [{"id": "solo", "prompt": "p", "kind": "text", "correctAnswer": "x"}]}}"#,
            )
            .unwrap();
        let loaded = source.load_content().unwrap();
        assert_eq!(loaded.questions_for(StageId::Stage1, None)[0].id, "solo");
    }
}
