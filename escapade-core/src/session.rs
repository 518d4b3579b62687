//! Session Manager: the identity of the learner/group for one play-through.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::hash::Hasher;
use thiserror::Error;
use twox_hash::XxHash64;

use crate::clock::{Clock, Millis};
use crate::config::CourseConfig;
use crate::constants::{
    KEY_PROGRESS, KEY_SESSION, MAX_COHORT_LABEL_CHARS, MAX_DISPLAY_NAME_CHARS,
};
use crate::persist::{KeyValueStore, WarningSink, read_json, write_json};

/// Registration details entered before a play-through starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_name: String,
    pub cohort_label: String,
    pub cohort_year: i32,
    /// Signed so out-of-range input can be reported rather than rejected by the parser.
    pub group_number: i64,
}

/// Profile field a validation problem refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProfileField {
    DisplayName,
    CohortLabel,
    CohortYear,
    GroupNumber,
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DisplayName => "displayName",
            Self::CohortLabel => "cohortLabel",
            Self::CohortYear => "cohortYear",
            Self::GroupNumber => "groupNumber",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FieldProblem {
    #[error("must not be blank")]
    Blank,
    #[error("must be at most {max} characters")]
    TooLong { max: usize },
    #[error("must be between {min} and {max}")]
    OutOfRange { min: i64, max: i64 },
    #[error("must be a whole number")]
    NotANumber,
}

/// One invalid profile field; the UI shows one message per instance.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{field} {problem}")]
pub struct FieldError {
    pub field: ProfileField,
    pub problem: FieldProblem,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid profile: {}", join_fields(.0))]
    Validation(Vec<FieldError>),
}

impl SessionError {
    /// Field-scoped problems carried by this error.
    #[must_use]
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation(errors) => errors,
        }
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn check_text(field: ProfileField, value: &str, max: usize, errors: &mut Vec<FieldError>) {
    let trimmed = value.trim();
    let problem = if trimmed.is_empty() {
        FieldProblem::Blank
    } else if trimmed.chars().count() > max {
        FieldProblem::TooLong { max }
    } else {
        return;
    };
    errors.push(FieldError { field, problem });
}

impl Profile {
    /// Check every field against `cfg`, reporting each offending field.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] listing one [`FieldError`] per bad field.
    pub fn validate(&self, cfg: &CourseConfig) -> Result<(), SessionError> {
        let mut errors = Vec::new();
        check_text(
            ProfileField::DisplayName,
            &self.display_name,
            MAX_DISPLAY_NAME_CHARS,
            &mut errors,
        );
        check_text(
            ProfileField::CohortLabel,
            &self.cohort_label,
            MAX_COHORT_LABEL_CHARS,
            &mut errors,
        );
        if !cfg.cohort_years().contains(&self.cohort_year) {
            errors.push(FieldError {
                field: ProfileField::CohortYear,
                problem: FieldProblem::OutOfRange {
                    min: i64::from(cfg.cohort_year_min),
                    max: i64::from(cfg.cohort_year_max),
                },
            });
        }
        let groups = i64::from(cfg.group_min)..=i64::from(cfg.group_max);
        if !groups.contains(&self.group_number) {
            errors.push(FieldError {
                field: ProfileField::GroupNumber,
                problem: FieldProblem::OutOfRange {
                    min: *groups.start(),
                    max: *groups.end(),
                },
            });
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SessionError::Validation(errors))
        }
    }
}

/// Profile fields exactly as a form submitted them.
///
/// Missing fields and values of the wrong type become field errors in
/// [`ProfileForm::parse`] instead of failing the whole form.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileForm {
    pub display_name: Value,
    pub cohort_label: Value,
    pub cohort_year: Value,
    pub group_number: Value,
}

fn form_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    }
}

fn form_number(field: ProfileField, value: &Value, errors: &mut Vec<FieldError>) -> Option<i64> {
    let parsed = match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.trim().parse::<i64>().ok()),
        Value::Number(number) => Some(number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| {
                    #[allow(clippy::cast_possible_truncation)]
                    let whole = f as i64;
                    whole
                })
        })),
        _ => Some(None),
    };
    match parsed {
        Some(Some(number)) => Some(number),
        Some(None) => {
            errors.push(FieldError {
                field,
                problem: FieldProblem::NotANumber,
            });
            None
        }
        None => {
            errors.push(FieldError {
                field,
                problem: FieldProblem::Blank,
            });
            None
        }
    }
}

impl ProfileForm {
    /// Type-check and validate every field, reporting each bad one once.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] with one [`FieldError`] per bad
    /// field, in field order.
    pub fn parse(&self, cfg: &CourseConfig) -> Result<Profile, SessionError> {
        let mut errors = Vec::new();
        let cohort_year = form_number(ProfileField::CohortYear, &self.cohort_year, &mut errors);
        let group_number = form_number(ProfileField::GroupNumber, &self.group_number, &mut errors);
        let profile = Profile {
            display_name: form_text(&self.display_name),
            cohort_label: form_text(&self.cohort_label),
            cohort_year: cohort_year.map_or(cfg.cohort_year_min, |year| {
                i32::try_from(year).unwrap_or(if year < 0 { i32::MIN } else { i32::MAX })
            }),
            group_number: group_number.unwrap_or_else(|| i64::from(cfg.group_min)),
        };
        if let Err(SessionError::Validation(found)) = profile.validate(cfg) {
            errors.extend(found);
        }
        if errors.is_empty() {
            return Ok(profile);
        }
        errors.sort_by_key(|err| err.field);
        Err(SessionError::Validation(errors))
    }
}

/// The active play-through. Exactly one exists per client at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub display_name: String,
    pub cohort_label: String,
    pub cohort_year: i32,
    pub group_number: u32,
    pub started_at: Millis,
}

impl Session {
    /// Build a session for an already validated profile.
    ///
    /// Ids lead with the start timestamp, which is forced past the previous
    /// session's so ids on one client sort in creation order.
    fn mint(profile: &Profile, now: Millis, previous: Option<&Self>) -> Self {
        let started_at = previous.map_or(now, |prev| now.max(prev.started_at.saturating_add(1)));
        let group_number = u32::try_from(profile.group_number).unwrap_or_default();
        let mut hasher = XxHash64::with_seed(started_at.unsigned_abs());
        hasher.write(profile.display_name.trim().as_bytes());
        hasher.write(profile.cohort_label.trim().as_bytes());
        hasher.write_u32(group_number);
        let tag = hasher.finish() & 0xFFFF_FFFF;
        Self {
            session_id: format!("{started_at:013}-{tag:08x}"),
            display_name: profile.display_name.trim().to_string(),
            cohort_label: profile.cohort_label.trim().to_string(),
            cohort_year: profile.cohort_year,
            group_number,
            started_at,
        }
    }
}

/// Creates, persists and tears down the client's [`Session`].
#[derive(Debug, Clone)]
pub struct SessionManager<S, C> {
    store: S,
    clock: C,
    warnings: WarningSink,
}

impl<S: KeyValueStore, C: Clock> SessionManager<S, C> {
    pub const fn new(store: S, clock: C, warnings: WarningSink) -> Self {
        Self {
            store,
            clock,
            warnings,
        }
    }

    /// Validate `profile`, wipe this client's previous play-through and
    /// persist a fresh session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] when any field is invalid; nothing
    /// is cleared in that case.
    pub fn start(&self, profile: &Profile, cfg: &CourseConfig) -> Result<Session, SessionError> {
        profile.validate(cfg)?;
        let previous = self.current();
        self.clear_local();
        let session = Session::mint(profile, self.clock.now_ms(), previous.as_ref());
        self.warnings.check(
            "persist session",
            write_json(&self.store, KEY_SESSION, &session),
        );
        log::info!(
            "session {} started for group {} ({})",
            session.session_id,
            session.group_number,
            session.display_name
        );
        Ok(session)
    }

    /// The persisted session, if any. Unreadable data counts as none.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        match read_json(&self.store, KEY_SESSION) {
            Ok(session) => session,
            Err(err) => {
                log::warn!("{err}; treating client as having no session");
                None
            }
        }
    }

    /// Drop the session and every session-scoped record on this client.
    /// Class-wide records are left alone.
    pub fn end(&self) {
        if let Some(session) = self.current() {
            log::info!("session {} ended", session.session_id);
        }
        self.clear_local();
    }

    fn clear_local(&self) {
        self.warnings
            .check("clear session", self.store.remove(KEY_SESSION));
        self.warnings
            .check("clear progress", self.store.remove(KEY_PROGRESS));
    }
}
