//! JavaScript-facing facade over [`EscapeEngine`].
//!
//! Values cross the boundary as plain JSON-shaped objects (camelCase keys).
//! Errors are thrown as `{ kind, message, fields? }` objects so the UI can
//! show one message per invalid profile field.

use escapade_core::{
    AdminConsole, AdminError, ContentSource, CourseConfig, EscapeEngine, FieldError, ProfileForm,
    ProgressError, SessionError, StageId, StoredContent, SyncSubscription,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::clock::JsClock;
use crate::dom;
use crate::schedule::{BrowserInterval, IntervalScheduler};
use crate::storage::LocalStorageStore;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorPayload<'a> {
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "no_fields")]
    fields: &'a [FieldError],
}

fn no_fields(fields: &&[FieldError]) -> bool {
    fields.is_empty()
}

fn throw(kind: &'static str, message: impl ToString, fields: &[FieldError]) -> JsValue {
    let payload = ErrorPayload {
        kind,
        message: message.to_string(),
        fields,
    };
    serde_wasm_bindgen::to_value(&payload)
        .unwrap_or_else(|_| JsValue::from_str(&payload.message))
}

fn session_error(err: &SessionError) -> JsValue {
    throw("validation", err, err.field_errors())
}

fn progress_error(err: &ProgressError) -> JsValue {
    let kind = match err {
        ProgressError::NoSession => "noSession",
        ProgressError::SessionChanged { .. } => "sessionChanged",
        ProgressError::StageLocked(_) => "stageLocked",
        ProgressError::UnknownQuestion { .. } => "unknownQuestion",
        ProgressError::Incomplete { .. } => "incomplete",
        ProgressError::Unsolved { .. } => "unsolved",
    };
    throw(kind, err, &[])
}

fn admin_error(err: &AdminError) -> JsValue {
    let kind = match err {
        AdminError::Denied => "denied",
        AdminError::Store(_) => "storage",
    };
    throw(kind, err, &[])
}

fn parse_stage(stage: &str) -> Result<StageId, JsValue> {
    stage
        .parse()
        .map_err(|err| throw("unknownStage", err, &[]))
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|err| throw("serialization", err, &[]))
}

type Engine = EscapeEngine<LocalStorageStore, JsClock>;

/// One browser tab's handle on the escape room.
#[wasm_bindgen]
pub struct EscapeClient {
    engine: Engine,
    subscription: Option<SyncSubscription<BrowserInterval>>,
}

#[wasm_bindgen]
impl EscapeClient {
    /// Connect to this origin's `localStorage`, reading course config and
    /// puzzle content from it.
    ///
    /// # Errors
    /// Throws if the stored and bundled content are both unusable, or the
    /// course config is invalid.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<Self, JsValue> {
        let store = LocalStorageStore::new();
        let config = CourseConfig::load(&store);
        let content = StoredContent::new(store.clone())
            .load_content()
            .map_err(|err| throw("content", err, &[]))?;
        let engine = EscapeEngine::new(store, JsClock, config, content)
            .map_err(|err| throw("config", err, &[]))?;
        Ok(Self {
            engine,
            subscription: None,
        })
    }

    /// Missing or non-numeric fields are reported per field, alongside
    /// range and blank checks.
    ///
    /// # Errors
    /// Throws a `validation` error listing every invalid field, or
    /// `invalidProfile` when the argument is not an object at all.
    #[wasm_bindgen(js_name = startSession)]
    pub fn start_session(&mut self, profile: JsValue) -> Result<JsValue, JsValue> {
        let form: ProfileForm = serde_wasm_bindgen::from_value(profile)
            .map_err(|err| throw("invalidProfile", err, &[]))?;
        let session = self
            .engine
            .start_session_from_form(&form)
            .map_err(|err| session_error(&err))?;
        to_js(&session)
    }

    #[wasm_bindgen(js_name = endSession)]
    pub fn end_session(&mut self) {
        self.engine.end_session();
    }

    /// The active session, or `null`.
    ///
    /// # Errors
    /// Throws if the session cannot be converted.
    #[wasm_bindgen(js_name = currentSession)]
    pub fn current_session(&self) -> Result<JsValue, JsValue> {
        self.engine
            .current_session()
            .map_or(Ok(JsValue::NULL), to_js)
    }

    /// # Errors
    /// Throws for an unknown or locked stage, or without a session.
    #[wasm_bindgen(js_name = enterStage)]
    pub fn enter_stage(&mut self, stage: &str) -> Result<bool, JsValue> {
        let stage = parse_stage(stage)?;
        self.engine
            .enter_stage(stage)
            .map_err(|err| progress_error(&err))
    }

    /// The questions this client's group sees for `stage`.
    ///
    /// # Errors
    /// Throws for an unknown stage.
    pub fn questions(&self, stage: &str) -> Result<JsValue, JsValue> {
        let stage = parse_stage(stage)?;
        to_js(self.engine.questions_for(stage))
    }

    /// # Errors
    /// Throws for an unknown stage or question, or a locked stage.
    pub fn evaluate(
        &mut self,
        stage: &str,
        question_id: &str,
        answer: &str,
    ) -> Result<JsValue, JsValue> {
        let stage = parse_stage(stage)?;
        let evaluation = self
            .engine
            .evaluate(stage, question_id, answer)
            .map_err(|err| progress_error(&err))?;
        to_js(&evaluation)
    }

    /// # Errors
    /// Throws `incomplete` / `unsolved` when the stage cannot close yet.
    #[wasm_bindgen(js_name = attemptFinalizeStage)]
    pub fn attempt_finalize_stage(&mut self, stage: &str) -> Result<JsValue, JsValue> {
        let stage = parse_stage(stage)?;
        let transition = self
            .engine
            .attempt_finalize_stage(stage)
            .map_err(|err| progress_error(&err))?;
        to_js(&transition)
    }

    /// # Errors
    /// Throws if the view cannot be converted.
    #[wasm_bindgen(js_name = currentStageView)]
    pub fn current_stage_view(&self) -> Result<JsValue, JsValue> {
        to_js(&self.engine.current_stage_view())
    }

    /// # Errors
    /// Throws for an unknown stage.
    #[wasm_bindgen(js_name = attemptsFor)]
    pub fn attempts_for(&self, stage: &str, question_id: &str) -> Result<JsValue, JsValue> {
        let stage = parse_stage(stage)?;
        to_js(self.engine.attempts_for(stage, question_id))
    }

    /// # Errors
    /// Throws if the pool cannot be converted.
    #[wasm_bindgen(js_name = currentPool)]
    pub fn current_pool(&self) -> Result<JsValue, JsValue> {
        to_js(&self.engine.current_pool())
    }

    /// # Errors
    /// Throws if the outcome cannot be converted.
    #[wasm_bindgen(js_name = submitPuzzleGuess)]
    pub fn submit_puzzle_guess(&self, guess: &str) -> Result<JsValue, JsValue> {
        to_js(&self.engine.submit_puzzle_guess(guess))
    }

    #[wasm_bindgen(js_name = isPuzzleSolved)]
    pub fn is_puzzle_solved(&self) -> bool {
        self.engine.is_puzzle_solved()
    }

    /// Poll the shared pool and solved flag, calling `on_change(view)` after
    /// any tick that changed what this tab knows. Replaces (and cancels) any
    /// earlier subscription.
    pub fn subscribe(&mut self, on_change: js_sys::Function) {
        self.unsubscribe();
        let subscription = self
            .engine
            .synchronizer()
            .start_with_listener(&IntervalScheduler, move |view| {
                let Ok(value) = serde_wasm_bindgen::to_value(view) else {
                    return;
                };
                if let Err(err) = on_change.call1(&JsValue::NULL, &value) {
                    dom::console_warn(&format!(
                        "sync listener threw: {}",
                        dom::js_error_message(&err)
                    ));
                }
            });
        self.subscription = Some(subscription);
    }

    /// Stop polling. No callback fires after this returns.
    pub fn unsubscribe(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }

    /// Latest polled view, or `null` when not subscribed.
    ///
    /// # Errors
    /// Throws if the view cannot be converted.
    #[wasm_bindgen(js_name = syncView)]
    pub fn sync_view(&self) -> Result<JsValue, JsValue> {
        self.subscription
            .as_ref()
            .map_or(Ok(JsValue::NULL), |sub| to_js(&sub.view()))
    }

    /// Messages for persistence failures since the last call.
    #[wasm_bindgen(js_name = drainWarnings)]
    pub fn drain_warnings(&self) -> Vec<String> {
        self.engine
            .drain_warnings()
            .into_iter()
            .map(|warning| format!("{}: {}", warning.operation, warning.error))
            .collect()
    }

    /// # Errors
    /// Throws `denied` for a wrong secret.
    #[wasm_bindgen(js_name = adminLedgerPage)]
    pub fn admin_ledger_page(
        &self,
        secret: &str,
        offset: usize,
        limit: usize,
    ) -> Result<JsValue, JsValue> {
        to_js(&self.admin(secret)?.ledger_page(offset, limit))
    }

    /// # Errors
    /// Throws `denied` for a wrong secret or `storage` if the delete fails.
    #[wasm_bindgen(js_name = adminClearLedger)]
    pub fn admin_clear_ledger(&self, secret: &str) -> Result<(), JsValue> {
        self.admin(secret)?
            .clear_ledger()
            .map_err(|err| admin_error(&err))
    }

    /// # Errors
    /// Throws `denied` for a wrong secret or `storage` if the delete fails.
    #[wasm_bindgen(js_name = adminClearCompletions)]
    pub fn admin_clear_completions(&self, secret: &str) -> Result<(), JsValue> {
        self.admin(secret)?
            .clear_completions()
            .map_err(|err| admin_error(&err))
    }

    /// # Errors
    /// Throws `denied` for a wrong secret or `storage` if the delete fails.
    #[wasm_bindgen(js_name = adminClearPuzzle)]
    pub fn admin_clear_puzzle(&self, secret: &str) -> Result<(), JsValue> {
        self.admin(secret)?
            .clear_puzzle()
            .map_err(|err| admin_error(&err))
    }
}

impl EscapeClient {
    fn admin(&self, secret: &str) -> Result<AdminConsole<LocalStorageStore>, JsValue> {
        self.engine.admin(secret).map_err(|err| admin_error(&err))
    }
}

impl Drop for EscapeClient {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
