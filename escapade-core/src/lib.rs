//! Escapade Core
//!
//! Platform-agnostic logic for the Escapade classroom escape room: session
//! management, stage progression, the attempt ledger and the class-wide
//! completion pool that independent clients converge on through a shared
//! key-value store. Platform crates supply the store, clock and scheduler.

pub mod admin;
pub mod aggregation;
pub mod clock;
pub mod config;
pub mod constants;
pub mod content;
pub mod engine;
pub mod ledger;
pub mod persist;
pub mod progress;
pub mod puzzle;
pub mod session;
pub mod stage;
pub mod sync;
pub mod timer;

// Re-export commonly used types
pub use admin::{AdminConsole, AdminError, secret_digest, verify_secret};
pub use aggregation::{
    AggregationStore, CompletionRecord, PoolSnapshot, PublishError, is_valid_symbol,
};
pub use clock::{Clock, ManualClock, Millis, SystemClock};
pub use config::{ConfigError, CourseConfig};
pub use content::{
    BundledContent, ContentError, ContentSource, PuzzleContent, QuestionKind, QuestionSpec,
    StoredContent,
};
pub use engine::{EngineError, EscapeEngine, Evaluation};
pub use ledger::{AttemptLedger, AttemptLog, AttemptRecord, ClasswideEntry, LedgerPage};
pub use persist::{
    FileStore, KeyValueStore, MemoryStore, StorageWarning, StoreError, WarningSink,
};
pub use progress::{
    Progress, ProgressError, ProgressState, StageSummary, StageTransition, StageView,
};
pub use puzzle::{GuessOutcome, PuzzleBoard, PuzzleSolvedFlag, normalize_guess};
pub use session::{
    FieldError, FieldProblem, Profile, ProfileField, ProfileForm, Session, SessionError,
    SessionManager,
};
pub use stage::{StageId, StageUnlockSet, UnknownStage};
pub use sync::{
    IntervalHandle, ManualInterval, ManualScheduler, Scheduler, SyncConfig, SyncSubscription,
    SyncView, Synchronizer,
};
pub use timer::{RoomTimer, RoomTiming};
