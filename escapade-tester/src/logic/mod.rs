pub mod learner;
pub mod reports;
pub mod tester;

pub use learner::{LearnerProfile, LearnerRun, SimLearner};
pub use tester::{LogicTester, ScenarioResult};
