use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::scenario::{Scenario, ScenarioCtx};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub seed: u64,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    pub notes: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
    #[serde(with = "duration_vec_serde")]
    pub performance_data: Vec<Duration>,
    /// RFC 3339 wall-clock time the first iteration started.
    pub started_at: String,
}

#[derive(Debug, Clone, Copy)]
pub struct LogicTester {
    verbose: bool,
}

impl LogicTester {
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Run `scenario` `iterations` times, deriving one seed per iteration
    /// from `ctx.seed`.
    pub fn run_scenario(
        &self,
        scenario: &dyn Scenario,
        ctx: &ScenarioCtx,
        iterations: usize,
    ) -> ScenarioResult {
        if self.verbose {
            println!(
                "🧪 Testing scenario: {} (store: {:?} seed: {})",
                scenario.name().bright_white(),
                ctx.store,
                ctx.seed
            );
        }
        let started_at = chrono::Local::now().to_rfc3339();
        let mut successes = 0;
        let mut failures = Vec::new();
        let mut notes = Vec::new();
        let mut performance_data = Vec::new();

        for i in 0..iterations {
            let iteration_ctx = ScenarioCtx {
                seed: ctx.seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX)),
                ..ctx.clone()
            };
            let start_time = Instant::now();
            match scenario.run(&iteration_ctx) {
                Ok(outcome) => {
                    successes += 1;
                    let duration = start_time.elapsed();
                    performance_data.push(duration);
                    if self.verbose {
                        println!(
                            "  ✅ Iteration {}/{} passed ({duration:?}) {}",
                            i + 1,
                            iterations,
                            outcome.notes.join("; ")
                        );
                    }
                    notes.extend(
                        outcome
                            .notes
                            .into_iter()
                            .map(|note| format!("seed {}: {note}", iteration_ctx.seed)),
                    );
                }
                Err(err) => {
                    let message = format!(
                        "Iteration {} (seed {}): {err:#}",
                        i + 1,
                        iteration_ctx.seed
                    );
                    if self.verbose {
                        println!(
                            "  ❌ Iteration {}/{} failed: {}",
                            i + 1,
                            iterations,
                            message.clone().red()
                        );
                    }
                    failures.push(message);
                }
            }
        }

        let average_duration = if performance_data.is_empty() {
            Duration::ZERO
        } else {
            performance_data.iter().sum::<Duration>()
                / u32::try_from(performance_data.len()).unwrap_or(1)
        };

        ScenarioResult {
            scenario_name: scenario.name().to_string(),
            seed: ctx.seed,
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            notes,
            average_duration,
            performance_data,
            started_at,
        }
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis: Vec<u128> = durations.iter().map(Duration::as_millis).collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Vec::<u128>::deserialize(deserializer)?;
        Ok(millis
            .into_iter()
            .map(|ms| Duration::from_millis(u64::try_from(ms).unwrap_or(0)))
            .collect())
    }
}
