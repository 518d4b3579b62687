use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::time::Duration;

use super::ScenarioResult;

/// Percentage of results that passed; zero when nothing ran.
#[must_use]
pub fn success_rate(results: &[ScenarioResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let passed = results.iter().filter(|r| r.passed).count();
    #[allow(clippy::cast_precision_loss)]
    let rate = (passed as f64 / results.len() as f64) * 100.0;
    rate
}

pub fn generate_console_report<W: Write + ?Sized>(
    out: &mut W,
    results: &[ScenarioResult],
    total_duration: Duration,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Classroom Simulation Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "===============================".cyan())?;

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();
    let failed_tests = total_tests - passed_tests;

    writeln!(out, "Total scenarios: {total_tests}")?;
    writeln!(out, "Passed: {}", passed_tests.to_string().green())?;
    writeln!(out, "Failed: {}", failed_tests.to_string().red())?;
    writeln!(out, "Success rate: {:.1}%", success_rate(results))?;
    writeln!(out, "Total time: {total_duration:?}")?;
    writeln!(out)?;

    for result in results {
        let status = if result.passed {
            "✅ PASS".green()
        } else {
            "❌ FAIL".red()
        };

        writeln!(
            out,
            "{status} {} (seed {})",
            result.scenario_name.bold(),
            result.seed
        )?;
        writeln!(
            out,
            "   Iterations: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(out, "   Average time: {:?}", result.average_duration)?;
        if let Some(note) = result.notes.first() {
            writeln!(out, "   Note: {}", note.dimmed())?;
        }

        if !result.failures.is_empty() {
            writeln!(out, "   Failures:")?;
            for failure in &result.failures {
                writeln!(out, "     • {}", failure.red())?;
            }
        }
        writeln!(out)?;
    }

    let fastest = results.iter().min_by_key(|r| r.average_duration);
    let slowest = results.iter().max_by_key(|r| r.average_duration);
    if let (Some(fastest), Some(slowest)) = (fastest, slowest) {
        writeln!(out, "{}", "⚡ Performance Summary".bright_yellow().bold())?;
        writeln!(out, "{}", "=====================".yellow())?;
        writeln!(
            out,
            "Fastest: {} ({:?})",
            fastest.scenario_name.green(),
            fastest.average_duration
        )?;
        writeln!(
            out,
            "Slowest: {} ({:?})",
            slowest.scenario_name.yellow(),
            slowest.average_duration
        )?;
    }
    Ok(())
}

pub fn generate_json_report<W: Write + ?Sized>(out: &mut W, results: &[ScenarioResult]) -> Result<()> {
    let json_output = serde_json::to_string_pretty(results)?;
    writeln!(out, "{json_output}")?;
    Ok(())
}

pub fn generate_markdown_report<W: Write + ?Sized>(
    out: &mut W,
    results: &[ScenarioResult],
) -> Result<()> {
    writeln!(out, "# Escapade Classroom Simulation Results\n")?;
    writeln!(
        out,
        "_Generated {}_\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S %Z")
    )?;

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();

    writeln!(out, "## Summary\n")?;
    writeln!(out, "- **Total scenarios**: {total_tests}")?;
    writeln!(out, "- **Passed**: {passed_tests}")?;
    writeln!(out, "- **Failed**: {}", total_tests - passed_tests)?;
    writeln!(out, "- **Success rate**: {:.1}%\n", success_rate(results))?;

    writeln!(out, "## Detailed Results\n")?;
    for result in results {
        let status = if result.passed { "✅" } else { "❌" };
        writeln!(out, "### {status} {} (seed {})\n", result.scenario_name, result.seed)?;
        writeln!(
            out,
            "- **Iterations**: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(out, "- **Average time**: {:?}", result.average_duration)?;
        if !result.notes.is_empty() {
            writeln!(out, "- **Notes**:")?;
            for note in &result.notes {
                writeln!(out, "  - {note}")?;
            }
        }
        if !result.failures.is_empty() {
            writeln!(out, "- **Failures**:")?;
            for failure in &result.failures {
                writeln!(out, "  - {failure}")?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, passed: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_name: name.to_string(),
            seed: 1337,
            passed,
            iterations_run: 2,
            successful_iterations: usize::from(passed) * 2,
            failures: if passed {
                Vec::new()
            } else {
                vec!["Iteration 1 (seed 1337): boom".to_string()]
            },
            notes: vec!["seed 1337: 3 groups".to_string()],
            average_duration: Duration::from_millis(4),
            performance_data: vec![Duration::from_millis(4)],
            started_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn success_rate_handles_empty_and_mixed() {
        assert!(success_rate(&[]).abs() < f64::EPSILON);
        let rate = success_rate(&[result("a", true), result("b", false)]);
        assert!((rate - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn markdown_lists_failures_and_notes() {
        let mut out = Vec::new();
        generate_markdown_report(&mut out, &[result("classroom", false)]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("### ❌ classroom (seed 1337)"));
        assert!(text.contains("  - Iteration 1 (seed 1337): boom"));
        assert!(text.contains("  - seed 1337: 3 groups"));
    }

    #[test]
    fn json_report_is_an_array() {
        let mut out = Vec::new();
        generate_json_report(&mut out, &[result("a", true), result("b", true)]).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn console_report_mentions_every_scenario() {
        colored::control::set_override(false);
        let mut out = Vec::new();
        generate_console_report(
            &mut out,
            &[result("regroup", true), result("quota", false)],
            Duration::from_millis(10),
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("✅ PASS regroup"));
        assert!(text.contains("❌ FAIL quota"));
        assert!(text.contains("Fastest:"));
    }
}
