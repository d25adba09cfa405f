use crate::scenario::RunSummary;
use crate::scenario::StepOutcome;

pub fn setup(s: &str) {
    println!("{}", console::style(setup_line(s)).bold().yellow());
}

/// The `[SETUP]` tag lives here so call sites can't drift.
fn setup_line(s: &str) -> String {
    format!("[SETUP] {s}")
}

pub fn warn(s: &str) {
    println!(
        "{} {}",
        console::style("⚠").yellow().bold(),
        console::style(s).yellow()
    );
}

pub fn step_line(i: usize, total: usize, name: &str, outcome: &StepOutcome) {
    match outcome {
        StepOutcome::Passed => println!(
            "[{i}/{total}] {}  {name} {}",
            console::style("✔").green().bold(),
            console::style("PASS!").green().bold(),
        ),
        StepOutcome::Degraded => println!(
            "[{i}/{total}] {}  {name} {}",
            console::style("⚠").yellow().bold(),
            console::style("DEGRADED").yellow().bold(),
        ),
        StepOutcome::Failed(err) => println!(
            "[{i}/{total}] {}  {name} {} {err}",
            console::style("✘").red().bold(),
            console::style("FAIL!").red().bold(),
        ),
    }
}

pub fn run_summary(summary: &RunSummary) {
    let failed: Vec<_> = summary.failures().collect();

    println!();
    if failed.is_empty() {
        println!("{}", console::style("All steps passed! 🎉").bold().green());
        return;
    }

    println!("{}", console::style("Summary of failed steps:").bold().red());
    for (idx, report) in failed.iter().enumerate() {
        let StepOutcome::Failed(err) = &report.outcome else {
            continue;
        };
        println!("{}. {}: {err}", idx + 1, report.step.name());
    }
}

#[cfg(test)]
mod test {
    use crate::outputter::setup_line;

    #[test]
    fn setup_lines_carry_the_tag() {
        assert_eq!(setup_line("waiting..."), "[SETUP] waiting...");
    }
}
