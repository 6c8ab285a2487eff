use colored::*;
use std::time::Duration;

#[derive(Debug)]
pub struct TestResult {
    pub scenario: String,
    pub passed: bool,
    pub message: Option<String>,
    pub duration: Duration,
}

impl TestResult {
    fn status(&self) -> ColoredString {
        if self.passed {
            "ok".green().bold()
        } else {
            "FAILED".red().bold()
        }
    }
}

pub fn print_frame(client_label: &str, frame: &str) {
    println!(
        "\n[{}] frame received",
        client_label.bright_blue().bold()
    );
    println!("   {}", frame.trim_end().dimmed());
}

pub fn print_test_summary(results: &[TestResult]) {
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;
    let total_time: Duration = results.iter().map(|r| r.duration).sum();

    println!(
        "\n{} {} scenario(s), {} passed, {} failed, {:.1?} total",
        "SUMMARY".bright_white().bold(),
        results.len(),
        passed.to_string().green(),
        failed.to_string().red(),
        total_time
    );

    for result in results {
        let detail = match &result.message {
            Some(msg) => format!(" {} {}", "·".dimmed(), msg.dimmed()),
            None => String::new(),
        };
        println!(
            "  {} ... {} [{}ms]{}",
            result.scenario,
            result.status(),
            result.duration.as_millis(),
            detail
        );
    }
}
