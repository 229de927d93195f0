use crate::error::CliError;
use engine_core::{monitor::health::HealthReport, state::models::RunRecord};
use model::execution::run::RunReport;
use serde::Serialize;

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_run_report(report: &RunReport) {
    let stats = &report.stats;
    println!("Run '{}' of job '{}':", report.run_id, report.job_name);
    println!("-----------------------------");
    println!("{:<16} {}", "Status", report.status);
    println!("{:<16} {}", "Rows read", stats.rows_read);
    println!("{:<16} {}", "Written", stats.documents_written);
    println!(
        "{:<16} {} ({} process, {} write)",
        "Skipped",
        stats.skipped(),
        stats.process_skips,
        stats.write_skips
    );
    println!("{:<16} {}", "Retries", stats.retries);
    println!(
        "{:<16} {} committed, {} aborted",
        "Chunks", stats.chunks_committed, stats.chunks_aborted
    );
    println!("{:<16} {} ms", "Duration", report.duration_ms());
    println!("{:<16} {:.1} rows/s", "Throughput", report.throughput());
    if let Some(error) = &report.error {
        println!("{:<16} {}", "Error", error);
    }
}

pub fn print_jobs(names: &[String]) {
    if names.is_empty() {
        println!("No jobs in the catalog");
        return;
    }
    for name in names {
        println!("{name}");
    }
}

pub fn print_history(job: &str, runs: &[RunRecord], as_json: bool) -> Result<(), CliError> {
    if as_json {
        return print_json(runs);
    }

    println!("History for job '{job}':");
    println!(
        "{:<38} {:<10} {:<25} {:>10} {:>8}",
        "Run", "Status", "Started", "Written", "Skipped"
    );
    for run in runs {
        println!(
            "{:<38} {:<10} {:<25} {:>10} {:>8}",
            run.run_id,
            run.status,
            run.started_at.to_rfc3339(),
            run.stats.documents_written,
            run.stats.skipped()
        );
    }
    Ok(())
}

pub fn print_health(report: &HealthReport, as_json: bool) -> Result<(), CliError> {
    if as_json {
        return print_json(report);
    }

    println!("{:<16} {}", "Health", report.level);
    for probe in &report.probes {
        let state = match &probe.error {
            None if probe.reachable => "reachable".to_string(),
            Some(err) => format!("unreachable: {err}"),
            None => "unreachable".to_string(),
        };
        println!("{:<16} {}", probe.name, state);
    }
    println!("{:<16} {}", "Active runs", report.active_runs);
    let success = report
        .success_rate_pct
        .map(|pct| format!("{pct:.1}%"))
        .unwrap_or_else(|| "n/a".to_string());
    println!("{:<16} {}", "Success rate", success);
    for alert in &report.active_alerts {
        println!("{:<16} {}", "Alert", alert);
    }
    Ok(())
}
