use lexmask_stats::{LiveSnapshot, SanityCheck, Summary, SummaryCell};
use std::fmt::Write;

fn opt(value: Option<f64>, scale: f64, precision: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.*}", precision, v * scale))
}

fn cell_line(label: &str, cell: &SummaryCell) -> String {
    format!(
        "{label:<24} n={:<4} acc={:<6} rt={:<8} median={}",
        cell.n,
        opt(cell.accuracy, 1.0, 3),
        opt(cell.mean_rt, 1e3, 1),
        opt(cell.median_rt, 1e3, 1),
    )
}

pub fn render_summary(summary: &Summary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} trials, {} excluded by the clean window",
        summary.total, summary.excluded
    );
    for (&(lex, dur), cell) in &summary.cells {
        let label = format!("{lex} @ {:.0} ms", dur.as_secs_f64() * 1e3);
        let _ = writeln!(out, "{}", cell_line(&label, cell));
    }
    for (lex, cell) in &summary.by_lexicality {
        let _ = writeln!(out, "{}", cell_line(&format!("{lex} (all durations)"), cell));
    }
    for (dur, cell) in &summary.by_duration {
        let label = format!("{:.0} ms (both types)", dur.as_secs_f64() * 1e3);
        let _ = writeln!(out, "{}", cell_line(&label, cell));
    }
    out
}

pub fn render_sanity(check: &SanityCheck) -> String {
    let flags = check.flags();
    format!(
        "subject {}: {} trials, accuracy {}, missing {} ({}){}",
        check.subject,
        check.trials,
        opt(check.accuracy, 1.0, 3),
        check.missing,
        opt(check.missing_rate, 1.0, 3),
        if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        }
    )
}

pub fn render_snapshot(snapshot: &LiveSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== update {} ==", snapshot.generation);
    for session in &snapshot.sessions {
        let _ = writeln!(
            out,
            "session {} subject {}: {}/{} {:?}",
            session.session_id, session.subject, session.completed_trials, session.total_trials, session.status
        );
    }
    for view in &snapshot.subjects {
        let _ = writeln!(out, "{}", render_sanity(&view.sanity));
    }
    out.push_str(&render_summary(&snapshot.overall));
    out
}
