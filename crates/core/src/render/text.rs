//! Text-based rendering for reports

use super::sanitize::sanitize_terminal;
use crate::ambiguity::Ambiguity;
use crate::models::{Confidence, ProcessRecord};
use crate::report::Report;
use crate::socket::{format_endpoint, Connection};
use time::format_description::well_known::Rfc3339;

/// Longest command line shown before truncation
const MAX_CMDLINE: usize = 120;

fn label(record: &ProcessRecord) -> String {
    format!("{} (pid {})", sanitize_terminal(record.name()), record.pid)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// Render a human-readable narrative report
pub fn render_human(report: &Report) -> String {
    let mut out = String::new();
    let proc = report.process();

    out.push_str(&format!("─── Query: {} ───\n\n", sanitize_terminal(&report.target.to_string())));

    out.push_str(&format!("Process     : {}\n", label(proc)));
    out.push_str(&format!(
        "Command     : {}\n",
        sanitize_terminal(&truncate(proc.display_cmdline(), MAX_CMDLINE))
    ));
    if let Some(path) = &proc.facts.exe {
        out.push_str(&format!("Executable  : {}\n", sanitize_terminal(path)));
    }
    match (&proc.facts.user, proc.facts.uid) {
        (Some(user), _) => out.push_str(&format!("User        : {}\n", sanitize_terminal(user))),
        (None, Some(uid)) => out.push_str(&format!("User        : uid {}\n", uid)),
        _ => {}
    }
    if let Some(start) = &proc.facts.started_at {
        if let Ok(formatted) = start.format(&Rfc3339) {
            out.push_str(&format!("Started     : {}\n", formatted));
        }
    }
    if let Some(cwd) = &proc.facts.working_dir {
        out.push_str(&format!("Working Dir : {}\n", sanitize_terminal(cwd)));
    }
    out.push_str(&format!("State       : {}\n", proc.state));

    out.push_str("\nWhy It Exists:\n  ");
    out.push_str(&render_short(report));
    out.push('\n');

    let marker = match report.source.level() {
        Confidence::High => "●",
        Confidence::Medium => "◐",
        Confidence::Low => "○",
    };
    out.push_str(&format!("\nSource      : {} {}", marker, report.source.kind));
    if !report.source.name.is_empty() {
        out.push_str(&format!(" ({})", sanitize_terminal(&report.source.name)));
    }
    out.push_str(&format!(
        " [{} confidence, {:.1}]\n",
        report.source.level(),
        report.source.confidence
    ));
    out.push_str(&format!("  {}\n", sanitize_terminal(&report.source.description())));
    for ev in &report.source.evidence {
        out.push_str(&format!(
            "  ↳ {} (pid {}) matched {} \"{}\"\n",
            sanitize_terminal(&ev.command),
            ev.pid,
            ev.signal,
            sanitize_terminal(&ev.matched)
        ));
    }

    if !report.sockets.is_empty() {
        let endpoints: Vec<String> = report.sockets.iter().map(|s| s.endpoint()).collect();
        out.push_str(&format!("\nListening   : {}\n", endpoints.join(", ")));
    }
    if report.restart_count > 0 {
        out.push_str(&format!("Restarts    : {}\n", report.restart_count));
    }

    if !report.connections.is_empty() {
        out.push('\n');
        out.push_str(&render_connections(&report.connections));
    }

    if !report.warnings.is_empty() {
        out.push_str("\nWarnings:\n");
        for warning in &report.warnings {
            out.push_str(&format!("  ⚠ {}\n", warning));
        }
    }

    if !report.errors.is_empty() {
        out.push('\n');
        for error in &report.errors {
            out.push_str(&format!("✗ Error: {}\n", sanitize_terminal(error)));
        }
    }

    out
}

/// Render the ancestry as an indented tree, root first
pub fn render_tree(report: &Report) -> String {
    let mut out = String::new();
    let last = report.ancestry.len() - 1;

    for (i, record) in report.ancestry.iter().enumerate() {
        let indent = "  ".repeat(i);
        let connector = if i == 0 { "" } else { "└─ " };
        let marker = if i == last { "▶ " } else { "" };
        out.push_str(&format!("{}{}{}{}\n", indent, connector, marker, label(record)));
    }

    if let Some(ppid) = report.ancestry.broken_at() {
        out.push_str(&format!("  (ancestry stops: parent {} has exited)\n", ppid));
    }

    out.push_str(&format!(
        "\n  Source: {} ({} confidence)\n",
        report.source.kind,
        report.source.level()
    ));
    for warning in &report.warnings {
        out.push_str(&format!("  ⚠ {}\n", warning));
    }

    out
}

/// Render the ancestry on one line: `init (pid 1) → sshd (pid 50) → ...`
pub fn render_short(report: &Report) -> String {
    report
        .ancestry
        .iter()
        .map(label)
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Render the numbered disambiguation listing and the re-run hint
pub fn render_ambiguity(ambiguity: &Ambiguity) -> String {
    let mut out = format!(
        "Multiple matching processes found for {}:\n\n",
        sanitize_terminal(&ambiguity.target.to_string())
    );
    for row in ambiguity.listing() {
        out.push_str(&format!(
            "[{}] PID {:<8} {:<16} {}\n",
            row.index,
            row.pid,
            row.label,
            sanitize_terminal(&truncate(&row.description, MAX_CMDLINE))
        ));
    }
    out.push_str("\nRe-run with an explicit PID:\n  witr --pid <pid>\n");
    out
}

/// Render a connection table
pub fn render_connections(connections: &[Connection]) -> String {
    if connections.is_empty() {
        return "No active connections\n".to_string();
    }
    let mut out = format!("Connections ({}):\n", connections.len());
    for conn in connections {
        out.push_str(&format!(
            "  {:<24} → {:<24} {}\n",
            format_endpoint(&conn.local_addr, conn.local_port),
            format_endpoint(&conn.remote_addr, conn.remote_port),
            conn.state
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ambiguity::{Candidate, CandidateOrigin};
    use crate::models::{AncestryChain, Source, SourceKind, Target, Warning};
    use crate::socket::TcpState;

    fn sample_report() -> Report {
        let chain = AncestryChain::from_root_first(vec![
            ProcessRecord::new(1, 0, "init", "/sbin/init"),
            ProcessRecord::new(50, 1, "sshd", "/usr/sbin/sshd -D"),
            ProcessRecord::new(120, 50, "bash", "-bash"),
            ProcessRecord::new(121, 120, "python", "python app.py"),
        ])
        .unwrap();
        let mut report = Report::new(Target::pid("121"), chain);
        report.source = Source::new(SourceKind::Shell, "bash", 0.5);
        report
    }

    #[test]
    fn test_render_short() {
        assert_eq!(
            render_short(&sample_report()),
            "init (pid 1) → sshd (pid 50) → bash (pid 120) → python (pid 121)"
        );
    }

    #[test]
    fn test_render_human_contains_process() {
        let mut report = sample_report();
        report.add_warning(Warning::RunningAsRoot);
        let output = render_human(&report);
        assert!(output.contains("python (pid 121)"));
        assert!(output.contains("python app.py"));
        assert!(output.contains("Interactive Shell (bash)"));
        assert!(output.contains("⚠ Process is running as root"));
    }

    #[test]
    fn test_render_tree_contains_hierarchy() {
        let output = render_tree(&sample_report());
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "init (pid 1)");
        assert_eq!(lines[1], "  └─ sshd (pid 50)");
        assert_eq!(lines[3], "      └─ ▶ python (pid 121)");
    }

    #[test]
    fn test_render_escapes_hostile_names() {
        let chain = AncestryChain::from_root_first(vec![ProcessRecord::new(
            9,
            0,
            "evil\x1b]0;pwned\x07",
            "evil",
        )])
        .unwrap();
        let report = Report::new(Target::pid("9"), chain);
        let output = render_short(&report);
        assert!(!output.contains('\x1b'));
        assert!(output.contains("\\x1b"));
    }

    #[test]
    fn test_render_ambiguity_listing() {
        let amb = Ambiguity {
            target: Target::name("node"),
            candidates: vec![
                Candidate::new(40, CandidateOrigin::Service, "node /srv/api.js"),
                Candidate::new(41, CandidateOrigin::Manual, "node /srv/worker.js"),
            ],
        };
        let output = render_ambiguity(&amb);
        assert!(output.starts_with("Multiple matching processes found for \"node\""));
        assert!(output.contains("[1] PID 40"));
        assert!(output.contains("service"));
        assert!(output.contains("[2] PID 41"));
        assert!(output.contains("witr --pid <pid>"));
    }

    #[test]
    fn test_render_connections() {
        let conns = vec![Connection {
            pid: 3,
            local_addr: "::1".parse().unwrap(),
            local_port: 5432,
            remote_addr: "::1".parse().unwrap(),
            remote_port: 40000,
            state: TcpState::Established,
        }];
        let output = render_connections(&conns);
        assert!(output.contains("[::1]:5432"));
        assert!(output.contains("ESTABLISHED"));
        assert_eq!(render_connections(&[]), "No active connections\n");
    }
}
