//! Colored terminal output

use owo_colors::{OwoColorize, Style};
use std::io::{self, IsTerminal, Write};
use tabled::{
    settings::{object::Columns, style::Style as TableStyle, Alignment, Modify},
    Table, Tabled,
};
use time::OffsetDateTime;
use witr_core::render::sanitize_terminal;
use witr_core::{Ambiguity, Confidence, Connection, Report, SourceKind};

/// Label width for aligned output
const LABEL_WIDTH: usize = 12;

/// Longest command line shown in the report before truncation
const MAX_ARGS: usize = 80;

/// Color configuration for output
pub struct Colors {
    pub enabled: bool,
    pub header: Style,
    pub success: Style,
    pub warning: Style,
    pub error: Style,
    pub info: Style,
    pub dim: Style,
    pub highlight: Style,
}

impl Colors {
    pub fn new(enabled: bool) -> Self {
        if enabled {
            Self {
                enabled: true,
                header: Style::new().bold().cyan(),
                success: Style::new().green(),
                warning: Style::new().yellow(),
                error: Style::new().red().bold(),
                info: Style::new().cyan(),
                dim: Style::new().dimmed(),
                highlight: Style::new().bold().white(),
            }
        } else {
            Self {
                enabled: false,
                header: Style::new(),
                success: Style::new(),
                warning: Style::new(),
                error: Style::new(),
                info: Style::new(),
                dim: Style::new(),
                highlight: Style::new(),
            }
        }
    }
}

/// Check if stdout is a terminal that wants color
pub fn supports_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var("TERM").map(|t| t == "dumb").unwrap_or(false) {
        return false;
    }
    io::stdout().is_terminal()
}

pub fn print_error(colors: &Colors, message: &str) {
    eprintln!("{} {}", "error:".style(colors.error), message);
}

pub fn print_warning(colors: &Colors, message: &str) {
    eprintln!("{} {}", "warning:".style(colors.warning), message);
}

pub fn print_info(colors: &Colors, message: &str) {
    eprintln!("{} {}", "info:".style(colors.info), message);
}

fn print_row(out: &mut impl Write, label: &str, value: &str, label_style: Style, value_style: Style) {
    writeln!(
        out,
        "{:>width$} : {}",
        label.style(label_style),
        value.style(value_style),
        width = LABEL_WIDTH
    )
    .ok();
}

/// Print an aligned label with an already styled value
fn print_row_raw(out: &mut impl Write, label: &str, value: String, label_style: Style) {
    writeln!(
        out,
        "{:>width$} : {}",
        label.style(label_style),
        value,
        width = LABEL_WIDTH
    )
    .ok();
}

fn print_section(out: &mut impl Write, label: &str, label_style: Style) {
    writeln!(out).ok();
    writeln!(out, "{:>width$} :", label.style(label_style), width = LABEL_WIDTH).ok();
}

fn print_sub_item(out: &mut impl Write, value: &str, value_style: Style) {
    writeln!(out, "{:>width$}   {}", "", value.style(value_style), width = LABEL_WIDTH).ok();
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", head)
}

/// Format relative time (e.g., "3 hours ago")
pub fn format_relative_time(dt: &OffsetDateTime, now: OffsetDateTime) -> String {
    let duration = now - *dt;
    let plural = |n: i64| if n == 1 { "" } else { "s" };

    let days = duration.whole_days();
    let hours = duration.whole_hours();
    let minutes = duration.whole_minutes();
    let seconds = duration.whole_seconds().max(0);

    if days > 0 {
        format!("{} day{} ago", days, plural(days))
    } else if hours > 0 {
        format!("{} hour{} ago", hours, plural(hours))
    } else if minutes > 0 {
        format!("{} minute{} ago", minutes, plural(minutes))
    } else {
        format!("{} second{} ago", seconds, plural(seconds))
    }
}

fn format_absolute_time(dt: &OffsetDateTime) -> String {
    dt.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| dt.to_string())
}

fn kind_style(kind: SourceKind, colors: &Colors) -> Style {
    match kind {
        SourceKind::ServiceManager => colors.info,
        SourceKind::Shell => colors.success,
        SourceKind::Cron => colors.warning,
        SourceKind::Supervisor => colors.highlight,
        SourceKind::Container => colors.info,
        SourceKind::Unknown => colors.dim,
    }
}

fn confidence_style(level: Confidence, colors: &Colors) -> Style {
    match level {
        Confidence::High => colors.success,
        Confidence::Medium => colors.warning,
        Confidence::Low => colors.dim,
    }
}

/// Print a colored human-readable report
pub fn print_colored_report(report: &Report, verbose: bool, colors: &Colors) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let proc = report.process();

    print_row(
        &mut out,
        "Target",
        &sanitize_terminal(&report.target.to_string()),
        colors.header,
        colors.dim,
    );
    let process_value = format!(
        "{} (pid {})",
        sanitize_terminal(proc.name()).style(colors.highlight),
        proc.pid.to_string().style(colors.info),
    );
    print_row_raw(&mut out, "Process", process_value, colors.header);

    if let Some(user) = &proc.facts.user {
        print_row(&mut out, "User", &sanitize_terminal(user), colors.header, colors.info);
    } else if let Some(uid) = proc.facts.uid {
        print_row(&mut out, "User", &format!("uid {}", uid), colors.header, colors.info);
    }
    if let Some(exe) = &proc.facts.exe {
        print_row(&mut out, "Command", &sanitize_terminal(exe), colors.header, colors.dim);
    }
    print_row(
        &mut out,
        "Args",
        &sanitize_terminal(&truncate(proc.display_cmdline(), MAX_ARGS)),
        colors.header,
        colors.dim,
    );
    if let Some(start) = &proc.facts.started_at {
        let value = format!(
            "{} ({})",
            format_relative_time(start, OffsetDateTime::now_utc()).style(colors.dim),
            format_absolute_time(start).style(colors.dim)
        );
        print_row_raw(&mut out, "Started", value, colors.header);
    }
    if let Some(cwd) = &proc.facts.working_dir {
        print_row(&mut out, "Working Dir", &sanitize_terminal(cwd), colors.header, colors.dim);
    }

    print_section(&mut out, "Why It Exists", colors.header);
    let chain: Vec<String> = report
        .ancestry
        .iter()
        .map(|record| {
            let style = if record.pid == report.pid { colors.highlight } else { colors.info };
            format!(
                "{} (pid {})",
                sanitize_terminal(record.name()).style(style),
                record.pid.to_string().style(colors.dim)
            )
        })
        .collect();
    print_sub_item(&mut out, &chain.join(" → "), Style::new());

    let mut source = report.source.kind.to_string();
    if !report.source.name.is_empty() {
        source.push_str(&format!(" ({})", sanitize_terminal(&report.source.name)));
    }
    let level = report.source.level();
    let source_value = format!(
        "{} {}",
        source.style(kind_style(report.source.kind, colors)),
        format!("[{} confidence]", level).style(confidence_style(level, colors))
    );
    writeln!(out).ok();
    print_row_raw(&mut out, "Source", source_value, colors.header);

    if verbose && !report.source.evidence.is_empty() {
        print_section(&mut out, "Evidence", colors.header);
        for ev in &report.source.evidence {
            print_sub_item(
                &mut out,
                &format!(
                    "• {} (pid {}) matched {} \"{}\"",
                    sanitize_terminal(&ev.command),
                    ev.pid,
                    ev.signal,
                    sanitize_terminal(&ev.matched)
                ),
                colors.dim,
            );
        }
    }

    if !report.sockets.is_empty() {
        let endpoints: Vec<String> = report.sockets.iter().map(|s| s.endpoint()).collect();
        print_row(&mut out, "Listening", &endpoints.join(", "), colors.header, colors.info);
    }
    if report.restart_count > 0 {
        print_row(
            &mut out,
            "Restarts",
            &report.restart_count.to_string(),
            colors.header,
            colors.warning,
        );
    }

    if !report.connections.is_empty() {
        print_connections(&mut out, &report.connections, colors);
    }

    if !report.warnings.is_empty() {
        print_section(&mut out, "Warnings", colors.warning);
        for warning in &report.warnings {
            print_sub_item(&mut out, &format!("• {}", warning), colors.warning);
        }
    }

    for error in &report.errors {
        writeln!(out).ok();
        print_row(&mut out, "Error", &sanitize_terminal(error), colors.error, colors.error);
    }
}

/// Only the warnings, one per line
pub fn print_warnings_only(report: &Report, colors: &Colors) {
    if report.warnings.is_empty() {
        println!("{}", "No warnings".style(colors.success));
        return;
    }
    for warning in &report.warnings {
        println!("{} {}", "⚠".style(colors.warning), warning);
    }
}

/// Root-first ancestry tree
pub fn print_colored_tree(report: &Report, colors: &Colors) {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (i, record) in report.ancestry.iter().enumerate() {
        let is_target = record.pid == report.pid;
        let connector = if i == 0 { "" } else { "└─ " };
        let marker = if is_target { "▶ " } else { "" };
        writeln!(
            out,
            "{}{}{}{} {}",
            "  ".repeat(i),
            connector.style(colors.dim),
            marker.style(colors.success),
            sanitize_terminal(record.name()).style(if is_target { colors.highlight } else { colors.info }),
            format!("(pid {})", record.pid).style(colors.dim)
        )
        .ok();
    }
    if let Some(ppid) = report.ancestry.broken_at() {
        writeln!(out, "  {}", format!("(ancestry stops: parent {} has exited)", ppid).style(colors.dim)).ok();
    }

    writeln!(out).ok();
    writeln!(
        out,
        "{}: {}",
        "Source".style(colors.header),
        report.source.description().style(kind_style(report.source.kind, colors))
    )
    .ok();
}

#[derive(Tabled)]
struct CandidateRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "PID")]
    pid: u32,
    #[tabled(rename = "Origin")]
    origin: String,
    #[tabled(rename = "Command")]
    command: String,
}

/// Numbered candidate table with the re-run hint
pub fn print_ambiguity_table(ambiguity: &Ambiguity, colors: &Colors) {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(
        out,
        "\n{} Multiple matching processes found for {}:\n",
        "→".style(colors.info),
        sanitize_terminal(&ambiguity.target.to_string())
    )
    .ok();

    let rows: Vec<CandidateRow> = ambiguity
        .listing()
        .into_iter()
        .map(|row| CandidateRow {
            index: row.index,
            pid: row.pid,
            origin: row.label,
            command: sanitize_terminal(&truncate(&row.description, MAX_ARGS)).into_owned(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(TableStyle::rounded())
        .with(Modify::new(Columns::single(0)).with(Alignment::right()))
        .with(Modify::new(Columns::single(1)).with(Alignment::right()))
        .to_string();
    for line in table.lines() {
        writeln!(out, "  {}", line).ok();
    }

    writeln!(
        out,
        "\n{} Re-run with an explicit PID: {}",
        "tip:".style(colors.dim),
        "witr --pid <pid>".style(colors.info)
    )
    .ok();
}

#[derive(Tabled)]
struct ConnectionRow {
    #[tabled(rename = "Local Address")]
    local: String,
    #[tabled(rename = "Remote Address")]
    remote: String,
    #[tabled(rename = "State")]
    state: String,
}

fn print_connections(out: &mut impl Write, connections: &[Connection], colors: &Colors) {
    print_section(out, "Connections", colors.header);
    print_sub_item(out, &format!("({} connections)", connections.len()), colors.dim);

    let rows: Vec<ConnectionRow> = connections
        .iter()
        .map(|conn| ConnectionRow {
            local: witr_core::socket::format_endpoint(&conn.local_addr, conn.local_port),
            remote: witr_core::socket::format_endpoint(&conn.remote_addr, conn.remote_port),
            state: conn.state.to_string(),
        })
        .collect();

    let table = Table::new(&rows).with(TableStyle::rounded()).to_string();
    for line in table.lines() {
        writeln!(out, "  {}", line).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_format_relative_time() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(format_relative_time(&(now - Duration::seconds(1)), now), "1 second ago");
        assert_eq!(format_relative_time(&(now - Duration::minutes(5)), now), "5 minutes ago");
        assert_eq!(format_relative_time(&(now - Duration::hours(1)), now), "1 hour ago");
        assert_eq!(format_relative_time(&(now - Duration::days(256)), now), "256 days ago");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }

    #[test]
    fn test_plain_colors_are_unstyled() {
        let colors = Colors::new(false);
        assert!(!colors.enabled);
        assert_eq!(format!("{}", "x".style(colors.error)), "x");
    }
}
