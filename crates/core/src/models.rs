//! Core domain models for witr
//!
//! These types are OS-agnostic. Every value here is scoped to a single query;
//! nothing is cached or shared between invocations.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use time::OffsetDateTime;

/// What kind of identifier the user supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Query by process ID
    Pid,
    /// Query by listening TCP port
    Port,
    /// Query by process or service name
    Name,
}

/// The input target for the query
///
/// The value is kept exactly as typed; it is validated when resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub kind: TargetKind,
    pub value: String,
}

impl Target {
    pub fn new(kind: TargetKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn pid(value: impl Into<String>) -> Self {
        Self::new(TargetKind::Pid, value)
    }

    pub fn port(value: impl Into<String>) -> Self {
        Self::new(TargetKind::Port, value)
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self::new(TargetKind::Name, value)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TargetKind::Pid => write!(f, "PID {}", self.value),
            TargetKind::Port => write!(f, "port {}", self.value),
            TargetKind::Name => write!(f, "\"{}\"", self.value),
        }
    }
}

/// Scheduler state of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Running,
    Sleeping,
    DiskSleep,
    Stopped,
    Zombie,
    Idle,
    Dead,
    #[default]
    Unknown,
}

impl ProcessState {
    /// Parse the one-letter state code used by `/proc/<pid>/stat` and `ps -o stat`
    ///
    /// Only the first character is significant; `ps` appends modifiers such as `s` or `+`.
    pub fn from_code(code: &str) -> Self {
        match code.chars().next() {
            Some('R') => ProcessState::Running,
            Some('S') => ProcessState::Sleeping,
            Some('D') | Some('U') => ProcessState::DiskSleep,
            Some('T') | Some('t') => ProcessState::Stopped,
            Some('Z') => ProcessState::Zombie,
            Some('I') => ProcessState::Idle,
            Some('X') | Some('x') => ProcessState::Dead,
            _ => ProcessState::Unknown,
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Running => write!(f, "running"),
            ProcessState::Sleeping => write!(f, "sleeping"),
            ProcessState::DiskSleep => write!(f, "disk sleep"),
            ProcessState::Stopped => write!(f, "stopped"),
            ProcessState::Zombie => write!(f, "zombie"),
            ProcessState::Idle => write!(f, "idle"),
            ProcessState::Dead => write!(f, "dead"),
            ProcessState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Best-effort facts about a process beyond its identity
///
/// Sources fill in whatever the platform exposes cheaply. Only the classifier
/// looks at `container` and `service_unit`; the rest is for presentation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessFacts {
    /// Full path to the executable image
    pub exe: Option<String>,
    /// Owning user id
    pub uid: Option<u32>,
    /// Owning user name, when it could be looked up
    pub user: Option<String>,
    /// Process start time
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// Current working directory
    pub working_dir: Option<String>,
    /// Container runtime signature (e.g. "docker", "kubernetes")
    pub container: Option<String>,
    /// Service unit that owns the process (e.g. "nginx.service")
    pub service_unit: Option<String>,
}

/// A single process as read from the process table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// Process ID
    pub pid: u32,
    /// Parent process ID (0 for the tree root)
    pub ppid: u32,
    /// Short command name (e.g. "bash")
    pub command: String,
    /// Full command line, arguments joined by spaces
    pub cmdline: String,
    /// Scheduler state
    pub state: ProcessState,
    /// Opaque OS facts
    #[serde(default)]
    pub facts: ProcessFacts,
}

impl ProcessRecord {
    pub fn new(pid: u32, ppid: u32, command: impl Into<String>, cmdline: impl Into<String>) -> Self {
        Self {
            pid,
            ppid,
            command: command.into(),
            cmdline: cmdline.into(),
            state: ProcessState::Unknown,
            facts: ProcessFacts::default(),
        }
    }

    /// Display name: the command, or the basename of argv[0] when the command is empty
    pub fn name(&self) -> &str {
        if !self.command.is_empty() {
            return &self.command;
        }
        self.cmdline
            .split_whitespace()
            .next()
            .and_then(|arg0| arg0.rsplit(['/', '\\']).next())
            .unwrap_or("<unknown>")
    }

    /// The command line, falling back to the command name when it is empty
    /// (kernel threads and zombies have no argv)
    pub fn display_cmdline(&self) -> &str {
        if self.cmdline.trim().is_empty() {
            self.name()
        } else {
            &self.cmdline
        }
    }
}

/// Lineage of a process, root first and the walked process last
///
/// Invariants: never empty, no PID appears twice, and the last record is the
/// process the walk started from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AncestryChain {
    records: Vec<ProcessRecord>,
    /// PPID whose lookup failed when the walk stopped before the tree root
    broken_at: Option<u32>,
}

impl AncestryChain {
    /// Build a chain from records ordered root-first
    ///
    /// Returns `None` for an empty list or one that repeats a PID.
    pub fn from_root_first(records: Vec<ProcessRecord>) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let mut seen = HashSet::with_capacity(records.len());
        if !records.iter().all(|r| seen.insert(r.pid)) {
            return None;
        }
        Some(Self {
            records,
            broken_at: None,
        })
    }

    pub(crate) fn with_broken_at(mut self, ppid: Option<u32>) -> Self {
        self.broken_at = ppid;
        self
    }

    /// The process the chain was walked from
    pub fn target(&self) -> &ProcessRecord {
        &self.records[self.records.len() - 1]
    }

    /// The furthest ancestor that could be read
    pub fn root(&self) -> &ProcessRecord {
        &self.records[0]
    }

    /// Records ordered root first
    pub fn iter(&self) -> std::slice::Iter<'_, ProcessRecord> {
        self.records.iter()
    }

    /// Records ordered nearest first, starting with the target itself
    pub fn iter_nearest_first(&self) -> std::iter::Rev<std::slice::Iter<'_, ProcessRecord>> {
        self.records.iter().rev()
    }

    /// Ancestors only, root first (the target is excluded)
    pub fn ancestors(&self) -> &[ProcessRecord] {
        &self.records[..self.records.len() - 1]
    }

    pub fn as_slice(&self) -> &[ProcessRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.records.iter().map(|r| r.pid).collect()
    }

    pub fn contains_pid(&self, pid: u32) -> bool {
        self.records.iter().any(|r| r.pid == pid)
    }

    /// Set when a parent exited between enumeration and read
    pub fn broken_at(&self) -> Option<u32> {
        self.broken_at
    }

    /// Number of adjacent parent/child pairs running the same command
    pub fn restart_count(&self) -> usize {
        self.records
            .windows(2)
            .filter(|pair| pair[0].command == pair[1].command)
            .count()
    }
}

impl<'a> IntoIterator for &'a AncestryChain {
    type Item = &'a ProcessRecord;
    type IntoIter = std::slice::Iter<'a, ProcessRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Classification of the mechanism that launched the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Container runtime (Docker, containerd, Podman, LXC)
    Container,
    /// System service manager unit (systemd service)
    ServiceManager,
    /// Process supervisor or init system
    Supervisor,
    /// Scheduled task runner (cron, at)
    Cron,
    /// Interactive shell
    Shell,
    /// Origin could not be determined
    Unknown,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Container => write!(f, "Container"),
            SourceKind::ServiceManager => write!(f, "Service Manager"),
            SourceKind::Supervisor => write!(f, "Supervisor"),
            SourceKind::Cron => write!(f, "Scheduled Task"),
            SourceKind::Shell => write!(f, "Interactive Shell"),
            SourceKind::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Coarse confidence level for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Low confidence - speculative or incomplete data
    Low,
    /// Medium confidence - likely correct but not verified
    Medium,
    /// High confidence - specific, strong signal
    High,
}

impl Confidence {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Confidence::High
        } else if score >= 0.5 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// Which observation produced a classification hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Short command name matched a table entry
    CommandName,
    /// A command-line argument matched a table entry
    CommandLine,
    /// Control group carried a container signature
    ControlGroup,
    /// Process belongs to a service unit
    ServiceUnit,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::CommandName => write!(f, "command name"),
            Signal::CommandLine => write!(f, "command line"),
            Signal::ControlGroup => write!(f, "control group"),
            Signal::ServiceUnit => write!(f, "service unit"),
        }
    }
}

/// A piece of evidence supporting a classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Process the signal was found on
    pub pid: u32,
    /// That process's command name
    pub command: String,
    /// Kind of signal
    pub signal: Signal,
    /// The matched value (table key, unit name, runtime)
    pub matched: String,
}

/// The inferred launch mechanism with its confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub kind: SourceKind,
    pub name: String,
    /// Score in [0, 1]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Evidence>,
}

impl Source {
    pub fn new(kind: SourceKind, name: impl Into<String>, confidence: f64) -> Self {
        Self {
            kind,
            name: name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            evidence: Vec::new(),
        }
    }

    /// The result when no detector fires
    pub fn unknown() -> Self {
        Self::new(SourceKind::Unknown, "", 0.0)
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence.push(evidence);
        self
    }

    pub fn level(&self) -> Confidence {
        Confidence::from_score(self.confidence)
    }

    pub fn is_unknown(&self) -> bool {
        self.kind == SourceKind::Unknown
    }

    /// Human-readable explanation
    pub fn description(&self) -> String {
        match self.kind {
            SourceKind::Container => format!("Running inside a {} container", self.name),
            SourceKind::ServiceManager => format!("Managed service unit {}", self.name),
            SourceKind::Supervisor => format!("Started by supervisor {}", self.name),
            SourceKind::Cron => format!("Launched by scheduler {}", self.name),
            SourceKind::Shell => format!("Launched from an interactive {} shell", self.name),
            SourceKind::Unknown => "Could not determine process origin".to_string(),
        }
    }
}

/// Warnings about the process or about gaps in the analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details", rename_all = "snake_case")]
pub enum Warning {
    /// Parent process has exited, ancestry chain is incomplete
    ParentExited { last_known_ppid: u32 },
    /// Process exited during analysis
    ProcessExited,
    /// A listening socket is bound to a wildcard address
    ListeningPublicly { address: String, port: u16 },
    /// Process is a zombie awaiting reaping by its parent
    Zombie,
    /// Process is stopped (job control or debugger)
    Stopped,
    /// Process runs with uid 0
    RunningAsRoot,
    /// Ancestors re-ran the same command
    Restarted { count: usize },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::ParentExited { last_known_ppid } => {
                write!(
                    f,
                    "Parent process (PID {}) has exited; ancestry is incomplete",
                    last_known_ppid
                )
            }
            Warning::ProcessExited => write!(f, "Process exited during analysis"),
            Warning::ListeningPublicly { address, port } => {
                write!(f, "Listening on all interfaces ({}:{})", address, port)
            }
            Warning::Zombie => write!(f, "Process is a zombie (exited, not yet reaped)"),
            Warning::Stopped => write!(f, "Process is stopped"),
            Warning::RunningAsRoot => write!(f, "Process is running as root"),
            Warning::Restarted { count } => {
                write!(f, "Command re-launched itself {} time(s) in the ancestry", count)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: u32, ppid: u32, command: &str) -> ProcessRecord {
        ProcessRecord::new(pid, ppid, command, command)
    }

    #[test]
    fn test_target_display() {
        assert_eq!(Target::pid("42").to_string(), "PID 42");
        assert_eq!(Target::port("8080").to_string(), "port 8080");
        assert_eq!(Target::name("nginx").to_string(), "\"nginx\"");
    }

    #[test]
    fn test_process_state_from_code() {
        assert_eq!(ProcessState::from_code("Ss+"), ProcessState::Sleeping);
        assert_eq!(ProcessState::from_code("Z"), ProcessState::Zombie);
        assert_eq!(ProcessState::from_code("t"), ProcessState::Stopped);
        assert_eq!(ProcessState::from_code(""), ProcessState::Unknown);
    }

    #[test]
    fn test_record_name_falls_back_to_argv0() {
        let rec = ProcessRecord::new(7, 1, "", "/usr/local/bin/node server.js");
        assert_eq!(rec.name(), "node");
        assert_eq!(rec.display_cmdline(), "/usr/local/bin/node server.js");

        let kthread = ProcessRecord::new(2, 0, "kthreadd", "");
        assert_eq!(kthread.display_cmdline(), "kthreadd");
    }

    #[test]
    fn test_chain_rejects_empty_and_duplicates() {
        assert!(AncestryChain::from_root_first(vec![]).is_none());
        assert!(AncestryChain::from_root_first(vec![
            record(1, 0, "init"),
            record(5, 1, "sh"),
            record(1, 5, "init"),
        ])
        .is_none());
    }

    #[test]
    fn test_chain_accessors() {
        let chain = AncestryChain::from_root_first(vec![
            record(1, 0, "init"),
            record(50, 1, "sshd"),
            record(120, 50, "bash"),
        ])
        .unwrap();

        assert_eq!(chain.root().pid, 1);
        assert_eq!(chain.target().pid, 120);
        assert_eq!(chain.ancestors().len(), 2);
        assert_eq!(
            chain.iter_nearest_first().map(|r| r.pid).collect::<Vec<_>>(),
            vec![120, 50, 1]
        );
        assert!(chain.contains_pid(50));
        assert_eq!(chain.broken_at(), None);
    }

    #[test]
    fn test_restart_count() {
        let chain = AncestryChain::from_root_first(vec![
            record(1, 0, "init"),
            record(10, 1, "node"),
            record(11, 10, "node"),
            record(12, 11, "node"),
        ])
        .unwrap();
        assert_eq!(chain.restart_count(), 2);
    }

    #[test]
    fn test_source_confidence_levels() {
        assert_eq!(Source::new(SourceKind::Shell, "bash", 0.5).level(), Confidence::Medium);
        assert_eq!(Source::new(SourceKind::Supervisor, "pm2", 0.9).level(), Confidence::High);
        assert_eq!(Source::unknown().level(), Confidence::Low);
        assert_eq!(Source::new(SourceKind::Cron, "cron", 1.7).confidence, 1.0);
    }

    #[test]
    fn test_warning_serializes_tagged() {
        let json = serde_json::to_string(&Warning::ParentExited { last_known_ppid: 9 }).unwrap();
        assert_eq!(json, r#"{"type":"parent_exited","details":{"last_known_ppid":9}}"#);
    }
}
