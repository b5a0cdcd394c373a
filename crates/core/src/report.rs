//! Report structure for process origin analysis results

use crate::models::{AncestryChain, ProcessRecord, Source, SourceKind, Target, Warning};
use crate::socket::{Connection, ListeningSocket};
use serde::{Deserialize, Serialize};

/// Complete analysis report for one resolved process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// The target that was queried
    pub target: Target,
    /// The PID the target resolved to
    pub pid: u32,
    /// Process ancestry, root first, the process itself last
    pub ancestry: AncestryChain,
    /// Classified origin of the process
    pub source: Source,
    /// Adjacent ancestors that re-ran the same command
    pub restart_count: usize,
    /// Listening sockets held by the process
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sockets: Vec<ListeningSocket>,
    /// Active connections of the process (only when requested)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,
    /// Warnings about the process or about gaps in the analysis
    pub warnings: Vec<Warning>,
    /// Non-fatal errors from optional lookups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl Report {
    /// Create a report with an unclassified source
    pub fn new(target: Target, ancestry: AncestryChain) -> Self {
        Self {
            target,
            pid: ancestry.target().pid,
            restart_count: ancestry.restart_count(),
            ancestry,
            source: Source::unknown(),
            sockets: Vec::new(),
            connections: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// The resolved process record
    pub fn process(&self) -> &ProcessRecord {
        self.ancestry.target()
    }

    /// Check if any warnings were raised
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Check if any errors occurred
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Get the root ancestor (furthest from target)
    pub fn root_ancestor(&self) -> &ProcessRecord {
        self.ancestry.root()
    }

    pub fn is_service(&self) -> bool {
        self.source.kind == SourceKind::ServiceManager
    }

    pub fn is_interactive(&self) -> bool {
        self.source.kind == SourceKind::Shell
    }

    /// Add a warning, ignoring duplicates
    pub fn add_warning(&mut self, warning: Warning) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// Add an error to the report
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> Report {
        let chain = AncestryChain::from_root_first(vec![
            ProcessRecord::new(1, 0, "init", "init"),
            ProcessRecord::new(10, 1, "app", "app --serve"),
        ])
        .unwrap();
        Report::new(Target::pid("10"), chain)
    }

    #[test]
    fn test_report_accessors() {
        let r = report();
        assert_eq!(r.pid, 10);
        assert_eq!(r.process().command, "app");
        assert_eq!(r.root_ancestor().pid, 1);
        assert!(!r.has_warnings());
        assert!(!r.is_service());
    }

    #[test]
    fn test_duplicate_warnings_collapse() {
        let mut r = report();
        r.add_warning(Warning::Zombie);
        r.add_warning(Warning::Zombie);
        r.add_error("cwd unreadable");
        assert_eq!(r.warnings.len(), 1);
        assert!(r.has_errors());
    }

    #[test]
    fn test_report_json_shape() {
        let value = serde_json::to_value(report()).unwrap();
        assert_eq!(value["pid"], 10);
        assert_eq!(value["source"]["kind"], "unknown");
        assert!(value.get("sockets").is_none());
        assert_eq!(value["ancestry"]["records"][1]["command"], "app");
    }
}
