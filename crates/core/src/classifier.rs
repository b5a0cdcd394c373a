//! Origin Classifier
//!
//! Infers what launched a process from its ancestry chain. Pure and
//! deterministic: an ordered list of detectors, first hit wins.
//!
//! Precedence: container, service manager, scheduled task, supervisor, shell.
//! More specific mechanisms come first so that a shell inside a container (or
//! a shell that started a unit with `systemctl`) does not mask them.

use crate::models::{AncestryChain, Evidence, ProcessRecord, Signal, Source, SourceKind};
use crate::tables::{normalize_command, LaunchTables};
use tracing::debug;

/// Confidence scores for each detector
mod scores {
    /// Control group of the process names a container runtime
    pub const CONTAINER_FACT: f64 = 0.9;
    /// A container runtime helper is an ancestor
    pub const CONTAINER_ANCESTOR: f64 = 0.8;
    /// Process belongs to a service unit
    pub const SERVICE_UNIT: f64 = 0.8;
    /// A scheduled-task runner is in the chain
    pub const CRON: f64 = 0.8;
    /// Dedicated process-manager family (pm2)
    pub const PROCESS_MANAGER: f64 = 0.9;
    /// Known supervisor or init
    pub const SUPERVISOR: f64 = 0.7;
    /// Nearest interactive shell
    pub const SHELL: f64 = 0.5;
}

/// One independent launch-mechanism detector
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    /// A candidate classification, or `None` for no opinion
    fn detect(&self, chain: &AncestryChain, tables: &LaunchTables) -> Option<Source>;
}

fn evidence(record: &ProcessRecord, signal: Signal, matched: &str) -> Evidence {
    Evidence {
        pid: record.pid,
        command: record.command.clone(),
        signal,
        matched: matched.to_string(),
    }
}

/// Container runtime: control-group signature on the process, or a runtime helper ancestor
pub struct ContainerDetector;

impl Detector for ContainerDetector {
    fn name(&self) -> &'static str {
        "container"
    }

    fn detect(&self, chain: &AncestryChain, tables: &LaunchTables) -> Option<Source> {
        let target = chain.target();
        if let Some(runtime) = target.facts.container.as_deref() {
            return Some(
                Source::new(SourceKind::Container, runtime, scores::CONTAINER_FACT)
                    .with_evidence(evidence(target, Signal::ControlGroup, runtime)),
            );
        }

        chain.ancestors().iter().rev().find_map(|record| {
            let runtime = tables.container_runtime(&record.command)?;
            Some(
                Source::new(SourceKind::Container, runtime, scores::CONTAINER_ANCESTOR)
                    .with_evidence(evidence(record, Signal::CommandName, &record.command)),
            )
        })
    }
}

/// Service manager: the unit the process itself belongs to
///
/// Control groups are inherited, so the target's unit is the operative one;
/// an ancestor in a different unit (e.g. `ssh.service` above a login session)
/// says nothing about the target.
pub struct ServiceUnitDetector;

impl Detector for ServiceUnitDetector {
    fn name(&self) -> &'static str {
        "service-manager"
    }

    fn detect(&self, chain: &AncestryChain, _tables: &LaunchTables) -> Option<Source> {
        let target = chain.target();
        let unit = target.facts.service_unit.as_deref()?;
        if !unit.ends_with(".service") {
            return None;
        }
        Some(
            Source::new(SourceKind::ServiceManager, unit, scores::SERVICE_UNIT)
                .with_evidence(evidence(target, Signal::ServiceUnit, unit)),
        )
    }
}

/// Scheduled task: nearest cron-like runner
pub struct CronDetector;

impl Detector for CronDetector {
    fn name(&self) -> &'static str {
        "cron"
    }

    fn detect(&self, chain: &AncestryChain, tables: &LaunchTables) -> Option<Source> {
        chain.iter_nearest_first().find_map(|record| {
            let label = tables.cron_label(&record.command)?;
            Some(
                Source::new(SourceKind::Cron, label, scores::CRON)
                    .with_evidence(evidence(record, Signal::CommandName, &record.command)),
            )
        })
    }
}

/// Supervisor / init: first table hit scanning from the root
pub struct SupervisorDetector;

impl SupervisorDetector {
    /// Table hit on a command-line argument, compared by basename
    fn cmdline_hit<'t>(
        record: &ProcessRecord,
        lookup: impl Fn(&str) -> Option<&'t str>,
    ) -> Option<(&'t str, String)> {
        record.cmdline.split_whitespace().find_map(|token| {
            let base = normalize_command(token);
            lookup(&base).map(|label| (label, base))
        })
    }
}

impl Detector for SupervisorDetector {
    fn name(&self) -> &'static str {
        "supervisor"
    }

    fn detect(&self, chain: &AncestryChain, tables: &LaunchTables) -> Option<Source> {
        let has_shell = chain
            .iter()
            .any(|record| tables.shell_label(&record.command).is_some());

        for record in chain.iter() {
            if let Some(family) = tables
                .process_manager_in(&record.command)
                .or_else(|| tables.process_manager_in(&record.cmdline))
            {
                return Some(
                    Source::new(SourceKind::Supervisor, family, scores::PROCESS_MANAGER)
                        .with_evidence(evidence(record, Signal::CommandLine, family)),
                );
            }

            if let Some(label) = tables.supervisor_label(&record.command) {
                return Some(
                    Source::new(SourceKind::Supervisor, label, scores::SUPERVISOR)
                        .with_evidence(evidence(record, Signal::CommandName, &record.command)),
                );
            }

            if let Some(label) = tables.init_label(&record.command) {
                if has_shell {
                    debug!(pid = record.pid, label, "Skipping init-role ancestor, shell present");
                } else {
                    return Some(
                        Source::new(SourceKind::Supervisor, label, scores::SUPERVISOR)
                            .with_evidence(evidence(record, Signal::CommandName, &record.command)),
                    );
                }
            }

            if let Some((label, matched)) =
                Self::cmdline_hit(record, |name| tables.supervisor_label(name))
            {
                return Some(
                    Source::new(SourceKind::Supervisor, label, scores::SUPERVISOR)
                        .with_evidence(evidence(record, Signal::CommandLine, &matched)),
                );
            }

            if !has_shell {
                if let Some((label, matched)) =
                    Self::cmdline_hit(record, |name| tables.init_label(name))
                {
                    return Some(
                        Source::new(SourceKind::Supervisor, label, scores::SUPERVISOR)
                            .with_evidence(evidence(record, Signal::CommandLine, &matched)),
                    );
                }
            }
        }
        None
    }
}

/// Interactive shell: the nearest one wins
pub struct ShellDetector;

impl Detector for ShellDetector {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn detect(&self, chain: &AncestryChain, tables: &LaunchTables) -> Option<Source> {
        chain.iter_nearest_first().find_map(|record| {
            let shell = tables.shell_label(&record.command)?;
            Some(
                Source::new(SourceKind::Shell, shell, scores::SHELL)
                    .with_evidence(evidence(record, Signal::CommandName, &record.command)),
            )
        })
    }
}

/// Runs detectors in precedence order against a set of tables
pub struct Classifier {
    tables: LaunchTables,
    detectors: Vec<Box<dyn Detector>>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(LaunchTables::default())
    }
}

impl Classifier {
    /// Classifier with the standard detector precedence
    pub fn new(tables: LaunchTables) -> Self {
        Self {
            tables,
            detectors: vec![
                Box::new(ContainerDetector),
                Box::new(ServiceUnitDetector),
                Box::new(CronDetector),
                Box::new(SupervisorDetector),
                Box::new(ShellDetector),
            ],
        }
    }

    /// Classifier with a custom detector list, evaluated in the given order
    pub fn with_detectors(tables: LaunchTables, detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { tables, detectors }
    }

    pub fn tables(&self) -> &LaunchTables {
        &self.tables
    }

    /// First detector hit, or `Unknown` with confidence 0
    pub fn classify(&self, chain: &AncestryChain) -> Source {
        for detector in &self.detectors {
            if let Some(source) = detector.detect(chain, &self.tables) {
                debug!(
                    detector = detector.name(),
                    kind = %source.kind,
                    name = %source.name,
                    confidence = source.confidence,
                    "Classified process origin"
                );
                return source;
            }
        }
        Source::unknown()
    }
}

/// Classify with the built-in tables
pub fn classify(chain: &AncestryChain) -> Source {
    Classifier::default().classify(chain)
}
