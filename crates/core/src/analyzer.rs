//! Full analysis: resolve, walk, classify, then collect peripheral context
//!
//! Peripheral lookups (sockets, connections, final liveness check) never fail
//! the analysis; they add warnings or errors to the report instead.

use crate::ancestry::walk;
use crate::classifier::Classifier;
use crate::error::{ResolveError, SourceError};
use crate::models::{ProcessState, Target, Warning};
use crate::report::Report;
use crate::resolver::Resolver;
use crate::sources::Sources;
use tracing::debug;

/// Knobs for one analysis run
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Collect the process's active connections
    pub connections: bool,
    /// Treat this PID as "self" for name-match exclusion
    pub self_pid: Option<u32>,
}

/// Resolve `target` and build its report
pub fn analyze(
    target: &Target,
    sources: &Sources,
    classifier: &Classifier,
    options: &AnalyzeOptions,
) -> Result<Report, ResolveError> {
    let mut resolver = Resolver::new(sources, classifier.tables());
    if let Some(pid) = options.self_pid {
        resolver = resolver.with_self_pid(pid);
    }
    let pid = resolver.resolve(target)?;
    debug!(pid, %target, "Target resolved");

    let chain = walk(sources.processes.as_ref(), pid).map_err(|e| match e {
        SourceError::ProcessNotFound { .. } => ResolveError::NotFound {
            target: target.to_string(),
        },
        other => ResolveError::SourceUnavailable(other),
    })?;

    let mut report = Report::new(target.clone(), chain);
    report.source = classifier.classify(&report.ancestry);

    if let Some(ppid) = report.ancestry.broken_at() {
        report.add_warning(Warning::ParentExited {
            last_known_ppid: ppid,
        });
    }
    if report.restart_count > 0 {
        report.add_warning(Warning::Restarted {
            count: report.restart_count,
        });
    }
    let state = report.process().state;
    match state {
        ProcessState::Zombie => report.add_warning(Warning::Zombie),
        ProcessState::Stopped => report.add_warning(Warning::Stopped),
        _ => {}
    }
    if report.process().facts.uid == Some(0) {
        report.add_warning(Warning::RunningAsRoot);
    }

    report.sockets = resolver.sockets_owned_by(pid);
    let public: Vec<Warning> = report
        .sockets
        .iter()
        .filter(|s| s.is_wildcard())
        .map(|s| Warning::ListeningPublicly {
            address: s.local_addr.to_string(),
            port: s.port,
        })
        .collect();
    for warning in public {
        report.add_warning(warning);
    }

    if options.connections {
        collect_connections(&mut report, sources);
    }

    if let Err(SourceError::ProcessNotFound { .. }) = sources.processes.read_process(pid) {
        report.add_warning(Warning::ProcessExited);
    }

    Ok(report)
}

fn collect_connections(report: &mut Report, sources: &Sources) {
    for table in &sources.sockets {
        match table.list_connections() {
            Ok(all) => {
                report.connections = all.into_iter().filter(|c| c.pid == report.pid).collect();
                return;
            }
            Err(e) => report.add_error(format!("{}: connections unavailable: {}", table.name(), e)),
        }
    }
}
