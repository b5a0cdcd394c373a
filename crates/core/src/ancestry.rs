//! Ancestry Walker
//!
//! Builds the chain of parent processes from a target process up to the root
//! of the process tree.

use crate::error::{SourceError, SourceResult};
use crate::models::{AncestryChain, ProcessRecord};
use crate::sources::ProcessTable;
use std::collections::HashSet;
use tracing::{debug, trace};

/// PID of the process-tree root on POSIX systems
const INIT_PID: u32 = 1;

/// Walk the parent chain of `pid`
///
/// Only a failure to read `pid` itself is an error. Later failures (a parent
/// exited mid-walk, or a cycle in a racy snapshot) end the walk and return what
/// was collected so far.
pub fn walk(processes: &dyn ProcessTable, pid: u32) -> SourceResult<AncestryChain> {
    let target = processes.read_process(pid)?;

    let mut nearest_first: Vec<ProcessRecord> = Vec::new();
    let mut visited: HashSet<u32> = HashSet::new();
    let mut broken_at = None;
    let mut current = target;

    loop {
        visited.insert(current.pid);
        let parent_pid = current.ppid;
        let at_root = current.pid == INIT_PID || parent_pid == 0 || parent_pid == current.pid;
        nearest_first.push(current);

        if at_root {
            break;
        }
        if visited.contains(&parent_pid) {
            debug!(pid = parent_pid, "Cycle in process ancestry, stopping walk");
            break;
        }

        match processes.read_process(parent_pid) {
            Ok(parent) => {
                trace!(pid = parent.pid, ppid = parent.ppid, command = %parent.command, "Ancestor");
                current = parent;
            }
            Err(e) => {
                debug!(ppid = parent_pid, error = %e, "Ancestor lookup failed, returning partial chain");
                broken_at = Some(parent_pid);
                break;
            }
        }
    }

    nearest_first.reverse();
    let chain = AncestryChain::from_root_first(nearest_first)
        .ok_or_else(|| SourceError::parse("ancestry", "walk produced an invalid chain"))?
        .with_broken_at(broken_at);
    Ok(chain)
}
