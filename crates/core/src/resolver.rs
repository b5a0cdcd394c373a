//! Target Resolver
//!
//! Turns a PID, port or name query into exactly one PID, or reports why it
//! cannot: nothing matched, several processes matched, or the owner of a port
//! could not be attributed.

use crate::ambiguity::{settle, Ambiguity, Candidate, CandidateOrigin};
use crate::error::{ResolveError, SourceError};
use crate::models::{ProcessRecord, Target, TargetKind};
use crate::socket::{ListeningSocket, OwnerHandle, Protocol};
use crate::sources::{SocketTable, Sources};
use crate::tables::LaunchTables;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;
use tracing::{debug, trace, warn};

/// Longest label passed to a service manager
const MAX_SERVICE_LABEL: usize = 256;

/// Reverse-domain prefixes tried after the bare service name
const SERVICE_PREFIXES: &[&str] = &["com.apple.", "org.", "io."];

/// Shown when a candidate's command line cannot be read
const UNKNOWN_DESCRIPTION: &str = "(unknown)";

/// Result of resolving a target
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    /// Exactly one live process
    Resolved(u32),
    /// Two or more live processes; never auto-resolved
    Ambiguous(Ambiguity),
    /// No candidate at all
    NotFound,
}

impl ResolutionOutcome {
    pub fn into_result(self, target: &Target) -> Result<u32, ResolveError> {
        match self {
            ResolutionOutcome::Resolved(pid) => Ok(pid),
            ResolutionOutcome::Ambiguous(ambiguity) => Err(ResolveError::Ambiguous(ambiguity)),
            ResolutionOutcome::NotFound => Err(ResolveError::NotFound {
                target: target.to_string(),
            }),
        }
    }
}

/// Resolves targets against one set of sources
pub struct Resolver<'a> {
    sources: &'a Sources,
    tables: &'a LaunchTables,
    self_pid: u32,
    parent_pid: Option<u32>,
}

impl<'a> Resolver<'a> {
    pub fn new(sources: &'a Sources, tables: &'a LaunchTables) -> Self {
        Self {
            sources,
            tables,
            self_pid: std::process::id(),
            parent_pid: current_parent_pid(),
        }
    }

    /// Exclude a different PID (and its parent) from name matches
    ///
    /// The parent is then taken from the process listing unless
    /// [`with_parent_pid`](Self::with_parent_pid) names it.
    pub fn with_self_pid(mut self, pid: u32) -> Self {
        self.self_pid = pid;
        self.parent_pid = None;
        self
    }

    pub fn with_parent_pid(mut self, ppid: u32) -> Self {
        self.parent_pid = Some(ppid);
        self
    }

    /// Resolve to a single PID
    pub fn resolve(&self, target: &Target) -> Result<u32, ResolveError> {
        self.outcome(target)?.into_result(target)
    }

    /// Resolve, keeping ambiguity and absence as values
    ///
    /// Errors are limited to invalid input, unattributable ports and
    /// unavailable sources without a fallback.
    pub fn outcome(&self, target: &Target) -> Result<ResolutionOutcome, ResolveError> {
        debug!(%target, "Resolving target");
        match target.kind {
            TargetKind::Pid => {
                let pid = parse_pid(&target.value)?;
                self.resolve_pid(pid)
            }
            TargetKind::Port => {
                let port = parse_port(&target.value)?;
                self.resolve_port(target, port)
            }
            TargetKind::Name => {
                let name = target.value.trim();
                if name.is_empty() {
                    return Err(ResolveError::InvalidTarget {
                        kind: "name",
                        value: target.value.clone(),
                        reason: "empty",
                    });
                }
                self.resolve_name(target, name)
            }
        }
    }

    fn resolve_pid(&self, pid: u32) -> Result<ResolutionOutcome, ResolveError> {
        match self.sources.processes.read_process(pid) {
            Ok(_) => Ok(ResolutionOutcome::Resolved(pid)),
            Err(SourceError::ProcessNotFound { .. }) => Ok(ResolutionOutcome::NotFound),
            Err(e) => Err(ResolveError::SourceUnavailable(e)),
        }
    }

    // ---- port ----

    fn resolve_port(&self, target: &Target, port: u16) -> Result<ResolutionOutcome, ResolveError> {
        let Some((table, sockets)) = self.listeners_on(port) else {
            warn!(port, "No socket table could be queried");
            return Ok(ResolutionOutcome::NotFound);
        };
        if sockets.is_empty() {
            debug!(port, table = table.name(), "No listener on port");
            return Ok(ResolutionOutcome::NotFound);
        }

        let owners = self.attribute(table, &sockets);
        if owners.is_empty() {
            return Err(ResolveError::OwnerNotDetected { port });
        }

        // Forked servers share one socket; the supervisor bound it first and
        // so usually holds the smallest PID.
        let mut by_address: BTreeMap<IpAddr, u32> = BTreeMap::new();
        for (addr, pid) in owners {
            by_address
                .entry(addr)
                .and_modify(|min| *min = (*min).min(pid))
                .or_insert(pid);
        }

        let candidates = by_address
            .into_iter()
            .map(|(addr, pid)| {
                Candidate::new(
                    pid,
                    CandidateOrigin::Listener {
                        addresses: vec![addr],
                    },
                    self.describe(pid),
                )
            })
            .collect();
        Ok(settle(target, candidates))
    }

    /// TCP listeners on `port` from the first socket table that answers
    fn listeners_on(&self, port: u16) -> Option<(&dyn SocketTable, Vec<ListeningSocket>)> {
        for table in &self.sources.sockets {
            debug!(table = table.name(), port, "Querying socket table");
            match table.list_listening_sockets() {
                Ok(all) => {
                    let matching = all
                        .into_iter()
                        .filter(|s| s.port == port && s.protocol == Protocol::Tcp)
                        .collect();
                    return Some((table.as_ref(), matching));
                }
                Err(e) => {
                    warn!(table = table.name(), error = %e, "Socket table failed, trying fallback");
                }
            }
        }
        None
    }

    /// `(bind address, pid)` for every socket whose owner can be determined
    fn attribute(&self, table: &dyn SocketTable, sockets: &[ListeningSocket]) -> Vec<(IpAddr, u32)> {
        let wanted: HashSet<u64> = sockets
            .iter()
            .filter_map(|s| match s.owner {
                Some(OwnerHandle::Inode(inode)) => Some(inode),
                _ => None,
            })
            .collect();
        let inode_owners = if wanted.is_empty() {
            HashMap::new()
        } else {
            self.scan_handles(table, &wanted)
        };

        let mut owners = Vec::new();
        for socket in sockets {
            match socket.owner {
                Some(OwnerHandle::Pid(pid)) => owners.push((socket.local_addr, pid)),
                Some(OwnerHandle::Inode(inode)) => {
                    for pid in inode_owners.get(&inode).into_iter().flatten() {
                        owners.push((socket.local_addr, *pid));
                    }
                }
                None => trace!(addr = %socket.local_addr, "Listener without owner"),
            }
        }
        owners
    }

    /// One pass over every process's handles, collecting holders of `wanted` inodes
    fn scan_handles(&self, table: &dyn SocketTable, wanted: &HashSet<u64>) -> HashMap<u64, Vec<u32>> {
        let mut holders: HashMap<u64, Vec<u32>> = HashMap::new();
        let processes = match self.sources.processes.list_processes() {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Cannot list processes to attribute socket inodes");
                return holders;
            }
        };

        for record in &processes {
            match table.list_open_handles(record.pid) {
                Ok(handles) => {
                    for handle in handles {
                        if let OwnerHandle::Inode(inode) = handle {
                            if wanted.contains(&inode) {
                                holders.entry(inode).or_default().push(record.pid);
                            }
                        }
                    }
                }
                Err(e) => trace!(pid = record.pid, error = %e, "Skipping handles"),
            }
        }
        holders
    }

    /// Listening sockets held by `pid`, from the first socket table that answers
    pub fn sockets_owned_by(&self, pid: u32) -> Vec<ListeningSocket> {
        let Some((table, all)) = self
            .sources
            .sockets
            .iter()
            .find_map(|t| t.list_listening_sockets().ok().map(|all| (t, all)))
        else {
            return Vec::new();
        };
        let handles: HashSet<OwnerHandle> = table
            .list_open_handles(pid)
            .map(|h| h.into_iter().collect())
            .unwrap_or_default();

        all.into_iter()
            .filter(|s| match s.owner {
                Some(OwnerHandle::Pid(owner)) => owner == pid,
                Some(handle @ OwnerHandle::Inode(_)) => handles.contains(&handle),
                None => false,
            })
            .collect()
    }

    // ---- name ----

    fn resolve_name(&self, target: &Target, name: &str) -> Result<ResolutionOutcome, ResolveError> {
        let (listing, service_pid) = std::thread::scope(|scope| {
            let service = scope.spawn(|| self.find_service(name));
            let listing = self.sources.processes.list_processes();
            let service_pid = service.join().unwrap_or_else(|_| {
                warn!("Service lookup thread panicked");
                None
            });
            (listing, service_pid)
        });
        let processes = listing.map_err(ResolveError::SourceUnavailable)?;

        let mut candidates = Vec::new();
        if let Some(pid) = service_pid {
            let description = processes
                .iter()
                .find(|r| r.pid == pid)
                .map(|r| r.display_cmdline().to_string())
                .unwrap_or_else(|| self.describe(pid));
            candidates.push(Candidate::new(pid, CandidateOrigin::Service, description));
        }

        candidates.extend(
            self.match_processes(&processes, name)
                .into_iter()
                .map(|r| Candidate::new(r.pid, CandidateOrigin::Manual, r.display_cmdline())),
        );
        Ok(settle(target, candidates))
    }

    /// Case-insensitive substring matches on command or command line
    fn match_processes<'p>(&self, processes: &'p [ProcessRecord], name: &str) -> Vec<&'p ProcessRecord> {
        let query = name.to_lowercase();
        let parent_pid = self.parent_pid.or_else(|| {
            processes
                .iter()
                .find(|r| r.pid == self.self_pid)
                .map(|r| r.ppid)
        });

        processes
            .iter()
            .filter(|r| {
                if r.pid == self.self_pid || Some(r.pid) == parent_pid {
                    return false;
                }
                if r.pid.to_string() == name {
                    return false;
                }
                if self.tables.is_filter_utility(&r.command) {
                    trace!(pid = r.pid, command = %r.command, "Skipping filter utility");
                    return false;
                }
                r.command.to_lowercase().contains(&query) || r.cmdline.to_lowercase().contains(&query)
            })
            .collect()
    }

    /// Leading PID of a running unit named `name` or a conventional variant
    fn find_service(&self, name: &str) -> Option<u32> {
        if !is_valid_service_label(name) {
            debug!(name, "Not a valid service label, skipping service manager");
            return None;
        }
        let manager = &self.sources.services;
        let variants = std::iter::once(name.to_string())
            .chain(SERVICE_PREFIXES.iter().map(|prefix| format!("{}{}", prefix, name)));

        for label in variants {
            debug!(manager = manager.name(), %label, "Querying service manager");
            match manager.find_service_main_pid(&label) {
                Ok(Some(pid)) if pid > 0 => return Some(pid),
                Ok(_) => {}
                Err(e) => {
                    warn!(manager = manager.name(), error = %e, "Service manager failed, ignoring services");
                    return None;
                }
            }
        }
        None
    }

    fn describe(&self, pid: u32) -> String {
        self.sources
            .processes
            .read_process(pid)
            .map(|r| r.display_cmdline().to_string())
            .unwrap_or_else(|_| UNKNOWN_DESCRIPTION.to_string())
    }
}

fn parse_positive(kind: &'static str, value: &str, max: u64) -> Result<u64, ResolveError> {
    let invalid = |reason| ResolveError::InvalidTarget {
        kind,
        value: value.to_string(),
        reason,
    };
    let n: u64 = value.trim().parse().map_err(|_| invalid("not a positive integer"))?;
    if n == 0 {
        return Err(invalid("must be greater than zero"));
    }
    if n > max {
        return Err(invalid("out of range"));
    }
    Ok(n)
}

#[cfg(unix)]
fn current_parent_pid() -> Option<u32> {
    Some(std::os::unix::process::parent_id())
}

#[cfg(not(unix))]
fn current_parent_pid() -> Option<u32> {
    None
}

pub fn parse_pid(value: &str) -> Result<u32, ResolveError> {
    parse_positive("PID", value, u64::from(u32::MAX)).map(|n| n as u32)
}

pub fn parse_port(value: &str) -> Result<u16, ResolveError> {
    parse_positive("port", value, u64::from(u16::MAX)).map(|n| n as u16)
}

/// Characters a service label may contain, and its length limit
pub fn is_valid_service_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_SERVICE_LABEL
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sources, FakeProcesses, FakeServices, FakeSockets};

    const SELF_PID: u32 = 4000;

    fn resolver_outcome(sources: &Sources, target: Target) -> Result<ResolutionOutcome, ResolveError> {
        let tables = LaunchTables::default();
        Resolver::new(sources, &tables)
            .with_self_pid(SELF_PID)
            .outcome(&target)
    }

    fn base_processes() -> FakeProcesses {
        FakeProcesses::new()
            .with(1, 0, "init")
            .with_cmdline(3999, 1, "bash", "-bash")
            .with_cmdline(SELF_PID, 3999, "witr", "witr nginx")
    }

    mod unit_tests {
        use super::*;

        #[test]
        fn test_parse_targets() {
            assert_eq!(parse_pid("42").unwrap(), 42);
            assert_eq!(parse_port(" 8080 ").unwrap(), 8080);
            assert!(matches!(parse_pid("0"), Err(ResolveError::InvalidTarget { .. })));
            assert!(matches!(parse_pid("-3"), Err(ResolveError::InvalidTarget { .. })));
            assert!(matches!(parse_pid("abc"), Err(ResolveError::InvalidTarget { .. })));
            assert!(matches!(parse_port("65536"), Err(ResolveError::InvalidTarget { .. })));
            assert_eq!(parse_port("65535").unwrap(), 65535);
        }

        #[test]
        fn test_service_label_validation() {
            assert!(is_valid_service_label("nginx"));
            assert!(is_valid_service_label("getty@tty1"));
            assert!(is_valid_service_label("com.apple.Finder"));
            assert!(!is_valid_service_label("foo bar"));
            assert!(!is_valid_service_label("a/b"));
            assert!(!is_valid_service_label(&"x".repeat(257)));
        }

        #[test]
        fn test_pid_live_and_dead() {
            let src = sources(base_processes(), vec![], FakeServices::new());
            assert_eq!(
                resolver_outcome(&src, Target::pid("1")).unwrap(),
                ResolutionOutcome::Resolved(1)
            );
            assert_eq!(
                resolver_outcome(&src, Target::pid("77")).unwrap(),
                ResolutionOutcome::NotFound
            );
        }

        #[test]
        fn test_invalid_target_touches_no_source() {
            let src = sources(
                FakeProcesses::new().failing_list(SourceError::unavailable("ps", "boom")),
                vec![],
                FakeServices::new(),
            );
            let err = resolver_outcome(&src, Target::port("http")).unwrap_err();
            assert_eq!(err.exit_code(), 4);
        }
    }

    mod port_tests {
        use super::*;

        #[test]
        fn test_port_without_listener_is_not_found() {
            let sockets = FakeSockets::new("primary").listen("0.0.0.0", 22, Some(OwnerHandle::Pid(50)));
            let src = sources(base_processes(), vec![sockets], FakeServices::new());
            assert_eq!(
                resolver_outcome(&src, Target::port("8080")).unwrap(),
                ResolutionOutcome::NotFound
            );
        }

        #[test]
        fn test_forked_workers_pick_smallest_pid() {
            let processes = base_processes()
                .with_cmdline(100, 1, "nginx", "nginx: master process")
                .with_cmdline(101, 100, "nginx", "nginx: worker process")
                .with_cmdline(102, 100, "nginx", "nginx: worker process");
            let sockets = FakeSockets::new("procfs")
                .listen("0.0.0.0", 80, Some(OwnerHandle::Inode(9001)))
                .listen("::", 80, Some(OwnerHandle::Inode(9002)))
                .handles(100, vec![OwnerHandle::Inode(9001), OwnerHandle::Inode(9002)])
                .handles(101, vec![OwnerHandle::Inode(9001), OwnerHandle::Inode(9002)])
                .handles(102, vec![OwnerHandle::Inode(9001)]);
            let src = sources(processes, vec![sockets], FakeServices::new());
            assert_eq!(
                resolver_outcome(&src, Target::port("80")).unwrap(),
                ResolutionOutcome::Resolved(100)
            );
        }

        #[test]
        fn test_two_addresses_two_owners_is_ambiguous() {
            let processes = base_processes()
                .with_cmdline(200, 1, "redis-server", "redis-server 127.0.0.1:6379")
                .with_cmdline(300, 1, "redis-server", "redis-server 10.0.0.2:6379");
            let sockets = FakeSockets::new("ss")
                .listen("127.0.0.1", 6379, Some(OwnerHandle::Pid(200)))
                .listen("10.0.0.2", 6379, Some(OwnerHandle::Pid(300)));
            let src = sources(processes, vec![sockets], FakeServices::new());

            let ResolutionOutcome::Ambiguous(amb) = resolver_outcome(&src, Target::port("6379")).unwrap() else {
                panic!("expected ambiguity");
            };
            assert_eq!(amb.pids(), vec![200, 300]);
            assert_eq!(amb.candidates[0].description, "redis-server 127.0.0.1:6379");
            assert_eq!(amb.listing()[1].label, "10.0.0.2");
        }

        #[test]
        fn test_owner_not_detected() {
            let sockets = FakeSockets::new("procfs")
                .listen("0.0.0.0", 22, Some(OwnerHandle::Inode(555)))
                .listen("::", 22, None);
            let src = sources(base_processes(), vec![sockets], FakeServices::new());
            assert_eq!(
                resolver_outcome(&src, Target::port("22")).unwrap_err(),
                ResolveError::OwnerNotDetected { port: 22 }
            );
        }

        #[test]
        fn test_falls_back_when_primary_fails() {
            let primary = FakeSockets::new("ss").failing(SourceError::unavailable("ss", "not installed"));
            let fallback = FakeSockets::new("lsof").listen("0.0.0.0", 5432, Some(OwnerHandle::Pid(3999)));
            let src = sources(base_processes(), vec![primary, fallback], FakeServices::new());
            assert_eq!(
                resolver_outcome(&src, Target::port("5432")).unwrap(),
                ResolutionOutcome::Resolved(3999)
            );
        }

        #[test]
        fn test_timeout_is_a_failed_source() {
            let primary = FakeSockets::new("ss").failing(SourceError::Timeout {
                collaborator: "ss",
                after: std::time::Duration::from_millis(5),
            });
            let src = sources(base_processes(), vec![primary], FakeServices::new());
            assert_eq!(
                resolver_outcome(&src, Target::port("5432")).unwrap(),
                ResolutionOutcome::NotFound
            );
        }

        #[test]
        fn test_empty_primary_is_authoritative() {
            let primary = FakeSockets::new("ss");
            let fallback = FakeSockets::new("lsof").listen("0.0.0.0", 5432, Some(OwnerHandle::Pid(3999)));
            let src = sources(base_processes(), vec![primary, fallback], FakeServices::new());
            assert_eq!(
                resolver_outcome(&src, Target::port("5432")).unwrap(),
                ResolutionOutcome::NotFound
            );
        }

        #[test]
        fn test_sockets_owned_by() {
            let sockets = FakeSockets::new("procfs")
                .listen("0.0.0.0", 80, Some(OwnerHandle::Inode(1)))
                .listen("0.0.0.0", 443, Some(OwnerHandle::Pid(100)))
                .listen("0.0.0.0", 22, Some(OwnerHandle::Pid(50)))
                .handles(100, vec![OwnerHandle::Inode(1)]);
            let src = sources(base_processes(), vec![sockets], FakeServices::new());
            let tables = LaunchTables::default();
            let owned = Resolver::new(&src, &tables).sockets_owned_by(100);
            let ports: Vec<u16> = owned.iter().map(|s| s.port).collect();
            assert_eq!(ports, vec![80, 443]);
        }

        #[test]
        fn test_sockets_owned_by_lists_once() {
            let failing = FakeSockets::new("ss").failing(SourceError::unavailable("ss", "not installed"));
            let sockets = FakeSockets::new("lsof").listen("0.0.0.0", 443, Some(OwnerHandle::Pid(100)));
            let failed_calls = failing.listing_counter();
            let calls = sockets.listing_counter();
            let src = sources(base_processes(), vec![failing, sockets], FakeServices::new());
            let tables = LaunchTables::default();

            assert_eq!(Resolver::new(&src, &tables).sockets_owned_by(100).len(), 1);
            assert_eq!(failed_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
            assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        }
    }

    mod name_tests {
        use super::*;

        #[test]
        fn test_single_cmdline_match() {
            let processes = base_processes()
                .with_cmdline(700, 1, "python3", "python3 /srv/Flask-App/main.py")
                .with_cmdline(701, 1, "sshd", "sshd -D");
            let src = sources(processes, vec![], FakeServices::new());
            assert_eq!(
                resolver_outcome(&src, Target::name("flask-app")).unwrap(),
                ResolutionOutcome::Resolved(700)
            );
        }

        #[test]
        fn test_excludes_self_parent_and_filters() {
            let processes = base_processes()
                .with_cmdline(800, 3999, "grep", "grep nginx")
                .with_cmdline(801, 3999, "rg", "rg nginx")
                .with_cmdline(802, 1, "nginx", "nginx: master process");
            let src = sources(processes, vec![], FakeServices::new());
            assert_eq!(
                resolver_outcome(&src, Target::name("nginx")).unwrap(),
                ResolutionOutcome::Resolved(802)
            );
        }

        #[test]
        fn test_excludes_parent_missing_from_listing() {
            // Self has already exited from the snapshot; the parent still matches the query
            let processes = FakeProcesses::new()
                .with(1, 0, "init")
                .with_cmdline(3999, 1, "sh", "sh -c witr nginx")
                .with_cmdline(802, 1, "nginx", "nginx: master process");
            let src = sources(processes, vec![], FakeServices::new());
            let tables = LaunchTables::default();
            let outcome = Resolver::new(&src, &tables)
                .with_self_pid(SELF_PID)
                .with_parent_pid(3999)
                .outcome(&Target::name("nginx"))
                .unwrap();
            assert_eq!(outcome, ResolutionOutcome::Resolved(802));
        }

        #[test]
        fn test_pid_text_is_not_a_name_match() {
            let processes = base_processes().with_cmdline(5555, 1, "sleep", "sleep 5555");
            let src = sources(processes, vec![], FakeServices::new());
            // "5555" matches the sleep argument but not the process whose PID is 5555
            assert_eq!(
                resolver_outcome(&src, Target::name("5555")).unwrap(),
                ResolutionOutcome::NotFound
            );
        }

        #[test]
        fn test_service_and_manual_are_ambiguous_service_first() {
            let processes = base_processes()
                .with_cmdline(900, 1, "postgres", "postgres -D /var/lib/postgres")
                .with_cmdline(950, 3999, "postgres", "postgres --single");
            let services = FakeServices::new().with("postgres", 900);
            let src = sources(processes, vec![], services);

            let outcome = resolver_outcome(&src, Target::name("postgres")).unwrap();
            let ResolutionOutcome::Ambiguous(amb) = outcome else {
                panic!("expected ambiguity");
            };
            assert_eq!(amb.pids(), vec![900, 950]);
            assert_eq!(amb.candidates[0].origin, CandidateOrigin::Service);
            assert_eq!(amb.candidates[1].origin, CandidateOrigin::Manual);
        }

        #[test]
        fn test_service_with_different_pid_is_ambiguous() {
            let processes = base_processes()
                .with_cmdline(20, 1, "dockerd", "/usr/bin/dockerd")
                .with_cmdline(21, 1, "docker-proxy", "docker-proxy -host-port 80");
            let services = FakeServices::new().with("org.docker", 20);
            let src = sources(processes, vec![], services);

            let ResolutionOutcome::Ambiguous(amb) = resolver_outcome(&src, Target::name("docker")).unwrap() else {
                panic!("expected ambiguity");
            };
            assert_eq!(amb.candidates[0].pid, 20);
            assert_eq!(amb.candidates[0].origin, CandidateOrigin::Service);
        }

        #[test]
        fn test_service_only_match_resolves() {
            let processes = base_processes().with_cmdline(1200, 1, "Finder", "/System/Library/CoreServices/Finder.app");
            let services = FakeServices::new().with("com.apple.mds", 300);
            let src = sources(processes, vec![], services);
            assert_eq!(
                resolver_outcome(&src, Target::name("mds")).unwrap(),
                ResolutionOutcome::Resolved(300)
            );
        }

        #[test]
        fn test_service_failure_is_ignored() {
            let processes = base_processes().with_cmdline(10, 1, "cupsd", "/usr/sbin/cupsd -l");
            let services = FakeServices::new().failing(SourceError::unavailable("systemctl", "no bus"));
            let src = sources(processes, vec![], services);
            assert_eq!(
                resolver_outcome(&src, Target::name("cupsd")).unwrap(),
                ResolutionOutcome::Resolved(10)
            );
        }

        #[test]
        fn test_process_listing_failure_surfaces() {
            let processes = base_processes().failing_list(SourceError::AccessDenied {
                what: "/proc".into(),
            });
            let src = sources(processes, vec![], FakeServices::new());
            let err = resolver_outcome(&src, Target::name("cupsd")).unwrap_err();
            assert!(matches!(err, ResolveError::SourceUnavailable(_)));
            assert_eq!(err.exit_code(), 3);
        }

        #[test]
        fn test_resolve_maps_outcomes_to_errors() {
            let src = sources(base_processes(), vec![], FakeServices::new());
            let tables = LaunchTables::default();
            let resolver = Resolver::new(&src, &tables).with_self_pid(SELF_PID);
            let err = resolver.resolve(&Target::name("nothing-like-this")).unwrap_err();
            assert_eq!(
                err,
                ResolveError::NotFound {
                    target: "\"nothing-like-this\"".into()
                }
            );
        }
    }
}
