//! Linux `/proc` process and socket tables
//!
//! Built on the `procfs` crate. The root is configurable so tests can point
//! it at a fake tree.

use procfs::net::{TcpNetEntries, TcpNetEntry, TcpState as NetTcpState};
use procfs::process::{all_processes_with_root, FDTarget, Process};
use procfs::{FromReadSI, ProcError, ProcessCGroup};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use time::OffsetDateTime;
use tracing::{debug, trace};
use witr_core::{
    Connection, ListeningSocket, OwnerHandle, ProcessFacts, ProcessRecord, ProcessState,
    ProcessTable, Protocol, SocketTable, SourceError, SourceResult, TcpState,
};

use crate::users::UserTable;

const COLLABORATOR: &str = "procfs";

/// Process and socket tables backed by a procfs mount
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
    /// Seconds since the epoch at boot
    boot_time: Option<u64>,
    ticks_per_second: u64,
    users: OnceLock<UserTable>,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcFs {
    /// The live `/proc`
    pub fn new() -> Self {
        let boot_time = procfs::boot_time_secs()
            .map_err(|e| debug!(error = %e, "Boot time unavailable"))
            .ok();
        Self {
            boot_time,
            ..Self::with_root("/proc")
        }
    }

    /// A procfs tree rooted elsewhere (fixtures, a host mount inside a container)
    ///
    /// Start times stay unknown until [`with_boot_time`](Self::with_boot_time).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            boot_time: None,
            ticks_per_second: procfs::ticks_per_second().max(1),
            users: OnceLock::new(),
        }
    }

    pub fn with_boot_time(mut self, secs: u64) -> Self {
        self.boot_time = Some(secs);
        self
    }

    /// Use this user table instead of the system's
    pub fn with_users(self, users: UserTable) -> Self {
        let _ = self.users.set(users);
        self
    }

    pub fn is_available(&self) -> bool {
        self.root.join("self").exists() || self.root.join("1").join("stat").exists()
    }

    fn users(&self) -> &UserTable {
        self.users.get_or_init(UserTable::load)
    }

    fn process(&self, pid: u32) -> SourceResult<Process> {
        Process::new_with_root(self.root.join(pid.to_string())).map_err(|e| map_proc_error(e, Some(pid)))
    }

    /// Every readable process, PID ascending
    fn processes(&self) -> SourceResult<Vec<Process>> {
        let mut processes: Vec<Process> = all_processes_with_root(&self.root)
            .map_err(|e| map_proc_error(e, None))?
            .filter_map(|p| p.map_err(|e| trace!(error = %e, "Skipping process")).ok())
            .collect();
        processes.sort_by_key(|p| p.pid());
        Ok(processes)
    }

    fn record(&self, process: &Process) -> SourceResult<ProcessRecord> {
        let pid = process.pid() as u32;
        let stat = process.stat().map_err(|e| map_proc_error(e, Some(pid)))?;
        let cmdline = process.cmdline().map(|argv| argv.join(" ")).unwrap_or_default();

        let mut record = ProcessRecord::new(pid, stat.ppid.max(0) as u32, stat.comm, cmdline);
        record.state = ProcessState::from_code(&stat.state.to_string());

        let uid = process.status().ok().map(|status| status.ruid);
        let (container, service_unit) = process
            .cgroups()
            .map(|groups| cgroup_facts(&groups.0))
            .unwrap_or_default();
        record.facts = ProcessFacts {
            exe: process.exe().ok().map(|p| p.display().to_string()),
            uid,
            user: uid.and_then(|uid| self.users().name(uid)),
            started_at: self.started_at(stat.starttime),
            working_dir: process.cwd().ok().map(|p| p.display().to_string()),
            container,
            service_unit,
        };
        Ok(record)
    }

    fn started_at(&self, start_ticks: u64) -> Option<OffsetDateTime> {
        let secs = self.boot_time? + start_ticks / self.ticks_per_second;
        OffsetDateTime::from_unix_timestamp(i64::try_from(secs).ok()?).ok()
    }

    fn socket_inodes(process: &Process) -> SourceResult<Vec<u64>> {
        let pid = process.pid() as u32;
        let fds = process.fd().map_err(|e| map_proc_error(e, Some(pid)))?;
        Ok(fds
            .filter_map(Result::ok)
            .filter_map(|fd| match fd.target {
                FDTarget::Socket(inode) => Some(inode),
                _ => None,
            })
            .collect())
    }

    fn net_entries(&self) -> SourceResult<Vec<TcpNetEntry>> {
        let net = self.root.join("net");
        let mut entries = read_tcp_table(&net.join("tcp"))?;
        // IPv6 may be disabled
        if let Ok(v6) = read_tcp_table(&net.join("tcp6")) {
            entries.extend(v6);
        }
        Ok(entries)
    }
}

impl ProcessTable for ProcFs {
    fn name(&self) -> &'static str {
        COLLABORATOR
    }

    fn read_process(&self, pid: u32) -> SourceResult<ProcessRecord> {
        self.record(&self.process(pid)?)
    }

    fn list_processes(&self) -> SourceResult<Vec<ProcessRecord>> {
        let mut records = Vec::new();
        for process in self.processes()? {
            match self.record(&process) {
                Ok(record) => records.push(record),
                Err(e) => trace!(pid = process.pid(), error = %e, "Skipping process"),
            }
        }
        Ok(records)
    }
}

impl SocketTable for ProcFs {
    fn name(&self) -> &'static str {
        COLLABORATOR
    }

    fn list_listening_sockets(&self) -> SourceResult<Vec<ListeningSocket>> {
        Ok(self
            .net_entries()?
            .into_iter()
            .filter(|e| e.state == NetTcpState::Listen)
            .map(|e| ListeningSocket {
                protocol: Protocol::Tcp,
                local_addr: e.local_address.ip(),
                port: e.local_address.port(),
                owner: (e.inode != 0).then_some(OwnerHandle::Inode(e.inode)),
            })
            .collect())
    }

    fn list_open_handles(&self, pid: u32) -> SourceResult<Vec<OwnerHandle>> {
        Ok(Self::socket_inodes(&self.process(pid)?)?
            .into_iter()
            .map(OwnerHandle::Inode)
            .collect())
    }

    fn list_connections(&self) -> SourceResult<Vec<Connection>> {
        let entries: Vec<TcpNetEntry> = self
            .net_entries()?
            .into_iter()
            .filter(|e| e.state != NetTcpState::Listen && e.inode != 0)
            .collect();
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut owner_of: HashMap<u64, u32> = HashMap::new();
        for process in self.processes()? {
            if let Ok(inodes) = Self::socket_inodes(&process) {
                for inode in inodes {
                    owner_of.entry(inode).or_insert(process.pid() as u32);
                }
            }
        }

        Ok(entries
            .into_iter()
            .filter_map(|e| {
                let pid = *owner_of.get(&e.inode)?;
                Some(Connection {
                    pid,
                    local_addr: e.local_address.ip(),
                    local_port: e.local_address.port(),
                    remote_addr: e.remote_address.ip(),
                    remote_port: e.remote_address.port(),
                    state: tcp_state(&e.state),
                })
            })
            .collect())
    }
}

fn read_tcp_table(path: &Path) -> SourceResult<Vec<TcpNetEntry>> {
    TcpNetEntries::from_file(path, procfs::current_system_info())
        .map(|entries| entries.0)
        .map_err(|e| SourceError::unavailable(COLLABORATOR, format!("{}: {}", path.display(), e)))
}

fn map_proc_error(e: ProcError, pid: Option<u32>) -> SourceError {
    match (e, pid) {
        (ProcError::NotFound(_), Some(pid)) => SourceError::ProcessNotFound { pid },
        (ProcError::PermissionDenied(path), _) => SourceError::AccessDenied {
            what: path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| COLLABORATOR.to_string()),
        },
        (other, _) => SourceError::unavailable(COLLABORATOR, other),
    }
}

fn tcp_state(state: &NetTcpState) -> TcpState {
    match state {
        NetTcpState::Established => TcpState::Established,
        NetTcpState::SynSent => TcpState::SynSent,
        NetTcpState::SynRecv => TcpState::SynReceived,
        NetTcpState::FinWait1 => TcpState::FinWait1,
        NetTcpState::FinWait2 => TcpState::FinWait2,
        NetTcpState::TimeWait => TcpState::TimeWait,
        NetTcpState::Close => TcpState::Closed,
        NetTcpState::CloseWait => TcpState::CloseWait,
        NetTcpState::LastAck => TcpState::LastAck,
        NetTcpState::Listen => TcpState::Listen,
        NetTcpState::Closing => TcpState::Closing,
        // NEW_SYN_RECV
        _ => TcpState::SynReceived,
    }
}

/// Container runtime signature and service unit of one process
///
/// The unit comes from the unified hierarchy, or from the v1 `name=systemd`
/// controller when there is none.
pub fn cgroup_facts(groups: &[ProcessCGroup]) -> (Option<String>, Option<String>) {
    let container = groups
        .iter()
        .find_map(|g| container_runtime(&g.pathname))
        .map(str::to_string);
    let systemd_path = groups
        .iter()
        .find(|g| g.hierarchy == 0)
        .or_else(|| {
            groups
                .iter()
                .find(|g| g.controllers.iter().any(|c| c == "name=systemd"))
        })
        .map(|g| g.pathname.as_str());
    (container, systemd_path.and_then(service_unit))
}

/// Runtime whose container payload lives in this control group
///
/// Only payload groups count. The runtime's own daemons (`docker.service`,
/// `containerd.service`, `libpod-conmon-*.scope`) are host processes.
pub fn container_runtime(path: &str) -> Option<&'static str> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.iter().any(|s| s.starts_with("kubepods")) {
        return Some("kubernetes");
    }

    for (i, segment) in segments.iter().enumerate() {
        if segment.ends_with(".service") {
            continue;
        }
        if let Some(scope) = segment.strip_suffix(".scope") {
            if scope.starts_with("docker-") {
                return Some("docker");
            }
            if scope.starts_with("cri-containerd-") {
                return Some("containerd");
            }
            if scope.starts_with("crio-") && !scope.starts_with("crio-conmon-") {
                return Some("cri-o");
            }
            if scope.starts_with("libpod-") && !scope.starts_with("libpod-conmon-") {
                return Some("podman");
            }
            continue;
        }
        if segment.starts_with("lxc.payload") {
            return Some("lxc");
        }
        // cgroupfs driver: /docker/<id>, /lxc/<name>
        let has_child = i + 1 < segments.len();
        match *segment {
            "docker" if has_child => return Some("docker"),
            "lxc" if has_child => return Some("lxc"),
            _ => {}
        }
    }
    None
}

/// Innermost `*.service` unit, ignoring the per-user manager
pub fn service_unit(path: &str) -> Option<String> {
    path.split('/')
        .filter(|c| c.ends_with(".service") && !c.starts_with("user@"))
        .last()
        .map(str::to_string)
}
