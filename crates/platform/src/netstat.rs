//! macOS `netstat -anv` socket table, the fallback when lsof is missing
//!
//! The verbose listing carries the owning PID. Its column set differs between
//! macOS releases, so the PID column is located from the header line.

use crate::command::CommandRunner;
use crate::endpoint::parse_dotted_endpoint;
use witr_core::{
    Connection, ListeningSocket, OwnerHandle, SocketTable, SourceResult, TcpState,
};

const COLLABORATOR: &str = "netstat";

/// Column of the PID in data rows when no header is recognized
const DEFAULT_PID_COLUMN: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct NetstatSockets {
    runner: CommandRunner,
}

impl NetstatSockets {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    fn rows(&self) -> SourceResult<Vec<NetstatRow>> {
        let out = self
            .runner
            .run_ok(COLLABORATOR, "netstat", &["-anv", "-p", "tcp"])?;
        Ok(parse_netstat(&out))
    }
}

impl SocketTable for NetstatSockets {
    fn name(&self) -> &'static str {
        COLLABORATOR
    }

    fn list_listening_sockets(&self) -> SourceResult<Vec<ListeningSocket>> {
        Ok(self
            .rows()?
            .into_iter()
            .filter(|r| r.state == TcpState::Listen)
            .map(|r| ListeningSocket::tcp(r.local.0, r.local.1, r.pid.map(OwnerHandle::Pid)))
            .collect())
    }

    fn list_open_handles(&self, _pid: u32) -> SourceResult<Vec<OwnerHandle>> {
        Ok(Vec::new())
    }

    fn list_connections(&self) -> SourceResult<Vec<Connection>> {
        Ok(self
            .rows()?
            .into_iter()
            .filter_map(|r| {
                let remote = r.remote?;
                Some(Connection {
                    pid: r.pid?,
                    local_addr: r.local.0,
                    local_port: r.local.1,
                    remote_addr: remote.0,
                    remote_port: remote.1,
                    state: r.state,
                })
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetstatRow {
    pub local: (std::net::IpAddr, u16),
    pub remote: Option<(std::net::IpAddr, u16)>,
    pub state: TcpState,
    pub pid: Option<u32>,
}

pub fn parse_netstat(output: &str) -> Vec<NetstatRow> {
    let mut pid_column = DEFAULT_PID_COLUMN;
    let mut rows = Vec::new();

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.first() == Some(&"Proto") {
            // "Local Address" and "Foreign Address" are two header words each
            if let Some(idx) = fields
                .iter()
                .position(|f| *f == "pid" || *f == "process:pid")
            {
                pid_column = idx.saturating_sub(2);
            }
            continue;
        }
        let Some(proto) = fields.first() else {
            continue;
        };
        if !proto.starts_with("tcp") || fields.len() < 6 {
            continue;
        }
        let ipv6 = *proto == "tcp6";
        let Some(local) = parse_dotted_endpoint(fields[3], ipv6) else {
            continue;
        };
        let Some(state) = TcpState::from_name(fields[5]) else {
            continue;
        };
        let pid = fields.get(pid_column).and_then(|v| {
            let v = v.rsplit(':').next().unwrap_or(v);
            v.parse().ok().filter(|pid: &u32| *pid > 0)
        });
        rows.push(NetstatRow {
            local,
            remote: parse_dotted_endpoint(fields[4], ipv6),
            state,
            pid,
        });
    }
    rows
}
