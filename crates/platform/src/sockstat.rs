//! FreeBSD `sockstat` socket table

use crate::command::CommandRunner;
use crate::endpoint::{parse_endpoint, parse_endpoint_v6};
use witr_core::{
    Connection, ListeningSocket, OwnerHandle, SocketTable, SourceResult, TcpState,
};

const COLLABORATOR: &str = "sockstat";

#[derive(Debug, Clone, Default)]
pub struct SockstatSockets {
    runner: CommandRunner,
}

impl SockstatSockets {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

impl SocketTable for SockstatSockets {
    fn name(&self) -> &'static str {
        COLLABORATOR
    }

    fn list_listening_sockets(&self) -> SourceResult<Vec<ListeningSocket>> {
        let out = self
            .runner
            .run_ok(COLLABORATOR, "sockstat", &["-46", "-l", "-P", "tcp"])?;
        Ok(parse_sockstat(&out)
            .into_iter()
            .map(|r| ListeningSocket::tcp(r.local.0, r.local.1, Some(OwnerHandle::Pid(r.pid))))
            .collect())
    }

    fn list_open_handles(&self, _pid: u32) -> SourceResult<Vec<OwnerHandle>> {
        Ok(Vec::new())
    }

    fn list_connections(&self) -> SourceResult<Vec<Connection>> {
        let out = self
            .runner
            .run_ok(COLLABORATOR, "sockstat", &["-46", "-c", "-P", "tcp"])?;
        Ok(parse_sockstat(&out)
            .into_iter()
            .filter_map(|r| {
                let remote = r.remote?;
                Some(Connection {
                    pid: r.pid,
                    local_addr: r.local.0,
                    local_port: r.local.1,
                    remote_addr: remote.0,
                    remote_port: remote.1,
                    state: TcpState::Established,
                })
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SockstatRow {
    pub command: String,
    pub pid: u32,
    pub local: (std::net::IpAddr, u16),
    pub remote: Option<(std::net::IpAddr, u16)>,
}

/// Parse `USER COMMAND PID FD PROTO LOCAL FOREIGN` rows
///
/// Kernel-owned sockets show `?` in the PID column and are skipped.
pub fn parse_sockstat(output: &str) -> Vec<SockstatRow> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 7 || fields[0] == "USER" {
                return None;
            }
            let pid: u32 = fields[2].parse().ok().filter(|p| *p > 0)?;
            let ipv6 = fields[4].ends_with('6');
            let parse = if ipv6 { parse_endpoint_v6 } else { parse_endpoint };
            Some(SockstatRow {
                command: fields[1].to_string(),
                pid,
                local: parse(fields[5])?,
                remote: parse(fields[6]),
            })
        })
        .collect()
}
