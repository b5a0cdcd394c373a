//! `ss` socket table (iproute2)
//!
//! `ss -p` names the owning process directly, so owners come back as
//! [`OwnerHandle::Pid`] and no handle cross-referencing is needed.

use crate::command::CommandRunner;
use crate::endpoint::parse_endpoint;
use witr_core::{
    Connection, ListeningSocket, OwnerHandle, SocketTable, SourceResult, TcpState,
};

const COLLABORATOR: &str = "ss";

/// Listening and established TCP sockets via `ss -tnp`
#[derive(Debug, Clone, Default)]
pub struct SsSockets {
    runner: CommandRunner,
}

impl SsSockets {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

impl SocketTable for SsSockets {
    fn name(&self) -> &'static str {
        COLLABORATOR
    }

    fn list_listening_sockets(&self) -> SourceResult<Vec<ListeningSocket>> {
        let out = self.runner.run_ok(COLLABORATOR, "ss", &["-ltnpH"])?;
        Ok(parse_ss(&out)
            .into_iter()
            .filter(|row| row.state == TcpState::Listen)
            .flat_map(|row| {
                let (addr, port) = row.local;
                let owners = if row.pids.is_empty() {
                    vec![None]
                } else {
                    row.pids.into_iter().map(Some).collect()
                };
                owners
                    .into_iter()
                    .map(move |pid| ListeningSocket::tcp(addr, port, pid.map(OwnerHandle::Pid)))
            })
            .collect())
    }

    /// Owners are already PIDs; nothing to cross-reference
    fn list_open_handles(&self, _pid: u32) -> SourceResult<Vec<OwnerHandle>> {
        Ok(Vec::new())
    }

    fn list_connections(&self) -> SourceResult<Vec<Connection>> {
        let out = self.runner.run_ok(COLLABORATOR, "ss", &["-tnpH"])?;
        Ok(parse_ss(&out)
            .into_iter()
            .filter_map(|row| {
                let remote = row.remote?;
                let pid = *row.pids.first()?;
                Some(Connection {
                    pid,
                    local_addr: row.local.0,
                    local_port: row.local.1,
                    remote_addr: remote.0,
                    remote_port: remote.1,
                    state: row.state,
                })
            })
            .collect())
    }
}

/// One parsed line of `ss -tnpH` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsRow {
    pub state: TcpState,
    pub local: (std::net::IpAddr, u16),
    pub remote: Option<(std::net::IpAddr, u16)>,
    pub pids: Vec<u32>,
}

/// Parse headerless `ss` output
///
/// ```text
/// LISTEN 0 511 0.0.0.0:80 0.0.0.0:* users:(("nginx",pid=1201,fd=6),("nginx",pid=1200,fd=6))
/// ```
pub fn parse_ss(output: &str) -> Vec<SsRow> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                return None;
            }
            let state = TcpState::from_name(fields[0])?;
            let local = parse_endpoint(fields[3])?;
            let remote = parse_endpoint(fields[4]);
            let pids = fields
                .get(5..)
                .map(|rest| parse_users(&rest.join(" ")))
                .unwrap_or_default();
            Some(SsRow {
                state,
                local,
                remote,
                pids,
            })
        })
        .collect()
}

/// Extract every `pid=N` from a `users:((...))` column, deduplicated
fn parse_users(users: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = users
        .split("pid=")
        .skip(1)
        .filter_map(|rest| {
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        })
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    const SS_LISTEN: &str = "\
LISTEN 0      511          0.0.0.0:80        0.0.0.0:*    users:((\"nginx\",pid=1201,fd=6),(\"nginx\",pid=1200,fd=6))
LISTEN 0      128        127.0.0.1:5432      0.0.0.0:*    users:((\"postgres\",pid=880,fd=5))
LISTEN 0      4096            [::]:22           [::]:*    users:((\"sshd\",pid=610,fd=4))
LISTEN 0      4096   127.0.0.53%lo:53        0.0.0.0:*
";

    #[test]
    fn test_parse_listeners() {
        let rows = parse_ss(SS_LISTEN);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].local, (IpAddr::V4(Ipv4Addr::UNSPECIFIED), 80));
        assert_eq!(rows[0].pids, vec![1200, 1201]);
        assert_eq!(rows[1].pids, vec![880]);
        assert_eq!(rows[2].local, (IpAddr::V6(Ipv6Addr::UNSPECIFIED), 22));
        assert_eq!(rows[3].local.1, 53);
        assert!(rows[3].pids.is_empty());
    }

    #[test]
    fn test_parse_connections() {
        let out = "ESTAB 0 0 10.0.0.5:22 10.0.0.9:51544 users:((\"sshd\",pid=999,fd=4))\n";
        let rows = parse_ss(out);
        assert_eq!(rows[0].state, TcpState::Established);
        assert_eq!(rows[0].remote.unwrap().1, 51544);
        assert_eq!(rows[0].pids, vec![999]);
    }

    #[test]
    fn test_garbage_lines_are_skipped() {
        assert!(parse_ss("State Recv-Q Send-Q\n\nnonsense\n").is_empty());
    }
}
