//! `lsof` socket table
//!
//! Uses lsof's machine-readable field output (`-F`), one field per line:
//! `p` starts a process set, `f` a file within it, `t` is the address
//! family, `n` the endpoint and `TST=` the TCP state.

use crate::command::{CommandOutput, CommandRunner};
use crate::endpoint::{parse_endpoint, parse_endpoint_v6};
use std::net::IpAddr;
use witr_core::{
    Connection, ListeningSocket, OwnerHandle, SocketTable, SourceError, SourceResult, TcpState,
};

const COLLABORATOR: &str = "lsof";

#[derive(Debug, Clone, Default)]
pub struct LsofSockets {
    runner: CommandRunner,
}

impl LsofSockets {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    fn query(&self, args: &[&str]) -> SourceResult<String> {
        let output = self.runner.run(COLLABORATOR, "lsof", args)?;
        accept_output(output)
    }
}

/// lsof exits 1 both when nothing matched and on real errors; only the
/// latter write to stderr
fn accept_output(output: CommandOutput) -> SourceResult<String> {
    let stderr = output.stderr.trim();
    if output.success || stderr.is_empty() {
        return Ok(output.stdout);
    }
    // Warnings about unreadable mounts come with usable output
    if !output.stdout.is_empty() {
        return Ok(output.stdout);
    }
    Err(SourceError::unavailable(COLLABORATOR, stderr))
}

impl SocketTable for LsofSockets {
    fn name(&self) -> &'static str {
        COLLABORATOR
    }

    fn list_listening_sockets(&self) -> SourceResult<Vec<ListeningSocket>> {
        let out = self.query(&["-nP", "-iTCP", "-sTCP:LISTEN", "-F", "ptn"])?;
        Ok(parse_lsof_fields(&out)
            .into_iter()
            .filter(|f| f.remote.is_none())
            .map(|f| ListeningSocket::tcp(f.local.0, f.local.1, Some(OwnerHandle::Pid(f.pid))))
            .collect())
    }

    fn list_open_handles(&self, _pid: u32) -> SourceResult<Vec<OwnerHandle>> {
        Ok(Vec::new())
    }

    fn list_connections(&self) -> SourceResult<Vec<Connection>> {
        let out = self.query(&["-nP", "-iTCP", "-F", "ptnT"])?;
        Ok(parse_lsof_fields(&out)
            .into_iter()
            .filter_map(|f| {
                let remote = f.remote?;
                Some(Connection {
                    pid: f.pid,
                    local_addr: f.local.0,
                    local_port: f.local.1,
                    remote_addr: remote.0,
                    remote_port: remote.1,
                    state: f.state.unwrap_or(TcpState::Established),
                })
            })
            .collect())
    }
}

/// One socket file from lsof field output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsofFile {
    pub pid: u32,
    pub local: (IpAddr, u16),
    pub remote: Option<(IpAddr, u16)>,
    pub state: Option<TcpState>,
}

#[derive(Default)]
struct Pending {
    ipv6: bool,
    name: Option<String>,
    state: Option<TcpState>,
}

impl Pending {
    fn finish(self, pid: Option<u32>) -> Option<LsofFile> {
        let pid = pid?;
        let name = self.name?;
        let parse = |s: &str| {
            if self.ipv6 {
                parse_endpoint_v6(s)
            } else {
                parse_endpoint(s)
            }
        };
        let (local, remote) = match name.split_once("->") {
            Some((l, r)) => (parse(l)?, Some(parse(r)?)),
            None => (parse(&name)?, None),
        };
        Some(LsofFile {
            pid,
            local,
            remote,
            state: self.state,
        })
    }
}

pub fn parse_lsof_fields(output: &str) -> Vec<LsofFile> {
    let mut files = Vec::new();
    let mut pid: Option<u32> = None;
    let mut pending = Pending::default();

    for line in output.lines() {
        let Some(tag) = line.chars().next() else {
            continue;
        };
        let value = &line[tag.len_utf8()..];
        match tag {
            'p' => {
                files.extend(std::mem::take(&mut pending).finish(pid));
                pid = value.parse().ok();
            }
            'f' => files.extend(std::mem::take(&mut pending).finish(pid)),
            't' => pending.ipv6 = value == "IPv6",
            'n' => pending.name = Some(value.to_string()),
            'T' => {
                if let Some(state) = value.strip_prefix("ST=") {
                    pending.state = TcpState::from_name(state);
                }
            }
            _ => {}
        }
    }
    files.extend(pending.finish(pid));
    files
}
