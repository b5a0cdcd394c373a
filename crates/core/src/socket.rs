//! Socket records shared by every socket table implementation

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Network protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

/// TCP connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
    DeleteTcb,
}

impl TcpState {
    /// Parse the hex state column of `/proc/net/tcp`
    pub fn from_proc_hex(code: &str) -> Option<Self> {
        let state = match u8::from_str_radix(code, 16).ok()? {
            0x01 => TcpState::Established,
            0x02 => TcpState::SynSent,
            0x03 => TcpState::SynReceived,
            0x04 => TcpState::FinWait1,
            0x05 => TcpState::FinWait2,
            0x06 => TcpState::TimeWait,
            0x07 => TcpState::Closed,
            0x08 => TcpState::CloseWait,
            0x09 => TcpState::LastAck,
            0x0A => TcpState::Listen,
            0x0B => TcpState::Closing,
            _ => return None,
        };
        Some(state)
    }

    /// Parse the numeric MIB_TCP_STATE values used by the IP Helper API
    pub fn from_mib_state(state: u32) -> Self {
        match state {
            1 => TcpState::Closed,
            2 => TcpState::Listen,
            3 => TcpState::SynSent,
            4 => TcpState::SynReceived,
            5 => TcpState::Established,
            6 => TcpState::FinWait1,
            7 => TcpState::FinWait2,
            8 => TcpState::CloseWait,
            9 => TcpState::Closing,
            10 => TcpState::LastAck,
            11 => TcpState::TimeWait,
            12 => TcpState::DeleteTcb,
            _ => TcpState::Closed,
        }
    }

    /// Parse the textual state printed by `ss`, `netstat` and `lsof`
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().trim_matches(|c| c == '(' || c == ')');
        let state = match normalized.to_ascii_uppercase().replace('-', "_").as_str() {
            "LISTEN" => TcpState::Listen,
            "ESTAB" | "ESTABLISHED" => TcpState::Established,
            "SYN_SENT" => TcpState::SynSent,
            "SYN_RECV" | "SYN_RCVD" | "SYN_RECEIVED" => TcpState::SynReceived,
            "FIN_WAIT1" | "FIN_WAIT_1" => TcpState::FinWait1,
            "FIN_WAIT2" | "FIN_WAIT_2" => TcpState::FinWait2,
            "CLOSE_WAIT" => TcpState::CloseWait,
            "CLOSING" => TcpState::Closing,
            "LAST_ACK" => TcpState::LastAck,
            "TIME_WAIT" => TcpState::TimeWait,
            "CLOSE" | "CLOSED" => TcpState::Closed,
            _ => return None,
        };
        Some(state)
    }
}

impl std::fmt::Display for TcpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TcpState::Closed => write!(f, "CLOSED"),
            TcpState::Listen => write!(f, "LISTEN"),
            TcpState::SynSent => write!(f, "SYN_SENT"),
            TcpState::SynReceived => write!(f, "SYN_RCVD"),
            TcpState::Established => write!(f, "ESTABLISHED"),
            TcpState::FinWait1 => write!(f, "FIN_WAIT_1"),
            TcpState::FinWait2 => write!(f, "FIN_WAIT_2"),
            TcpState::CloseWait => write!(f, "CLOSE_WAIT"),
            TcpState::Closing => write!(f, "CLOSING"),
            TcpState::LastAck => write!(f, "LAST_ACK"),
            TcpState::TimeWait => write!(f, "TIME_WAIT"),
            TcpState::DeleteTcb => write!(f, "DELETE_TCB"),
        }
    }
}

/// Whatever a socket table can tell us about who owns a socket
///
/// Procfs knows only the socket inode; tools like `ss` and `lsof` report the PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerHandle {
    /// Kernel socket inode, resolved by scanning process handle tables
    Inode(u64),
    /// Owning process reported directly
    Pid(u32),
}

/// A socket in the LISTEN state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListeningSocket {
    pub protocol: Protocol,
    pub local_addr: IpAddr,
    pub port: u16,
    /// `None` when the table could not attribute the socket (insufficient privileges)
    pub owner: Option<OwnerHandle>,
}

impl ListeningSocket {
    pub fn tcp(local_addr: IpAddr, port: u16, owner: Option<OwnerHandle>) -> Self {
        Self {
            protocol: Protocol::Tcp,
            local_addr,
            port,
            owner,
        }
    }

    /// Bound to 0.0.0.0 or ::
    pub fn is_wildcard(&self) -> bool {
        self.local_addr.is_unspecified()
    }

    /// `addr:port`, with brackets around IPv6 addresses
    pub fn endpoint(&self) -> String {
        format_endpoint(&self.local_addr, self.port)
    }
}

/// An established or otherwise non-listening TCP connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub pid: u32,
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
    pub state: TcpState,
}

pub fn format_endpoint(addr: &IpAddr, port: u16) -> String {
    match addr {
        IpAddr::V4(v4) => format!("{}:{}", v4, port),
        IpAddr::V6(v6) => format!("[{}]:{}", v6, port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_state_parsers() {
        assert_eq!(TcpState::from_proc_hex("0A"), Some(TcpState::Listen));
        assert_eq!(TcpState::from_proc_hex("01"), Some(TcpState::Established));
        assert_eq!(TcpState::from_proc_hex("zz"), None);
        assert_eq!(TcpState::from_mib_state(2), TcpState::Listen);
        assert_eq!(TcpState::from_name("ESTAB"), Some(TcpState::Established));
        assert_eq!(TcpState::from_name("(LISTEN)"), Some(TcpState::Listen));
        assert_eq!(TcpState::from_name("TIME-WAIT"), Some(TcpState::TimeWait));
    }

    #[test]
    fn test_endpoint_formatting() {
        let v4 = ListeningSocket::tcp(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 80, None);
        assert!(v4.is_wildcard());
        assert_eq!(v4.endpoint(), "0.0.0.0:80");

        let v6 = ListeningSocket::tcp(IpAddr::V6(Ipv6Addr::LOCALHOST), 443, None);
        assert!(!v6.is_wildcard());
        assert_eq!(v6.endpoint(), "[::1]:443");
    }
}
