//! Read-only interfaces to the operating system
//!
//! The resolver, walker and report builder only ever see these traits. Each
//! platform provides one implementation per trait (see `witr-platform`).

use crate::error::SourceResult;
use crate::models::ProcessRecord;
use crate::socket::{Connection, ListeningSocket, OwnerHandle};

/// Process Table Source
pub trait ProcessTable: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Read one process; `SourceError::ProcessNotFound` when it does not exist
    fn read_process(&self, pid: u32) -> SourceResult<ProcessRecord>;

    /// Snapshot of every visible process
    fn list_processes(&self) -> SourceResult<Vec<ProcessRecord>>;
}

/// Socket Table Source
pub trait SocketTable: Send + Sync {
    fn name(&self) -> &'static str;

    /// TCP sockets in LISTEN state
    fn list_listening_sockets(&self) -> SourceResult<Vec<ListeningSocket>>;

    /// Socket handles held open by `pid`
    ///
    /// Only consulted for sockets whose owner is an [`OwnerHandle::Inode`].
    fn list_open_handles(&self, pid: u32) -> SourceResult<Vec<OwnerHandle>>;

    /// Active connections with their remote endpoints
    fn list_connections(&self) -> SourceResult<Vec<Connection>> {
        Ok(Vec::new())
    }
}

/// Service Manager Source
pub trait ServiceManager: Send + Sync {
    fn name(&self) -> &'static str;

    /// Leading PID of a running unit, `Ok(None)` when the unit is absent or stopped
    fn find_service_main_pid(&self, label: &str) -> SourceResult<Option<u32>>;
}

/// A service manager for platforms that have none we can query
#[derive(Debug, Default, Clone, Copy)]
pub struct NoServiceManager;

impl ServiceManager for NoServiceManager {
    fn name(&self) -> &'static str {
        "none"
    }

    fn find_service_main_pid(&self, _label: &str) -> SourceResult<Option<u32>> {
        Ok(None)
    }
}

/// The collaborators for one query
pub struct Sources {
    pub processes: Box<dyn ProcessTable>,
    /// Primary first, then fallbacks in order
    pub sockets: Vec<Box<dyn SocketTable>>,
    pub services: Box<dyn ServiceManager>,
}

impl Sources {
    pub fn new(
        processes: Box<dyn ProcessTable>,
        sockets: Vec<Box<dyn SocketTable>>,
        services: Box<dyn ServiceManager>,
    ) -> Self {
        Self {
            processes,
            sockets,
            services,
        }
    }

    /// Keep only the primary socket table
    pub fn without_fallback(mut self) -> Self {
        self.sockets.truncate(1);
        self
    }
}

impl std::fmt::Debug for Sources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sources")
            .field("processes", &self.processes.name())
            .field(
                "sockets",
                &self.sockets.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("services", &self.services.name())
            .finish()
    }
}
