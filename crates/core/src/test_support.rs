//! In-memory sources for unit tests

use crate::error::{SourceError, SourceResult};
use crate::models::{ProcessFacts, ProcessRecord};
use crate::socket::{Connection, ListeningSocket, OwnerHandle};
use crate::sources::{ProcessTable, ServiceManager, SocketTable, Sources};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
pub struct FakeProcesses {
    records: BTreeMap<u32, ProcessRecord>,
    list_error: Option<SourceError>,
}

impl FakeProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, pid: u32, ppid: u32, command: &str) -> Self {
        self.with_cmdline(pid, ppid, command, command)
    }

    pub fn with_cmdline(self, pid: u32, ppid: u32, command: &str, cmdline: &str) -> Self {
        self.with_record(ProcessRecord::new(pid, ppid, command, cmdline))
    }

    pub fn with_facts(self, pid: u32, ppid: u32, command: &str, facts: ProcessFacts) -> Self {
        let mut record = ProcessRecord::new(pid, ppid, command, command);
        record.facts = facts;
        self.with_record(record)
    }

    pub fn with_record(mut self, record: ProcessRecord) -> Self {
        self.records.insert(record.pid, record);
        self
    }

    pub fn failing_list(mut self, error: SourceError) -> Self {
        self.list_error = Some(error);
        self
    }
}

impl ProcessTable for FakeProcesses {
    fn name(&self) -> &'static str {
        "fake-processes"
    }

    fn read_process(&self, pid: u32) -> SourceResult<ProcessRecord> {
        self.records
            .get(&pid)
            .cloned()
            .ok_or(SourceError::ProcessNotFound { pid })
    }

    fn list_processes(&self) -> SourceResult<Vec<ProcessRecord>> {
        match &self.list_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.records.values().cloned().collect()),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct FakeSockets {
    name: &'static str,
    listeners: Vec<ListeningSocket>,
    handles: HashMap<u32, Vec<OwnerHandle>>,
    connections: Vec<Connection>,
    error: Option<SourceError>,
    listings: Arc<AtomicUsize>,
}

impl FakeSockets {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    pub fn listen(mut self, addr: &str, port: u16, owner: Option<OwnerHandle>) -> Self {
        let addr: IpAddr = addr.parse().unwrap();
        self.listeners.push(ListeningSocket::tcp(addr, port, owner));
        self
    }

    pub fn handles(mut self, pid: u32, handles: Vec<OwnerHandle>) -> Self {
        self.handles.insert(pid, handles);
        self
    }

    pub fn connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    pub fn failing(mut self, error: SourceError) -> Self {
        self.error = Some(error);
        self
    }

    /// Shared count of `list_listening_sockets` calls, readable after boxing
    pub fn listing_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.listings)
    }
}

impl SocketTable for FakeSockets {
    fn name(&self) -> &'static str {
        self.name
    }

    fn list_listening_sockets(&self) -> SourceResult<Vec<ListeningSocket>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(self.listeners.clone()),
        }
    }

    fn list_open_handles(&self, pid: u32) -> SourceResult<Vec<OwnerHandle>> {
        self.handles
            .get(&pid)
            .cloned()
            .ok_or(SourceError::AccessDenied {
                what: format!("handles of {}", pid),
            })
    }

    fn list_connections(&self) -> SourceResult<Vec<Connection>> {
        Ok(self.connections.clone())
    }
}

#[derive(Debug, Default, Clone)]
pub struct FakeServices {
    units: HashMap<String, u32>,
    error: Option<SourceError>,
}

impl FakeServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, label: &str, pid: u32) -> Self {
        self.units.insert(label.to_string(), pid);
        self
    }

    pub fn failing(mut self, error: SourceError) -> Self {
        self.error = Some(error);
        self
    }
}

impl ServiceManager for FakeServices {
    fn name(&self) -> &'static str {
        "fake-services"
    }

    fn find_service_main_pid(&self, label: &str) -> SourceResult<Option<u32>> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(self.units.get(label).copied()),
        }
    }
}

pub fn sources(processes: FakeProcesses, sockets: Vec<FakeSockets>, services: FakeServices) -> Sources {
    Sources::new(
        Box::new(processes),
        sockets
            .into_iter()
            .map(|s| Box::new(s) as Box<dyn SocketTable>)
            .collect(),
        Box::new(services),
    )
}
