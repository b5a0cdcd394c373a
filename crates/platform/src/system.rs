//! `sysinfo` process table for macOS and the BSDs

use std::sync::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};
use time::OffsetDateTime;
use witr_core::{ProcessFacts, ProcessRecord, ProcessState, ProcessTable, SourceError, SourceResult};

use crate::users::UserTable;

const COLLABORATOR: &str = "sysinfo";

#[derive(Debug)]
pub struct SystemProcessTable {
    system: Mutex<System>,
    users: UserTable,
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            users: UserTable::load(),
        }
    }

    fn refresh_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::nothing()
            .with_cmd(UpdateKind::OnlyIfNotSet)
            .with_exe(UpdateKind::OnlyIfNotSet)
            .with_cwd(UpdateKind::OnlyIfNotSet)
            .with_user(UpdateKind::OnlyIfNotSet)
    }

    fn record(&self, process: &sysinfo::Process) -> ProcessRecord {
        let cmdline = process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        let mut record = ProcessRecord::new(
            process.pid().as_u32(),
            process.parent().map(Pid::as_u32).unwrap_or(0),
            process.name().to_string_lossy().into_owned(),
            cmdline,
        );
        record.state = process_state(process.status());

        let uid = process.user_id().map(|uid| **uid);
        record.facts = ProcessFacts {
            exe: process.exe().map(|p| p.display().to_string()),
            uid,
            user: uid.and_then(|uid| self.users.name(uid)),
            started_at: started_at(process.start_time()),
            working_dir: process.cwd().map(|p| p.display().to_string()),
            ..ProcessFacts::default()
        };
        record
    }
}

impl ProcessTable for SystemProcessTable {
    fn name(&self) -> &'static str {
        COLLABORATOR
    }

    fn read_process(&self, pid: u32) -> SourceResult<ProcessRecord> {
        let mut system = self
            .system
            .lock()
            .map_err(|e| SourceError::unavailable(COLLABORATOR, e.to_string()))?;
        let target = Pid::from_u32(pid);
        system.refresh_processes_specifics(ProcessesToUpdate::Some(&[target]), true, Self::refresh_kind());
        system
            .process(target)
            .map(|process| self.record(process))
            .ok_or(SourceError::ProcessNotFound { pid })
    }

    fn list_processes(&self) -> SourceResult<Vec<ProcessRecord>> {
        let mut system = self
            .system
            .lock()
            .map_err(|e| SourceError::unavailable(COLLABORATOR, e.to_string()))?;
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, Self::refresh_kind());
        let mut records: Vec<ProcessRecord> = system
            .processes()
            .values()
            // Linux threads show up as tasks of their process
            .filter(|process| process.thread_kind().is_none())
            .map(|process| self.record(process))
            .collect();
        records.sort_by_key(|r| r.pid);
        Ok(records)
    }
}

fn process_state(status: ProcessStatus) -> ProcessState {
    match status {
        ProcessStatus::Run => ProcessState::Running,
        ProcessStatus::Sleep => ProcessState::Sleeping,
        ProcessStatus::Idle => ProcessState::Idle,
        ProcessStatus::Stop | ProcessStatus::Tracing => ProcessState::Stopped,
        ProcessStatus::Zombie => ProcessState::Zombie,
        ProcessStatus::Dead => ProcessState::Dead,
        ProcessStatus::UninterruptibleDiskSleep => ProcessState::DiskSleep,
        _ => ProcessState::Unknown,
    }
}

/// `sysinfo` reports 0 when the start time is unknown
fn started_at(epoch_secs: u64) -> Option<OffsetDateTime> {
    if epoch_secs == 0 {
        return None;
    }
    OffsetDateTime::from_unix_timestamp(i64::try_from(epoch_secs).ok()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_state() {
        assert_eq!(process_state(ProcessStatus::Run), ProcessState::Running);
        assert_eq!(process_state(ProcessStatus::Tracing), ProcessState::Stopped);
        assert_eq!(process_state(ProcessStatus::UninterruptibleDiskSleep), ProcessState::DiskSleep);
        assert_eq!(process_state(ProcessStatus::Unknown(42)), ProcessState::Unknown);
    }

    #[test]
    fn test_started_at() {
        assert_eq!(started_at(0), None);
        assert_eq!(started_at(1_700_000_000).map(|t| t.unix_timestamp()), Some(1_700_000_000));
    }

    #[test]
    #[ignore] // Reads the live process table
    fn test_reads_self() {
        let table = SystemProcessTable::new();
        let pid = std::process::id();
        let record = table.read_process(pid).unwrap();
        assert_eq!(record.pid, pid);
        assert_eq!(record.ppid, std::os::unix::process::parent_id());
        assert!(record.facts.started_at.is_some());
        assert!(table.list_processes().unwrap().iter().any(|r| r.pid == pid));
    }

    #[test]
    fn test_unknown_pid_is_not_found() {
        let table = SystemProcessTable {
            system: Mutex::new(System::new()),
            users: UserTable::default(),
        };
        assert!(table.read_process(u32::MAX - 1).unwrap_err().is_not_found());
    }
}
