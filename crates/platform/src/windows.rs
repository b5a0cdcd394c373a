//! Windows sources: Toolhelp process snapshot, IP Helper TCP tables and the
//! Service Control Manager

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use time::OffsetDateTime;
use tracing::{debug, trace};
use windows::core::PWSTR;
use windows::Win32::Foundation::{CloseHandle, FILETIME, HANDLE};
use windows::Win32::NetworkManagement::IpHelper::{
    GetExtendedTcpTable, MIB_TCP6TABLE_OWNER_PID, MIB_TCPTABLE_OWNER_PID, TCP_TABLE_OWNER_PID_ALL,
};
use windows::Win32::Networking::WinSock::{AF_INET, AF_INET6};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Services::{
    CloseServiceHandle, EnumServicesStatusExW, OpenSCManagerW, ENUM_SERVICE_STATUS_PROCESSW,
    SC_ENUM_PROCESS_INFO, SC_HANDLE, SC_MANAGER_ENUMERATE_SERVICE, SERVICE_STATE_ALL, SERVICE_WIN32,
};
use windows::Win32::System::Threading::{
    GetProcessTimes, OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
    PROCESS_QUERY_LIMITED_INFORMATION,
};
use witr_core::{
    Connection, ListeningSocket, OwnerHandle, ProcessRecord, ProcessState,
    ProcessTable, ServiceManager, SocketTable, SourceError, SourceResult, TcpState,
};

const E_ACCESS_DENIED: u32 = 0x8007_0005;
/// SERVICE_RUNNING
const SERVICE_RUNNING: u32 = 4;
/// 100ns ticks between 1601-01-01 and 1970-01-01
const FILETIME_EPOCH_DIFF: u64 = 116_444_736_000_000_000;

/// Closes a kernel handle on drop
struct SafeHandle(HANDLE);

impl Drop for SafeHandle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }
}

struct ScHandle(SC_HANDLE);

impl Drop for ScHandle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CloseServiceHandle(self.0);
            }
        }
    }
}

fn wchar_to_string(wchars: &[u16]) -> String {
    let len = wchars.iter().position(|&c| c == 0).unwrap_or(wchars.len());
    String::from_utf16_lossy(&wchars[..len])
}

fn pwstr_to_string(p: PWSTR) -> String {
    if p.is_null() {
        return String::new();
    }
    unsafe { p.to_string().unwrap_or_default() }
}

fn api_error(collaborator: &'static str, api: &str, e: windows::core::Error) -> SourceError {
    SourceError::unavailable(collaborator, format!("{} failed: {}", api, e.message()))
}

/// Process table from a Toolhelp snapshot, enriched per process where the
/// process can be opened
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolhelpProcessTable;

impl ToolhelpProcessTable {
    fn snapshot() -> SourceResult<Vec<ProcessRecord>> {
        let mut records = Vec::new();
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)
                .map_err(|e| api_error("toolhelp", "CreateToolhelp32Snapshot", e))?;
            let _handle = SafeHandle(snapshot);

            let mut entry = PROCESSENTRY32W {
                dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };
            if Process32FirstW(snapshot, &mut entry).is_ok() {
                loop {
                    let command = wchar_to_string(&entry.szExeFile);
                    let mut record =
                        ProcessRecord::new(entry.th32ProcessID, entry.th32ParentProcessID, command, String::new());
                    record.state = ProcessState::Running;
                    records.push(record);
                    if Process32NextW(snapshot, &mut entry).is_err() {
                        break;
                    }
                }
            }
        }
        Ok(records)
    }

    /// Image path and start time; either may be denied for protected processes
    fn enrich(record: &mut ProcessRecord) {
        let pid = record.pid;
        let handle = match unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) } {
            Ok(h) => SafeHandle(h),
            Err(e) => {
                trace!(pid, error = %e.message(), "Cannot open process");
                return;
            }
        };

        let mut buffer = [0u16; 1024];
        let mut size = buffer.len() as u32;
        let image = unsafe {
            QueryFullProcessImageNameW(handle.0, PROCESS_NAME_WIN32, PWSTR(buffer.as_mut_ptr()), &mut size)
        };
        if image.is_ok() {
            let path = String::from_utf16_lossy(&buffer[..size as usize]);
            record.cmdline = path.clone();
            record.facts.exe = Some(path);
        }

        let mut creation = FILETIME::default();
        let mut exit = FILETIME::default();
        let mut kernel = FILETIME::default();
        let mut user = FILETIME::default();
        let times = unsafe { GetProcessTimes(handle.0, &mut creation, &mut exit, &mut kernel, &mut user) };
        if times.is_ok() {
            record.facts.started_at = filetime_to_datetime(&creation);
        }
    }
}

fn filetime_to_datetime(ft: &FILETIME) -> Option<OffsetDateTime> {
    let ticks = (ft.dwHighDateTime as u64) << 32 | ft.dwLowDateTime as u64;
    let unix_ticks = ticks.checked_sub(FILETIME_EPOCH_DIFF)?;
    let secs = (unix_ticks / 10_000_000) as i64;
    let nanos = ((unix_ticks % 10_000_000) * 100) as i64;
    OffsetDateTime::from_unix_timestamp(secs)
        .ok()
        .map(|dt| dt + time::Duration::nanoseconds(nanos))
}

impl ProcessTable for ToolhelpProcessTable {
    fn name(&self) -> &'static str {
        "toolhelp"
    }

    fn read_process(&self, pid: u32) -> SourceResult<ProcessRecord> {
        let mut record = Self::snapshot()?
            .into_iter()
            .find(|r| r.pid == pid)
            .ok_or(SourceError::ProcessNotFound { pid })?;
        Self::enrich(&mut record);
        Ok(record)
    }

    fn list_processes(&self) -> SourceResult<Vec<ProcessRecord>> {
        let mut records = Self::snapshot()?;
        for record in &mut records {
            Self::enrich(record);
        }
        Ok(records)
    }
}

/// One row of the owner-PID TCP tables
struct TcpRow {
    pid: u32,
    local: (IpAddr, u16),
    remote: (IpAddr, u16),
    state: TcpState,
}

/// TCP tables from `GetExtendedTcpTable`; every row names its owning PID
#[derive(Debug, Clone, Copy, Default)]
pub struct IpHelperSockets;

impl IpHelperSockets {
    fn table(family: u32) -> SourceResult<Vec<u8>> {
        unsafe {
            let mut size = 0u32;
            let _ = GetExtendedTcpTable(None, &mut size, false, family, TCP_TABLE_OWNER_PID_ALL, 0);
            if size == 0 {
                return Ok(Vec::new());
            }
            let mut buffer: Vec<u8> = vec![0; size as usize];
            let result = GetExtendedTcpTable(
                Some(buffer.as_mut_ptr() as *mut _),
                &mut size,
                false,
                family,
                TCP_TABLE_OWNER_PID_ALL,
                0,
            );
            if result != 0 {
                return Err(SourceError::unavailable(
                    "iphelper",
                    format!("GetExtendedTcpTable failed with code {}", result),
                ));
            }
            Ok(buffer)
        }
    }

    fn rows() -> SourceResult<Vec<TcpRow>> {
        let mut rows = Vec::new();

        let v4 = Self::table(AF_INET.0 as u32)?;
        if !v4.is_empty() {
            unsafe {
                let table = &*(v4.as_ptr() as *const MIB_TCPTABLE_OWNER_PID);
                let entries = std::slice::from_raw_parts(table.table.as_ptr(), table.dwNumEntries as usize);
                for row in entries {
                    rows.push(TcpRow {
                        pid: row.dwOwningPid,
                        local: (
                            IpAddr::V4(Ipv4Addr::from(u32::from_be(row.dwLocalAddr))),
                            u16::from_be(row.dwLocalPort as u16),
                        ),
                        remote: (
                            IpAddr::V4(Ipv4Addr::from(u32::from_be(row.dwRemoteAddr))),
                            u16::from_be(row.dwRemotePort as u16),
                        ),
                        state: TcpState::from_mib_state(row.dwState),
                    });
                }
            }
        }

        let v6 = Self::table(AF_INET6.0 as u32)?;
        if !v6.is_empty() {
            unsafe {
                let table = &*(v6.as_ptr() as *const MIB_TCP6TABLE_OWNER_PID);
                let entries = std::slice::from_raw_parts(table.table.as_ptr(), table.dwNumEntries as usize);
                for row in entries {
                    rows.push(TcpRow {
                        pid: row.dwOwningPid,
                        local: (
                            IpAddr::V6(Ipv6Addr::from(row.ucLocalAddr)),
                            u16::from_be(row.dwLocalPort as u16),
                        ),
                        remote: (
                            IpAddr::V6(Ipv6Addr::from(row.ucRemoteAddr)),
                            u16::from_be(row.dwRemotePort as u16),
                        ),
                        state: TcpState::from_mib_state(row.dwState),
                    });
                }
            }
        }

        Ok(rows)
    }
}

impl SocketTable for IpHelperSockets {
    fn name(&self) -> &'static str {
        "iphelper"
    }

    fn list_listening_sockets(&self) -> SourceResult<Vec<ListeningSocket>> {
        Ok(Self::rows()?
            .into_iter()
            .filter(|r| r.state == TcpState::Listen)
            .map(|r| ListeningSocket::tcp(r.local.0, r.local.1, Some(OwnerHandle::Pid(r.pid))))
            .collect())
    }

    fn list_open_handles(&self, _pid: u32) -> SourceResult<Vec<OwnerHandle>> {
        Ok(Vec::new())
    }

    fn list_connections(&self) -> SourceResult<Vec<Connection>> {
        Ok(Self::rows()?
            .into_iter()
            .filter(|r| r.state != TcpState::Listen)
            .map(|r| Connection {
                pid: r.pid,
                local_addr: r.local.0,
                local_port: r.local.1,
                remote_addr: r.remote.0,
                remote_port: r.remote.1,
                state: r.state,
            })
            .collect())
    }
}

/// A Win32 service as enumerated by the SCM
#[derive(Debug, Clone)]
pub struct ServiceEntry {
    pub name: String,
    pub display_name: String,
    pub pid: u32,
    pub running: bool,
}

/// Finds services by name or display name, case-insensitively
pub fn find_running_service<'a>(services: &'a [ServiceEntry], label: &str) -> Option<&'a ServiceEntry> {
    services.iter().find(|s| {
        s.running
            && s.pid != 0
            && (s.name.eq_ignore_ascii_case(label) || s.display_name.eq_ignore_ascii_case(label))
    })
}

/// Service Control Manager
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceControlManager;

impl ServiceControlManager {
    fn enumerate() -> SourceResult<Vec<ServiceEntry>> {
        let mut services = Vec::new();
        unsafe {
            let scm = OpenSCManagerW(None, None, SC_MANAGER_ENUMERATE_SERVICE).map_err(|e| {
                if e.code().0 as u32 == E_ACCESS_DENIED {
                    SourceError::AccessDenied {
                        what: "service control manager".to_string(),
                    }
                } else {
                    api_error("scm", "OpenSCManagerW", e)
                }
            })?;
            let _scm_handle = ScHandle(scm);

            let mut bytes_needed = 0u32;
            let mut services_returned = 0u32;
            let mut resume_handle = 0u32;

            let _ = EnumServicesStatusExW(
                scm,
                SC_ENUM_PROCESS_INFO,
                SERVICE_WIN32,
                SERVICE_STATE_ALL,
                None,
                &mut bytes_needed,
                &mut services_returned,
                Some(&mut resume_handle),
                None,
            );
            if bytes_needed == 0 {
                return Ok(services);
            }

            let mut buffer: Vec<u8> = vec![0; bytes_needed as usize];
            EnumServicesStatusExW(
                scm,
                SC_ENUM_PROCESS_INFO,
                SERVICE_WIN32,
                SERVICE_STATE_ALL,
                Some(&mut buffer),
                &mut bytes_needed,
                &mut services_returned,
                Some(&mut resume_handle),
                None,
            )
            .map_err(|e| api_error("scm", "EnumServicesStatusExW", e))?;

            let entries = std::slice::from_raw_parts(
                buffer.as_ptr() as *const ENUM_SERVICE_STATUS_PROCESSW,
                services_returned as usize,
            );
            for entry in entries {
                services.push(ServiceEntry {
                    name: pwstr_to_string(entry.lpServiceName),
                    display_name: pwstr_to_string(entry.lpDisplayName),
                    pid: entry.ServiceStatusProcess.dwProcessId,
                    running: entry.ServiceStatusProcess.dwCurrentState.0 == SERVICE_RUNNING,
                });
            }
        }
        Ok(services)
    }
}

impl ServiceManager for ServiceControlManager {
    fn name(&self) -> &'static str {
        "scm"
    }

    fn find_service_main_pid(&self, label: &str) -> SourceResult<Option<u32>> {
        let services = Self::enumerate()?;
        let found = find_running_service(&services, label).map(|s| s.pid);
        debug!(label, pid = ?found, "SCM lookup");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, display: &str, pid: u32, running: bool) -> ServiceEntry {
        ServiceEntry {
            name: name.into(),
            display_name: display.into(),
            pid,
            running,
        }
    }

    #[test]
    fn test_find_running_service() {
        let services = vec![
            service("Spooler", "Print Spooler", 2040, true),
            service("W32Time", "Windows Time", 0, false),
        ];
        assert_eq!(find_running_service(&services, "spooler").map(|s| s.pid), Some(2040));
        assert_eq!(find_running_service(&services, "print spooler").map(|s| s.pid), Some(2040));
        assert!(find_running_service(&services, "W32Time").is_none());
    }

    #[test]
    fn test_filetime_conversion() {
        let ticks = FILETIME_EPOCH_DIFF + 10_000_000;
        let ft = FILETIME {
            dwLowDateTime: ticks as u32,
            dwHighDateTime: (ticks >> 32) as u32,
        };
        assert_eq!(filetime_to_datetime(&ft).map(|t| t.unix_timestamp()), Some(1));
    }

    #[test]
    #[ignore] // Requires a live Windows session
    fn test_snapshot_contains_self() {
        let records = ToolhelpProcessTable.list_processes().unwrap();
        assert!(records.iter().any(|r| r.pid == std::process::id()));
    }
}
