//! Service manager lookups: systemd and launchd
//!
//! Both answer the same question: if `label` is a running service, which
//! PID is its main process?

use crate::command::CommandRunner;
use tracing::debug;
use witr_core::{ServiceManager, SourceError, SourceResult};

/// systemd via `systemctl show`
#[derive(Debug, Clone, Default)]
pub struct Systemd {
    runner: CommandRunner,
}

impl Systemd {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

/// `nginx` -> `nginx.service`; labels that already carry a unit suffix are kept
pub fn unit_name(label: &str) -> String {
    if label.contains('.') {
        label.to_string()
    } else {
        format!("{}.service", label)
    }
}

/// `MainPID` value; 0 means the unit is not running
pub fn parse_main_pid(output: &str) -> SourceResult<Option<u32>> {
    let value = output.trim();
    let value = value.strip_prefix("MainPID=").unwrap_or(value);
    let pid: u32 = value
        .parse()
        .map_err(|_| SourceError::parse("systemctl MainPID", value))?;
    Ok((pid != 0).then_some(pid))
}

impl ServiceManager for Systemd {
    fn name(&self) -> &'static str {
        "systemd"
    }

    fn find_service_main_pid(&self, label: &str) -> SourceResult<Option<u32>> {
        let unit = unit_name(label);
        let out = self.runner.run_ok(
            "systemd",
            "systemctl",
            &["show", "-p", "MainPID", "--value", "--", &unit],
        )?;
        let pid = parse_main_pid(&out)?;
        debug!(unit = %unit, ?pid, "systemd main PID");
        Ok(pid)
    }
}

/// launchd via `launchctl print`
#[derive(Debug, Clone, Default)]
pub struct Launchd {
    runner: CommandRunner,
}

impl Launchd {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    fn domains(label: &str) -> Vec<String> {
        let mut domains = vec![format!("system/{}", label)];
        #[cfg(unix)]
        {
            // SAFETY: getuid cannot fail
            let uid = unsafe { libc::getuid() };
            domains.push(format!("gui/{}/{}", uid, label));
        }
        domains
    }
}

/// First top-level `pid = N` line of `launchctl print` output
pub fn parse_launchctl_pid(output: &str) -> Option<u32> {
    output
        .lines()
        .filter_map(|l| l.trim().strip_prefix("pid = "))
        .find_map(|v| v.trim().parse().ok())
        .filter(|pid| *pid > 0)
}

impl ServiceManager for Launchd {
    fn name(&self) -> &'static str {
        "launchd"
    }

    fn find_service_main_pid(&self, label: &str) -> SourceResult<Option<u32>> {
        for domain in Self::domains(label) {
            let out = self.runner.run("launchd", "launchctl", &["print", &domain])?;
            // "Could not find service" exits non-zero
            if !out.success {
                continue;
            }
            if let Some(pid) = parse_launchctl_pid(&out.stdout) {
                debug!(domain = %domain, pid, "launchd service PID");
                return Ok(Some(pid));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAUNCHCTL_PRINT: &str = "\
system/com.apple.cupsd = {
\tactive count = 1
\tpath = /System/Library/LaunchDaemons/org.cups.cupsd.plist
\tstate = running

\tprogram = /usr/sbin/cupsd
\tpid = 1234
\timmediate reason = ipc (mach)
\tendpoints = {
\t\t\"com.apple.cupsd\" = {
\t\t\tport = 0x1a03
\t\t}
\t}
}
";

    #[test]
    fn test_unit_name() {
        assert_eq!(unit_name("nginx"), "nginx.service");
        assert_eq!(unit_name("docker.socket"), "docker.socket");
        assert_eq!(unit_name("getty@tty1.service"), "getty@tty1.service");
    }

    #[test]
    fn test_parse_main_pid() {
        assert_eq!(parse_main_pid("812\n").unwrap(), Some(812));
        assert_eq!(parse_main_pid("0\n").unwrap(), None);
        assert_eq!(parse_main_pid("MainPID=77").unwrap(), Some(77));
        assert!(parse_main_pid("oops").is_err());
    }

    #[test]
    fn test_parse_launchctl_pid() {
        assert_eq!(parse_launchctl_pid(LAUNCHCTL_PRINT), Some(1234));
        assert_eq!(parse_launchctl_pid("system/x = {\n\tstate = not running\n}\n"), None);
    }
}
