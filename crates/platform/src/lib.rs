//! witr-platform: process, socket and service-manager sources for witr
//!
//! One implementation of each `witr-core` source trait per platform, plus
//! [`native_sources`] which picks the set for the build target.
//!
//! | Platform | Processes | Sockets (primary, fallbacks) | Services |
//! |----------|-----------|------------------------------|----------|
//! | Linux    | procfs    | ss, procfs, lsof             | systemd  |
//! | macOS    | sysinfo   | lsof, netstat                | launchd  |
//! | FreeBSD  | sysinfo   | sockstat, lsof               | none     |
//! | Windows  | Toolhelp  | IP Helper                    | SCM      |

use std::time::Duration;
use witr_core::Sources;

pub mod command;
pub mod endpoint;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod lsof;
pub mod netstat;
pub mod services;
pub mod sockstat;
pub mod ss;
#[cfg(unix)]
pub mod system;
#[cfg(unix)]
pub mod users;
#[cfg(windows)]
pub mod windows;

pub use command::{CommandOutput, CommandRunner};
pub use lsof::LsofSockets;
pub use netstat::NetstatSockets;
#[cfg(target_os = "linux")]
pub use linux::ProcFs;
pub use services::{Launchd, Systemd};
pub use sockstat::SockstatSockets;
pub use ss::SsSockets;
#[cfg(unix)]
pub use system::SystemProcessTable;
#[cfg(unix)]
pub use users::UserTable;
#[cfg(windows)]
pub use windows::{IpHelperSockets, ServiceControlManager, ToolhelpProcessTable};

/// Default bound on every external command, in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// How the native sources are built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceOptions {
    /// Bound on each external command
    pub timeout: Duration,
    /// Keep the fallback socket tables after the primary one
    pub fallback: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            fallback: true,
        }
    }
}

fn finish(sources: Sources, options: SourceOptions) -> Sources {
    tracing::debug!(?sources, fallback = options.fallback, "Native sources");
    if options.fallback {
        sources
    } else {
        sources.without_fallback()
    }
}

/// Sources for the platform this binary was built for
#[cfg(target_os = "linux")]
pub fn native_sources(options: SourceOptions) -> Sources {
    let runner = CommandRunner::new(options.timeout);
    let sources = Sources::new(
        Box::new(ProcFs::new()),
        vec![
            Box::new(SsSockets::new(runner)),
            Box::new(ProcFs::new()),
            Box::new(LsofSockets::new(runner)),
        ],
        Box::new(Systemd::new(runner)),
    );
    finish(sources, options)
}

#[cfg(target_os = "macos")]
pub fn native_sources(options: SourceOptions) -> Sources {
    let runner = CommandRunner::new(options.timeout);
    let sources = Sources::new(
        Box::new(SystemProcessTable::new()),
        vec![
            Box::new(LsofSockets::new(runner)),
            Box::new(NetstatSockets::new(runner)),
        ],
        Box::new(Launchd::new(runner)),
    );
    finish(sources, options)
}

#[cfg(windows)]
pub fn native_sources(options: SourceOptions) -> Sources {
    let sources = Sources::new(
        Box::new(ToolhelpProcessTable),
        vec![Box::new(IpHelperSockets)],
        Box::new(ServiceControlManager),
    );
    finish(sources, options)
}

/// The BSDs and other unix systems
#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
pub fn native_sources(options: SourceOptions) -> Sources {
    let runner = CommandRunner::new(options.timeout);
    let sources = Sources::new(
        Box::new(SystemProcessTable::new()),
        vec![
            Box::new(SockstatSockets::new(runner)),
            Box::new(LsofSockets::new(runner)),
        ],
        Box::new(witr_core::NoServiceManager),
    );
    finish(sources, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = SourceOptions::default();
        assert_eq!(options.timeout, Duration::from_millis(2000));
        assert!(options.fallback);
    }

    #[test]
    fn test_without_fallback_keeps_primary() {
        let all = native_sources(SourceOptions::default());
        let primary = all.sockets[0].name();
        let trimmed = native_sources(SourceOptions {
            fallback: false,
            ..SourceOptions::default()
        });
        assert_eq!(trimmed.sockets.len(), 1);
        assert_eq!(trimmed.sockets[0].name(), primary);
    }
}
