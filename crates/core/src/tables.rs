//! Launch-mechanism name tables
//!
//! Plain data consumed by the classifier and the name resolver. Defaults are
//! built in; extra entries can be appended from the configuration file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every lookup table the classifier and resolver consult
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchTables {
    /// Interactive shell command names
    pub shells: Vec<String>,
    /// Supervisor / service-wrapper command name -> label
    pub supervisors: BTreeMap<String, String>,
    /// Generic init-role command name -> label; skipped when a shell is in the chain
    pub init_roles: BTreeMap<String, String>,
    /// Dedicated process-manager families, matched by substring
    pub process_managers: Vec<String>,
    /// Container runtime helper command name -> runtime
    pub container_runtimes: BTreeMap<String, String>,
    /// Scheduled-task runner command name -> label
    pub cron_runners: BTreeMap<String, String>,
    /// Text-filtering utilities excluded from name matches
    pub filter_utilities: Vec<String>,
}

fn owned_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for LaunchTables {
    fn default() -> Self {
        Self {
            shells: owned_list(&["bash", "zsh", "sh", "fish", "csh", "tcsh", "ksh", "dash"]),
            supervisors: owned_map(&[
                ("pm2", "pm2"),
                ("pm2 god", "pm2"),
                ("supervisord", "supervisord"),
                ("supervisor", "supervisord"),
                ("gunicorn", "gunicorn"),
                ("uwsgi", "uwsgi"),
                ("s6-supervise", "s6"),
                ("s6", "s6"),
                ("s6-svscan", "s6"),
                ("runsv", "runit"),
                ("runit", "runit"),
                ("openrc", "openrc"),
                ("monit", "monit"),
                ("circusd", "circus"),
                ("circus", "circus"),
                ("systemctl", "systemd service"),
                ("daemontools", "daemontools"),
                ("initctl", "upstart"),
                ("tini", "tini"),
                ("docker-init", "docker-init"),
                ("podman-init", "podman-init"),
                ("smf", "smf"),
                ("god", "god"),
                ("forever", "forever"),
                ("nssm", "nssm"),
            ]),
            init_roles: owned_map(&[
                ("init", "init"),
                ("systemd", "systemd"),
                ("launchd", "launchd"),
                ("openrc-init", "openrc"),
                ("runit-init", "runit"),
            ]),
            process_managers: owned_list(&["pm2"]),
            container_runtimes: owned_map(&[
                ("containerd-shim", "containerd"),
                ("containerd-shim-runc-v2", "containerd"),
                ("conmon", "podman"),
                ("lxc-start", "lxc"),
                ("runc", "runc"),
                ("crun", "crun"),
            ]),
            cron_runners: owned_map(&[
                ("cron", "cron"),
                ("crond", "cron"),
                ("anacron", "anacron"),
                ("atd", "at"),
                ("fcron", "fcron"),
            ]),
            filter_utilities: owned_list(&["grep", "egrep", "fgrep", "rg", "ag", "ack"]),
        }
    }
}

/// Entries appended to the built-in tables
///
/// Same shape as [`LaunchTables`] but every field defaults to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableExtensions {
    pub shells: Vec<String>,
    pub supervisors: BTreeMap<String, String>,
    pub init_roles: BTreeMap<String, String>,
    pub process_managers: Vec<String>,
    pub container_runtimes: BTreeMap<String, String>,
    pub cron_runners: BTreeMap<String, String>,
    pub filter_utilities: Vec<String>,
}

impl TableExtensions {
    pub fn is_empty(&self) -> bool {
        self == &TableExtensions::default()
    }
}

/// Lowercased basename without a login-shell dash or `.exe` suffix
pub fn normalize_command(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('-');
    let base = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
    let lower = base.to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

fn extend_list(list: &mut Vec<String>, extra: Vec<String>) {
    for item in extra {
        let item = normalize_command(&item);
        if !item.is_empty() && !list.contains(&item) {
            list.push(item);
        }
    }
}

fn extend_map(map: &mut BTreeMap<String, String>, extra: BTreeMap<String, String>) {
    for (key, label) in extra {
        let key = key.trim().to_lowercase();
        if !key.is_empty() {
            map.insert(key, label);
        }
    }
}

impl LaunchTables {
    /// Append configured entries; a repeated key replaces the built-in label
    pub fn extend(&mut self, extra: TableExtensions) {
        extend_list(&mut self.shells, extra.shells);
        extend_map(&mut self.supervisors, extra.supervisors);
        extend_map(&mut self.init_roles, extra.init_roles);
        extend_list(&mut self.process_managers, extra.process_managers);
        extend_map(&mut self.container_runtimes, extra.container_runtimes);
        extend_map(&mut self.cron_runners, extra.cron_runners);
        extend_list(&mut self.filter_utilities, extra.filter_utilities);
    }

    pub fn with_extensions(mut self, extra: TableExtensions) -> Self {
        self.extend(extra);
        self
    }

    /// Shell label for a command, if it is a known interactive shell
    pub fn shell_label(&self, command: &str) -> Option<String> {
        let name = normalize_command(command);
        self.shells.iter().find(|s| **s == name).cloned()
    }

    pub fn supervisor_label(&self, command: &str) -> Option<&str> {
        self.supervisors
            .get(&normalize_command(command))
            .map(String::as_str)
    }

    pub fn init_label(&self, command: &str) -> Option<&str> {
        self.init_roles
            .get(&normalize_command(command))
            .map(String::as_str)
    }

    /// Process-manager family whose name appears anywhere in `text`
    pub fn process_manager_in(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.process_managers
            .iter()
            .find(|pm| !pm.is_empty() && lower.contains(pm.as_str()))
            .map(String::as_str)
    }

    pub fn container_runtime(&self, command: &str) -> Option<&str> {
        self.container_runtimes
            .get(&normalize_command(command))
            .map(String::as_str)
    }

    pub fn cron_label(&self, command: &str) -> Option<&str> {
        self.cron_runners
            .get(&normalize_command(command))
            .map(String::as_str)
    }

    /// True for commands such as `grep` that would match the query text itself
    pub fn is_filter_utility(&self, command: &str) -> bool {
        let name = normalize_command(command);
        name.contains("grep") || self.filter_utilities.iter().any(|f| *f == name)
    }
}
