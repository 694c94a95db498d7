//! Machine fingerprinting for license binding.
//!
//! The raw identity is a pipe-joined list of `key:value` tokens built from
//! stable local facts. Only its digest ever leaves the process.

use crate::crypto::digest::prefixed_sha256;
use std::env;
use std::fs;

/// Platform files that may hold a persistent machine id.
const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Stable local facts contributing to the fingerprint.
///
/// Absent sources are `None` and are left out of the raw string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineFacts {
    /// Operating system name.
    pub os: Option<String>,
    /// Kernel / OS release.
    pub os_version: Option<String>,
    /// CPU architecture.
    pub arch: Option<String>,
    /// Host name.
    pub hostname: Option<String>,
    /// Windows `COMPUTERNAME`.
    pub computer_name: Option<String>,
    /// Platform machine id.
    pub machine_id: Option<String>,
}

impl MachineFacts {
    /// Collect facts from the running machine.
    pub fn collect() -> Self {
        Self {
            os: non_empty(Some(env::consts::OS.to_string())),
            os_version: os_release(),
            arch: non_empty(Some(env::consts::ARCH.to_string())),
            hostname: non_empty(
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok()),
            ),
            computer_name: non_empty(env::var("COMPUTERNAME").ok()),
            machine_id: MACHINE_ID_PATHS.iter().find_map(|p| first_line(p)),
        }
    }

    /// Pipe-joined `key:value` identity string.
    pub fn raw(&self) -> String {
        let tokens = [
            ("os", &self.os),
            ("osver", &self.os_version),
            ("machine", &self.arch),
            ("host", &self.hostname),
            ("cn", &self.computer_name),
            ("mid", &self.machine_id),
        ];
        tokens
            .iter()
            .filter_map(|&(key, value)| value.as_ref().map(|v| format!("{}:{}", key, v)))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// `sha256:<hex>` digest of [`raw`](Self::raw).
    pub fn hash(&self) -> String {
        prefixed_sha256(self.raw().as_bytes())
    }
}

/// Fingerprint hash of the current machine.
pub fn current_fingerprint_hash() -> String {
    MachineFacts::collect().hash()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn first_line(path: &str) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    non_empty(content.lines().next().map(str::to_string))
}

fn os_release() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        first_line("/proc/sys/kernel/osrelease")
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("uname")
            .arg("-r")
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|s| non_empty(Some(s)))
    }

    #[cfg(target_os = "windows")]
    {
        non_empty(env::var("OS").ok())
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}
