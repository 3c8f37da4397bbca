use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::error::{PortError, Result};

/// OS/environment families the path adapter translates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Macos,
    Linux,
    Wsl,
}

impl Platform {
    /// Platform of the running process.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Macos
        } else if is_wsl() {
            Platform::Wsl
        } else {
            Platform::Linux
        }
    }

    pub fn is_windows(self) -> bool {
        self == Platform::Windows
    }

    /// Prefix under which POSIX environments mount Windows drives.
    pub fn drive_mount_prefix(self) -> &'static str {
        match self {
            Platform::Wsl => "/mnt/",
            _ => "/",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Macos => "macos",
            Platform::Linux => "linux",
            Platform::Wsl => "wsl",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_wsl() -> bool {
    fs::read_to_string("/proc/sys/kernel/osrelease")
        .map(|release| release.to_ascii_lowercase().contains("microsoft"))
        .unwrap_or(false)
}

/// Home directory, platform and environment lookup for one side of a transfer.
///
/// Threaded explicitly into the path adapter so translation never reads
/// process-global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformContext {
    pub platform: Platform,
    pub home: PathBuf,
    env: BTreeMap<String, String>,
}

impl PlatformContext {
    pub fn new(platform: Platform, home: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            home: home.into(),
            env: BTreeMap::new(),
        }
    }

    /// Builder-style environment override, mostly for tests.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Capture the running process's platform and home directory.
    ///
    /// `CFGPORT_HOME` overrides the detected home directory.
    pub fn detect() -> Result<Self> {
        let home = match std::env::var_os("CFGPORT_HOME") {
            Some(home) if !home.is_empty() => PathBuf::from(home),
            _ => directories::BaseDirs::new()
                .map(|dirs| dirs.home_dir().to_path_buf())
                .ok_or_else(|| {
                    PortError::io(
                        "Failed to determine home directory",
                        PathBuf::new(),
                        std::io::Error::from(std::io::ErrorKind::NotFound),
                    )
                })?,
        };

        let env = std::env::vars().collect();
        Ok(Self {
            platform: Platform::current(),
            home,
            env,
        })
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Home directory rendered with this platform's separator.
    pub fn home_string(&self) -> String {
        let home = self.home.to_string_lossy();
        if self.platform.is_windows() {
            home.replace('/', "\\")
        } else {
            home.replace('\\', "/")
        }
    }

    /// Expand a leading `~` to this context's home directory.
    pub fn expand_home(&self, value: &str) -> String {
        let home = self.home_string();
        let expanded = shellexpand::tilde_with_context(value, || Some(home.as_str()));
        expanded.into_owned()
    }
}
