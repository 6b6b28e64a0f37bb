//! Identify the process listening on a TCP port.
//!
//! Linux only: listening sockets are found in `/proc/net/tcp{,6}` and
//! matched to a pid through the `socket:[inode]` links in `/proc/<pid>/fd`.
//! Other platforms report no owner.

use std::fmt;

/// The process holding a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortOwner {
    pub pid: u32,
    pub name: Option<String>,
}

impl fmt::Display for PortOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "pid {} ({})", self.pid, name),
            None => write!(f, "pid {}", self.pid),
        }
    }
}

/// TCP state code for LISTEN in `/proc/net/tcp`.
const TCP_LISTEN: &str = "0A";

/// Socket inodes listening on `port` in a `/proc/net/tcp`-format table.
pub fn listening_inodes(table: &str, port: u16) -> Vec<u64> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let local = fields.get(1)?;
            let state = fields.get(3)?;
            let inode = fields.get(9)?;

            let (_, port_hex) = local.rsplit_once(':')?;
            let local_port = u16::from_str_radix(port_hex, 16).ok()?;
            if local_port != port || *state != TCP_LISTEN {
                return None;
            }
            inode.parse::<u64>().ok().filter(|inode| *inode != 0)
        })
        .collect()
}

/// Find the process listening on `port`, if it can be determined.
#[cfg(target_os = "linux")]
pub fn find_listener(port: u16) -> Option<PortOwner> {
    use std::fs;

    let mut inodes = Vec::new();
    for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
        if let Ok(content) = fs::read_to_string(table) {
            inodes.extend(listening_inodes(&content, port));
        }
    }
    if inodes.is_empty() {
        return None;
    }

    let targets: Vec<String> = inodes.iter().map(|i| format!("socket:[{}]", i)).collect();
    for entry in fs::read_dir("/proc").ok()?.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        // Other users' fd tables are unreadable without privileges.
        let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        let owns = fds.flatten().any(|fd| {
            fs::read_link(fd.path())
                .map(|target| targets.iter().any(|t| target.as_os_str() == t.as_str()))
                .unwrap_or(false)
        });
        if owns {
            let name = fs::read_to_string(entry.path().join("comm"))
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            return Some(PortOwner { pid, name });
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
pub fn find_listener(_port: u16) -> Option<PortOwner> {
    None
}
