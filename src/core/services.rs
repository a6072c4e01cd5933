//! Service name to port lookup
//!
//! Resolves the `service/protocol` form of port literals (`http/tcp`,
//! `domain/udp`). Entries come from a built-in table of well-known services,
//! overlaid with the system services database when it can be read.

use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Location of the system services database.
pub const SYSTEM_SERVICES_PATH: &str = "/etc/services";

/// Protocol used when a service literal has no `/protocol` suffix.
pub const DEFAULT_PROTOCOL: &str = "tcp";

/// Well-known services every lookup can rely on.
const BUILTIN_SERVICES: &[(&str, u16, &[&str])] = &[
    ("ftp-data", 20, &["tcp"]),
    ("ftp", 21, &["tcp"]),
    ("ssh", 22, &["tcp", "udp", "sctp"]),
    ("telnet", 23, &["tcp"]),
    ("smtp", 25, &["tcp"]),
    ("domain", 53, &["tcp", "udp"]),
    ("bootps", 67, &["udp"]),
    ("bootpc", 68, &["udp"]),
    ("tftp", 69, &["udp"]),
    ("http", 80, &["tcp", "udp", "sctp"]),
    ("www", 80, &["tcp", "udp"]),
    ("kerberos", 88, &["tcp", "udp"]),
    ("pop3", 110, &["tcp"]),
    ("sunrpc", 111, &["tcp", "udp"]),
    ("ntp", 123, &["udp"]),
    ("imap", 143, &["tcp"]),
    ("snmp", 161, &["tcp", "udp"]),
    ("snmp-trap", 162, &["tcp", "udp"]),
    ("bgp", 179, &["tcp"]),
    ("ldap", 389, &["tcp", "udp"]),
    ("https", 443, &["tcp", "udp", "sctp"]),
    ("submission", 587, &["tcp"]),
    ("ldaps", 636, &["tcp"]),
    ("imaps", 993, &["tcp"]),
    ("pop3s", 995, &["tcp"]),
    ("openvpn", 1194, &["tcp", "udp"]),
    ("mysql", 3306, &["tcp"]),
    ("postgresql", 5432, &["tcp"]),
];

/// Service name lookup table keyed by `(name, protocol)`.
#[derive(Debug, Clone, Default)]
pub struct ServiceDirectory {
    entries: HashMap<(String, String), u16>,
}

impl ServiceDirectory {
    /// Empty directory; every lookup fails.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Directory holding only the built-in well-known services.
    pub fn builtin() -> Self {
        let mut dir = Self::empty();
        for &(name, port, protocols) in BUILTIN_SERVICES {
            for protocol in protocols {
                dir.insert(name, protocol, port);
            }
        }
        dir
    }

    /// Built-in services overlaid with [`SYSTEM_SERVICES_PATH`].
    ///
    /// A missing or unreadable services file is not an error.
    pub fn system() -> Self {
        let mut dir = Self::builtin();
        match dir.load_file(Path::new(SYSTEM_SERVICES_PATH)) {
            Ok(count) => debug!("Loaded {} service entries from {}", count, SYSTEM_SERVICES_PATH),
            Err(e) => debug!("Services database unavailable ({}), using built-in table", e),
        }
        dir
    }

    /// Reads a services(5) file into the directory, returning the number of
    /// entries read.
    pub fn load_file(&mut self, path: &Path) -> std::io::Result<usize> {
        let text = std::fs::read_to_string(path)?;
        Ok(self.load_str(&text))
    }

    /// Parses services(5) text: `name port/protocol [aliases...] [# comment]`.
    ///
    /// Malformed lines are skipped.
    pub fn load_str(&mut self, text: &str) -> usize {
        let mut count = 0;
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or_default();
            let mut fields = line.split_whitespace();
            let (Some(name), Some(port_proto)) = (fields.next(), fields.next()) else {
                continue;
            };
            let Some((port, protocol)) = port_proto.split_once('/') else {
                continue;
            };
            let Ok(port) = port.parse::<u16>() else {
                continue;
            };

            self.insert(name, protocol, port);
            for alias in fields {
                self.insert(alias, protocol, port);
            }
            count += 1;
        }
        count
    }

    pub fn insert(&mut self, name: &str, protocol: &str, port: u16) {
        self.entries
            .insert((name.to_string(), protocol.to_ascii_lowercase()), port);
    }

    /// Resolves a service name for a protocol.
    ///
    /// A purely numeric service resolves to itself.
    pub fn lookup(&self, service: &str, protocol: &str) -> Option<u16> {
        if let Ok(port) = service.parse::<u16>() {
            return Some(port);
        }
        self.entries
            .get(&(service.to_string(), protocol.to_ascii_lowercase()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
