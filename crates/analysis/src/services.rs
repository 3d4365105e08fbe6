//! Port to service-name table
//!
//! Used to fill in the service of findings that only carry a port, so the
//! attack-path heuristics see the same names a discovery tool would report.

use patchscout_common::Vulnerability;

/// Broad role of a network service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceClass {
    Web,
    RemoteAccess,
    Database,
    Mail,
    Other,
}

/// Well-known service name for a port (IANA assignments and common defaults).
pub fn service_for_port(port: u16) -> Option<&'static str> {
    let service = match port {
        // File transfer
        20 => "ftp-data",
        21 => "ftp",
        990 => "ftps",
        873 => "rsync",
        2049 => "nfs",

        // Remote access
        22 => "ssh",
        23 => "telnet",
        3389 => "rdp",
        5900 => "vnc",
        5985 => "wsman",
        5986 => "wsmans",

        // Mail
        25 => "smtp",
        465 => "smtps",
        587 => "submission",
        110 => "pop3",
        995 => "pop3s",
        143 => "imap",
        993 => "imaps",

        // Name and directory services
        53 => "domain",
        88 => "kerberos",
        389 => "ldap",
        636 => "ldaps",

        // Web
        80 => "http",
        443 => "https",
        3000 | 5000 | 8000 | 8888 | 9000 => "http-alt",
        8080 => "http-proxy",
        8443 => "https-alt",

        // Windows
        135 => "msrpc",
        139 => "netbios-ssn",
        445 => "microsoft-ds",

        // Management
        161 => "snmp",
        123 => "ntp",
        514 => "syslog",

        // Databases
        1433 => "mssql",
        1521 => "oracle",
        3306 => "mysql",
        5432 => "postgresql",
        27017 => "mongodb",
        6379 => "redis",
        9200 => "elasticsearch",
        11211 => "memcached",

        // Containers and queues
        2375 => "docker",
        2376 => "docker-tls",
        6443 => "kubernetes",
        10250 => "kubelet",
        5672 => "amqp",
        1883 => "mqtt",
        9090 => "prometheus",
        _ => return None,
    };

    Some(service)
}

/// Classify a service name as reported by a tool (`"OpenSSH"`, `"mysql"`, `"https"`).
pub fn classify(service: &str) -> ServiceClass {
    let name = service.to_ascii_lowercase();
    let contains_any = |needles: &[&str]| needles.iter().any(|n| name.contains(n));

    if contains_any(&["mysql", "postgresql", "mssql", "mongodb"]) {
        ServiceClass::Database
    } else if contains_any(&["ssh", "telnet", "rdp", "vnc"]) {
        ServiceClass::RemoteAccess
    } else if contains_any(&["http", "www"]) {
        ServiceClass::Web
    } else if contains_any(&["smtp", "imap", "pop3", "submission"]) {
        ServiceClass::Mail
    } else {
        ServiceClass::Other
    }
}

/// The finding's own service name, else the well-known name of its port.
pub fn effective_service(vuln: &Vulnerability) -> Option<&str> {
    vuln.service
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| vuln.port.and_then(service_for_port))
}
