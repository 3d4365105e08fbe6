//! Target Resolver - scan target and port-range validation
//!
//! A scan target is one token in one of these forms:
//! - single IP address: "10.0.0.5", "::1"
//! - CIDR: "192.168.1.0/24"
//! - IPv4 range: "192.168.1.1-192.168.1.10"
//! - hostname: "example.com"
//! - URL: "https://example.com:8443/app"
//!
//! Nothing is resolved here; the external tools do their own DNS lookups.

use anyhow::{anyhow, bail, Context, Result};
use ipnet::IpNet;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// Networks larger than this are rejected unless `PATCHSCOUT_ALLOW_LARGE_CIDR=1`.
pub const MAX_HOSTS: u128 = 4096;

static HOSTNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)*$")
        .expect("hostname pattern is valid")
});

/// A validated scan target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Ip(IpAddr),
    Network(IpNet),
    Range(Ipv4Addr, Ipv4Addr),
    Hostname(String),
    Url {
        scheme: String,
        host: String,
        port: Option<u16>,
        raw: String,
    },
}

impl Target {
    /// Parse and validate a target string.
    pub fn parse(input: &str) -> Result<Self> {
        let t = input.trim();
        if t.is_empty() {
            bail!("No target specified");
        }
        if t.contains(char::is_whitespace) || t.contains(',') {
            bail!("Target must be a single host, network or URL: '{}'", t);
        }

        if let Some((scheme, rest)) = t.split_once("://") {
            return parse_url(t, scheme, rest);
        }

        if let Ok(net) = t.parse::<IpNet>() {
            check_network_size(&net)?;
            return Ok(Target::Network(net));
        }

        if let Ok(ip) = t.parse::<IpAddr>() {
            return Ok(Target::Ip(ip));
        }

        if t.contains('-') && t.split('-').all(|p| p.parse::<Ipv4Addr>().is_ok()) {
            let (start, end) = parse_ip_range(t)?;
            return Ok(Target::Range(start, end));
        }

        if is_valid_hostname(t) {
            return Ok(Target::Hostname(t.to_ascii_lowercase()));
        }

        bail!("Invalid target: '{}'", t)
    }

    /// Host part as network tools expect it (no scheme, no path).
    #[must_use]
    pub fn host(&self) -> String {
        match self {
            Target::Ip(ip) => ip.to_string(),
            Target::Network(net) => net.to_string(),
            Target::Range(start, end) => {
                // nmap octet-range syntax only works inside one /24
                let (s, e) = (start.octets(), end.octets());
                if s[..3] == e[..3] {
                    format!("{}.{}.{}.{}-{}", s[0], s[1], s[2], s[3], e[3])
                } else {
                    format!("{}-{}", start, end)
                }
            }
            Target::Hostname(h) => h.clone(),
            Target::Url { host, .. } => host.clone(),
        }
    }

    /// URL for web scanners; bare hosts default to http.
    #[must_use]
    pub fn url(&self) -> String {
        match self {
            Target::Url { raw, .. } => raw.clone(),
            other => format!("http://{}", other.host()),
        }
    }

    /// Port implied by a URL target.
    #[must_use]
    pub fn web_port(&self) -> u16 {
        match self {
            Target::Url { port: Some(p), .. } => *p,
            Target::Url { scheme, .. } if scheme == "https" => 443,
            _ => 80,
        }
    }

    /// Number of hosts covered by this target.
    #[must_use]
    pub fn host_count(&self) -> u128 {
        match self {
            Target::Network(net) => host_count(net),
            Target::Range(start, end) => u128::from(u32::from(*end) - u32::from(*start)) + 1,
            _ => 1,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Url { raw, .. } => f.write_str(raw),
            other => f.write_str(&other.host()),
        }
    }
}

fn parse_url(raw: &str, scheme: &str, rest: &str) -> Result<Target> {
    let scheme = scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        bail!("Unsupported URL scheme '{}'", scheme);
    }
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if authority.is_empty() {
        bail!("URL has no host: '{}'", raw);
    }

    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (ip, tail) = bracketed
            .split_once(']')
            .ok_or_else(|| anyhow!("Unterminated IPv6 literal in '{}'", raw))?;
        let port = match tail.strip_prefix(':') {
            Some(p) => Some(p.parse::<u16>().context(format!("Invalid port in '{}'", raw))?),
            None => None,
        };
        (ip.to_string(), port)
    } else {
        match authority.rsplit_once(':') {
            Some((h, p)) => (
                h.to_string(),
                Some(p.parse::<u16>().context(format!("Invalid port in '{}'", raw))?),
            ),
            None => (authority.to_string(), None),
        }
    };

    if host.parse::<IpAddr>().is_err() && !is_valid_hostname(&host) {
        bail!("Invalid host in URL: '{}'", host);
    }

    Ok(Target::Url {
        scheme,
        host: host.to_ascii_lowercase(),
        port,
        raw: raw.to_string(),
    })
}

fn is_valid_hostname(h: &str) -> bool {
    h.len() <= 253 && h.chars().any(|c| c.is_ascii_alphabetic()) && HOSTNAME_RE.is_match(h)
}

fn host_count(net: &IpNet) -> u128 {
    let bits = u32::from(net.max_prefix_len() - net.prefix_len());
    if bits >= 128 {
        u128::MAX
    } else {
        1u128 << bits
    }
}

fn check_network_size(net: &IpNet) -> Result<()> {
    let hosts = host_count(net);
    let allow_large = std::env::var("PATCHSCOUT_ALLOW_LARGE_CIDR")
        .map(|v| v == "1")
        .unwrap_or(false);
    if hosts > MAX_HOSTS && !allow_large {
        bail!(
            "CIDR {} covers {} hosts which exceeds the allowed limit of {}. Set PATCHSCOUT_ALLOW_LARGE_CIDR=1 to override.",
            net,
            hosts,
            MAX_HOSTS
        );
    }
    Ok(())
}

fn parse_ip_range(range: &str) -> Result<(Ipv4Addr, Ipv4Addr)> {
    let (a, b) = range
        .split_once('-')
        .ok_or_else(|| anyhow!("Invalid IP range: {}", range))?;
    let start: Ipv4Addr = a.parse().context(format!("Invalid start IP: {}", a))?;
    let end: Ipv4Addr = b.parse().context(format!("Invalid end IP: {}", b))?;
    if u32::from(start) > u32::from(end) {
        bail!("Invalid IP range: start > end");
    }
    if u128::from(u32::from(end) - u32::from(start)) + 1 > MAX_HOSTS {
        bail!("IP range {} exceeds the allowed limit of {} hosts", range, MAX_HOSTS);
    }
    Ok((start, end))
}

/// Parses a port string like "80,443,1000-1010" into a sorted, deduplicated port list.
pub fn parse_ports(ports_str: &str) -> Result<Vec<u16>> {
    let mut ports = Vec::new();

    for part in ports_str.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((a, b)) = part.split_once('-') {
            let start: u16 = a.trim().parse().context(format!("Invalid start port: {}", a))?;
            let end: u16 = b.trim().parse().context(format!("Invalid end port: {}", b))?;
            if start == 0 {
                bail!("Port 0 is not scannable");
            }
            if start > end {
                bail!("Invalid range: start > end");
            }
            ports.extend(start..=end);
        } else {
            let port: u16 = part.parse().context(format!("Invalid port: {}", part))?;
            if port == 0 {
                bail!("Port 0 is not scannable");
            }
            ports.push(port);
        }
    }

    if ports.is_empty() {
        bail!("No ports specified");
    }
    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}

/// Ports of `range` minus those listed in `exclude`.
pub fn effective_ports(range: &str, exclude: Option<&str>) -> Result<Vec<u16>> {
    let mut ports = parse_ports(range)?;
    if let Some(ex) = exclude.filter(|e| !e.trim().is_empty()) {
        let excluded = parse_ports(ex)?;
        ports.retain(|p| excluded.binary_search(p).is_err());
    }
    if ports.is_empty() {
        bail!("Port exclusions leave nothing to scan");
    }
    Ok(ports)
}

/// Collapse a sorted port list into inclusive (start, end) runs.
#[must_use]
pub fn port_ranges(ports: &[u16]) -> Vec<(u16, u16)> {
    let mut runs: Vec<(u16, u16)> = Vec::new();
    for &port in ports {
        match runs.last_mut() {
            Some((_, end)) if u32::from(port) == u32::from(*end) + 1 => *end = port,
            _ => runs.push((port, port)),
        }
    }
    runs
}

/// Re-render a port list in compact range syntax ("22,80-82").
#[must_use]
pub fn format_ports(ports: &[u16]) -> String {
    port_ranges(ports)
        .into_iter()
        .map(|(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{}-{}", start, end)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
