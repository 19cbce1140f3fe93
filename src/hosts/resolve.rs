//! Connect string parsing and endpoint resolution.

use std::net::{SocketAddr, ToSocketAddrs};

use tracing::{debug, warn};

use crate::core::HostSetError;

/// Port used when a host in a connect string has none.
pub const DEFAULT_CLIENT_PORT: u16 = 2181;

/// Parsed `host1:port1,host2:port2/chroot` connect string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectString {
    /// `host:port` entries in the order given.
    pub hosts: Vec<String>,
    /// Optional chroot suffix, without trailing slash.
    pub chroot: Option<String>,
}

impl ConnectString {
    /// Parse a comma separated host list with an optional `/chroot` suffix.
    ///
    /// Hosts without a port get [`DEFAULT_CLIENT_PORT`]. Bracketed IPv6
    /// literals (`[::1]:2181`) are accepted.
    pub fn parse(input: &str) -> Result<Self, HostSetError> {
        let (host_part, chroot) = match input.find('/') {
            Some(idx) => {
                let chroot = input[idx..].trim_end_matches('/');
                let chroot = (!chroot.is_empty()).then(|| chroot.to_string());
                (&input[..idx], chroot)
            }
            None => (input, None),
        };

        let hosts: Vec<String> = host_part
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(with_default_port)
            .collect();

        if hosts.is_empty() {
            return Err(HostSetError::EmptyMembership);
        }

        Ok(Self { hosts, chroot })
    }
}

fn with_default_port(host: &str) -> String {
    let has_port = match host.rfind(']') {
        // [v6]:port
        Some(bracket) => host[bracket..].contains(':'),
        None => host.contains(':'),
    };
    if has_port {
        host.to_string()
    } else {
        format!("{host}:{DEFAULT_CLIENT_PORT}")
    }
}

/// Resolve every `host:port` entry, keeping all addresses of each host.
///
/// Entries that fail to resolve are skipped. Fails only if nothing
/// resolved at all, so a host set built from the result is never empty.
pub fn resolve_all<S: AsRef<str>>(hosts: &[S]) -> Result<Vec<SocketAddr>, HostSetError> {
    let mut resolved = Vec::new();
    for host in hosts {
        let host = host.as_ref();
        match host.to_socket_addrs() {
            Ok(addrs) => {
                let before = resolved.len();
                resolved.extend(addrs);
                debug!(host, count = resolved.len() - before, "resolved host");
            }
            Err(e) => warn!(host, error = %e, "unable to resolve address"),
        }
    }

    if resolved.is_empty() {
        return Err(HostSetError::Unresolvable(
            hosts.iter().map(|h| h.as_ref().to_string()).collect(),
        ));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let cs = ConnectString::parse("10.0.0.1:2181,10.0.0.2:2182").unwrap();
        assert_eq!(cs.hosts, vec!["10.0.0.1:2181", "10.0.0.2:2182"]);
        assert_eq!(cs.chroot, None);
    }

    #[test]
    fn test_parse_default_port_and_chroot() {
        let cs = ConnectString::parse("alpha, beta:3000/app/locks/").unwrap();
        assert_eq!(cs.hosts, vec!["alpha:2181", "beta:3000"]);
        assert_eq!(cs.chroot.as_deref(), Some("/app/locks"));

        let cs = ConnectString::parse("alpha/").unwrap();
        assert_eq!(cs.chroot, None);
    }

    #[test]
    fn test_parse_ipv6() {
        let cs = ConnectString::parse("[::1]:2181,[::1]").unwrap();
        assert_eq!(cs.hosts, vec!["[::1]:2181", "[::1]:2181"]);
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(ConnectString::parse(""), Err(HostSetError::EmptyMembership));
        assert_eq!(ConnectString::parse(" , /x"), Err(HostSetError::EmptyMembership));
    }

    #[test]
    fn test_resolve_literals() {
        let addrs = resolve_all(&["127.0.0.1:2181", "127.0.0.2:2182"]).unwrap();
        assert_eq!(
            addrs,
            vec![
                "127.0.0.1:2181".parse::<SocketAddr>().unwrap(),
                "127.0.0.2:2182".parse::<SocketAddr>().unwrap(),
            ]
        );
    }

    #[test]
    fn test_resolve_skips_bad_entries() {
        let addrs = resolve_all(&["not a host", "127.0.0.1:2181"]).unwrap();
        assert_eq!(addrs.len(), 1);
    }

    #[test]
    fn test_resolve_nothing() {
        let err = resolve_all(&["not a host"]).unwrap_err();
        assert_eq!(err, HostSetError::Unresolvable(vec!["not a host".to_string()]));
    }
}
