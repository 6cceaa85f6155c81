//! Parses the `[<proto>:]addr_port` address syntax used by `SERVER` and by
//! `_REQ`/`_RES` (spec §6 "Global command set").

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proto {
    Tcp,
    Udp,
    Tls,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub proto: Proto,
    pub host: Option<String>,
    pub port: u16,
}

/// Parses `[tcp|udp|tls|ssl:]host:port` or a bare `port` (host omitted means
/// "any interface" for a listener, "localhost" for a client connection —
/// the caller decides which default applies).
pub fn parse_address(spec: &str) -> Result<Address, String> {
    let mut rest = spec.trim();
    let mut proto = Proto::Tcp;
    for (prefix, p) in [("tcp:", Proto::Tcp), ("udp:", Proto::Udp), ("tls:", Proto::Tls), ("ssl:", Proto::Tls)] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            proto = p;
            rest = stripped;
            break;
        }
    }
    if rest.is_empty() {
        return Err(format!("empty address in {spec:?}"));
    }
    match rest.rsplit_once(':') {
        Some((host, port_str)) => {
            let port: u16 = port_str
                .parse()
                .map_err(|_| format!("invalid port {port_str:?} in {spec:?}"))?;
            Ok(Address {
                proto,
                host: Some(host.to_string()),
                port,
            })
        }
        None => {
            let port: u16 = rest
                .parse()
                .map_err(|_| format!("invalid port {rest:?} in {spec:?}"))?;
            Ok(Address {
                proto,
                host: None,
                port,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_port_has_no_host() {
        let addr = parse_address("0").unwrap();
        assert_eq!(addr.proto, Proto::Tcp);
        assert_eq!(addr.host, None);
        assert_eq!(addr.port, 0);
    }

    #[test]
    fn host_and_port() {
        let addr = parse_address("localhost:8080").unwrap();
        assert_eq!(addr.host.as_deref(), Some("localhost"));
        assert_eq!(addr.port, 8080);
    }

    #[test]
    fn proto_prefix() {
        let addr = parse_address("udp:localhost:9000").unwrap();
        assert_eq!(addr.proto, Proto::Udp);
        let addr = parse_address("ssl:localhost:443").unwrap();
        assert_eq!(addr.proto, Proto::Tls);
    }

    #[test]
    fn invalid_port_is_rejected() {
        assert!(parse_address("localhost:notaport").is_err());
    }
}
