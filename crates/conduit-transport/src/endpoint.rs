use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// A bindable address: IP+port, a Unix socket path, or an inherited file
/// handle.
///
/// For [`Endpoint::Ip`], the port may be `0` on input; `TransportManager::bind`
/// overwrites it with the kernel-assigned port once the listener is bound.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Ip(SocketAddr),
    Unix(PathBuf),
    FileHandle { handle: u64, hint: FileHandleHint },
}

/// A hint about what an inherited file handle actually is, since the kernel
/// gives us nothing but a raw descriptor number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileHandleHint {
    Tcp,
    Unix,
    Unknown,
}

impl Endpoint {
    /// Produces a new [`Endpoint`] with the same port (for [`Endpoint::Ip`])
    /// but `ip` substituted, used to expand a wildcard bind into concrete
    /// IPv4/IPv6 addresses.
    pub fn with_ip(&self, ip: IpAddr) -> Self {
        match self {
            Endpoint::Ip(addr) => Endpoint::Ip(SocketAddr::new(ip, addr.port())),
            other => other.clone(),
        }
    }

    /// Returns a copy of this endpoint with its port set to `port`, used
    /// once a stream/multiplexed bind resolves the kernel-assigned port for
    /// an input port of `0`.
    pub fn with_port(&self, port: u16) -> Self {
        match self {
            Endpoint::Ip(addr) => Endpoint::Ip(SocketAddr::new(addr.ip(), port)),
            other => other.clone(),
        }
    }

    /// `{scheme}://{host}:{port}` for IP, `{scheme}://unix:{path}` for Unix,
    /// `{scheme}://<file handle>` for inherited FDs. `scheme` is `https` iff
    /// TLS is configured for the endpoint, else `http`; the caller supplies
    /// it since this type does not know about TLS state.
    pub fn display_with_scheme(&self, scheme: &str) -> String {
        match self {
            Endpoint::Ip(addr) => format!("{scheme}://{}:{}", addr.ip(), addr.port()),
            Endpoint::Unix(path) => format!("{scheme}://unix:{}", path.display()),
            Endpoint::FileHandle { handle, .. } => format!("{scheme}://<file handle {handle}>"),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Endpoint::Ip(_) => "ip",
            Endpoint::Unix(_) => "unix",
            Endpoint::FileHandle { .. } => "file-handle",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_with_scheme("http"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_clone_preserves_port_and_swaps_ip() {
        let wildcard: SocketAddr = "[::]:4433".parse().unwrap();
        let endpoint = Endpoint::Ip(wildcard);
        let ipv4 = endpoint.with_ip("0.0.0.0".parse().unwrap());
        match ipv4 {
            Endpoint::Ip(addr) => {
                assert_eq!(addr.port(), 4433);
                assert!(addr.ip().is_ipv4());
            }
            _ => panic!("expected Ip endpoint"),
        }
    }

    #[test]
    fn display_uses_scheme_and_kind() {
        let endpoint = Endpoint::Unix(PathBuf::from("/tmp/conduit.sock"));
        assert_eq!(
            endpoint.display_with_scheme("https"),
            "https://unix:/tmp/conduit.sock"
        );
    }
}
