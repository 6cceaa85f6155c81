//! The `Transport` seam: the interpreter's `_REQ`/`_RES`/send/recv handlers
//! go through this trait, never touching `std::net` or `rustls` directly
//! (spec §9 "Transport abstraction"), the same way the teacher's interpreter
//! never touches a concrete terminal, only `TerminalBackend`.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// A byte-oriented, line-bufferable connection: one TCP connection, one
/// "connected" UDP socket, or one TLS session over either.
pub trait Transport: Send {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Read up to `buf.len()` bytes. Returns `Ok(0)` on clean EOF.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Read a single line (without the trailing `\n`), using the transport's
    /// internal buffer (spec §3 socket entry "peek buffer and length").
    fn read_line(&mut self) -> io::Result<String>;

    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    fn shutdown(&mut self) -> io::Result<()>;

    fn peer_description(&self) -> String;

    fn is_tls(&self) -> bool {
        false
    }
}

/// A plain TCP connection, read through a `BufReader` so `read_line` can be
/// implemented without losing bytes a later raw `read` would need.
pub struct TcpTransport {
    write_half: TcpStream,
    reader: BufReader<TcpStream>,
    peer: String,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        let write_half = stream.try_clone()?;
        Ok(Self {
            write_half,
            reader: BufReader::new(stream),
            peer,
        })
    }
}

impl Transport for TcpTransport {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.write_half.write_all(buf)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(line);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        self.write_half.set_write_timeout(timeout)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.write_half.shutdown(std::net::Shutdown::Both)
    }

    fn peer_description(&self) -> String {
        self.peer.clone()
    }
}

/// A "connected" UDP socket (spec §2 "compatibility shims: UDP connect/bind").
/// UDP has no stream framing, so `read_line` treats one datagram as one line.
pub struct UdpTransport {
    socket: std::net::UdpSocket,
    peer: String,
    pending: std::collections::VecDeque<u8>,
}

impl UdpTransport {
    pub fn connected(socket: std::net::UdpSocket, peer: std::net::SocketAddr) -> io::Result<Self> {
        socket.connect(peer)?;
        Ok(Self {
            socket,
            peer: peer.to_string(),
            pending: std::collections::VecDeque::new(),
        })
    }
}

impl Transport for UdpTransport {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.socket.send(buf).map(|_| ())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.pending.is_empty() {
            let n = buf.len().min(self.pending.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.pending.pop_front().unwrap();
            }
            return Ok(n);
        }
        self.socket.recv(buf)
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut datagram = [0u8; 65536];
        let n = self.socket.recv(&mut datagram)?;
        let text = String::from_utf8_lossy(&datagram[..n]).into_owned();
        Ok(text.trim_end_matches(['\r', '\n']).to_string())
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket.set_read_timeout(timeout)?;
        self.socket.set_write_timeout(timeout)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn peer_description(&self) -> String {
        self.peer.clone()
    }
}

#[cfg(feature = "tls")]
pub mod tls {
    use super::Transport;
    use std::io::{self, Read, Write};
    use std::net::TcpStream;
    use std::sync::Arc;
    use std::time::Duration;

    /// TLS over a TCP stream, client or server side. Certificates and trust
    /// roots are loaded once at startup by the caller; this type only drives
    /// the handshake and framed I/O. `rustls::StreamOwned` isn't nameable
    /// generically over client/server connections, so the two sides are
    /// kept as enum variants instead of one generic struct.
    pub struct TlsSession {
        role: RoleStream,
        peer: String,
    }

    enum RoleStream {
        Client(rustls::StreamOwned<rustls::ClientConnection, TcpStream>),
        Server(rustls::StreamOwned<rustls::ServerConnection, TcpStream>),
    }

    impl TlsSession {
        pub fn client(
            config: Arc<rustls::ClientConfig>,
            server_name: rustls::pki_types::ServerName<'static>,
            stream: TcpStream,
        ) -> io::Result<Self> {
            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "<unknown>".to_string());
            let conn = rustls::ClientConnection::new(config, server_name)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            Ok(Self {
                role: RoleStream::Client(rustls::StreamOwned::new(conn, stream)),
                peer,
            })
        }

        pub fn server(config: Arc<rustls::ServerConfig>, stream: TcpStream) -> io::Result<Self> {
            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "<unknown>".to_string());
            let conn = rustls::ServerConnection::new(config)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            Ok(Self {
                role: RoleStream::Server(rustls::StreamOwned::new(conn, stream)),
                peer,
            })
        }
    }

    impl Transport for TlsSession {
        fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
            match &mut self.role {
                RoleStream::Client(s) => s.write_all(buf),
                RoleStream::Server(s) => s.write_all(buf),
            }
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match &mut self.role {
                RoleStream::Client(s) => s.read(buf),
                RoleStream::Server(s) => s.read(buf),
            }
        }

        fn read_line(&mut self) -> io::Result<String> {
            let mut line = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                let n = self.read(&mut byte)?;
                if n == 0 {
                    break;
                }
                if byte[0] == b'\n' {
                    break;
                }
                line.push(byte[0]);
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            Ok(String::from_utf8_lossy(&line).into_owned())
        }

        fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
            match &self.role {
                RoleStream::Client(s) => {
                    s.sock.set_read_timeout(timeout)?;
                    s.sock.set_write_timeout(timeout)
                }
                RoleStream::Server(s) => {
                    s.sock.set_read_timeout(timeout)?;
                    s.sock.set_write_timeout(timeout)
                }
            }
        }

        fn shutdown(&mut self) -> io::Result<()> {
            match &self.role {
                RoleStream::Client(s) => s.sock.shutdown(std::net::Shutdown::Both),
                RoleStream::Server(s) => s.sock.shutdown(std::net::Shutdown::Both),
            }
        }

        fn peer_description(&self) -> String {
            self.peer.clone()
        }

        fn is_tls(&self) -> bool {
            true
        }
    }

    /// Loads `cert_path`/`key_path` (PEM) into a server TLS config. `SERVER`
    /// loads `server.cert.pem`/`server.key.pem` from the working directory
    /// when present (spec §4.1 `SERVER` syntax help text).
    pub fn load_server_config(cert_path: &std::path::Path, key_path: &std::path::Path) -> io::Result<Arc<rustls::ServerConfig>> {
        let cert_file = std::fs::File::open(cert_path)?;
        let certs: Vec<_> = rustls_pemfile::certs(&mut io::BufReader::new(cert_file))
            .collect::<Result<_, _>>()?;
        let key_file = std::fs::File::open(key_path)?;
        let key = rustls_pemfile::private_key(&mut io::BufReader::new(key_file))?
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no private key found"))?;
        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Arc::new(config))
    }

    /// A client config that trusts the platform's native root store, for
    /// connecting to `tls:`/`ssl:`-prefixed `_REQ` addresses.
    pub fn load_client_config() -> io::Result<Arc<rustls::ClientConfig>> {
        let mut roots = rustls::RootCertStore::empty();
        for cert in rustls_native_certs::load_native_certs().certs {
            let _ = roots.add(cert);
        }
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Arc::new(config))
    }

    /// Loads the native-roots client config and performs the handshake
    /// against `host`, keeping `rustls`'s types out of the callers that only
    /// need a `Transport` (`_REQ tls:`/`ssl:`).
    pub fn connect_client(host: &str, stream: TcpStream) -> io::Result<TlsSession> {
        let config = load_client_config()?;
        let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        TlsSession::client(config, server_name, stream)
    }

    /// Loads `cert_path`/`key_path` and performs the server-side handshake
    /// on an already-accepted `stream` (`SERVER tls:`/`ssl:`).
    pub fn accept_server(cert_path: &std::path::Path, key_path: &std::path::Path, stream: TcpStream) -> io::Result<TlsSession> {
        let config = load_server_config(cert_path, key_path)?;
        TlsSession::server(config, stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    #[test]
    fn tcp_transport_roundtrips_a_line() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut transport = TcpTransport::new(stream).unwrap();
            transport.write_all(b"hello\r\n").unwrap();
        });
        let stream = TcpStream::connect(addr).unwrap();
        let mut client = TcpTransport::new(stream).unwrap();
        let line = client.read_line().unwrap();
        assert_eq!(line, "hello");
        server.join().unwrap();
    }
}
