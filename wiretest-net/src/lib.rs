//! Transport and socket-table types the interpreter's `_REQ`/`_RES`/send/
//! recv commands are built on (spec §1 "external collaborators", §9
//! "Transport abstraction").

pub mod socket;
pub mod transport;

#[cfg(feature = "tls")]
pub use transport::tls;
pub use socket::{SocketEntry, SocketState, SocketTable, socket_key};
pub use transport::{TcpTransport, Transport, UdpTransport};
