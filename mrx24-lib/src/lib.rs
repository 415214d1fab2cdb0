pub mod commands;
pub mod crc;
pub mod decode;
pub mod error;
pub mod frame;
pub mod link;
pub mod params;
pub mod status;
pub mod targets;
pub mod transport;

// Re-export the driver facade and its building blocks for easy access
pub use commands::{Commands, Opcode};
pub use error::{RadarError, Result};
pub use link::RadarLink;
pub use transport::{TcpTransport, Transport, TransportKind, UdpTransport};
