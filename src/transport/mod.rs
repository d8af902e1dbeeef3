//! Datagram transport to the hardware endpoint

pub mod packet;
mod udp;

pub use packet::{FrameError, PacketEncoder, PacketHeader, HEADER_LEN, PACKET_TYPE_AUDIO};
pub use udp::DeviceLink;
