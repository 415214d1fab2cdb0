//! Shared fixtures for driving [`Commands`] over the scripted transport.

#![allow(dead_code)]

use mrx24_lib::commands::Commands;
use mrx24_lib::crc::crc16;
use mrx24_lib::transport::{MockTransport, TransportKind};

/// Response frame as the device sends it: echoed opcode, status word,
/// payload, CRC16 of everything before it.
pub fn sealed_response(opcode: u16, status: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 6);
    frame.extend_from_slice(&opcode.to_be_bytes());
    frame.extend_from_slice(&status.to_be_bytes());
    frame.extend_from_slice(payload);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame
}

pub fn stream_commands() -> Commands<MockTransport> {
    Commands::new(MockTransport::new(TransportKind::Stream))
}

pub fn datagram_commands() -> Commands<MockTransport> {
    Commands::new(MockTransport::new(TransportKind::Datagram))
}

/// Incremental payload builder for fixtures, big-endian like the device.
#[derive(Default)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn new() -> Self {
        Payload(Vec::new())
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.0.push(v);
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn i16(mut self, v: i16) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn f32(mut self, v: f32) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn bytes(mut self, v: &[u8]) -> Self {
        self.0.extend_from_slice(v);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.0
    }
}
