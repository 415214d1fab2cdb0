//! Framed request/response engine on top of a [`Transport`].
//!
//! Every exchange is strictly half duplex: encode one command frame, send it,
//! then read the response for that command before anything else moves. The
//! response always opens with a four-byte acknowledge (echoed opcode plus
//! status word); when CRC sealing is enabled a CRC16 of all bytes of the
//! direction is appended, and a received frame validates by reducing the
//! accumulator to residue zero over everything received in the exchange.
//!
//! Whether CRC sealing is used is decided when the link is built. The device
//! persists the choice per session, so flipping it mid-session would desync
//! both ends.

use std::thread::sleep;
use std::time::Duration;

use tracing::{debug, trace};

use crate::crc::Crc16;
use crate::error::{RadarError, Result};
use crate::frame::{RxFrame, TxFrame};
use crate::status::Status;
use crate::transport::{Transport, TransportKind};

/// Opcode echoed when the device does not implement the command.
pub const UNKNOWN_OPCODE: u16 = 0xE0F0;
/// Echoed opcode plus status word.
pub const ACK_SIZE: usize = 4;
pub const CRC_SIZE: usize = 2;
/// Ceiling for a single maximal read on datagram transports.
pub const MAX_TRANSFER_SIZE: usize = 40 * 1024;

/// Per-call receive behavior. Multi-phase commands flip the ACK/CRC flags
/// between phases; everything else uses [`ReceiveOptions::exchange`].
#[derive(Debug, Clone, Copy)]
pub struct ReceiveOptions {
    /// Expect (and consume) the four-byte acknowledge first.
    pub with_ack: bool,
    /// Expect the trailing CRC bytes to be part of this read.
    pub with_crc: bool,
    /// Verify the accumulator over everything received so far.
    pub check_crc: bool,
    /// One maximal read instead of filling the requested length exactly.
    pub allow_partial: bool,
}

impl ReceiveOptions {
    /// Complete single-phase response: ACK, payload, checked CRC.
    pub fn exchange() -> Self {
        ReceiveOptions {
            with_ack: true,
            with_crc: true,
            check_crc: true,
            allow_partial: false,
        }
    }

    /// First phase of a two-phase read: ACK and the length-bearing prefix,
    /// CRC still outstanding.
    pub fn header() -> Self {
        ReceiveOptions {
            with_ack: true,
            with_crc: false,
            check_crc: false,
            allow_partial: false,
        }
    }

    /// Second phase: remainder plus CRC, validated over the whole exchange.
    pub fn remainder() -> Self {
        ReceiveOptions {
            with_ack: false,
            with_crc: true,
            check_crc: true,
            allow_partial: false,
        }
    }

    pub fn partial(mut self) -> Self {
        self.allow_partial = true;
        self
    }
}

/// Protocol session over one transport: frame buffers, CRC state and the
/// bookkeeping of the command currently in flight.
pub struct RadarLink<T: Transport> {
    transport: T,
    tx: TxFrame,
    rx: RxFrame,
    crc: Crc16,
    use_crc: bool,
    current_opcode: u16,
    last_status: Status,
}

impl<T: Transport> RadarLink<T> {
    /// Link with CRC sealing enabled (the device default).
    pub fn new(transport: T) -> Self {
        Self::with_crc_mode(transport, true)
    }

    /// Link for devices configured to run without CRC sealing.
    pub fn without_crc(transport: T) -> Self {
        Self::with_crc_mode(transport, false)
    }

    fn with_crc_mode(transport: T, use_crc: bool) -> Self {
        let word_aligned = transport.word_aligned();
        RadarLink {
            transport,
            tx: TxFrame::new(word_aligned),
            rx: RxFrame::new(word_aligned),
            crc: Crc16::new(),
            use_crc,
            current_opcode: 0,
            last_status: Status::default(),
        }
    }

    pub fn open(&mut self) -> Result<()> {
        self.transport.open()
    }

    pub fn close(&mut self) {
        self.transport.close();
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn use_crc(&self) -> bool {
        self.use_crc
    }

    /// Status word of the most recent acknowledge.
    pub fn last_status(&self) -> Status {
        self.last_status
    }

    pub fn tx(&mut self) -> &mut TxFrame {
        &mut self.tx
    }

    pub fn rx(&mut self) -> &mut RxFrame {
        &mut self.rx
    }

    /// Start a new exchange: reset session state, clear both frames and
    /// encode the opcode.
    pub fn begin(&mut self, opcode: u16) {
        self.current_opcode = opcode;
        self.last_status = Status::default();
        self.tx.clear();
        self.rx.clear();
        self.tx.put_u16(opcode);
    }

    /// Seal and send the pending command frame. Opens the transport lazily.
    pub fn transmit(&mut self) -> Result<()> {
        if self.use_crc {
            self.crc.reset();
            self.crc.process(self.tx.as_slice());
            // One 16-bit word even on word-aligned links.
            let crc = self.crc.value();
            self.tx.put_u16(crc);
        }
        if !self.transport.is_open() {
            self.transport.open()?;
        }
        debug!(
            opcode = format_args!("{:#06x}", self.current_opcode),
            bytes = self.tx.len(),
            "transmit"
        );
        let mut sent = 0;
        while sent < self.tx.len() {
            let n = self.transport.write(&self.tx.as_slice()[sent..])?;
            if n == 0 {
                return Err(RadarError::TransmitFault(format!(
                    "link stalled after {sent} of {} bytes",
                    self.tx.len()
                )));
            }
            sent += n;
        }
        Ok(())
    }

    /// Read one response phase of `rx_len` payload bytes (plus ACK/CRC as
    /// configured). Returns the number of payload bytes now available.
    ///
    /// Exact mode keeps reading until the requested length is complete; a
    /// stalled link that only delivered the acknowledge is first checked for
    /// status faults so the device's own diagnosis wins over the generic
    /// truncation error.
    pub fn receive(&mut self, rx_len: usize, opts: ReceiveOptions) -> Result<usize> {
        let mut extra = 0;
        if opts.with_ack {
            extra += ACK_SIZE;
        }
        if self.use_crc && opts.with_crc {
            extra += CRC_SIZE;
        }

        let got = if opts.allow_partial {
            let want = (rx_len + extra).min(MAX_TRANSFER_SIZE);
            let buf = self.rx.space(want);
            let n = self.transport.read(buf)?;
            self.rx.commit(n);
            n
        } else {
            let want = rx_len + extra;
            let mut got = 0;
            while got < want {
                let buf = self.rx.space(want - got);
                let n = self.transport.read(buf)?;
                if n == 0 {
                    break;
                }
                self.rx.commit(n);
                got += n;
            }
            got
        };
        trace!(bytes = got, "receive phase");

        if got < extra {
            return Err(RadarError::TruncatedResponse {
                expected: rx_len + extra,
                actual: got,
            });
        }

        if self.use_crc && opts.check_crc {
            self.verify_crc()?;
        }

        if opts.with_ack {
            self.consume_ack()?;
        }

        let mut payload = got - if opts.with_ack { ACK_SIZE } else { 0 };
        if self.use_crc && opts.with_crc {
            payload = payload.saturating_sub(CRC_SIZE);
        }

        if rx_len > 0 && !opts.allow_partial && payload < rx_len {
            // The device may have answered with a bare fault acknowledge.
            self.raise_status_faults()?;
            return Err(RadarError::TruncatedResponse {
                expected: rx_len,
                actual: payload,
            });
        }
        Ok(payload)
    }

    /// Full round trip for simple commands: transmit, optional settle delay,
    /// single-phase receive, status faults raised.
    pub fn transceive(&mut self, rx_len: usize, delay: Duration) -> Result<usize> {
        self.transmit()?;
        if !delay.is_zero() {
            sleep(delay);
        }
        let opts = match self.kind() {
            TransportKind::Stream => ReceiveOptions::exchange(),
            TransportKind::Datagram => ReceiveOptions::exchange().partial(),
        };
        let payload = self.receive(rx_len, opts)?;
        self.raise_status_faults()?;
        if payload < rx_len {
            return Err(RadarError::TruncatedResponse {
                expected: rx_len,
                actual: payload,
            });
        }
        Ok(payload)
    }

    /// Validate the CRC over everything received this exchange.
    pub fn verify_crc(&mut self) -> Result<()> {
        self.crc.reset();
        self.crc.process(self.rx.received());
        if self.crc.value() != 0 {
            return Err(RadarError::CrcError);
        }
        Ok(())
    }

    fn consume_ack(&mut self) -> Result<()> {
        let echoed = self.rx.get_u16()?;
        let status = self.rx.get_u16()?;
        self.last_status = Status::from_word(status);
        trace!(
            echoed = format_args!("{echoed:#06x}"),
            status = format_args!("{status:#06x}"),
            "acknowledge"
        );
        if echoed != self.current_opcode {
            if echoed == UNKNOWN_OPCODE {
                return Err(RadarError::UnsupportedCommand {
                    opcode: self.current_opcode,
                });
            }
            return Err(RadarError::UnexpectedResponse {
                sent: self.current_opcode,
                received: echoed,
            });
        }
        Ok(())
    }

    /// Turn fault-class status bits of the last acknowledge into errors.
    pub fn raise_status_faults(&self) -> Result<()> {
        self.last_status.check_faults(self.current_opcode)
    }
}
