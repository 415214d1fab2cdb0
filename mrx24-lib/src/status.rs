//! Device status word returned in every acknowledge.

use modular_bitfield::prelude::*;

use crate::error::{RadarError, Result};

/// 16-bit status bitmask, second word of every ACK.
///
/// `crc_error`, `meas_timeout` and `fw_update_error` are raised as faults
/// after frame validation; `acute_global_error` and `global_error_logged` are
/// informational and left for the caller to inspect. Payload content is only
/// meaningful while `wrong_rx_data` is clear.
#[bitfield(bytes = 2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub crc_error: bool,        // 0x0001
    pub wrong_rx_data: bool,    // 0x0002
    pub meas_timeout: bool,     // 0x0004
    pub frontend_error: bool,   // 0x0008
    pub frontend_overtemp: bool, // 0x0010
    #[skip]
    reserved0: B3,
    pub acute_global_error: bool, // 0x0100
    pub global_error_logged: bool, // 0x0200
    #[skip]
    reserved1: B2,
    pub fw_update_error: bool, // 0x1000
    #[skip]
    reserved2: B3,
}

impl Status {
    pub fn from_word(word: u16) -> Self {
        Status::from_bytes(word.to_le_bytes())
    }

    pub fn to_word(self) -> u16 {
        u16::from_le_bytes(self.into_bytes())
    }

    pub fn is_ok(self) -> bool {
        self.to_word() == 0
    }

    /// True when the device flagged a pending or logged global error.
    pub fn has_global_error(self) -> bool {
        self.acute_global_error() || self.global_error_logged()
    }

    /// Turn the fault-class bits into errors; informational bits pass.
    pub fn check_faults(self, opcode: u16) -> Result<()> {
        if self.crc_error() {
            return Err(RadarError::CrcError);
        }
        if self.meas_timeout() {
            return Err(RadarError::MeasurementTimeout { opcode });
        }
        if self.fw_update_error() {
            return Err(RadarError::FirmwareUpdateError { opcode });
        }
        Ok(())
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_assignments() {
        assert!(Status::from_word(0x0001).crc_error());
        assert!(Status::from_word(0x0002).wrong_rx_data());
        assert!(Status::from_word(0x0004).meas_timeout());
        assert!(Status::from_word(0x0008).frontend_error());
        assert!(Status::from_word(0x0010).frontend_overtemp());
        assert!(Status::from_word(0x0100).acute_global_error());
        assert!(Status::from_word(0x0200).global_error_logged());
        assert!(Status::from_word(0x1000).fw_update_error());
        assert_eq!(Status::from_word(0x1337).to_word(), 0x1337 & 0x131F);
    }

    #[test]
    fn fault_and_informational_split() {
        assert!(matches!(
            Status::from_word(0x0001).check_faults(0x0030),
            Err(RadarError::CrcError)
        ));
        assert!(matches!(
            Status::from_word(0x0004).check_faults(0x0030),
            Err(RadarError::MeasurementTimeout { opcode: 0x0030 })
        ));
        assert!(matches!(
            Status::from_word(0x1000).check_faults(0x0030),
            Err(RadarError::FirmwareUpdateError { opcode: 0x0030 })
        ));
        // Global-error bits are informational only.
        assert!(Status::from_word(0x0300).check_faults(0x0030).is_ok());
        assert!(Status::from_word(0x0300).has_global_error());
    }
}
