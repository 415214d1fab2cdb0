//! Structured measurement records produced by the read commands.
//!
//! These are plain data carriers; all wire knowledge lives in `decode`.

use serde::{Deserialize, Serialize};

use crate::params::{NUM_NN_CLASSES, SECTOR_ANGLE_BINS, SECTOR_RANGE_BINS};

/// Number of per-module error masks reported by `GetErrors`/`GetErrorLogs`.
pub const NUM_ERROR_MODULES: usize = 16;

/// Bits of the `ReadData` selection mask. A mask of zero selects raw ADC
/// samples instead.
pub mod data_mask {
    pub const RAW: u16 = 0x0;
    pub const RANGE_FFT: u16 = 0x1;
    pub const DOPPLER_FFT: u16 = 0x2;
    pub const MAGNITUDE_MAP: u16 = 0x4;
    pub const PEAK_MAP: u16 = 0x8;
    pub const CFAR_MAP: u16 = 0x10;
    pub const DETECTIONS: u16 = 0x20;
    pub const TRACKS: u16 = 0x40;
}

/// One complex spectrum sample, I and Q as signed 16-bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Iq {
    pub re: i16,
    pub im: i16,
}

impl Iq {
    /// Squared magnitude, exact in 33 bits.
    pub fn abs_sq(self) -> u64 {
        let re = self.re as i64;
        let im = self.im as i64;
        (re * re + im * im) as u64
    }
}

/// Samples of one receive channel. Channels absent from the configured mask
/// contribute no data at all, so the channel number is carried explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelData<T> {
    pub channel: u8,
    pub samples: Vec<T>,
}

/// Raw ADC frame of one chirp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    pub time_ms: u64,
    pub channels: Vec<ChannelData<i16>>,
}

/// Range spectrum of one channel. Single-chirp cubes deliver the first two
/// channels complex and the remaining ones magnitude-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Spectrum {
    Complex(Vec<Iq>),
    Magnitude(Vec<u16>),
}

impl Spectrum {
    pub fn len(&self) -> usize {
        match self {
            Spectrum::Complex(v) => v.len(),
            Spectrum::Magnitude(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpectrum {
    pub channel: u8,
    pub spectrum: Spectrum,
}

/// Strongest range peak over all channels, appended to single-chirp range
/// frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangePeak {
    pub channel: u16,
    pub range_bin: u16,
    pub magnitude: u16,
}

/// Range FFT payload. The layout switches on the cube, not on a field in the
/// frame, so the decoder picks the variant from the geometry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RangeProfile {
    /// Single-chirp cubes: mixed complex/magnitude channels plus the peak.
    SingleChirp {
        channels: Vec<ChannelSpectrum>,
        peak: RangePeak,
    },
    /// Multi-chirp cubes: complex spectra per chirp per channel.
    Chirps(Vec<Vec<ChannelData<Iq>>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeData {
    pub time_ms: u64,
    pub profile: RangeProfile,
}

/// Doppler spectra of one range bin, complex per active channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DopplerData {
    pub time_ms: u64,
    pub channels: Vec<ChannelData<Iq>>,
}

/// Range/Doppler magnitude map. Rows follow the configured Doppler bin order
/// (FFT-shift corrected), each row covering the active range window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeDopplerMap {
    pub time_ms: u64,
    pub rows: Vec<Vec<u16>>,
}

/// One-bit-per-range-bin map (peak or CFAR hits), one row per Doppler bin of
/// the full cube, packed into 32-bit words.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitMap {
    pub num_range_bins: usize,
    pub rows: Vec<Vec<u32>>,
}

impl BitMap {
    pub fn is_set(&self, doppler_bin: usize, range_bin: usize) -> bool {
        if range_bin >= self.num_range_bins {
            return false;
        }
        self.rows
            .get(doppler_bin)
            .and_then(|row| row.get(range_bin >> 5))
            .map(|word| word >> (range_bin & 31) & 1 != 0)
            .unwrap_or(false)
    }

    pub fn count_set(&self) -> usize {
        self.rows
            .iter()
            .flatten()
            .map(|w| w.count_ones() as usize)
            .sum()
    }
}

/// All three maps of one measurement in a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllMaps {
    pub time_ms: u64,
    pub magnitude: RangeDopplerMap,
    pub peaks: BitMap,
    pub cfar: BitMap,
}

/// Ego-speed estimate prefix, present whenever speed estimation is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedEstimate {
    pub doppler_bin: i16,
    pub speed_raw: i16,
}

/// One detected target, 10 bytes on the wire. Angles are raw device units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub range_bin: u16,
    pub doppler_bin: i16,
    pub magnitude: u16,
    pub azimuth: i16,
    pub elevation: i16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionList {
    pub time_ms: u64,
    pub speed: Option<SpeedEstimate>,
    pub targets: Vec<Detection>,
}

/// Doppler spectra attached to a track. Format 1 carries complex spectra per
/// active channel, format 2 a single combined magnitude spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackSpectra {
    Complex(Vec<ChannelData<Iq>>),
    Magnitude(Vec<u16>),
}

/// One confirmed track, 24 bytes on the wire plus 16 bytes of class scores
/// when DSP Doppler processing is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: u16,
    pub range_m: f32,
    pub speed_mps: f32,
    pub magnitude: u16,
    pub azimuth_deg: f32,
    pub elevation_deg: f32,
    pub lifetime_ms: u32,
    pub classes: Option<[u16; NUM_NN_CLASSES]>,
    pub spectra: Option<TrackSpectra>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackList {
    pub time_ms: u64,
    pub speed: Option<SpeedEstimate>,
    pub targets: Vec<Track>,
}

/// Composite `ReadData` frame: one measurement time plus the sections
/// selected by the data mask, in mask bit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneData {
    pub data_mask: u16,
    pub time_ms: u64,
    pub raw: Option<Vec<Vec<ChannelData<i16>>>>,
    pub range_fft: Option<RangeProfile>,
    pub doppler_fft: Option<Vec<Vec<ChannelData<Iq>>>>,
    pub magnitude_map: Option<Vec<Vec<u16>>>,
    pub peak_map: Option<BitMap>,
    pub cfar_map: Option<BitMap>,
    pub detections: Option<DetectionList>,
    pub tracks: Option<TrackList>,
}

impl SceneData {
    pub(crate) fn empty(data_mask: u16, time_ms: u64) -> Self {
        SceneData {
            data_mask,
            time_ms,
            raw: None,
            range_fft: None,
            doppler_fft: None,
            magnitude_map: None,
            peak_map: None,
            cfar_map: None,
            detections: None,
            tracks: None,
        }
    }
}

/// One persisted error log record: device time and module error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub time_ms: u64,
    pub code: u16,
}

/// Global error mask plus one mask per firmware module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMasks {
    pub global: u16,
    pub modules: [u16; NUM_ERROR_MODULES],
}

impl ErrorMasks {
    pub fn any(&self) -> bool {
        self.global != 0 || self.modules.iter().any(|&m| m != 0)
    }
}

/// Range/angle sector enable map for sector filtering, range-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorMap {
    pub cells: [[u8; SECTOR_ANGLE_BINS]; SECTOR_RANGE_BINS],
}

impl Default for SectorMap {
    fn default() -> Self {
        SectorMap {
            cells: [[0; SECTOR_ANGLE_BINS]; SECTOR_RANGE_BINS],
        }
    }
}

/// Raw frontend sensor readings (meaning depends on the mounted frontend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeSensors {
    pub values: [i32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_word_and_bit_addressing() {
        let map = BitMap {
            num_range_bins: 64,
            rows: vec![vec![0x0000_0001, 0x8000_0000], vec![0, 0]],
        };
        assert!(map.is_set(0, 0));
        assert!(map.is_set(0, 63));
        assert!(!map.is_set(0, 1));
        assert!(!map.is_set(1, 0));
        // Out-of-range queries answer false instead of panicking.
        assert!(!map.is_set(0, 64));
        assert!(!map.is_set(5, 0));
        assert_eq!(map.count_set(), 2);
    }

    #[test]
    fn iq_abs_sq_extremes() {
        let s = Iq {
            re: i16::MIN,
            im: i16::MIN,
        };
        assert_eq!(s.abs_sq(), 2 * (32768u64 * 32768));
        assert_eq!(Iq::default().abs_sq(), 0);
    }

    #[test]
    fn error_masks_any() {
        let mut masks = ErrorMasks {
            global: 0,
            modules: [0; NUM_ERROR_MODULES],
        };
        assert!(!masks.any());
        masks.modules[7] = 0x40;
        assert!(masks.any());
    }
}
