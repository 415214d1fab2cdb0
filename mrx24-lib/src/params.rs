//! Device configuration model.
//!
//! The structs here mirror the parameter blocks the radar stores in EEPROM.
//! [`Geometry`] is the derived, read-only snapshot the payload decoders work
//! from; it is rebuilt only when a parameter command succeeds, so a failed
//! exchange can never leave decoders with half-updated shape information.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::error::{RadarError, Result};
use crate::frame::{RxFrame, TxFrame};

/// Frontend code reported by `GetInfo` when no frontend is mounted.
pub const FE_CODE_NO_FE: u32 = 0xFE00_0000;
/// Frontend code of the AWR1243 77 GHz frontend.
pub const FE_CODE_AWR1243: u32 = 0xFE77_0001;

pub const MAX_RX_CHANNELS: usize = 4;
pub const MAX_RX_CHANNELS_MIMO: usize = 12;
pub const MAX_DETECTIONS: usize = 128;
pub const MAX_TRACKS: usize = 30;
pub const NUM_NN_CLASSES: usize = 8;
pub const SECTOR_RANGE_BINS: usize = 20;
pub const SECTOR_ANGLE_BINS: usize = 18;
pub const MAX_ERROR_LOG_ENTRIES: usize = 100;

/// Radar cube selection: (samples, range bins, Doppler bins) per value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u16)]
pub enum RadarCube {
    Smpl256Crp1 = 0,
    Smpl512Crp1 = 1,
    Smpl1024Crp1 = 2,
    Smpl2048Crp1 = 3,
    Smpl128Crp64 = 4,
    Smpl128Crp128 = 5,
    Smpl128Crp256 = 6,
    Smpl256Crp64 = 7,
    Smpl256Crp128 = 8,
    Smpl256Crp256 = 9,
    Smpl512Crp64 = 10,
    Smpl512Crp128 = 11,
    Smpl512Crp256 = 12,
    Smpl1024Crp64 = 13,
    Smpl1024Crp128 = 14,
    Smpl256Crp64Mimo = 15,
    Smpl256Crp128Mimo = 16,
    Smpl256Crp256Mimo = 17,
    Smpl512Crp64Mimo = 18,
    Smpl512Crp128Mimo = 19,
    Smpl1024Crp64Mimo = 20,
}

impl RadarCube {
    /// (samples, range bins, Doppler bins) of the selected cube.
    pub fn bins(self) -> (usize, usize, usize) {
        use RadarCube::*;
        match self {
            Smpl256Crp1 => (256, 256, 1),
            Smpl512Crp1 => (512, 512, 1),
            Smpl1024Crp1 => (1024, 1024, 1),
            Smpl2048Crp1 => (2048, 2048, 1),
            Smpl128Crp64 => (128, 64, 64),
            Smpl128Crp128 => (128, 64, 128),
            Smpl128Crp256 => (128, 64, 256),
            Smpl256Crp64 => (256, 128, 64),
            Smpl256Crp128 => (256, 128, 128),
            Smpl256Crp256 => (256, 128, 256),
            Smpl512Crp64 => (512, 256, 64),
            Smpl512Crp128 => (512, 256, 128),
            Smpl512Crp256 => (512, 256, 256),
            Smpl1024Crp64 => (1024, 512, 64),
            Smpl1024Crp128 => (1024, 512, 128),
            Smpl256Crp64Mimo => (256, 128, 64),
            Smpl256Crp128Mimo => (256, 128, 128),
            Smpl256Crp256Mimo => (256, 128, 256),
            Smpl512Crp64Mimo => (512, 256, 64),
            Smpl512Crp128Mimo => (512, 256, 128),
            Smpl1024Crp64Mimo => (1024, 512, 64),
        }
    }

    pub fn is_mimo(self) -> bool {
        u16::from(self) >= u16::from(RadarCube::Smpl256Crp64Mimo)
    }

    /// Single-chirp cubes use the short "one chirp kernel" range-FFT layout
    /// (first two channels complex, the rest magnitude).
    pub fn is_single_chirp(self) -> bool {
        u16::from(self) <= u16::from(RadarCube::Smpl2048Crp1)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u16)]
pub enum Processing {
    NoProcessing = 0,
    RangeFft = 1,
    DopplerFft = 2,
    Combining = 3,
    PeakDetection = 4,
    Cfar = 5,
    Detections = 6,
    Tracking = 7,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u16)]
pub enum WindowFunc {
    None = 0,
    Blackman = 1,
    Hamming = 2,
    Hann = 3,
    Nuttal = 4,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u16)]
pub enum SpeedEstimation {
    Off = 0,
    SpeedOnly = 1,
    FilterAll = 2,
    FilterTracks = 3,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u16)]
pub enum SignalType {
    CwMinFrequency = 1,
    CwMaxFrequency = 2,
    FmcwUpRamp = 3,
    FmcwDownRamp = 4,
    FmcwUpDownRamp = 5,
    FmcwDownUpRamp = 6,
}

fn bad_enum(field: &str, value: u16) -> RadarError {
    RadarError::MalformedResponse(format!("invalid {field} value {value:#06x}"))
}

/// Static device information returned by `GetInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_number: u32,
    pub frontend_connected: u32,
    pub fw_version: u32,
    pub fw_revision: u32,
    pub fw_date: u32,
}

impl DeviceInfo {
    pub fn fw_version_string(&self) -> String {
        format!(
            "{}.{}.{}",
            (self.fw_version >> 16) & 0xFF,
            (self.fw_version >> 8) & 0xFF,
            self.fw_version & 0xFF
        )
    }

    pub fn fw_date_string(&self) -> String {
        format!(
            "{}.{}.{}",
            (self.fw_date >> 24) & 0xFF,
            (self.fw_date >> 16) & 0xFF,
            self.fw_date & 0xFFFF
        )
    }

    pub fn has_frontend(&self) -> bool {
        self.frontend_connected != FE_CODE_NO_FE
    }

    pub(crate) fn decode(rx: &mut RxFrame) -> Result<Self> {
        Ok(DeviceInfo {
            device_number: rx.get_u32()?,
            frontend_connected: rx.get_u32()?,
            fw_version: rx.get_u32()?,
            fw_revision: rx.get_u32()?,
            fw_date: rx.get_u32()?,
        })
    }
}

/// Measurement and processing parameters, wire order preserved.
///
/// 60 bytes on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarParams {
    pub radar_cube: RadarCube,
    pub continuous_meas: u8,
    pub meas_interval_ms: u16,
    pub processing: Processing,
    pub range_win_func: WindowFunc,
    pub doppler_win_func: WindowFunc,
    pub doppler_fft_shift: u8,
    pub min_range_bin: u16,
    pub max_range_bin: u16,
    pub min_doppler_bin: i16,
    pub max_doppler_bin: i16,
    pub cfar_window_size: u16,
    pub cfar_guard_int: u16,
    pub range_cfar_thresh: u16,
    pub trigger_thresh: i16,
    pub peak_search_thresh: u16,
    pub suppress_static_targets: u16,
    pub max_targets: u16,
    pub max_tracks: u16,
    pub max_hor_speed: u16,
    pub max_ver_speed: u16,
    pub max_accel: u16,
    pub max_range_error: u16,
    pub min_confirm: u16,
    pub target_size: u16,
    pub merge_limit: u16,
    pub sector_filtering: u8,
    pub speed_estimation: SpeedEstimation,
    pub dsp_doppler_proc: u8,
    pub rx_channels: u16,
    pub cfar_select: u16,
    pub doppler_cfar_thresh: u16,
}

/// Request sentinels meaning "use the current maximum".
impl RadarParams {
    pub const MAX_RANGE_BIN: u16 = 0xEFCA;
    pub const MAX_DOPPLER_BIN: u16 = 0xFEAC;
}

impl Default for RadarParams {
    fn default() -> Self {
        RadarParams {
            radar_cube: RadarCube::Smpl512Crp128,
            continuous_meas: 0,
            meas_interval_ms: 0,
            processing: Processing::RangeFft,
            range_win_func: WindowFunc::Blackman,
            doppler_win_func: WindowFunc::Blackman,
            doppler_fft_shift: 1,
            min_range_bin: 0,
            max_range_bin: 255,
            min_doppler_bin: -64,
            max_doppler_bin: 63,
            cfar_window_size: 10,
            cfar_guard_int: 2,
            range_cfar_thresh: 8,
            trigger_thresh: 10,
            peak_search_thresh: 6,
            suppress_static_targets: 0,
            max_targets: 30,
            max_tracks: 10,
            max_hor_speed: 5,
            max_ver_speed: 1,
            max_accel: 10,
            max_range_error: 20,
            min_confirm: 2,
            target_size: 5,
            merge_limit: 15,
            sector_filtering: 0,
            speed_estimation: SpeedEstimation::Off,
            dsp_doppler_proc: 0,
            rx_channels: 0xF,
            cfar_select: 1,
            doppler_cfar_thresh: 10,
        }
    }
}

impl RadarParams {
    /// Payload size of a Get/SetRadarParams exchange (byte-wide transports).
    pub const WIRE_SIZE: usize = 60;

    pub(crate) fn encode(&self, tx: &mut TxFrame) {
        tx.put_u16(self.radar_cube.into());
        tx.put_u8(self.continuous_meas);
        tx.put_u16(self.meas_interval_ms);
        tx.put_u16(self.processing.into());
        tx.put_u16(self.range_win_func.into());
        tx.put_u16(self.doppler_win_func.into());
        tx.put_u8(self.doppler_fft_shift);
        tx.put_u16(self.min_range_bin);
        tx.put_u16(self.max_range_bin);
        tx.put_i16(self.min_doppler_bin);
        tx.put_i16(self.max_doppler_bin);
        tx.put_u16(self.cfar_window_size);
        tx.put_u16(self.cfar_guard_int);
        tx.put_u16(self.range_cfar_thresh);
        tx.put_i16(self.trigger_thresh);
        tx.put_u16(self.peak_search_thresh);
        tx.put_u16(self.suppress_static_targets);
        tx.put_u16(self.max_targets);
        tx.put_u16(self.max_tracks);
        tx.put_u16(self.max_hor_speed);
        tx.put_u16(self.max_ver_speed);
        tx.put_u16(self.max_accel);
        tx.put_u16(self.max_range_error);
        tx.put_u16(self.min_confirm);
        tx.put_u16(self.target_size);
        tx.put_u16(self.merge_limit);
        tx.put_u8(self.sector_filtering);
        tx.put_u16(self.speed_estimation.into());
        tx.put_u8(self.dsp_doppler_proc);
        tx.put_u16(self.rx_channels);
        tx.put_u16(self.cfar_select);
        tx.put_u16(self.doppler_cfar_thresh);
    }

    pub(crate) fn decode(rx: &mut RxFrame) -> Result<Self> {
        let radar_cube = rx.get_u16()?;
        let radar_cube =
            RadarCube::try_from(radar_cube).map_err(|_| bad_enum("radar cube", radar_cube))?;
        let continuous_meas = rx.get_u8()?;
        let meas_interval_ms = rx.get_u16()?;
        let processing = rx.get_u16()?;
        let processing =
            Processing::try_from(processing).map_err(|_| bad_enum("processing", processing))?;
        let range_win_func = rx.get_u16()?;
        let range_win_func = WindowFunc::try_from(range_win_func)
            .map_err(|_| bad_enum("range window", range_win_func))?;
        let doppler_win_func = rx.get_u16()?;
        let doppler_win_func = WindowFunc::try_from(doppler_win_func)
            .map_err(|_| bad_enum("doppler window", doppler_win_func))?;
        let doppler_fft_shift = rx.get_u8()?;
        let min_range_bin = rx.get_u16()?;
        let max_range_bin = rx.get_u16()?;
        let min_doppler_bin = rx.get_i16()?;
        let max_doppler_bin = rx.get_i16()?;
        let cfar_window_size = rx.get_u16()?;
        let cfar_guard_int = rx.get_u16()?;
        let range_cfar_thresh = rx.get_u16()?;
        let trigger_thresh = rx.get_i16()?;
        let peak_search_thresh = rx.get_u16()?;
        let suppress_static_targets = rx.get_u16()?;
        let max_targets = rx.get_u16()?;
        let max_tracks = rx.get_u16()?;
        let max_hor_speed = rx.get_u16()?;
        let max_ver_speed = rx.get_u16()?;
        let max_accel = rx.get_u16()?;
        let max_range_error = rx.get_u16()?;
        let min_confirm = rx.get_u16()?;
        let target_size = rx.get_u16()?;
        let merge_limit = rx.get_u16()?;
        let sector_filtering = rx.get_u8()?;
        let speed_estimation = rx.get_u16()?;
        let speed_estimation = SpeedEstimation::try_from(speed_estimation)
            .map_err(|_| bad_enum("speed estimation", speed_estimation))?;
        let dsp_doppler_proc = rx.get_u8()?;
        let rx_channels = rx.get_u16()?;
        let cfar_select = rx.get_u16()?;
        let doppler_cfar_thresh = rx.get_u16()?;
        let rp = RadarParams {
            radar_cube,
            continuous_meas,
            meas_interval_ms,
            processing,
            range_win_func,
            doppler_win_func,
            doppler_fft_shift,
            min_range_bin,
            max_range_bin,
            min_doppler_bin,
            max_doppler_bin,
            cfar_window_size,
            cfar_guard_int,
            range_cfar_thresh,
            trigger_thresh,
            peak_search_thresh,
            suppress_static_targets,
            max_targets,
            max_tracks,
            max_hor_speed,
            max_ver_speed,
            max_accel,
            max_range_error,
            min_confirm,
            target_size,
            merge_limit,
            sector_filtering,
            speed_estimation,
            dsp_doppler_proc,
            rx_channels,
            cfar_select,
            doppler_cfar_thresh,
        };
        if let Some(msg) = rp.window_error() {
            return Err(RadarError::MalformedResponse(msg));
        }
        Ok(rp)
    }

    /// Ordering violation in the range or Doppler window, if any. Both
    /// windows must be ordered before a [`Geometry`] snapshot can be derived.
    pub(crate) fn window_error(&self) -> Option<String> {
        if self.max_range_bin < self.min_range_bin {
            return Some(format!(
                "inverted range window {}..{}",
                self.min_range_bin, self.max_range_bin
            ));
        }
        if self.max_doppler_bin < self.min_doppler_bin {
            return Some(format!(
                "inverted Doppler window {}..{}",
                self.min_doppler_bin, self.max_doppler_bin
            ));
        }
        None
    }
}

/// Read-only decoding snapshot derived from [`RadarParams`].
///
/// Every shape-dependent decoder works from this instead of the raw
/// parameters: cube bin counts, the active range/Doppler windows, the active
/// channel mask and the precomputed Doppler bin index list (already remapped
/// when the Doppler FFT shift is enabled).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    pub num_samples: usize,
    pub num_range_bins: usize,
    pub num_doppler_bins: usize,
    pub active_range_bins: usize,
    pub active_doppler_bins: usize,
    pub min_range_bin: u16,
    pub max_range_bin: u16,
    pub is_mimo: bool,
    pub single_chirp: bool,
    pub rx_channels: u16,
    pub speed_estimation: bool,
    pub dsp_doppler_proc: bool,
    /// Doppler bin indices in transmission order, FFT-shift corrected.
    pub doppler_indices: Vec<u16>,
}

impl Geometry {
    /// Derive the snapshot for an ordered parameter set. Inverted windows are
    /// rejected at the exchange boundaries (`RadarParams::decode` and the set
    /// commands); a degenerate window here clamps to a single bin.
    pub fn from_params(rp: &RadarParams) -> Self {
        let (num_samples, num_range_bins, num_doppler_bins) = rp.radar_cube.bins();
        let is_mimo = rp.radar_cube.is_mimo();
        let nd = num_doppler_bins as i32;
        let min = rp.min_doppler_bin as i32;
        let max = rp.max_doppler_bin as i32;

        // Split the configured window into the positive and negative halves
        // of the raw FFT output.
        let (mut neg, mut pos) = if min < 0 && max >= 0 {
            (Some((nd + min, nd - 1)), Some((0, max)))
        } else if min >= 0 && max > 0 {
            (None, Some((min, max)))
        } else {
            (Some((nd + min, nd + max)), None)
        };

        let shift = rp.doppler_fft_shift != 0;
        if shift {
            // With FFT shift the device reorders bins so negative frequencies
            // come first; remap both intervals by half the bin count.
            let half = nd / 2;
            neg = neg.map(|(lo, hi)| (lo - half, hi - half));
            pos = pos.map(|(lo, hi)| (lo + half, hi + half));
        }

        let mut doppler_indices = Vec::new();
        let mut push = |interval: Option<(i32, i32)>| {
            if let Some((lo, hi)) = interval {
                doppler_indices.extend((lo..=hi).map(|d| d as u16));
            }
        };
        if shift {
            push(neg);
            push(pos);
        } else {
            push(pos);
            push(neg);
        }

        Geometry {
            num_samples,
            num_range_bins,
            num_doppler_bins,
            active_range_bins: rp.max_range_bin.saturating_sub(rp.min_range_bin) as usize + 1,
            active_doppler_bins: (max - min).max(0) as usize + 1,
            min_range_bin: rp.min_range_bin,
            max_range_bin: rp.max_range_bin,
            is_mimo,
            single_chirp: rp.radar_cube.is_single_chirp(),
            rx_channels: rp.rx_channels,
            speed_estimation: rp.speed_estimation != SpeedEstimation::Off,
            dsp_doppler_proc: rp.dsp_doppler_proc != 0,
            doppler_indices,
        }
    }

    /// Number of selectable channels for the current cube (12 in MIMO mode).
    pub fn max_rx_channels(&self) -> usize {
        if self.is_mimo {
            MAX_RX_CHANNELS_MIMO
        } else {
            MAX_RX_CHANNELS
        }
    }

    fn channel_mask(&self) -> u16 {
        if self.is_mimo {
            self.rx_channels & 0xFFF
        } else {
            self.rx_channels & 0xF
        }
    }

    /// Channels present in payloads, ascending bit order; unset bits
    /// contribute no bytes at all.
    pub fn active_channels(&self) -> impl Iterator<Item = u8> + '_ {
        let mask = self.channel_mask();
        (0..self.max_rx_channels() as u8).filter(move |c| mask & (1 << c) != 0)
    }

    pub fn active_channel_count(&self) -> usize {
        self.channel_mask().count_ones() as usize
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry::from_params(&RadarParams::default())
    }
}

/// Frontend synthesizer/channel parameters, 42 bytes on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontendParams {
    pub min_frequency_khz: u32,
    pub max_frequency_khz: u32,
    pub signal_type: SignalType,
    pub tx_channel_selection: u16,
    pub rx_channel_selection: u16,
    pub tx_power_setting: i16,
    pub rx_power_setting: i16,
    pub ramp_init_ns: u32,
    pub ramp_time_ns: u32,
    pub ramp_reset_ns: u32,
    pub ramp_delay_ns: u32,
    pub opt_param1: i16,
    pub opt_param2: i16,
    pub opt_param3: i16,
    pub opt_param4: i16,
}

impl Default for FrontendParams {
    fn default() -> Self {
        // AWR1243 lower VCO band defaults.
        FrontendParams {
            min_frequency_khz: 76_000_000,
            max_frequency_khz: 77_000_000,
            signal_type: SignalType::FmcwUpRamp,
            tx_channel_selection: 0x1,
            rx_channel_selection: 0xF,
            tx_power_setting: 0,
            rx_power_setting: 10,
            ramp_init_ns: 0,
            ramp_time_ns: 70_000,
            ramp_reset_ns: 0,
            ramp_delay_ns: 0,
            opt_param1: 1,
            opt_param2: 0,
            opt_param3: 60,
            opt_param4: 0,
        }
    }
}

const C0: f64 = 299_792_458.0; // [m/s]

impl FrontendParams {
    pub const WIRE_SIZE: usize = 42;

    /// Complete time of one chirp in seconds.
    pub fn chirp_time(&self) -> f64 {
        (self.ramp_init_ns + self.ramp_time_ns + self.ramp_reset_ns + self.ramp_delay_ns) as f64
            * 1e-9
    }

    pub fn range_resolution(&self) -> f64 {
        let bw_hz = (self.max_frequency_khz.saturating_sub(self.min_frequency_khz)) as f64 * 1e3;
        if bw_hz == 0.0 {
            return 1.0;
        }
        C0 / (2.0 * bw_hz)
    }

    pub(crate) fn encode(&self, tx: &mut TxFrame) {
        tx.put_u32(self.min_frequency_khz);
        tx.put_u32(self.max_frequency_khz);
        tx.put_u16(self.signal_type.into());
        tx.put_u16(self.tx_channel_selection);
        tx.put_u16(self.rx_channel_selection);
        tx.put_i16(self.tx_power_setting);
        tx.put_i16(self.rx_power_setting);
        tx.put_u32(self.ramp_init_ns);
        tx.put_u32(self.ramp_time_ns);
        tx.put_u32(self.ramp_reset_ns);
        tx.put_u32(self.ramp_delay_ns);
        tx.put_i16(self.opt_param1);
        tx.put_i16(self.opt_param2);
        tx.put_i16(self.opt_param3);
        tx.put_i16(self.opt_param4);
    }

    pub(crate) fn decode(rx: &mut RxFrame) -> Result<Self> {
        let min_frequency_khz = rx.get_u32()?;
        let max_frequency_khz = rx.get_u32()?;
        let signal_type = rx.get_u16()?;
        let signal_type =
            SignalType::try_from(signal_type).map_err(|_| bad_enum("signal type", signal_type))?;
        Ok(FrontendParams {
            min_frequency_khz,
            max_frequency_khz,
            signal_type,
            tx_channel_selection: rx.get_u16()?,
            rx_channel_selection: rx.get_u16()?,
            tx_power_setting: rx.get_i16()?,
            rx_power_setting: rx.get_i16()?,
            ramp_init_ns: rx.get_u32()?,
            ramp_time_ns: rx.get_u32()?,
            ramp_reset_ns: rx.get_u32()?,
            ramp_delay_ns: rx.get_u32()?,
            opt_param1: rx.get_i16()?,
            opt_param2: rx.get_i16()?,
            opt_param3: rx.get_i16()?,
            opt_param4: rx.get_i16()?,
        })
    }
}

pub const ENET_MAX_TCP_PORTS: usize = 2;
pub const ENET_MAX_UDP_PORTS: usize = 2;
pub const ENET_MAX_MULTICAST_GROUPS: usize = 4;

/// Network configuration block of the device, 53 bytes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthernetConfig {
    pub dhcp: u8,
    pub auto_ip: u8,
    pub ip: [u8; 4],
    pub tcp_ports: [u16; ENET_MAX_TCP_PORTS],
    pub udp_ports: [u16; ENET_MAX_UDP_PORTS],
    pub subnet_mask: [u8; 4],
    pub default_gateway: [u8; 4],
    pub multicast_groups: [[u8; 4]; ENET_MAX_MULTICAST_GROUPS],
    pub sntp_mode: u8,
    pub ntp_server: [u8; 4],
    /// Read-only fields below are reported by the device but never written.
    pub udp_multicast_port: u16,
    pub udp_broadcast_port: u16,
    pub mac: [u8; 6],
}

impl Default for EthernetConfig {
    fn default() -> Self {
        EthernetConfig {
            dhcp: 0,
            auto_ip: 0,
            ip: [192, 168, 0, 2],
            tcp_ports: [1024, 1025],
            udp_ports: [4120, 4121],
            subnet_mask: [255, 255, 0, 0],
            default_gateway: [192, 168, 0, 1],
            multicast_groups: [
                [227, 115, 82, 100],
                [0, 115, 82, 101],
                [0, 115, 82, 102],
                [0, 115, 82, 103],
            ],
            sntp_mode: 0,
            ntp_server: [0, 0, 0, 0],
            udp_multicast_port: 4440,
            udp_broadcast_port: 4444,
            mac: [0; 6],
        }
    }
}

impl EthernetConfig {
    pub const WIRE_SIZE: usize =
        29 + ENET_MAX_TCP_PORTS * 2 + ENET_MAX_UDP_PORTS * 2 + ENET_MAX_MULTICAST_GROUPS * 4;

    pub(crate) fn encode(&self, tx: &mut TxFrame) {
        tx.put_u8(self.dhcp);
        tx.put_u8(self.auto_ip);
        for b in self.ip {
            tx.put_u8(b);
        }
        for p in self.tcp_ports {
            tx.put_u16(p);
        }
        for p in self.udp_ports {
            tx.put_u16(p);
        }
        for b in self.subnet_mask {
            tx.put_u8(b);
        }
        for b in self.default_gateway {
            tx.put_u8(b);
        }
        for group in self.multicast_groups {
            for b in group {
                tx.put_u8(b);
            }
        }
        tx.put_u8(self.sntp_mode);
        for b in self.ntp_server {
            tx.put_u8(b);
        }
    }

    pub(crate) fn decode(rx: &mut RxFrame) -> Result<Self> {
        let mut cfg = EthernetConfig::default();
        cfg.dhcp = rx.get_u8()?;
        cfg.auto_ip = rx.get_u8()?;
        for b in cfg.ip.iter_mut() {
            *b = rx.get_u8()?;
        }
        for p in cfg.tcp_ports.iter_mut() {
            *p = rx.get_u16()?;
        }
        for p in cfg.udp_ports.iter_mut() {
            *p = rx.get_u16()?;
        }
        for b in cfg.subnet_mask.iter_mut() {
            *b = rx.get_u8()?;
        }
        for b in cfg.default_gateway.iter_mut() {
            *b = rx.get_u8()?;
        }
        for group in cfg.multicast_groups.iter_mut() {
            for b in group.iter_mut() {
                *b = rx.get_u8()?;
            }
        }
        cfg.sntp_mode = rx.get_u8()?;
        for b in cfg.ntp_server.iter_mut() {
            *b = rx.get_u8()?;
        }
        cfg.udp_multicast_port = rx.get_u16()?;
        cfg.udp_broadcast_port = rx.get_u16()?;
        for b in cfg.mac.iter_mut() {
            *b = rx.get_u8()?;
        }
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum StreamProtocol {
    Tcp = 1,
    Udp = 2,
}

/// Configuration for device-initiated measurement streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub ip: [u8; 4],
    pub port: u16,
    pub own_port: u16,
    pub protocol: StreamProtocol,
    pub data_mode: u16,
    pub meas_mode: u16,
    pub delays: [u32; 4],
    pub mask: u16,
    pub data_mask: u16,
    pub chirp_raw: u16,
    pub chirp_range: u16,
    pub range_bin: u16,
    pub doppler_format: u16,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            ip: [0, 0, 0, 0],
            port: 0,
            own_port: 0,
            protocol: StreamProtocol::Udp,
            data_mode: 0,
            meas_mode: 0,
            delays: [0; 4],
            mask: 0,
            data_mask: 0,
            chirp_raw: 0,
            chirp_range: 0,
            range_bin: 0,
            doppler_format: 0,
        }
    }
}

/// Resolution figures reported by `GetRadarResolution`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub if_hz: f32,
    pub range_m: f32,
    pub doppler_hz: f32,
    pub speed_mps: f32,
}
