//! Typed command surface of the device.
//!
//! [`Commands`] owns the link plus cached copies of the device configuration.
//! The cached [`Geometry`] snapshot is what gives every response its shape,
//! so it is rebuilt exclusively here, and only after a parameter exchange
//! came back clean. Callers that change parameters behind our back must
//! refresh with [`Commands::get_radar_params`] before reading measurement
//! data.

use std::time::Duration;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::Display;
use tracing::{debug, warn};

use crate::decode::{
    self, DETECTION_ROW_BYTES, SPEED_ESTIMATE_BYTES, ALL,
};
use crate::error::{RadarError, Result};
use crate::link::{RadarLink, ReceiveOptions, CRC_SIZE, MAX_TRANSFER_SIZE};
use crate::params::{
    DeviceInfo, EthernetConfig, FrontendParams, Geometry, Processing, RadarParams, Resolution,
    StreamConfig, MAX_DETECTIONS, MAX_ERROR_LOG_ENTRIES, MAX_TRACKS, SECTOR_ANGLE_BINS,
    SECTOR_RANGE_BINS,
};
use crate::status::Status;
use crate::targets::{
    AllMaps, BitMap, DetectionList, DopplerData, ErrorLogEntry, ErrorMasks, FeSensors, RangeData,
    RangeDopplerMap, RawFrame, SceneData, SectorMap, SpeedEstimate, TrackList, NUM_ERROR_MODULES,
};
use crate::transport::{Transport, TransportKind};

const ERROR_LOG_ROW_BYTES: usize = 10;
const DATA_HEADER_BYTES: usize = 12; // measurement time + payload size

/// Command opcodes, first word of every request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u16)]
pub enum Opcode {
    GetInfo = 0x0001,
    GetSysTime = 0x0003,
    SetSysTime = 0x0004,
    GetRadarParams = 0x000A,
    SetRadarParams = 0x000B,
    ResetRadarParams = 0x000C,
    GetRadarResolution = 0x000D,
    GetFrontendParams = 0x0010,
    SetFrontendParams = 0x0011,
    ResetFrontendParams = 0x0012,
    ResetFrontend = 0x0013,
    GetEthernetConfig = 0x0020,
    SetEthernetConfig = 0x0021,
    ResetEthernetConfig = 0x0022,
    GetStream = 0x0023,
    StartEthernetStream = 0x0024,
    StopEthernetStream = 0x0025,
    StopUsbStream = 0x0026,
    GetMultiDataStream = 0x0027,
    ConfigureStream = 0x0028,
    TriggerStream = 0x0029,
    ReadData = 0x0030,
    ReadRawData = 0x0031,
    ReadRangeData = 0x0032,
    ReadDopplerData = 0x0033,
    ReadRangeDopplerMap = 0x0034,
    ReadPeakMap = 0x0035,
    ReadCfarMap = 0x0036,
    ReadAllMaps = 0x0037,
    ReadDetections = 0x0038,
    ReadTracks = 0x0039,
    ReadTrackedDopplerSpectra = 0x003A,
    ConfigSectorMap = 0x0040,
    GetSectorMap = 0x0041,
    SetSectorMap = 0x0042,
    /// Writes that skip the EEPROM carry the volatile bit on top of the
    /// regular set opcode.
    SetRadarParamsVolatile = 0x800B,
    SetFrontendParamsVolatile = 0x8011,
    SetEthernetConfigVolatile = 0x8021,
    GetErrors = 0xE000,
    GetErrorLogs = 0xE001,
    ResetErrorLogs = 0xE002,
    GetErrorLogTable = 0xE003,
    ResetErrorLogTable = 0xE004,
    FwUpdStart = 0xFDA0,
    FwUpdAbort = 0xFDA1,
    FwUpdData32 = 0xFDA2,
    FwUpdData64 = 0xFDA3,
    FwUpdData128 = 0xFDA4,
    FwUpdData256 = 0xFDA5,
    FwUpdData512 = 0xFDA6,
    FwUpdData1024 = 0xFDA7,
    FwUpdFlashStart = 0xFDA8,
    GetFeSensors = 0xFE01,
}

/// Driver facade: one typed method per device command.
pub struct Commands<T: Transport> {
    link: RadarLink<T>,
    info: Option<DeviceInfo>,
    radar: RadarParams,
    geometry: Geometry,
    frontend: FrontendParams,
    ethernet: EthernetConfig,
}

impl<T: Transport> Commands<T> {
    pub fn new(transport: T) -> Self {
        Self::with_link(RadarLink::new(transport))
    }

    pub fn without_crc(transport: T) -> Self {
        Self::with_link(RadarLink::without_crc(transport))
    }

    fn with_link(link: RadarLink<T>) -> Self {
        let radar = RadarParams::default();
        let geometry = Geometry::from_params(&radar);
        Commands {
            link,
            info: None,
            radar,
            geometry,
            frontend: FrontendParams::default(),
            ethernet: EthernetConfig::default(),
        }
    }

    pub fn open(&mut self) -> Result<()> {
        self.link.open()
    }

    pub fn close(&mut self) {
        self.link.close();
    }

    pub fn link(&self) -> &RadarLink<T> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut RadarLink<T> {
        &mut self.link
    }

    /// Last fetched device information, if `GetInfo` ran.
    pub fn info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    /// Cached radar parameters (what the device last confirmed).
    pub fn radar_params(&self) -> &RadarParams {
        &self.radar
    }

    pub fn frontend_params(&self) -> &FrontendParams {
        &self.frontend
    }

    pub fn ethernet_config(&self) -> &EthernetConfig {
        &self.ethernet
    }

    /// Decoding snapshot in effect for measurement reads.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn last_status(&self) -> Status {
        self.link.last_status()
    }

    /// True when the device accepted the transmitted values of the last
    /// parameter write.
    pub fn params_accepted(&self) -> bool {
        !self.link.last_status().wrong_rx_data()
    }

    pub fn has_global_error(&self) -> bool {
        self.link.last_status().has_global_error()
    }

    fn begin(&mut self, op: Opcode) {
        debug!(command = %op, "command");
        self.link.begin(op.into());
    }

    /// Argument-free command without response payload.
    fn simple(&mut self, op: Opcode) -> Result<()> {
        self.begin(op);
        self.link.transceive(0, Duration::ZERO)?;
        Ok(())
    }

    // ----- error handling ---------------------------------------------------

    fn error_masks(&mut self, op: Opcode) -> Result<ErrorMasks> {
        self.begin(op);
        self.link.transceive(2 * (1 + NUM_ERROR_MODULES), Duration::ZERO)?;
        let rx = self.link.rx();
        let global = rx.get_u16()?;
        let mut modules = [0u16; NUM_ERROR_MODULES];
        for mask in modules.iter_mut() {
            *mask = rx.get_u16()?;
        }
        Ok(ErrorMasks { global, modules })
    }

    /// Pending error masks, global plus one per firmware module.
    pub fn get_errors(&mut self) -> Result<ErrorMasks> {
        self.error_masks(Opcode::GetErrors)
    }

    /// Error masks accumulated in the persistent log.
    pub fn get_error_logs(&mut self) -> Result<ErrorMasks> {
        self.error_masks(Opcode::GetErrorLogs)
    }

    pub fn reset_error_logs(&mut self, reset_mask: u16) -> Result<()> {
        self.begin(Opcode::ResetErrorLogs);
        self.link.tx().put_u16(reset_mask);
        self.link.transceive(0, Duration::ZERO)?;
        Ok(())
    }

    /// Persisted error log, entry count first on the wire. The count arrives
    /// in its own phase on stream transports because the row block length is
    /// unknown until then.
    pub fn get_error_log_table(&mut self) -> Result<Vec<ErrorLogEntry>> {
        self.begin(Opcode::GetErrorLogTable);
        self.link.transmit()?;

        let count = match self.link.kind() {
            TransportKind::Datagram => {
                let max = 2 + MAX_ERROR_LOG_ENTRIES * ERROR_LOG_ROW_BYTES;
                let got = self
                    .link
                    .receive(max, ReceiveOptions::exchange().partial())?;
                self.link.raise_status_faults()?;
                if got < 2 {
                    return Err(RadarError::TruncatedResponse {
                        expected: 2,
                        actual: got,
                    });
                }
                self.checked_log_count()?
            }
            TransportKind::Stream => {
                self.link.receive(2, ReceiveOptions::header())?;
                self.link.raise_status_faults()?;
                let count = self.checked_log_count()?;
                self.link
                    .receive(count * ERROR_LOG_ROW_BYTES, ReceiveOptions::remainder())?;
                count
            }
        };

        let rx = self.link.rx();
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(ErrorLogEntry {
                time_ms: rx.get_u64()?,
                code: rx.get_u16()?,
            });
        }
        Ok(entries)
    }

    fn checked_log_count(&mut self) -> Result<usize> {
        let count = self.link.rx().get_u16()? as usize;
        if count > MAX_ERROR_LOG_ENTRIES {
            return Err(RadarError::MalformedResponse(format!(
                "error log count {count} exceeds limit {MAX_ERROR_LOG_ENTRIES}"
            )));
        }
        Ok(count)
    }

    pub fn reset_error_log_table(&mut self) -> Result<()> {
        self.simple(Opcode::ResetErrorLogTable)
    }

    // ----- info and time ----------------------------------------------------

    pub fn get_info(&mut self) -> Result<DeviceInfo> {
        self.begin(Opcode::GetInfo);
        self.link.transceive(5 * 4, Duration::ZERO)?;
        let info = DeviceInfo::decode(self.link.rx())?;
        self.info = Some(info);
        Ok(info)
    }

    pub fn get_fe_sensors(&mut self) -> Result<FeSensors> {
        self.begin(Opcode::GetFeSensors);
        self.link.transceive(4 * 4, Duration::ZERO)?;
        let rx = self.link.rx();
        let mut values = [0i32; 4];
        for v in values.iter_mut() {
            *v = rx.get_i32()?;
        }
        Ok(FeSensors { values })
    }

    /// Device time in milliseconds.
    pub fn get_sys_time(&mut self) -> Result<u64> {
        self.begin(Opcode::GetSysTime);
        self.link.transceive(8, Duration::ZERO)?;
        self.link.rx().get_u64()
    }

    pub fn set_sys_time(&mut self, time_ms: u64) -> Result<()> {
        self.begin(Opcode::SetSysTime);
        self.link.tx().put_u64(time_ms);
        self.link.transceive(0, Duration::ZERO)?;
        Ok(())
    }

    // ----- radar parameters -------------------------------------------------

    pub fn get_radar_params(&mut self) -> Result<RadarParams> {
        self.begin(Opcode::GetRadarParams);
        self.link.transceive(RadarParams::WIRE_SIZE, Duration::ZERO)?;
        let rp = RadarParams::decode(self.link.rx())?;
        self.adopt_radar_params(rp.clone());
        Ok(rp)
    }

    /// Write radar parameters to the device (and its EEPROM).
    pub fn set_radar_params(&mut self, rp: &RadarParams) -> Result<()> {
        self.set_radar_params_with(Opcode::SetRadarParams, rp)
    }

    /// Write radar parameters without persisting them to EEPROM.
    pub fn set_radar_params_volatile(&mut self, rp: &RadarParams) -> Result<()> {
        self.set_radar_params_with(Opcode::SetRadarParamsVolatile, rp)
    }

    fn set_radar_params_with(&mut self, op: Opcode, rp: &RadarParams) -> Result<()> {
        if let Some(msg) = rp.window_error() {
            return Err(RadarError::InvalidArgument(msg));
        }
        self.begin(op);
        rp.encode(self.link.tx());
        self.link.transceive(0, Duration::ZERO)?;
        if self.params_accepted() {
            self.adopt_radar_params(rp.clone());
        } else {
            warn!("device rejected radar parameters, keeping previous snapshot");
        }
        Ok(())
    }

    fn adopt_radar_params(&mut self, rp: RadarParams) {
        self.geometry = Geometry::from_params(&rp);
        self.radar = rp;
    }

    /// Restore factory radar parameters. The cached snapshot is stale
    /// afterwards until the next [`Commands::get_radar_params`].
    pub fn reset_radar_params(&mut self) -> Result<()> {
        self.simple(Opcode::ResetRadarParams)
    }

    pub fn get_radar_resolution(&mut self) -> Result<Resolution> {
        self.begin(Opcode::GetRadarResolution);
        self.link.transceive(4 * 4, Duration::ZERO)?;
        let rx = self.link.rx();
        Ok(Resolution {
            if_hz: rx.get_f32()?,
            range_m: rx.get_f32()?,
            doppler_hz: rx.get_f32()?,
            speed_mps: rx.get_f32()?,
        })
    }

    // ----- frontend ---------------------------------------------------------

    pub fn get_frontend_params(&mut self) -> Result<FrontendParams> {
        self.begin(Opcode::GetFrontendParams);
        self.link
            .transceive(FrontendParams::WIRE_SIZE, Duration::ZERO)?;
        let fp = FrontendParams::decode(self.link.rx())?;
        self.frontend = fp.clone();
        Ok(fp)
    }

    pub fn set_frontend_params(&mut self, fp: &FrontendParams) -> Result<()> {
        self.set_frontend_params_with(Opcode::SetFrontendParams, fp)
    }

    pub fn set_frontend_params_volatile(&mut self, fp: &FrontendParams) -> Result<()> {
        self.set_frontend_params_with(Opcode::SetFrontendParamsVolatile, fp)
    }

    fn set_frontend_params_with(&mut self, op: Opcode, fp: &FrontendParams) -> Result<()> {
        self.begin(op);
        fp.encode(self.link.tx());
        self.link.transceive(0, Duration::ZERO)?;
        if self.params_accepted() {
            self.frontend = fp.clone();
        } else {
            warn!("device rejected frontend parameters, keeping previous snapshot");
        }
        Ok(())
    }

    pub fn reset_frontend_params(&mut self) -> Result<()> {
        self.simple(Opcode::ResetFrontendParams)
    }

    /// Power-cycle the frontend hardware.
    pub fn reset_frontend(&mut self) -> Result<()> {
        self.simple(Opcode::ResetFrontend)
    }

    // ----- ethernet and streaming -------------------------------------------

    pub fn get_ethernet_config(&mut self) -> Result<EthernetConfig> {
        self.begin(Opcode::GetEthernetConfig);
        self.link
            .transceive(EthernetConfig::WIRE_SIZE, Duration::ZERO)?;
        let cfg = EthernetConfig::decode(self.link.rx())?;
        self.ethernet = cfg.clone();
        Ok(cfg)
    }

    /// Write the network configuration. Only the writable prefix travels;
    /// ports, MAC and broadcast settings past the NTP server are read-only.
    pub fn set_ethernet_config(&mut self, cfg: &EthernetConfig) -> Result<()> {
        self.set_ethernet_config_with(Opcode::SetEthernetConfig, cfg)
    }

    pub fn set_ethernet_config_volatile(&mut self, cfg: &EthernetConfig) -> Result<()> {
        self.set_ethernet_config_with(Opcode::SetEthernetConfigVolatile, cfg)
    }

    fn set_ethernet_config_with(&mut self, op: Opcode, cfg: &EthernetConfig) -> Result<()> {
        self.begin(op);
        cfg.encode(self.link.tx());
        self.link.transceive(0, Duration::ZERO)?;
        if self.params_accepted() {
            self.ethernet = cfg.clone();
        }
        Ok(())
    }

    pub fn reset_ethernet_config(&mut self) -> Result<()> {
        self.simple(Opcode::ResetEthernetConfig)
    }

    /// Request a single measurement push to the current connection.
    pub fn get_stream(&mut self, mask: u16, opt: u16) -> Result<()> {
        self.begin(Opcode::GetStream);
        let tx = self.link.tx();
        tx.put_u16(mask);
        tx.put_u16(opt);
        self.link.transceive(0, Duration::ZERO)?;
        Ok(())
    }

    pub fn get_multi_data_stream(
        &mut self,
        mask: u16,
        data_mask: u16,
        chirp: u16,
        range_bin: u16,
        doppler_format: u16,
    ) -> Result<()> {
        self.begin(Opcode::GetMultiDataStream);
        let tx = self.link.tx();
        tx.put_u16(mask);
        tx.put_u16(data_mask);
        tx.put_u16(chirp);
        tx.put_u16(range_bin);
        tx.put_u16(doppler_format);
        self.link.transceive(0, Duration::ZERO)?;
        Ok(())
    }

    /// Start a device-initiated stream to the endpoint in `cfg`. The data
    /// selector is picked from `cfg` by the processing stage currently
    /// configured on the device.
    pub fn start_ethernet_stream(&mut self, cfg: &StreamConfig) -> Result<()> {
        let opt = match self.radar.processing {
            Processing::NoProcessing => cfg.chirp_raw,
            Processing::RangeFft => cfg.chirp_range,
            Processing::DopplerFft => cfg.range_bin,
            Processing::Tracking => cfg.doppler_format,
            _ => 0,
        };
        self.begin(Opcode::StartEthernetStream);
        let tx = self.link.tx();
        tx.put_u16(cfg.mask);
        tx.put_u16(opt);
        tx.put_u16(cfg.protocol.into());
        tx.put_u16(cfg.port);
        for b in cfg.ip {
            tx.put_u8(b);
        }
        tx.put_u16(cfg.own_port);
        self.link.transceive(0, Duration::ZERO)?;
        Ok(())
    }

    pub fn configure_stream(&mut self, cfg: &StreamConfig) -> Result<()> {
        self.begin(Opcode::ConfigureStream);
        let tx = self.link.tx();
        tx.put_u16(cfg.data_mode);
        tx.put_u16(cfg.meas_mode);
        for d in cfg.delays {
            tx.put_u32(d);
        }
        tx.put_u16(cfg.mask);
        tx.put_u16(cfg.data_mask);
        tx.put_u16(cfg.chirp_range);
        tx.put_u16(cfg.range_bin);
        tx.put_u16(cfg.doppler_format);
        self.link.transceive(0, Duration::ZERO)?;
        Ok(())
    }

    pub fn trigger_stream(
        &mut self,
        time_ms: u64,
        time_mode: u16,
        delay_index: u16,
    ) -> Result<()> {
        self.begin(Opcode::TriggerStream);
        let tx = self.link.tx();
        tx.put_u64(time_ms);
        tx.put_u16(time_mode);
        tx.put_u16(delay_index);
        self.link.transceive(0, Duration::ZERO)?;
        Ok(())
    }

    pub fn stop_ethernet_stream(&mut self, port_type: u16, port: u16) -> Result<()> {
        self.begin(Opcode::StopEthernetStream);
        let tx = self.link.tx();
        tx.put_u16(port_type);
        tx.put_u16(port);
        self.link.transceive(0, Duration::ZERO)?;
        Ok(())
    }

    pub fn stop_usb_stream(&mut self) -> Result<()> {
        self.simple(Opcode::StopUsbStream)
    }

    // ----- measurement reads ------------------------------------------------

    fn check_chirp(&self, chirp: u16, allow_all: bool) -> Result<()> {
        if chirp == ALL && allow_all {
            return Ok(());
        }
        if (chirp as usize) < self.geometry.num_doppler_bins {
            return Ok(());
        }
        Err(RadarError::InvalidArgument(format!(
            "chirp {chirp} out of range (cube has {} chirps)",
            self.geometry.num_doppler_bins
        )))
    }

    fn check_range_bin(&self, range_bin: u16, allow_all: bool) -> Result<()> {
        if range_bin == ALL && allow_all {
            return Ok(());
        }
        if (range_bin as usize) < self.geometry.num_range_bins {
            return Ok(());
        }
        Err(RadarError::InvalidArgument(format!(
            "range bin {range_bin} out of range (cube has {} bins)",
            self.geometry.num_range_bins
        )))
    }

    /// Composite measurement frame selected by `data_mask` (zero selects raw
    /// ADC data). The response carries its own length, so the payload is
    /// received in two phases and only then decoded against the snapshot.
    pub fn read_data(
        &mut self,
        data_mask: u16,
        chirp: u16,
        range_bin: u16,
        doppler_format: u16,
    ) -> Result<SceneData> {
        self.check_chirp(chirp, true)?;
        self.check_range_bin(range_bin, true)?;

        self.begin(Opcode::ReadData);
        let tx = self.link.tx();
        tx.put_u16(data_mask);
        tx.put_u16(chirp);
        tx.put_u16(range_bin);
        tx.put_u16(doppler_format);
        self.link.transmit()?;

        let crc_len = if self.link.use_crc() { CRC_SIZE } else { 0 };
        let (time_ms, data_size) = match self.link.kind() {
            TransportKind::Datagram => {
                let mut have = self
                    .link
                    .receive(MAX_TRANSFER_SIZE, ReceiveOptions::header().partial())?;
                self.link.raise_status_faults()?;
                if have < DATA_HEADER_BYTES {
                    return Err(RadarError::TruncatedResponse {
                        expected: DATA_HEADER_BYTES,
                        actual: have,
                    });
                }
                let time_ms = self.link.rx().get_u64()?;
                let data_size = self.link.rx().get_u32()? as usize;
                let needed = DATA_HEADER_BYTES + data_size + crc_len;
                while have < needed {
                    let n = self.link.receive(
                        needed - have,
                        ReceiveOptions {
                            with_ack: false,
                            with_crc: false,
                            check_crc: false,
                            allow_partial: true,
                        },
                    )?;
                    if n == 0 {
                        return Err(RadarError::TruncatedResponse {
                            expected: needed,
                            actual: have,
                        });
                    }
                    have += n;
                }
                if self.link.use_crc() {
                    self.link.verify_crc()?;
                }
                (time_ms, data_size)
            }
            TransportKind::Stream => {
                self.link
                    .receive(DATA_HEADER_BYTES, ReceiveOptions::header())?;
                self.link.raise_status_faults()?;
                let time_ms = self.link.rx().get_u64()?;
                let data_size = self.link.rx().get_u32()? as usize;
                self.link.receive(data_size, ReceiveOptions::remainder())?;
                (time_ms, data_size)
            }
        };
        debug!(data_size, "composite frame received");

        decode::scene(
            self.link.rx(),
            &self.geometry,
            data_mask,
            chirp,
            range_bin,
            doppler_format,
            time_ms,
        )
    }

    /// Raw ADC samples of one chirp.
    pub fn read_raw_data(&mut self, chirp: u16) -> Result<RawFrame> {
        self.check_chirp(chirp, false)?;
        self.begin(Opcode::ReadRawData);
        self.link.tx().put_u16(chirp);
        let rx_len = decode::raw_chirp_size(&self.geometry) + 8;
        self.link.transceive(rx_len, Duration::ZERO)?;
        let time_ms = self.link.rx().get_u64()?;
        let channels = decode::raw_chirp(self.link.rx(), &self.geometry)?;
        Ok(RawFrame { time_ms, channels })
    }

    /// Range spectra of one chirp.
    pub fn read_range_data(&mut self, chirp: u16) -> Result<RangeData> {
        self.check_chirp(chirp, false)?;
        self.begin(Opcode::ReadRangeData);
        self.link.tx().put_u16(chirp);
        let rx_len = decode::range_profile_size(&self.geometry, chirp) + 8;
        self.link.transceive(rx_len, Duration::ZERO)?;
        let time_ms = self.link.rx().get_u64()?;
        let profile = decode::range_profile(self.link.rx(), &self.geometry, chirp)?;
        Ok(RangeData { time_ms, profile })
    }

    /// Doppler spectra of one range bin.
    pub fn read_doppler_data(&mut self, range_bin: u16) -> Result<DopplerData> {
        self.check_range_bin(range_bin, false)?;
        self.begin(Opcode::ReadDopplerData);
        self.link.tx().put_u16(range_bin);
        let rx_len = decode::doppler_size(&self.geometry) + 8;
        self.link.transceive(rx_len, Duration::ZERO)?;
        let time_ms = self.link.rx().get_u64()?;
        let channels = decode::doppler_channels(self.link.rx(), &self.geometry)?;
        Ok(DopplerData { time_ms, channels })
    }

    pub fn read_range_doppler_map(&mut self) -> Result<RangeDopplerMap> {
        self.begin(Opcode::ReadRangeDopplerMap);
        let rx_len = decode::magnitude_map_size(&self.geometry) + 8;
        self.link.transceive(rx_len, Duration::ZERO)?;
        let time_ms = self.link.rx().get_u64()?;
        let rows = decode::magnitude_map(self.link.rx(), &self.geometry)?;
        Ok(RangeDopplerMap { time_ms, rows })
    }

    pub fn read_peak_map(&mut self) -> Result<(u64, BitMap)> {
        self.read_bit_map(Opcode::ReadPeakMap)
    }

    pub fn read_cfar_map(&mut self) -> Result<(u64, BitMap)> {
        self.read_bit_map(Opcode::ReadCfarMap)
    }

    fn read_bit_map(&mut self, op: Opcode) -> Result<(u64, BitMap)> {
        self.begin(op);
        let rx_len = decode::bit_map_size(&self.geometry) + 8;
        self.link.transceive(rx_len, Duration::ZERO)?;
        let time_ms = self.link.rx().get_u64()?;
        let map = decode::bit_map(self.link.rx(), &self.geometry)?;
        Ok((time_ms, map))
    }

    /// Magnitude, peak and CFAR maps of one measurement in a single frame.
    pub fn read_all_maps(&mut self) -> Result<AllMaps> {
        self.begin(Opcode::ReadAllMaps);
        let rx_len = 8
            + decode::magnitude_map_size(&self.geometry)
            + 2 * decode::bit_map_size(&self.geometry);
        self.link.transceive(rx_len, Duration::ZERO)?;
        let time_ms = self.link.rx().get_u64()?;
        let rows = decode::magnitude_map(self.link.rx(), &self.geometry)?;
        let peaks = decode::bit_map(self.link.rx(), &self.geometry)?;
        let cfar = decode::bit_map(self.link.rx(), &self.geometry)?;
        Ok(AllMaps {
            time_ms,
            magnitude: RangeDopplerMap { time_ms, rows },
            peaks,
            cfar,
        })
    }

    fn speed_prefix_len(&self) -> usize {
        if self.geometry.speed_estimation {
            SPEED_ESTIMATE_BYTES
        } else {
            0
        }
    }

    /// Current detection list. Variable length, so stream transports fetch
    /// the count first and the rows in a second phase.
    pub fn read_detections(&mut self) -> Result<DetectionList> {
        self.begin(Opcode::ReadDetections);
        let min = 10 + self.speed_prefix_len();
        self.link.transmit()?;

        match self.link.kind() {
            TransportKind::Datagram => {
                let max = min + MAX_DETECTIONS * DETECTION_ROW_BYTES;
                let got = self
                    .link
                    .receive(max, ReceiveOptions::exchange().partial())?;
                self.link.raise_status_faults()?;
                if got < min {
                    return Err(RadarError::TruncatedResponse {
                        expected: min,
                        actual: got,
                    });
                }
                let time_ms = self.link.rx().get_u64()?;
                let speed = decode::speed_estimate(self.link.rx(), &self.geometry)?;
                let count = decode::detection_count(self.link.rx())?;
                let targets = decode::detection_rows(self.link.rx(), count)?;
                Ok(DetectionList {
                    time_ms,
                    speed,
                    targets,
                })
            }
            TransportKind::Stream => {
                self.link.receive(min, ReceiveOptions::header())?;
                self.link.raise_status_faults()?;
                let time_ms = self.link.rx().get_u64()?;
                let speed = decode::speed_estimate(self.link.rx(), &self.geometry)?;
                let count = decode::detection_count(self.link.rx())?;
                self.link
                    .receive(count * DETECTION_ROW_BYTES, ReceiveOptions::remainder())?;
                let targets = decode::detection_rows(self.link.rx(), count)?;
                Ok(DetectionList {
                    time_ms,
                    speed,
                    targets,
                })
            }
        }
    }

    /// Current track list. The ego-speed estimate travels after the count in
    /// this frame, unlike the detection frame.
    pub fn read_tracks(&mut self) -> Result<TrackList> {
        self.begin(Opcode::ReadTracks);
        let min = 10 + self.speed_prefix_len();
        let row = decode::track_row_size(&self.geometry);
        self.link.transmit()?;

        let (time_ms, count) = match self.link.kind() {
            TransportKind::Datagram => {
                let max = min + MAX_TRACKS * row;
                let got = self
                    .link
                    .receive(max, ReceiveOptions::exchange().partial())?;
                self.link.raise_status_faults()?;
                if got < min {
                    return Err(RadarError::TruncatedResponse {
                        expected: min,
                        actual: got,
                    });
                }
                let time_ms = self.link.rx().get_u64()?;
                let count = decode::track_count(self.link.rx())?;
                (time_ms, count)
            }
            TransportKind::Stream => {
                self.link.receive(min, ReceiveOptions::header())?;
                self.link.raise_status_faults()?;
                let time_ms = self.link.rx().get_u64()?;
                let count = decode::track_count(self.link.rx())?;
                self.link.receive(count * row, ReceiveOptions::remainder())?;
                (time_ms, count)
            }
        };

        let speed = decode::speed_estimate(self.link.rx(), &self.geometry)?;
        let mut targets = Vec::with_capacity(count);
        for _ in 0..count {
            targets.push(decode::track_row(self.link.rx(), &self.geometry)?);
        }
        Ok(TrackList {
            time_ms,
            speed,
            targets,
        })
    }

    /// Track list with per-track Doppler spectra in the requested format
    /// (see `decode::SPECTRA_*`).
    pub fn read_tracked_doppler_spectra(&mut self, format: u16) -> Result<TrackList> {
        self.begin(Opcode::ReadTrackedDopplerSpectra);
        self.link.tx().put_u16(format);
        let min = 10 + self.speed_prefix_len();
        let row = decode::track_row_size(&self.geometry)
            + decode::track_spectra_size(&self.geometry, format);
        let crc_len = if self.link.use_crc() { CRC_SIZE } else { 0 };
        self.link.transmit()?;

        match self.link.kind() {
            TransportKind::Datagram => {
                let max = min + MAX_TRACKS * row + crc_len;
                let mut have = self
                    .link
                    .receive(max, ReceiveOptions::header().partial())?;
                self.link.raise_status_faults()?;
                if have < min {
                    return Err(RadarError::TruncatedResponse {
                        expected: min,
                        actual: have,
                    });
                }
                // The prefix is decoded before the remainder loop because the
                // row block length depends on the count.
                let time_ms = self.link.rx().get_u64()?;
                let speed = decode::speed_estimate(self.link.rx(), &self.geometry)?;
                let count = decode::track_count(self.link.rx())?;
                let needed = min + count * row + crc_len;
                while have < needed {
                    let n = self.link.receive(
                        needed - have,
                        ReceiveOptions {
                            with_ack: false,
                            with_crc: false,
                            check_crc: false,
                            allow_partial: true,
                        },
                    )?;
                    if n == 0 {
                        return Err(RadarError::TruncatedResponse {
                            expected: needed,
                            actual: have,
                        });
                    }
                    have += n;
                }
                if self.link.use_crc() {
                    self.link.verify_crc()?;
                }
                self.finish_spectra(time_ms, speed, count, format)
            }
            TransportKind::Stream => {
                self.link.receive(min, ReceiveOptions::header())?;
                self.link.raise_status_faults()?;
                let time_ms = self.link.rx().get_u64()?;
                let speed = decode::speed_estimate(self.link.rx(), &self.geometry)?;
                let count = decode::track_count(self.link.rx())?;
                self.link.receive(count * row, ReceiveOptions::remainder())?;
                self.finish_spectra(time_ms, speed, count, format)
            }
        }
    }

    fn finish_spectra(
        &mut self,
        time_ms: u64,
        speed: Option<SpeedEstimate>,
        count: usize,
        format: u16,
    ) -> Result<TrackList> {
        let mut targets = Vec::with_capacity(count);
        for _ in 0..count {
            let mut track = decode::track_row(self.link.rx(), &self.geometry)?;
            track.spectra = decode::track_spectra(self.link.rx(), &self.geometry, format)?;
            targets.push(track);
        }
        Ok(TrackList {
            time_ms,
            speed,
            targets,
        })
    }

    // ----- sector map -------------------------------------------------------

    pub fn config_sector_map(&mut self, command: u16) -> Result<()> {
        self.begin(Opcode::ConfigSectorMap);
        self.link.tx().put_u16(command);
        self.link.transceive(0, Duration::ZERO)?;
        Ok(())
    }

    pub fn get_sector_map(&mut self) -> Result<SectorMap> {
        self.begin(Opcode::GetSectorMap);
        self.link
            .transceive(SECTOR_RANGE_BINS * SECTOR_ANGLE_BINS, Duration::ZERO)?;
        let rx = self.link.rx();
        let mut map = SectorMap::default();
        for row in map.cells.iter_mut() {
            for cell in row.iter_mut() {
                *cell = rx.get_u8()?;
            }
        }
        Ok(map)
    }

    pub fn set_sector_map(&mut self, map: &SectorMap) -> Result<()> {
        self.begin(Opcode::SetSectorMap);
        let tx = self.link.tx();
        for row in &map.cells {
            for &cell in row {
                tx.put_u8(cell);
            }
        }
        self.link.transceive(0, Duration::ZERO)?;
        Ok(())
    }

    // ----- firmware update --------------------------------------------------

    pub fn fw_upd_start(&mut self) -> Result<()> {
        self.simple(Opcode::FwUpdStart)
    }

    pub fn fw_upd_abort(&mut self) -> Result<()> {
        self.simple(Opcode::FwUpdAbort)
    }

    /// Send one firmware data block. The block length is encoded in the
    /// opcode, so only the fixed sizes are accepted.
    pub fn fw_upd_data(&mut self, block: &[u8]) -> Result<()> {
        let op = match block.len() {
            32 => Opcode::FwUpdData32,
            64 => Opcode::FwUpdData64,
            128 => Opcode::FwUpdData128,
            256 => Opcode::FwUpdData256,
            512 => Opcode::FwUpdData512,
            1024 => Opcode::FwUpdData1024,
            len => {
                return Err(RadarError::InvalidArgument(format!(
                    "firmware block of {len} bytes (expected 32..1024, power of two)"
                )))
            }
        };
        self.begin(op);
        let tx = self.link.tx();
        for &b in block {
            tx.put_u8(b);
        }
        self.link.transceive(0, Duration::ZERO)?;
        Ok(())
    }

    pub fn fw_upd_flash_start(&mut self, block_crcs: &[u16]) -> Result<()> {
        self.begin(Opcode::FwUpdFlashStart);
        let tx = self.link.tx();
        for &crc in block_crcs {
            tx.put_u16(crc);
        }
        self.link.transceive(0, Duration::ZERO)?;
        Ok(())
    }
}
