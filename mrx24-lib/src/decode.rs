//! Payload decoders for the measurement read commands.
//!
//! Responses carry no shape information of their own; every decoder is a pure
//! function of the received bytes, the [`Geometry`] snapshot and the request
//! arguments. The same functions back both the standalone read commands and
//! the composite mask-selected frame, which differ only in their prefixes.

use crate::error::{RadarError, Result};
use crate::frame::RxFrame;
use crate::params::{Geometry, MAX_DETECTIONS, MAX_TRACKS, NUM_NN_CLASSES};
use crate::targets::{
    data_mask, BitMap, ChannelData, ChannelSpectrum, Detection, DetectionList, Iq, RangePeak,
    RangeProfile, SceneData, SpeedEstimate, Spectrum, Track, TrackList, TrackSpectra,
};

pub const DETECTION_ROW_BYTES: usize = 10;
pub const TRACK_ROW_BYTES: usize = 24;
pub const NN_RESULT_BYTES: usize = 2 * NUM_NN_CLASSES;
pub const SPEED_ESTIMATE_BYTES: usize = 4;

/// Request value selecting every chirp (or every range bin) at once.
pub const ALL: u16 = 0xFFFF;

/// Doppler spectra request formats for tracks.
pub const SPECTRA_NONE: u16 = 0;
pub const SPECTRA_COMPLEX: u16 = 1;
pub const SPECTRA_MAGNITUDE: u16 = 2;

fn get_iq(rx: &mut RxFrame) -> Result<Iq> {
    Ok(Iq {
        re: rx.get_i16()?,
        im: rx.get_i16()?,
    })
}

/// Raw ADC samples of one chirp: `num_samples` signed values per active
/// channel, channels in ascending bit order.
pub fn raw_chirp(rx: &mut RxFrame, geom: &Geometry) -> Result<Vec<ChannelData<i16>>> {
    let mut channels = Vec::with_capacity(geom.active_channel_count());
    for c in geom.active_channels() {
        let mut samples = Vec::with_capacity(geom.num_samples);
        for _ in 0..geom.num_samples {
            samples.push(rx.get_i16()?);
        }
        channels.push(ChannelData {
            channel: c,
            samples,
        });
    }
    Ok(channels)
}

pub fn raw_chirp_size(geom: &Geometry) -> usize {
    2 * geom.active_channel_count() * geom.num_samples
}

fn chirp_repeats(geom: &Geometry, chirp: u16) -> usize {
    if chirp == ALL {
        geom.num_doppler_bins
    } else {
        1
    }
}

fn range_bin_repeats(geom: &Geometry, range_bin: u16) -> usize {
    if range_bin == ALL {
        geom.active_range_bins
    } else {
        1
    }
}

/// Range FFT payload. Single-chirp cubes use the short kernel layout (first
/// two channels complex, the rest magnitude, peak triple appended); all other
/// cubes deliver complex spectra per chirp per channel.
pub fn range_profile(rx: &mut RxFrame, geom: &Geometry, chirp: u16) -> Result<RangeProfile> {
    if geom.single_chirp {
        let mut channels = Vec::with_capacity(geom.active_channel_count());
        for c in geom.active_channels() {
            let spectrum = if c < 2 {
                let mut bins = Vec::with_capacity(geom.active_range_bins);
                for _ in 0..geom.active_range_bins {
                    bins.push(get_iq(rx)?);
                }
                Spectrum::Complex(bins)
            } else {
                let mut bins = Vec::with_capacity(geom.active_range_bins);
                for _ in 0..geom.active_range_bins {
                    bins.push(rx.get_u16()?);
                }
                Spectrum::Magnitude(bins)
            };
            channels.push(ChannelSpectrum {
                channel: c,
                spectrum,
            });
        }
        let peak = RangePeak {
            channel: rx.get_u16()?,
            range_bin: rx.get_u16()?,
            magnitude: rx.get_u16()?,
        };
        return Ok(RangeProfile::SingleChirp { channels, peak });
    }

    let mut chirps = Vec::with_capacity(chirp_repeats(geom, chirp));
    for _ in 0..chirp_repeats(geom, chirp) {
        let mut channels = Vec::with_capacity(geom.active_channel_count());
        for c in geom.active_channels() {
            let mut samples = Vec::with_capacity(geom.active_range_bins);
            for _ in 0..geom.active_range_bins {
                samples.push(get_iq(rx)?);
            }
            channels.push(ChannelData {
                channel: c,
                samples,
            });
        }
        chirps.push(channels);
    }
    Ok(RangeProfile::Chirps(chirps))
}

/// Payload size of one range profile, excluding any time prefix.
pub fn range_profile_size(geom: &Geometry, chirp: u16) -> usize {
    if geom.single_chirp {
        let complex = (geom.rx_channels & 0x3).count_ones() as usize;
        let magnitude = (geom.rx_channels & 0xC).count_ones() as usize;
        complex * geom.active_range_bins * 4 + magnitude * geom.active_range_bins * 2 + 6
    } else {
        chirp_repeats(geom, chirp) * 4 * geom.active_channel_count() * geom.active_range_bins
    }
}

/// Complex Doppler spectra of one range bin, per active channel.
pub fn doppler_channels(rx: &mut RxFrame, geom: &Geometry) -> Result<Vec<ChannelData<Iq>>> {
    let mut channels = Vec::with_capacity(geom.active_channel_count());
    for c in geom.active_channels() {
        let mut samples = Vec::with_capacity(geom.active_doppler_bins);
        for _ in 0..geom.active_doppler_bins {
            samples.push(get_iq(rx)?);
        }
        channels.push(ChannelData {
            channel: c,
            samples,
        });
    }
    Ok(channels)
}

pub fn doppler_size(geom: &Geometry) -> usize {
    4 * geom.active_channel_count() * geom.active_doppler_bins
}

/// Magnitude map rows in the configured Doppler order, one value per active
/// range bin.
pub fn magnitude_map(rx: &mut RxFrame, geom: &Geometry) -> Result<Vec<Vec<u16>>> {
    let mut rows = Vec::with_capacity(geom.doppler_indices.len());
    for _ in 0..geom.doppler_indices.len() {
        let mut row = Vec::with_capacity(geom.active_range_bins);
        for _ in 0..geom.active_range_bins {
            row.push(rx.get_u16()?);
        }
        rows.push(row);
    }
    Ok(rows)
}

pub fn magnitude_map_size(geom: &Geometry) -> usize {
    2 * geom.doppler_indices.len() * geom.active_range_bins
}

/// One-bit-per-range-bin map over the full cube, transmitted as 32-bit words.
pub fn bit_map(rx: &mut RxFrame, geom: &Geometry) -> Result<BitMap> {
    let words = geom.num_range_bins >> 5;
    let mut rows = Vec::with_capacity(geom.num_doppler_bins);
    for _ in 0..geom.num_doppler_bins {
        let mut row = Vec::with_capacity(words);
        for _ in 0..words {
            row.push(rx.get_u32()?);
        }
        rows.push(row);
    }
    Ok(BitMap {
        num_range_bins: geom.num_range_bins,
        rows,
    })
}

pub fn bit_map_size(geom: &Geometry) -> usize {
    (geom.num_range_bins >> 3) * geom.num_doppler_bins
}

/// Ego-speed prefix, present exactly when speed estimation is configured.
pub fn speed_estimate(rx: &mut RxFrame, geom: &Geometry) -> Result<Option<SpeedEstimate>> {
    if !geom.speed_estimation {
        return Ok(None);
    }
    Ok(Some(SpeedEstimate {
        doppler_bin: rx.get_i16()?,
        speed_raw: rx.get_i16()?,
    }))
}

/// Detection count with its ceiling enforced; a count beyond the firmware
/// limit means the frame is not what we think it is.
pub fn detection_count(rx: &mut RxFrame) -> Result<usize> {
    let count = rx.get_u16()? as usize;
    if count > MAX_DETECTIONS {
        return Err(RadarError::MalformedResponse(format!(
            "detection count {count} exceeds limit {MAX_DETECTIONS}"
        )));
    }
    Ok(count)
}

pub fn track_count(rx: &mut RxFrame) -> Result<usize> {
    let count = rx.get_u16()? as usize;
    if count > MAX_TRACKS {
        return Err(RadarError::MalformedResponse(format!(
            "track count {count} exceeds limit {MAX_TRACKS}"
        )));
    }
    Ok(count)
}

pub fn detection_rows(rx: &mut RxFrame, count: usize) -> Result<Vec<Detection>> {
    let mut targets = Vec::with_capacity(count);
    for _ in 0..count {
        targets.push(Detection {
            range_bin: rx.get_u16()?,
            doppler_bin: rx.get_i16()?,
            magnitude: rx.get_u16()?,
            azimuth: rx.get_i16()?,
            elevation: rx.get_i16()?,
        });
    }
    Ok(targets)
}

/// One track row; class scores follow when DSP Doppler processing is on.
pub fn track_row(rx: &mut RxFrame, geom: &Geometry) -> Result<Track> {
    let id = rx.get_u16()?;
    let range_m = rx.get_f32()?;
    let speed_mps = rx.get_f32()?;
    let magnitude = rx.get_u16()?;
    let azimuth_deg = rx.get_f32()?;
    let elevation_deg = rx.get_f32()?;
    let lifetime_ms = rx.get_u32()?;
    let classes = if geom.dsp_doppler_proc {
        let mut scores = [0u16; NUM_NN_CLASSES];
        for score in scores.iter_mut() {
            *score = rx.get_u16()?;
        }
        Some(scores)
    } else {
        None
    };
    Ok(Track {
        id,
        range_m,
        speed_mps,
        magnitude,
        azimuth_deg,
        elevation_deg,
        lifetime_ms,
        classes,
        spectra: None,
    })
}

pub fn track_row_size(geom: &Geometry) -> usize {
    TRACK_ROW_BYTES + if geom.dsp_doppler_proc { NN_RESULT_BYTES } else { 0 }
}

/// Per-track Doppler spectra in the requested format. Format 1 carries one
/// complex spectrum per active channel, formats 2 and above a single
/// magnitude spectrum.
pub fn track_spectra(
    rx: &mut RxFrame,
    geom: &Geometry,
    format: u16,
) -> Result<Option<TrackSpectra>> {
    match format {
        SPECTRA_NONE => Ok(None),
        SPECTRA_COMPLEX => {
            let mut channels = Vec::with_capacity(geom.active_channel_count());
            for c in geom.active_channels() {
                let mut samples = Vec::with_capacity(geom.active_doppler_bins);
                for _ in 0..geom.active_doppler_bins {
                    samples.push(get_iq(rx)?);
                }
                channels.push(ChannelData {
                    channel: c,
                    samples,
                });
            }
            Ok(Some(TrackSpectra::Complex(channels)))
        }
        _ => {
            let mut bins = Vec::with_capacity(geom.active_doppler_bins);
            for _ in 0..geom.active_doppler_bins {
                bins.push(rx.get_u16()?);
            }
            Ok(Some(TrackSpectra::Magnitude(bins)))
        }
    }
}

pub fn track_spectra_size(geom: &Geometry, format: u16) -> usize {
    match format {
        SPECTRA_NONE => 0,
        SPECTRA_COMPLEX => 4 * geom.active_channel_count() * geom.active_doppler_bins,
        _ => 2 * geom.active_doppler_bins,
    }
}

/// Composite mask-selected frame: sections appear in mask bit order after the
/// measurement time; a mask of zero selects raw chirps instead.
pub fn scene(
    rx: &mut RxFrame,
    geom: &Geometry,
    mask: u16,
    chirp: u16,
    range_bin: u16,
    doppler_format: u16,
    time_ms: u64,
) -> Result<SceneData> {
    let mut out = SceneData::empty(mask, time_ms);

    if mask == data_mask::RAW {
        let mut chirps = Vec::with_capacity(chirp_repeats(geom, chirp));
        for _ in 0..chirp_repeats(geom, chirp) {
            chirps.push(raw_chirp(rx, geom)?);
        }
        out.raw = Some(chirps);
        return Ok(out);
    }

    if mask & data_mask::RANGE_FFT != 0 {
        out.range_fft = Some(range_profile(rx, geom, chirp)?);
    }
    if mask & data_mask::DOPPLER_FFT != 0 {
        let mut bins = Vec::with_capacity(range_bin_repeats(geom, range_bin));
        for _ in 0..range_bin_repeats(geom, range_bin) {
            bins.push(doppler_channels(rx, geom)?);
        }
        out.doppler_fft = Some(bins);
    }
    if mask & data_mask::MAGNITUDE_MAP != 0 {
        out.magnitude_map = Some(magnitude_map(rx, geom)?);
    }
    if mask & data_mask::PEAK_MAP != 0 {
        out.peak_map = Some(bit_map(rx, geom)?);
    }
    if mask & data_mask::CFAR_MAP != 0 {
        out.cfar_map = Some(bit_map(rx, geom)?);
    }
    if mask & data_mask::DETECTIONS != 0 {
        let speed = speed_estimate(rx, geom)?;
        let count = detection_count(rx)?;
        out.detections = Some(DetectionList {
            time_ms,
            speed,
            targets: detection_rows(rx, count)?,
        });
    }
    if mask & data_mask::TRACKS != 0 {
        let speed = speed_estimate(rx, geom)?;
        let count = track_count(rx)?;
        let mut targets = Vec::with_capacity(count);
        for _ in 0..count {
            let mut track = track_row(rx, geom)?;
            track.spectra = track_spectra(rx, geom, doppler_format)?;
            targets.push(track);
        }
        out.tracks = Some(TrackList {
            time_ms,
            speed,
            targets,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::TxFrame;
    use crate::params::{RadarCube, RadarParams, SpeedEstimation};

    fn geom_with(f: impl FnOnce(&mut RadarParams)) -> Geometry {
        let mut rp = RadarParams::default();
        f(&mut rp);
        Geometry::from_params(&rp)
    }

    fn into_rx(tx: TxFrame) -> RxFrame {
        let mut rx = RxFrame::new(false);
        rx.space(tx.len()).copy_from_slice(tx.as_slice());
        rx.commit(tx.len());
        rx
    }

    #[test]
    fn raw_chirp_skips_disabled_channels() {
        let geom = geom_with(|rp| {
            rp.radar_cube = RadarCube::Smpl128Crp64;
            rp.rx_channels = 0b0101; // channels 0 and 2
        });
        let mut tx = TxFrame::new(false);
        for value in 0..2 * geom.num_samples {
            tx.put_i16(value as i16);
        }
        let mut rx = into_rx(tx);
        let chirp = raw_chirp(&mut rx, &geom).unwrap();
        assert_eq!(chirp.len(), 2);
        assert_eq!(chirp[0].channel, 0);
        assert_eq!(chirp[1].channel, 2);
        assert_eq!(chirp[0].samples.len(), 128);
        assert_eq!(chirp[1].samples[0], 128);
        assert_eq!(rx.unread(), 0);
    }

    #[test]
    fn single_chirp_range_layout_splits_channels() {
        let geom = geom_with(|rp| {
            rp.radar_cube = RadarCube::Smpl256Crp1;
            rp.min_range_bin = 0;
            rp.max_range_bin = 3;
            rp.rx_channels = 0xF;
        });
        let mut tx = TxFrame::new(false);
        for ch in 0..2 {
            for bin in 0..4i16 {
                tx.put_i16(ch * 10 + bin);
                tx.put_i16(-(ch * 10 + bin));
            }
        }
        for ch in 2..4u16 {
            for bin in 0..4u16 {
                tx.put_u16(ch * 100 + bin);
            }
        }
        tx.put_u16(1); // peak channel
        tx.put_u16(2); // peak range bin
        tx.put_u16(999); // peak magnitude
        assert_eq!(tx.len(), range_profile_size(&geom, 0));

        let mut rx = into_rx(tx);
        let profile = range_profile(&mut rx, &geom, 0).unwrap();
        let RangeProfile::SingleChirp { channels, peak } = profile else {
            panic!("expected single-chirp layout");
        };
        assert_eq!(channels.len(), 4);
        assert!(matches!(channels[0].spectrum, Spectrum::Complex(_)));
        assert!(matches!(channels[3].spectrum, Spectrum::Magnitude(_)));
        match &channels[2].spectrum {
            Spectrum::Magnitude(bins) => assert_eq!(bins[3], 203),
            _ => panic!("channel 2 must be magnitude"),
        }
        assert_eq!(
            peak,
            RangePeak {
                channel: 1,
                range_bin: 2,
                magnitude: 999
            }
        );
        assert_eq!(rx.unread(), 0);
    }

    #[test]
    fn chirp_sentinel_reads_whole_cube() {
        let geom = geom_with(|rp| {
            rp.radar_cube = RadarCube::Smpl128Crp64;
            rp.min_range_bin = 0;
            rp.max_range_bin = 1;
            rp.rx_channels = 0x1;
        });
        let size = range_profile_size(&geom, ALL);
        assert_eq!(size, 64 * 4 * 2);
        let mut tx = TxFrame::new(false);
        for _ in 0..size / 2 {
            tx.put_i16(7);
        }
        let mut rx = into_rx(tx);
        match range_profile(&mut rx, &geom, ALL).unwrap() {
            RangeProfile::Chirps(chirps) => assert_eq!(chirps.len(), 64),
            _ => panic!("expected per-chirp layout"),
        }
        assert_eq!(rx.unread(), 0);
    }

    #[test]
    fn magnitude_map_follows_doppler_order() {
        let geom = geom_with(|rp| {
            rp.radar_cube = RadarCube::Smpl128Crp64;
            rp.min_range_bin = 0;
            rp.max_range_bin = 2;
            rp.min_doppler_bin = -1;
            rp.max_doppler_bin = 1;
        });
        assert_eq!(geom.doppler_indices.len(), 3);
        let mut tx = TxFrame::new(false);
        for v in 0..9u16 {
            tx.put_u16(v);
        }
        let mut rx = into_rx(tx);
        let rows = magnitude_map(&mut rx, &geom).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], vec![6, 7, 8]);
    }

    #[test]
    fn bit_map_dimensions() {
        let geom = geom_with(|rp| rp.radar_cube = RadarCube::Smpl128Crp64);
        // 64 range bins -> 2 words per row, 64 Doppler rows.
        assert_eq!(bit_map_size(&geom), 8 * 64);
        let mut tx = TxFrame::new(false);
        for _ in 0..64 {
            tx.put_u32(0x8000_0001);
            tx.put_u32(0);
        }
        let mut rx = into_rx(tx);
        let map = bit_map(&mut rx, &geom).unwrap();
        assert_eq!(map.rows.len(), 64);
        assert!(map.is_set(10, 0));
        assert!(map.is_set(10, 31));
        assert!(!map.is_set(10, 32));
    }

    #[test]
    fn impossible_counts_are_rejected() {
        let mut tx = TxFrame::new(false);
        tx.put_u16(MAX_DETECTIONS as u16 + 1);
        let mut rx = into_rx(tx);
        assert!(matches!(
            detection_count(&mut rx),
            Err(RadarError::MalformedResponse(_))
        ));

        let mut tx = TxFrame::new(false);
        tx.put_u16(MAX_TRACKS as u16 + 1);
        let mut rx = into_rx(tx);
        assert!(matches!(
            track_count(&mut rx),
            Err(RadarError::MalformedResponse(_))
        ));
    }

    #[test]
    fn track_row_with_class_scores() {
        let geom = geom_with(|rp| rp.dsp_doppler_proc = 1);
        assert_eq!(track_row_size(&geom), 40);
        let mut tx = TxFrame::new(false);
        tx.put_u16(3);
        tx.put_f32(12.5);
        tx.put_f32(-1.25);
        tx.put_u16(400);
        tx.put_f32(10.0);
        tx.put_f32(-5.0);
        tx.put_u32(9000);
        for score in 0..NUM_NN_CLASSES as u16 {
            tx.put_u16(score);
        }
        let mut rx = into_rx(tx);
        let track = track_row(&mut rx, &geom).unwrap();
        assert_eq!(track.id, 3);
        assert_eq!(track.range_m, 12.5);
        assert_eq!(track.speed_mps, -1.25);
        assert_eq!(track.lifetime_ms, 9000);
        assert_eq!(track.classes.unwrap()[7], 7);
    }

    #[test]
    fn scene_sections_in_mask_order() {
        let geom = geom_with(|rp| {
            rp.radar_cube = RadarCube::Smpl128Crp64;
            rp.min_range_bin = 0;
            rp.max_range_bin = 1;
            rp.min_doppler_bin = 0;
            rp.max_doppler_bin = 1;
            rp.rx_channels = 0x1;
            rp.speed_estimation = SpeedEstimation::SpeedOnly;
        });
        let mut tx = TxFrame::new(false);
        // Magnitude map section: 2 Doppler rows x 2 range bins.
        for v in 10..14u16 {
            tx.put_u16(v);
        }
        // Detections section: speed estimate, count, one row.
        tx.put_i16(-3);
        tx.put_i16(120);
        tx.put_u16(1);
        tx.put_u16(5);
        tx.put_i16(-2);
        tx.put_u16(333);
        tx.put_i16(15);
        tx.put_i16(-10);
        let mut rx = into_rx(tx);
        let scene = scene(
            &mut rx,
            &geom,
            data_mask::MAGNITUDE_MAP | data_mask::DETECTIONS,
            0,
            0,
            0,
            42,
        )
        .unwrap();
        assert_eq!(scene.time_ms, 42);
        assert!(scene.range_fft.is_none());
        assert_eq!(scene.magnitude_map.unwrap()[1], vec![12, 13]);
        let det = scene.detections.unwrap();
        assert_eq!(
            det.speed,
            Some(SpeedEstimate {
                doppler_bin: -3,
                speed_raw: 120
            })
        );
        assert_eq!(det.targets.len(), 1);
        assert_eq!(det.targets[0].magnitude, 333);
        assert_eq!(rx.unread(), 0);
    }

    #[test]
    fn raw_mask_selects_adc_samples() {
        let geom = geom_with(|rp| {
            rp.radar_cube = RadarCube::Smpl128Crp64;
            rp.rx_channels = 0x3;
        });
        let mut tx = TxFrame::new(false);
        for _ in 0..2 * 128 {
            tx.put_i16(-1);
        }
        let mut rx = into_rx(tx);
        let scene = scene(&mut rx, &geom, data_mask::RAW, 0, 0, 0, 0).unwrap();
        let raw = scene.raw.unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].len(), 2);
        assert!(scene.magnitude_map.is_none());
    }
}
