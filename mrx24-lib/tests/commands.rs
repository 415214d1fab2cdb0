//! End-to-end command exchanges over the scripted transport.

mod common;

use common::*;

use mrx24_lib::commands::Commands;
use mrx24_lib::crc::crc16;
use mrx24_lib::error::RadarError;
use mrx24_lib::params::{RadarCube, RadarParams, SpeedEstimation};
use mrx24_lib::targets::{data_mask, TrackSpectra};
use mrx24_lib::transport::{MockTransport, TransportKind};

/// Push an accepting acknowledge and apply modified radar parameters, so the
/// decoding snapshot matches the fixture frames that follow.
fn apply_params(cmds: &mut Commands<MockTransport>, f: impl FnOnce(&mut RadarParams)) {
    let mut rp = cmds.radar_params().clone();
    f(&mut rp);
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x000B, 0, &[]));
    cmds.set_radar_params(&rp).unwrap();
    cmds.link_mut().transport_mut().take_written();
}

#[test]
fn test_get_info() {
    let mut cmds = stream_commands();
    // Device 7, no frontend, firmware 1.2.3 rev 1, date word 0x20240101.
    let payload = hex::decode("00000007fe000000000102030000000120240101").unwrap();
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x0001, 0, &payload));

    let info = cmds.get_info().unwrap();
    assert_eq!(info.device_number, 7);
    assert!(!info.has_frontend());
    assert_eq!(info.fw_version_string(), "1.2.3");
    assert_eq!(info.fw_date, 0x2024_0101);
    assert_eq!(cmds.info().unwrap().fw_revision, 1);

    // The request is the bare opcode sealed with its CRC.
    let written = cmds.link_mut().transport_mut().take_written();
    assert_eq!(&written[..2], &[0x00, 0x01]);
    assert_eq!(written.len(), 4);
    assert_eq!(crc16(&written), 0);
}

#[test]
fn test_status_crc_fault_beats_valid_frame() {
    // The device reports a CRC fault on our request; its own frame is intact.
    let mut cmds = stream_commands();
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x0003, 0x0001, &[0; 8]));
    assert!(matches!(
        cmds.get_sys_time().unwrap_err(),
        RadarError::CrcError
    ));
}

#[test]
fn test_wrong_echo_leaves_snapshot_untouched() {
    let mut cmds = stream_commands();
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x0001, 0, &[0u8; 60]));
    let err = cmds.get_radar_params().unwrap_err();
    assert!(matches!(
        err,
        RadarError::UnexpectedResponse {
            sent: 0x000A,
            received: 0x0001
        }
    ));
    // Defaults survive the failed exchange.
    assert_eq!(cmds.geometry().num_samples, 512);
    assert_eq!(cmds.radar_params().radar_cube, RadarCube::Smpl512Crp128);
}

#[test]
fn test_unknown_opcode_sentinel() {
    let mut cmds = stream_commands();
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0xE0F0, 0, &[]));
    assert!(matches!(
        cmds.get_fe_sensors().unwrap_err(),
        RadarError::UnsupportedCommand { opcode: 0xFE01 }
    ));
}

#[test]
fn test_radar_params_wire_roundtrip_rebuilds_geometry() {
    // Capture the encoding of a set exchange and replay it as a get response.
    let mut cmds = stream_commands();
    let mut rp = cmds.radar_params().clone();
    rp.radar_cube = RadarCube::Smpl128Crp64;
    rp.min_range_bin = 0;
    rp.max_range_bin = 31;
    rp.rx_channels = 0x3;
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x000B, 0, &[]));
    cmds.set_radar_params(&rp).unwrap();
    let written = cmds.link_mut().transport_mut().take_written();
    let payload = &written[2..written.len() - 2]; // strip opcode and CRC
    assert_eq!(payload.len(), 60);

    let mut fresh = stream_commands();
    fresh
        .link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x000A, 0, payload));
    let got = fresh.get_radar_params().unwrap();
    assert_eq!(got, rp);
    assert_eq!(fresh.geometry().num_samples, 128);
    assert_eq!(fresh.geometry().active_range_bins, 32);
    assert_eq!(fresh.geometry().active_channel_count(), 2);
}

#[test]
fn test_rejected_params_keep_previous_snapshot() {
    let mut cmds = stream_commands();
    let mut rp = cmds.radar_params().clone();
    rp.radar_cube = RadarCube::Smpl128Crp64;
    // Status with the wrong-rx-data bit set: exchange completes, values
    // were not taken over.
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x000B, 0x0002, &[]));
    cmds.set_radar_params(&rp).unwrap();
    assert!(!cmds.params_accepted());
    assert_eq!(cmds.geometry().num_samples, 512);
}

#[test]
fn test_inverted_window_from_device_is_malformed() {
    // CRC-valid, correctly sized frame whose range window is inverted
    // (min 10, max 5). The exchange must fail cleanly and leave the
    // snapshot alone.
    let payload = Payload::new()
        .u16(11) // cube
        .u8(0)
        .u16(0)
        .u16(1) // processing
        .u16(1) // range window function
        .u16(1) // doppler window function
        .u8(1)
        .u16(10) // min range bin
        .u16(5) // max range bin
        .i16(-64)
        .i16(63)
        .u16(10)
        .u16(2)
        .u16(8)
        .i16(10)
        .u16(6)
        .u16(0)
        .u16(30)
        .u16(10)
        .u16(5)
        .u16(1)
        .u16(10)
        .u16(20)
        .u16(2)
        .u16(5)
        .u16(15)
        .u8(0)
        .u16(0)
        .u8(0)
        .u16(0xF)
        .u16(1)
        .u16(10)
        .build();
    assert_eq!(payload.len(), 60);

    let mut cmds = stream_commands();
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x000A, 0, &payload));
    assert!(matches!(
        cmds.get_radar_params().unwrap_err(),
        RadarError::MalformedResponse(_)
    ));
    assert_eq!(cmds.geometry().num_samples, 512);
    assert_eq!(cmds.radar_params(), &RadarParams::default());
}

#[test]
fn test_inverted_window_from_caller_is_rejected() {
    let mut cmds = stream_commands();
    let mut rp = cmds.radar_params().clone();
    rp.min_doppler_bin = 8;
    rp.max_doppler_bin = -8;
    assert!(matches!(
        cmds.set_radar_params(&rp).unwrap_err(),
        RadarError::InvalidArgument(_)
    ));
    // Rejected before any traffic.
    assert!(cmds.link().transport().written().is_empty());
    assert_eq!(cmds.geometry().num_doppler_bins, 128);
}

#[test]
fn test_detections_two_phase_stream() {
    let mut cmds = stream_commands();
    let payload = Payload::new()
        .u64(5555)
        .u16(2) // count
        .u16(3)
        .i16(-4)
        .u16(500)
        .i16(10)
        .i16(-5)
        .u16(7)
        .i16(0)
        .u16(900)
        .i16(-30)
        .i16(12)
        .build();
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x0038, 0, &payload));

    let list = cmds.read_detections().unwrap();
    assert_eq!(list.time_ms, 5555);
    assert!(list.speed.is_none());
    assert_eq!(list.targets.len(), 2);
    assert_eq!(list.targets[0].doppler_bin, -4);
    assert_eq!(list.targets[1].magnitude, 900);
}

#[test]
fn test_detections_speed_prefix() {
    let mut cmds = stream_commands();
    apply_params(&mut cmds, |rp| {
        rp.speed_estimation = SpeedEstimation::SpeedOnly;
    });
    let payload = Payload::new()
        .u64(10)
        .i16(-6) // ego Doppler bin
        .i16(240) // ego speed, raw
        .u16(1)
        .u16(5)
        .i16(-2)
        .u16(333)
        .i16(15)
        .i16(-10)
        .build();
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x0038, 0, &payload));

    let list = cmds.read_detections().unwrap();
    let speed = list.speed.unwrap();
    assert_eq!(speed.doppler_bin, -6);
    assert_eq!(speed.speed_raw, 240);
    assert_eq!(list.targets.len(), 1);
}

#[test]
fn test_tracks_speed_travels_after_count() {
    let mut cmds = stream_commands();
    apply_params(&mut cmds, |rp| {
        rp.speed_estimation = SpeedEstimation::SpeedOnly;
    });
    let payload = Payload::new()
        .u64(77)
        .u16(1) // count before the ego speed in this frame
        .i16(-2)
        .i16(30)
        .u16(9) // track id
        .f32(10.5)
        .f32(-1.0)
        .u16(100)
        .f32(3.5)
        .f32(0.25)
        .u32(4000)
        .build();
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x0039, 0, &payload));

    let tracks = cmds.read_tracks().unwrap();
    assert_eq!(tracks.time_ms, 77);
    assert_eq!(tracks.speed.unwrap().doppler_bin, -2);
    assert_eq!(tracks.targets.len(), 1);
    let track = &tracks.targets[0];
    assert_eq!(track.id, 9);
    assert_eq!(track.range_m, 10.5);
    assert_eq!(track.azimuth_deg, 3.5);
    assert_eq!(track.lifetime_ms, 4000);
    assert!(track.classes.is_none());
    assert!(track.spectra.is_none());
}

#[test]
fn test_tracks_datagram_single_packet() {
    let mut cmds = datagram_commands();
    let payload = Payload::new()
        .u64(123)
        .u16(1)
        .u16(4)
        .f32(2.0)
        .f32(0.5)
        .u16(50)
        .f32(-12.0)
        .f32(1.0)
        .u32(200)
        .build();
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x0039, 0, &payload));

    let tracks = cmds.read_tracks().unwrap();
    assert_eq!(tracks.targets.len(), 1);
    assert_eq!(tracks.targets[0].speed_mps, 0.5);
}

#[test]
fn test_tracked_spectra_magnitude_format() {
    let mut cmds = stream_commands();
    apply_params(&mut cmds, |rp| {
        rp.radar_cube = RadarCube::Smpl128Crp64;
        rp.min_doppler_bin = -2;
        rp.max_doppler_bin = 1;
        rp.rx_channels = 0x1;
    });
    assert_eq!(cmds.geometry().active_doppler_bins, 4);
    let payload = Payload::new()
        .u64(9)
        .u16(1)
        .u16(2)
        .f32(5.0)
        .f32(0.0)
        .u16(60)
        .f32(0.0)
        .f32(0.0)
        .u32(100)
        // magnitude spectrum over the active Doppler window
        .u16(11)
        .u16(22)
        .u16(33)
        .u16(44)
        .build();
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x003A, 0, &payload));

    let tracks = cmds.read_tracked_doppler_spectra(2).unwrap();
    assert_eq!(tracks.targets.len(), 1);
    match tracks.targets[0].spectra.as_ref().unwrap() {
        TrackSpectra::Magnitude(bins) => assert_eq!(bins, &vec![11, 22, 33, 44]),
        other => panic!("unexpected spectra variant: {other:?}"),
    }

    // The request carries the format word.
    let written = cmds.link_mut().transport_mut().take_written();
    assert_eq!(&written[..4], &[0x00, 0x3A, 0x00, 0x02]);
    assert_eq!(crc16(&written), 0);
}

#[test]
fn test_error_log_table_two_phase() {
    let mut cmds = stream_commands();
    let payload = Payload::new()
        .u16(2)
        .u64(1_000)
        .u16(0x0102)
        .u64(2_000)
        .u16(0x0304)
        .build();
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0xE003, 0, &payload));

    let log = cmds.get_error_log_table().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].time_ms, 1_000);
    assert_eq!(log[1].code, 0x0304);
}

#[test]
fn test_error_log_table_rejects_impossible_count() {
    let mut cmds = stream_commands();
    let payload = Payload::new().u16(101).build();
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0xE003, 0, &payload));
    assert!(matches!(
        cmds.get_error_log_table().unwrap_err(),
        RadarError::MalformedResponse(_)
    ));
}

#[test]
fn test_read_raw_data() {
    let mut cmds = stream_commands();
    apply_params(&mut cmds, |rp| {
        rp.radar_cube = RadarCube::Smpl128Crp64;
        rp.rx_channels = 0x1;
    });
    let mut payload = Payload::new().u64(31337);
    for s in 0..128 {
        payload = payload.i16(s - 64);
    }
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x0031, 0, &payload.build()));

    let frame = cmds.read_raw_data(5).unwrap();
    assert_eq!(frame.time_ms, 31337);
    assert_eq!(frame.channels.len(), 1);
    assert_eq!(frame.channels[0].samples.len(), 128);
    assert_eq!(frame.channels[0].samples[0], -64);
}

#[test]
fn test_read_raw_data_rejects_bad_chirp() {
    let mut cmds = stream_commands();
    // Default cube has 128 chirps; no traffic may happen on a bad index.
    assert!(matches!(
        cmds.read_raw_data(128).unwrap_err(),
        RadarError::InvalidArgument(_)
    ));
    assert!(cmds.link().transport().written().is_empty());
}

#[test]
fn test_read_data_composite_detections_section() {
    let mut cmds = stream_commands();
    let section = Payload::new()
        .u16(1)
        .u16(12)
        .i16(-1)
        .u16(800)
        .i16(4)
        .i16(-4)
        .build();
    let payload = Payload::new()
        .u64(640) // measurement time
        .u32(section.len() as u32)
        .bytes(&section)
        .build();
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x0030, 0, &payload));

    let scene = cmds.read_data(data_mask::DETECTIONS, 0, 0, 0).unwrap();
    assert_eq!(scene.time_ms, 640);
    let det = scene.detections.unwrap();
    assert_eq!(det.time_ms, 640);
    assert_eq!(det.targets.len(), 1);
    assert_eq!(det.targets[0].range_bin, 12);
    assert!(scene.tracks.is_none());
    assert!(scene.raw.is_none());

    // Request: opcode + mask + chirp + range bin + Doppler format + CRC.
    let written = cmds.link_mut().transport_mut().take_written();
    assert_eq!(written.len(), 12);
    assert_eq!(&written[..4], &[0x00, 0x30, 0x00, 0x20]);
}

#[test]
fn test_truncated_response_without_crc_mode() {
    let mut cmds = Commands::without_crc(MockTransport::new(TransportKind::Stream));
    // Bare frame mode: ACK plus only half of the timestamp, then silence.
    let mut frame = Vec::new();
    frame.extend_from_slice(&0x0003u16.to_be_bytes());
    frame.extend_from_slice(&0u16.to_be_bytes());
    frame.extend_from_slice(&[0xAB; 4]);
    cmds.link_mut().transport_mut().push_response(&frame);
    assert!(matches!(
        cmds.get_sys_time().unwrap_err(),
        RadarError::TruncatedResponse {
            expected: 8,
            actual: 4
        }
    ));
}

#[test]
fn test_set_sys_time_request_bytes() {
    let mut cmds = stream_commands();
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x0004, 0, &[]));
    cmds.set_sys_time(0x0102_0304_0506_0708).unwrap();
    let written = cmds.link_mut().transport_mut().take_written();
    assert_eq!(written.len(), 12);
    assert_eq!(&written[..2], &[0x00, 0x04]);
    assert_eq!(&written[2..10], &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(crc16(&written), 0);
}

#[test]
fn test_get_radar_resolution() {
    let mut cmds = stream_commands();
    let payload = Payload::new()
        .f32(25_000.0)
        .f32(0.15)
        .f32(12.2)
        .f32(0.02)
        .build();
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0x000D, 0, &payload));
    let res = cmds.get_radar_resolution().unwrap();
    assert_eq!(res.range_m, 0.15);
    assert_eq!(res.speed_mps, 0.02);
}

#[test]
fn test_get_errors_masks() {
    let mut cmds = stream_commands();
    let mut payload = Payload::new().u16(0x8001);
    for module in 0..16u16 {
        payload = payload.u16(module);
    }
    cmds.link_mut()
        .transport_mut()
        .push_response(&sealed_response(0xE000, 0, &payload.build()));
    let masks = cmds.get_errors().unwrap();
    assert_eq!(masks.global, 0x8001);
    assert_eq!(masks.modules[15], 15);
    assert!(masks.any());
}
