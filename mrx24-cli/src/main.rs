use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use mrx24_lib::commands::Commands;
use mrx24_lib::targets::data_mask;
use mrx24_lib::transport::{TcpTransport, Transport, UdpTransport};

/// Command-line client for IMST 24 GHz radar modules
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// TCP address of the module, e.g. 192.168.0.2:1024
    #[arg(long, conflicts_with = "udp")]
    tcp: Option<SocketAddr>,

    /// UDP address of the module, e.g. 192.168.0.2:4120
    #[arg(long)]
    udp: Option<SocketAddr>,

    /// Local UDP port to bind
    #[arg(long, default_value = "4121", requires = "udp")]
    local_port: u16,

    /// I/O timeout in milliseconds
    #[arg(long, default_value = "2000")]
    timeout: u64,

    /// Talk to firmware that does not append CRC16 checksums
    #[arg(long)]
    no_crc: bool,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identify the module and its firmware
    Info,
    /// Read the radar parameter set
    Params,
    /// Read the derived measurement resolution
    Resolution,
    /// Read and print the module system time
    SysTime,
    /// Set the module system time from the host clock
    SetSysTime,
    /// Read the global and per-module error masks
    Errors,
    /// Read the persisted error log table
    ErrorLog,
    /// Read the frontend sensor values
    FeSensors,
    /// Trigger measurements and print detected targets
    Detections {
        /// Number of measurements to read
        #[arg(short, long, default_value = "1")]
        count: u32,
    },
    /// Trigger measurements and print confirmed tracks
    Tracks {
        /// Number of measurements to read
        #[arg(short, long, default_value = "1")]
        count: u32,
    },
    /// Read raw ADC samples of one chirp
    Raw {
        /// Chirp index within the radar cube
        #[arg(long, default_value = "0")]
        chirp: u16,
    },
    /// Read one composite measurement frame
    Scene {
        /// Data selection mask (hex), e.g. 0x60 for detections and tracks
        #[arg(long, default_value = "0x60", value_parser = parse_mask)]
        mask: u16,
    },
}

fn parse_mask(s: &str) -> Result<u16, String> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(s, 16).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.verbosity.tracing_level_filter())
        .init();

    let timeout = Duration::from_millis(args.timeout);
    match (&args.tcp, &args.udp) {
        (Some(addr), None) => run(&args, TcpTransport::new(*addr, timeout)),
        (None, Some(addr)) => run(&args, UdpTransport::new(*addr, args.local_port, timeout)),
        _ => bail!("exactly one of --tcp or --udp is required"),
    }
}

fn run<T: Transport>(args: &Args, transport: T) -> Result<()> {
    let mut radar = if args.no_crc {
        Commands::without_crc(transport)
    } else {
        Commands::new(transport)
    };
    radar.open().context("connecting to the module")?;
    tracing::debug!(crc = !args.no_crc, "module link open");

    match args.command {
        Command::Info => {
            let info = radar.get_info()?;
            println!("Device number: {}", info.device_number);
            println!("Firmware:      {} (rev {})", info.fw_version_string(), info.fw_revision);
            println!("Built:         {}", info.fw_date_string());
            if info.has_frontend() {
                println!("Frontend:      0x{:08X}", info.frontend_connected);
            } else {
                println!("Frontend:      none");
            }
        }
        Command::Params => {
            let rp = radar.get_radar_params()?;
            println!("Radar cube:        {}", rp.radar_cube);
            println!("Processing:        {}", rp.processing);
            println!("Range window:      {}", rp.range_win_func);
            println!("Doppler window:    {}", rp.doppler_win_func);
            println!("Range bins:        {}..={}", rp.min_range_bin, rp.max_range_bin);
            println!("Doppler bins:      {}..={}", rp.min_doppler_bin, rp.max_doppler_bin);
            println!("Rx channels:       0x{:X}", rp.rx_channels);
            println!("Speed estimation:  {}", rp.speed_estimation);
            println!("Max targets:       {}", rp.max_targets);
            println!("Max tracks:        {}", rp.max_tracks);
        }
        Command::Resolution => {
            let res = radar.get_radar_resolution()?;
            println!("IF frequency: {:.1} Hz", res.if_hz);
            println!("Range:        {:.4} m/bin", res.range_m);
            println!("Doppler:      {:.4} Hz/bin", res.doppler_hz);
            println!("Speed:        {:.4} m/s per bin", res.speed_mps);
        }
        Command::SysTime => {
            let time_ms = radar.get_sys_time()?;
            println!("Module uptime: {time_ms} ms");
        }
        Command::SetSysTime => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .context("host clock is before the epoch")?;
            radar.set_sys_time(now.as_millis() as u64)?;
            println!("Module time set");
        }
        Command::Errors => {
            let masks = radar.get_errors()?;
            if !masks.any() {
                println!("No errors reported");
            } else {
                println!("Global mask: 0x{:04X}", masks.global);
                for (module, mask) in masks.modules.iter().enumerate() {
                    if *mask != 0 {
                        println!("  module {module:2}: 0x{mask:04X}");
                    }
                }
            }
        }
        Command::ErrorLog => {
            let entries = radar.get_error_log_table()?;
            if entries.is_empty() {
                println!("Error log is empty");
            }
            for entry in entries {
                println!("{:>10} ms  code 0x{:04X}", entry.time_ms, entry.code);
            }
        }
        Command::FeSensors => {
            let sensors = radar.get_fe_sensors()?;
            for (i, v) in sensors.values.iter().enumerate() {
                println!("sensor {i}: {v}");
            }
        }
        Command::Detections { count } => {
            // Pull the live parameter set first so payload sizes match.
            radar.get_radar_params()?;
            for _ in 0..count {
                let list = radar.read_detections()?;
                println!("t={} ms, {} target(s)", list.time_ms, list.targets.len());
                if let Some(speed) = list.speed {
                    println!("  ego speed: bin {} raw {}", speed.doppler_bin, speed.speed_raw);
                }
                for d in &list.targets {
                    println!(
                        "  range bin {:3}  doppler {:4}  mag {:5}  az {:4}  el {:4}",
                        d.range_bin, d.doppler_bin, d.magnitude, d.azimuth, d.elevation
                    );
                }
            }
        }
        Command::Tracks { count } => {
            radar.get_radar_params()?;
            for _ in 0..count {
                let list = radar.read_tracks()?;
                println!("t={} ms, {} track(s)", list.time_ms, list.targets.len());
                for t in &list.targets {
                    println!(
                        "  #{:<3} {:6.2} m  {:6.2} m/s  mag {:5}  az {:6.1}°  el {:6.1}°  age {} ms",
                        t.id, t.range_m, t.speed_mps, t.magnitude, t.azimuth_deg,
                        t.elevation_deg, t.lifetime_ms
                    );
                }
            }
        }
        Command::Raw { chirp } => {
            radar.get_radar_params()?;
            let frame = radar.read_raw_data(chirp)?;
            println!("t={} ms, chirp {chirp}", frame.time_ms);
            for ch in &frame.channels {
                let peak = ch.samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
                println!("  channel {}: {} samples, peak {}", ch.channel, ch.samples.len(), peak);
            }
        }
        Command::Scene { mask } => {
            radar.get_radar_params()?;
            let scene = radar.read_data(mask, 0, 0, 0)?;
            println!("t={} ms, mask 0x{:02X}", scene.time_ms, scene.data_mask);
            if let Some(det) = &scene.detections {
                println!("  detections: {}", det.targets.len());
            }
            if let Some(tracks) = &scene.tracks {
                println!("  tracks: {}", tracks.targets.len());
            }
            if let Some(map) = &scene.peak_map {
                println!("  peak map: {} hits", map.count_set());
            }
            if let Some(map) = &scene.cfar_map {
                println!("  CFAR map: {} hits", map.count_set());
            }
            if scene.data_mask == data_mask::RAW {
                if let Some(raw) = &scene.raw {
                    println!("  raw chirps: {}", raw.len());
                }
            }
        }
    }

    radar.close();
    Ok(())
}
