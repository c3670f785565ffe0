// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for keyboard operations
//!
//! This module provides command-line functionality for:
//! - Playing with or without the terminal viewer
//! - Calibrating and adjusting the saved keyboard transform
//! - Listing depth sensors and MIDI ports
//! - Recording depth frames for replay

use crate::NudgeAxis;
use chrono::Local;
use keyboard_anywhere::backends::audio::{list_midi_ports, open_sink};
use keyboard_anywhere::backends::sensor::{DepthSource, ReplaySource, write_frame};
use keyboard_anywhere::config::SourceKind;
use keyboard_anywhere::errors::{AppError, AppResult, SensorError};
use keyboard_anywhere::pipelines::keyboard::NoteEvent;
use keyboard_anywhere::pipelines::session::SystemClock;
use keyboard_anywhere::{Calibration, Config, Session, TransformStore};
use nalgebra::Point3;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Give up recording when the sensor stays quiet this long
const RECORD_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Parse a point given as `x,y,z`
pub fn parse_point(s: &str) -> Result<Point3<f64>, String> {
    let coords = s
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid coordinate '{}': {}", part.trim(), e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    match coords.as_slice() {
        [x, y, z] => Ok(Point3::new(*x, *y, *z)),
        _ => Err(format!("expected x,y,z but got {} values", coords.len())),
    }
}

/// Open the depth source selected in the configuration
pub fn open_source(config: &Config) -> AppResult<Box<dyn DepthSource>> {
    match config.sensor.source {
        SourceKind::Replay => {
            let path = config.sensor.replay_path.clone().ok_or_else(|| {
                AppError::Config("sensor.replay_path is required for replay".to_string())
            })?;
            Ok(Box::new(ReplaySource::open(
                path,
                config.viewer.frame_period(),
            )?))
        }
        SourceKind::Kinect => open_kinect(config.sensor.device_index),
    }
}

#[cfg(all(target_arch = "x86_64", feature = "freedepth"))]
fn open_kinect(device_index: usize) -> AppResult<Box<dyn DepthSource>> {
    use keyboard_anywhere::backends::sensor::KinectSource;
    Ok(Box::new(KinectSource::open(device_index)?))
}

#[cfg(not(all(target_arch = "x86_64", feature = "freedepth")))]
fn open_kinect(_device_index: usize) -> AppResult<Box<dyn DepthSource>> {
    Err(AppError::Config(
        "built without Kinect support (enable the freedepth feature on x86_64) \
         or set sensor.source = \"replay\""
            .to_string(),
    ))
}

fn build_session(config: &Config) -> AppResult<Session> {
    let source = open_source(config)?;
    let sink = open_sink(&config.audio);
    Session::from_config(config, source, sink, Box::new(SystemClock::new()))
}

/// Play with the terminal viewer
pub fn run_terminal(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = build_session(config)?;
    keyboard_anywhere::terminal::run(&mut session, config.viewer.frame_period())
}

/// Play without a viewer until Ctrl+C or the sensor goes away
pub fn run_headless(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = build_session(config)?;
    let period = config.viewer.frame_period();

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!("Playing from {}", session.source_name());
    println!("Transform: {}", session.store().path().display());
    println!("Press Ctrl+C to stop");
    println!();

    let mut next_tick = Instant::now();
    while !stop_flag.load(Ordering::SeqCst) {
        match session.tick() {
            Ok(stats) => {
                for event in &stats.events {
                    match event {
                        NoteEvent::On { note, velocity } => {
                            println!("  on  {:3} (velocity {})", note, velocity)
                        }
                        NoteEvent::Off { note } => println!("  off {:3}", note),
                    }
                }
            }
            Err(SensorError::Disconnected) => {
                println!("Depth sensor disconnected");
                break;
            }
            Err(e) => tracing::warn!("Frame skipped: {}", e),
        }

        next_tick += period;
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            next_tick = now;
        }
    }

    let counters = session.counters();
    println!();
    println!(
        "Stopped after {} frames ({} fresh, {} stale), {} notes played",
        counters.ticks, counters.fresh_frames, counters.stale_frames, counters.notes_played
    );

    Ok(())
}

/// Calibrate from three points and save the transform
pub fn calibrate(
    config: &Config,
    p0: Point3<f64>,
    p1: Point3<f64>,
    p2: Point3<f64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let calibration = Calibration::from_points(&p0, &p1, &p2)?;
    let store = TransformStore::new(config.calibration.transform_path());
    store.save(&calibration)?;

    println!("Saved transform to {}", store.path().display());
    print_transform(&calibration);
    Ok(())
}

/// Apply roll or Z nudges to the saved transform
pub fn nudge(
    config: &Config,
    axis: NudgeAxis,
    sign: i8,
    steps: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    if sign != 1 && sign != -1 {
        return Err(format!("sign must be 1 or -1, got {}", sign).into());
    }

    let store = TransformStore::new(config.calibration.transform_path());
    let mut calibration = store.load_or_default();
    let sign = f64::from(sign);

    for _ in 0..steps {
        calibration = match axis {
            NudgeAxis::Roll => calibration.nudged_roll(sign, config.calibration.roll_step_rad)?,
            NudgeAxis::Z => calibration.nudged_z(sign, config.calibration.z_step_fraction)?,
        };
    }

    store.save(&calibration)?;
    println!("Applied {} step(s), saved to {}", steps, store.path().display());
    print_transform(&calibration);
    Ok(())
}

/// Print the saved transform
pub fn show(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = TransformStore::new(config.calibration.transform_path());
    println!("Transform file: {}", store.path().display());

    match store.load() {
        Ok(calibration) => print_transform(&calibration),
        Err(e) => {
            println!("  {}", e);
            println!("  Using placeholder transform:");
            print_transform(&Calibration::placeholder());
        }
    }
    Ok(())
}

/// Delete the saved transform
pub fn reset(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = TransformStore::new(config.calibration.transform_path());
    store.clear()?;
    println!("Removed {}", store.path().display());
    Ok(())
}

/// List depth sensors and MIDI output ports
pub fn list() -> Result<(), Box<dyn std::error::Error>> {
    list_sensors();
    println!();

    let ports = list_midi_ports()?;
    if ports.is_empty() {
        println!("No MIDI output ports found.");
    } else {
        println!("MIDI output ports:");
        for (index, port) in ports.iter().enumerate() {
            println!("  [{}] {}", index, port);
        }
    }
    Ok(())
}

#[cfg(all(target_arch = "x86_64", feature = "freedepth"))]
fn list_sensors() {
    let sensors = keyboard_anywhere::backends::sensor::kinect::enumerate_sensors();
    if sensors.is_empty() {
        println!("No depth sensors found.");
        return;
    }

    println!("Depth sensors:");
    for sensor in &sensors {
        println!("  [{}] {} (serial {})", sensor.index, sensor.name, sensor.serial);
    }
}

#[cfg(not(all(target_arch = "x86_64", feature = "freedepth")))]
fn list_sensors() {
    println!("Depth sensors: unavailable (built without the freedepth feature)");
}

/// Record raw depth frames for later replay
pub fn record(
    config: &Config,
    frames: usize,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = output.unwrap_or_else(|| {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        PathBuf::from(format!("depth_{}.raw", timestamp))
    });

    let mut source = open_source(config)?;
    let mut writer = BufWriter::new(std::fs::File::create(&output)?);

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!("Recording {} frames from {}", frames, source.name());
    println!("Output: {}", output.display());
    println!("Press Ctrl+C to stop early");
    println!();

    let mut written = 0;
    let mut last_frame_at = Instant::now();
    while written < frames && !stop_flag.load(Ordering::SeqCst) {
        match source.poll_frame() {
            Ok(frame) => {
                write_frame(&mut writer, &frame)?;
                written += 1;
                last_frame_at = Instant::now();
                print!("\rFrames: {}/{}", written, frames);
                std::io::stdout().flush()?;
            }
            Err(SensorError::Stale) => {
                if last_frame_at.elapsed() > RECORD_IDLE_TIMEOUT {
                    println!();
                    println!("No frames for {:?}, stopping", RECORD_IDLE_TIMEOUT);
                    break;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(e) => {
                println!();
                println!("Recording stopped: {}", e);
                break;
            }
        }
    }

    writer.flush()?;
    println!();
    println!("Saved {} frames to {}", written, output.display());
    Ok(())
}

fn print_transform(calibration: &Calibration) {
    for row in calibration.rows() {
        println!(
            "  [{:>12.4} {:>12.4} {:>12.4} {:>12.4}]",
            row[0], row[1], row[2], row[3]
        );
    }
    println!("  Keyboard length: {:.2}", calibration.scale());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point() {
        let p = parse_point("1.5, -2,3e1").unwrap();
        assert_eq!(p, Point3::new(1.5, -2.0, 30.0));
    }

    #[test]
    fn test_parse_point_rejects_wrong_arity() {
        assert!(parse_point("1,2").is_err());
        assert!(parse_point("1,2,3,4").is_err());
        assert!(parse_point("a,b,c").is_err());
    }

    #[test]
    fn test_replay_source_requires_path() {
        let mut config = Config::default();
        config.sensor.source = SourceKind::Replay;
        assert!(matches!(open_source(&config), Err(AppError::Config(_))));
    }
}
