use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::drivers::buffer::normalize_max_points;
use crate::drivers::publish::MIN_UPDATE_TIME;
use crate::drivers::CommandChannel;

/// One line of the arm/configure sequence sent before streaming.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArmStep {
    pub channel: CommandChannel,
    pub line: String,
}
impl ArmStep {
    pub fn shell(line: &str) -> Self {
        Self {
            channel: CommandChannel::Shell,
            line: line.to_string(),
        }
    }
    pub fn acq(line: &str) -> Self {
        Self {
            channel: CommandChannel::Acq,
            line: line.to_string(),
        }
    }
}
/// Knobs for the built-in simulated digitizer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub frequency_hz: f64,
    /// Peak volts of the sine.
    pub amplitude: f64,
    pub noise_amplitude: f64,
    pub vmin: f64,
    pub vmax: f64,
    /// Pace frames at the native sample rate.
    pub realtime: bool,
    /// Channel that drops to zero once `stuck_after_frames` frames were sent.
    pub stuck_channel: Option<usize>,
    pub stuck_after_frames: u64,
    /// End of stream after this many frames.
    pub max_frames: Option<u64>,
    pub seed: u64,
}
impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 1000.0,
            amplitude: 1.0,
            noise_amplitude: 0.1,
            vmin: -10.0,
            vmax: 10.0,
            realtime: true,
            stuck_channel: None,
            stuck_after_frames: 0,
            max_frames: None,
            seed: 164,
        }
    }
}
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Device name handed to the transport.
    pub device: String,
    pub nchan: usize,
    /// Points per published waveform.
    pub max_points: usize,
    /// Samples per channel in each frame.
    pub frame_samples: usize,
    /// Native samples per second.
    pub nsps: u32,
    /// Averaging flushes per second.
    pub scan_freq: u32,
    /// Client refresh interval in seconds.
    pub update_time: f64,
    /// Log calibration coefficients.
    pub verbose: bool,
    pub arm_sequence: Vec<ArmStep>,
    /// CSV file receiving every flushed average.
    pub record_path: Option<PathBuf>,
    /// Run without the monitor window.
    pub headless: bool,
    pub simulation: SimulationConfig,
}
impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            device: "acq164_001".to_string(),
            nchan: 64,
            max_points: 2000,
            frame_samples: 100,
            nsps: 20_000,
            scan_freq: 10,
            update_time: 0.5,
            verbose: false,
            arm_sequence: vec![
                ArmStep::shell("set.dtacq channel_mask 1"),
                ArmStep::shell("set.acq164.role MASTER 20"),
                ArmStep::acq("setMode SOFT_CONTINUOUS 1"),
                ArmStep::acq("setArm"),
            ],
            record_path: None,
            headless: false,
            simulation: SimulationConfig::default(),
        }
    }
}
impl DriverConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: DriverConfig = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config.normalized())
    }
    /// Clamps out-of-range values, warning about each one.
    pub fn normalized(mut self) -> Self {
        if self.nchan < 1 {
            warn!("nchan must be at least 1, using 1");
            self.nchan = 1;
        }
        if self.frame_samples < 1 {
            warn!("frame_samples must be at least 1, using 1");
            self.frame_samples = 1;
        }
        if self.nsps < 1 {
            warn!("nsps must be at least 1, using 1");
            self.nsps = 1;
        }
        self.max_points = normalize_max_points(self.max_points, self.frame_samples);
        self.scan_freq = clamp_scan_freq(self.scan_freq, self.nsps);
        if !(self.update_time >= MIN_UPDATE_TIME) {
            warn!(
                "update time too small, changed from {} to {MIN_UPDATE_TIME}",
                self.update_time
            );
            self.update_time = MIN_UPDATE_TIME;
        }
        self
    }
}
/// Keeps the averaging period between one sample and one second.
pub fn clamp_scan_freq(scan_freq: u32, nsps: u32) -> u32 {
    let clamped = scan_freq.clamp(1, nsps.max(1));
    if clamped != scan_freq {
        warn!("scan frequency {scan_freq} out of range 1..={nsps}, using {clamped}");
    }
    clamped
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn defaults_mirror_acq164_arm_sequence() {
        let config = DriverConfig::default();
        assert_eq!(config.arm_sequence.len(), 4);
        assert_eq!(config.arm_sequence[1], ArmStep::shell("set.acq164.role MASTER 20"));
        assert_eq!(config.arm_sequence[3], ArmStep::acq("setArm"));
        assert_eq!(config.max_points % config.frame_samples, 0);
    }
    #[test]
    fn partial_json_fills_defaults() {
        let config: DriverConfig =
            serde_json::from_str(r#"{ "nchan": 2, "simulation": { "realtime": false } }"#).unwrap();
        assert_eq!(config.nchan, 2);
        assert_eq!(config.nsps, 20_000);
        assert!(!config.simulation.realtime);
        assert_eq!(config.simulation.frequency_hz, 1000.0);
    }
    #[test]
    fn arm_step_channel_uses_snake_case() {
        let step: ArmStep = serde_json::from_str(r#"{ "channel": "shell", "line": "x" }"#).unwrap();
        assert_eq!(step, ArmStep::shell("x"));
    }
    #[test]
    fn normalization_clamps_out_of_range_values() {
        let config = DriverConfig {
            nchan: 0,
            max_points: 95,
            frame_samples: 10,
            scan_freq: 0,
            update_time: 0.0,
            ..DriverConfig::default()
        }
        .normalized();
        assert_eq!(config.nchan, 1);
        assert_eq!(config.max_points, 100);
        assert_eq!(config.scan_freq, 1);
        assert_eq!(config.update_time, MIN_UPDATE_TIME);
    }
    #[test]
    fn scan_freq_is_capped_at_sample_rate() {
        assert_eq!(clamp_scan_freq(50_000, 20_000), 20_000);
        assert_eq!(clamp_scan_freq(10, 20_000), 10);
    }
}
