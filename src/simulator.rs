use std::f64::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{DriverConfig, SimulationConfig};
use crate::drivers::calibration::ChannelCalibration;
use crate::drivers::{
    CommandChannel, DeviceControl, DeviceState, Frame, FrameSource, StreamError, VoltageRange,
};

/// Software stand-in for the digitizer: a noisy sine per channel, each
/// channel a little further along in phase.
pub struct SimulatedDevice {
    name: String,
    state: DeviceState,
    nchan: usize,
    frame_samples: usize,
    nsps: u32,
    sim: SimulationConfig,
    cal: ChannelCalibration,
    rng: StdRng,
    next_sample: u64,
    frames_sent: u64,
    started: Option<Instant>,
}
impl SimulatedDevice {
    pub fn connect(name: &str, config: &DriverConfig) -> Result<Self, StreamError> {
        let sim = config.simulation.clone();
        if !(sim.vmax > sim.vmin) {
            return Err(StreamError::Transport(format!(
                "simulated range [{}, {}] is empty",
                sim.vmin, sim.vmax
            )));
        }
        info!("connected to simulated {name} ({} channels)", config.nchan);
        Ok(Self {
            name: name.to_string(),
            state: DeviceState::Idle,
            nchan: config.nchan,
            frame_samples: config.frame_samples.max(1),
            nsps: config.nsps.max(1),
            cal: ChannelCalibration::from_range(VoltageRange::new(sim.vmin, sim.vmax)),
            rng: StdRng::seed_from_u64(sim.seed),
            sim,
            next_sample: 0,
            frames_sent: 0,
            started: None,
        })
    }
    fn stuck(&self, channel: usize) -> bool {
        self.sim.stuck_channel == Some(channel) && self.frames_sent >= self.sim.stuck_after_frames
    }
    fn pace(&mut self) {
        if !self.sim.realtime {
            return;
        }
        let started = *self.started.get_or_insert_with(Instant::now);
        let due = Duration::from_secs_f64(self.next_sample as f64 / self.nsps as f64);
        if let Some(wait) = due.checked_sub(started.elapsed()) {
            thread::sleep(wait);
        }
    }
}
impl FrameSource for SimulatedDevice {
    fn next_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        if !matches!(self.state, DeviceState::Armed | DeviceState::Running) {
            return Err(StreamError::Transport(format!(
                "{} is not armed (state {:?})",
                self.name, self.state
            )));
        }
        if self.sim.max_frames.is_some_and(|max| self.frames_sent >= max) {
            self.state = DeviceState::PostProcess;
            return Ok(None);
        }
        self.pace();
        self.state = DeviceState::Running;
        let dt = 1.0 / self.nsps as f64;
        let mut channels = Vec::with_capacity(self.nchan);
        for ch in 0..self.nchan {
            if self.stuck(ch) {
                channels.push(vec![0; self.frame_samples]);
                continue;
            }
            let phase = ch as f64 * TAU / self.nchan as f64;
            let codes = (0..self.frame_samples)
                .map(|i| {
                    let t = (self.next_sample + i as u64) as f64 * dt;
                    let noise = if self.sim.noise_amplitude > 0.0 {
                        self.rng
                            .gen_range(-self.sim.noise_amplitude..self.sim.noise_amplitude)
                    } else {
                        0.0
                    };
                    let volts = self.sim.amplitude * (TAU * self.sim.frequency_hz * t + phase).sin();
                    self.cal.code(volts + noise)
                })
                .collect();
            channels.push(codes);
        }
        let frame = Frame::from_channels(self.next_sample, &channels)?;
        self.next_sample += self.frame_samples as u64;
        self.frames_sent += 1;
        Ok(Some(frame))
    }
}
impl DeviceControl for SimulatedDevice {
    fn state(&mut self) -> Result<DeviceState, StreamError> {
        Ok(self.state)
    }
    fn channel_ranges(&mut self) -> Result<Vec<VoltageRange>, StreamError> {
        if self.nchan == 0 {
            return Err(StreamError::DeviceQuery(format!(
                "{} reports no analog input channels",
                self.name
            )));
        }
        Ok(vec![VoltageRange::new(self.sim.vmin, self.sim.vmax); self.nchan])
    }
    fn command(&mut self, channel: CommandChannel, line: &str) -> Result<String, StreamError> {
        debug!("{} <- {channel:?} {line}", self.name);
        let response = match (channel, line.split_whitespace().next()) {
            (CommandChannel::Shell, Some(cmd)) if cmd.starts_with("set.") => String::new(),
            (CommandChannel::Acq, Some("setMode")) => "ACQ32:setMode".to_string(),
            (CommandChannel::Acq, Some("setArm")) => {
                self.state = DeviceState::Armed;
                "ACQ32:setArm".to_string()
            }
            _ => format!("ERROR: unknown command {line}"),
        };
        Ok(response)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn config() -> DriverConfig {
        DriverConfig {
            nchan: 3,
            frame_samples: 8,
            simulation: SimulationConfig {
                realtime: false,
                max_frames: Some(2),
                ..SimulationConfig::default()
            },
            ..DriverConfig::default()
        }
    }
    #[test]
    fn refuses_frames_until_armed() {
        let mut dev = SimulatedDevice::connect("sim", &config()).unwrap();
        assert!(matches!(dev.next_frame(), Err(StreamError::Transport(_))));
        dev.command(CommandChannel::Acq, "setArm").unwrap();
        let frame = dev.next_frame().unwrap().unwrap();
        assert_eq!(frame.num_channels(), 3);
        assert_eq!(frame.samples_per_channel(), 8);
        assert_eq!(dev.state().unwrap(), DeviceState::Running);
    }
    #[test]
    fn frames_are_numbered_and_stream_ends() {
        let mut dev = SimulatedDevice::connect("sim", &config()).unwrap();
        dev.command(CommandChannel::Acq, "setArm").unwrap();
        assert_eq!(dev.next_frame().unwrap().unwrap().start_sample(), 0);
        assert_eq!(dev.next_frame().unwrap().unwrap().start_sample(), 8);
        assert!(dev.next_frame().unwrap().is_none());
    }
    #[test]
    fn codes_stay_within_signal_amplitude() {
        let mut dev = SimulatedDevice::connect("sim", &config()).unwrap();
        dev.command(CommandChannel::Acq, "setArm").unwrap();
        let frame = dev.next_frame().unwrap().unwrap();
        let cal = ChannelCalibration::from_range(VoltageRange::new(-10.0, 10.0));
        for ch in 0..3 {
            for &code in frame.channel(ch) {
                assert!(cal.volts(code).abs() <= 1.1 + 1e-3);
            }
        }
    }
    #[test]
    fn stuck_channel_reports_zeros() {
        let mut cfg = config();
        cfg.simulation.stuck_channel = Some(1);
        cfg.simulation.stuck_after_frames = 1;
        let mut dev = SimulatedDevice::connect("sim", &cfg).unwrap();
        dev.command(CommandChannel::Acq, "setArm").unwrap();
        let first = dev.next_frame().unwrap().unwrap();
        assert!(first.channel(1).iter().any(|&c| c != 0));
        let second = dev.next_frame().unwrap().unwrap();
        assert!(second.channel(1).iter().all(|&c| c == 0));
    }
    #[test]
    fn range_query_fails_without_channels() {
        let mut cfg = config();
        cfg.nchan = 0;
        let mut dev = SimulatedDevice::connect("sim", &cfg).unwrap();
        let err = dev.channel_ranges().unwrap_err();
        assert!(matches!(err, StreamError::DeviceQuery(_)));
        assert!(err.is_setup());
    }
    #[test]
    fn unknown_command_is_answered_with_error() {
        let mut dev = SimulatedDevice::connect("sim", &config()).unwrap();
        let response = dev.command(CommandChannel::Acq, "bogus").unwrap();
        assert!(response.starts_with("ERROR"));
        assert!(dev
            .command(CommandChannel::Shell, "set.dtacq channel_mask 1")
            .unwrap()
            .is_empty());
    }
}
