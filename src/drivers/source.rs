use serde::{Deserialize, Serialize};

use crate::drivers::StreamError;

/// One block of raw codes from the digitizer, `FRAME_SAMPLES` per channel.
#[derive(Clone, Debug)]
pub struct Frame {
    start_sample: u64,
    frame_samples: usize,
    codes: Vec<i32>, // channel-major: channel x samples
}
impl Frame {
    /// Builds a frame from per-channel code slices. Every channel must carry
    /// the same number of samples.
    pub fn from_channels(start_sample: u64, channels: &[Vec<i32>]) -> Result<Self, StreamError> {
        let frame_samples = channels.first().map(|c| c.len()).unwrap_or(0);
        if let Some(bad) = channels.iter().find(|c| c.len() != frame_samples) {
            return Err(StreamError::FrameShape {
                expected_channels: channels.len(),
                expected_samples: frame_samples,
                channels: channels.len(),
                samples: bad.len(),
            });
        }
        Ok(Self {
            start_sample,
            frame_samples,
            codes: channels.concat(),
        })
    }
    pub fn start_sample(&self) -> u64 {
        self.start_sample
    }
    pub fn num_channels(&self) -> usize {
        if self.frame_samples == 0 {
            0
        } else {
            self.codes.len() / self.frame_samples
        }
    }
    pub fn samples_per_channel(&self) -> usize {
        self.frame_samples
    }
    pub fn channel(&self, channel: usize) -> &[i32] {
        let start = channel * self.frame_samples;
        &self.codes[start..start + self.frame_samples]
    }
}
/// Acquisition state as reported by the card.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    Idle,
    Armed,
    Running,
    PostProcess,
}
/// Voltage span of one input channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoltageRange {
    pub vmin: f64,
    pub vmax: f64,
}
impl VoltageRange {
    pub fn new(vmin: f64, vmax: f64) -> Self {
        Self { vmin, vmax }
    }
}
/// Which command interpreter on the card receives a configuration line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandChannel {
    Shell,
    Acq,
}
/// Anything that can yield frames on demand. `Ok(None)` is end of stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, StreamError>;
}
/// Setup-time queries and commands. Never used on the data path.
pub trait DeviceControl {
    fn state(&mut self) -> Result<DeviceState, StreamError>;
    /// Ranges for channels 1..=nchan, in channel order.
    fn channel_ranges(&mut self) -> Result<Vec<VoltageRange>, StreamError>;
    fn command(&mut self, channel: CommandChannel, line: &str) -> Result<String, StreamError>;
}
pub trait Device: FrameSource + DeviceControl {}
impl<T: FrameSource + DeviceControl> Device for T {}

/// In-memory device for deterministic playback in tests.
#[cfg(test)]
pub struct ScriptedDevice {
    state: DeviceState,
    ranges: Vec<VoltageRange>,
    frames: std::collections::VecDeque<Frame>,
    commands: Vec<(CommandChannel, String)>,
}
#[cfg(test)]
impl ScriptedDevice {
    pub fn new(ranges: Vec<VoltageRange>, frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            state: DeviceState::Idle,
            ranges,
            frames: frames.into_iter().collect(),
            commands: Vec::new(),
        }
    }
    pub fn with_state(mut self, state: DeviceState) -> Self {
        self.state = state;
        self
    }
    /// Every command issued so far, in order.
    pub fn commands(&self) -> &[(CommandChannel, String)] {
        &self.commands
    }
}
#[cfg(test)]
impl FrameSource for ScriptedDevice {
    fn next_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        Ok(self.frames.pop_front())
    }
}
#[cfg(test)]
impl DeviceControl for ScriptedDevice {
    fn state(&mut self) -> Result<DeviceState, StreamError> {
        Ok(self.state)
    }
    fn channel_ranges(&mut self) -> Result<Vec<VoltageRange>, StreamError> {
        Ok(self.ranges.clone())
    }
    fn command(&mut self, channel: CommandChannel, line: &str) -> Result<String, StreamError> {
        self.commands.push((channel, line.to_string()));
        if line == "setArm" {
            self.state = DeviceState::Armed;
        }
        Ok(String::new())
    }
}
