use log::warn;

use crate::drivers::publish::Publisher;

/// Fallback length when the configured length is not positive.
pub const DEFAULT_MAX_POINTS: usize = 100;

/// Circular per-channel waveform store. Every channel shares one cursor since
/// each frame contributes the same number of samples to all of them.
pub struct WaveformBuffer {
    data: Vec<f64>, // channel-major: nchan x max_points
    nchan: usize,
    max_points: usize,
    cursor: usize,
}
impl WaveformBuffer {
    /// `max_points` is rounded up to a whole number of frames so a frame never
    /// straddles the end of a segment.
    pub fn new(nchan: usize, max_points: usize, frame_samples: usize) -> Self {
        let max_points = normalize_max_points(max_points, frame_samples);
        Self {
            data: vec![0.0; nchan * max_points],
            nchan,
            max_points,
            cursor: 0,
        }
    }
    pub fn num_channels(&self) -> usize {
        self.nchan
    }
    #[cfg(test)]
    pub fn max_points(&self) -> usize {
        self.max_points
    }
    pub fn cursor(&self) -> usize {
        self.cursor
    }
    pub fn segment(&self, channel: usize) -> &[f64] {
        let start = channel * self.max_points;
        &self.data[start..start + self.max_points]
    }
    pub fn segment_mut(&mut self, channel: usize) -> &mut [f64] {
        let start = channel * self.max_points;
        &mut self.data[start..start + self.max_points]
    }
    pub fn advance(&mut self, samples: usize) {
        self.cursor += samples;
    }
    pub fn is_full(&self) -> bool {
        self.cursor >= self.max_points
    }
    /// Emits every channel segment, then rewinds the cursor.
    pub fn handoff<P: Publisher>(&mut self, publisher: &mut P, start_sample: u64) {
        for channel in 0..self.nchan {
            publisher.publish_waveform(channel, self.segment(channel), start_sample);
        }
        self.cursor = 0;
    }
}
pub fn normalize_max_points(max_points: usize, frame_samples: usize) -> usize {
    let frame_samples = frame_samples.max(1);
    let mut points = max_points;
    if points < 1 {
        warn!("max points must be positive, using {DEFAULT_MAX_POINTS}");
        points = DEFAULT_MAX_POINTS;
    }
    let rounded = points.div_ceil(frame_samples) * frame_samples;
    if rounded != points {
        warn!("max points {points} is not a multiple of {frame_samples} samples per frame, using {rounded}");
    }
    rounded
}
