use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::warn;

/// Scope divisions spanned by the time base.
pub const NUM_DIVISIONS: f64 = 10.0;
/// Shortest accepted client refresh interval, in seconds.
pub const MIN_UPDATE_TIME: f64 = 0.02;

/// Sink for everything the frame processor makes visible to clients.
///
/// Implementations must copy `segment` if they keep it: the caller starts
/// overwriting it as soon as the call returns.
pub trait Publisher {
    fn publish_scalar(&mut self, channel: usize, value: f64);
    /// Called once after every flush, whether or not any channel published.
    fn scalars_done(&mut self, _sample_index: u64) {}
    fn publish_waveform(&mut self, channel: usize, segment: &[f64], start_sample: u64);
}
impl<P: Publisher + ?Sized> Publisher for &mut P {
    fn publish_scalar(&mut self, channel: usize, value: f64) {
        (**self).publish_scalar(channel, value)
    }
    fn scalars_done(&mut self, sample_index: u64) {
        (**self).scalars_done(sample_index)
    }
    fn publish_waveform(&mut self, channel: usize, segment: &[f64], start_sample: u64) {
        (**self).publish_waveform(channel, segment, start_sample)
    }
}
/// Hands one flush to `publisher`. Channels whose window was empty keep
/// their previous value.
pub fn publish_means<P: Publisher + ?Sized>(
    publisher: &mut P,
    means: Vec<Option<f64>>,
    sample_index: u64,
) {
    for (channel, mean) in means.into_iter().enumerate() {
        if let Some(value) = mean {
            publisher.publish_scalar(channel, value);
        }
    }
    publisher.scalars_done(sample_index);
}
/// `i / (max_points - 1) * NUM_DIVISIONS` for every point.
pub fn time_base(max_points: usize) -> Vec<f64> {
    if max_points <= 1 {
        return vec![0.0; max_points];
    }
    (0..max_points)
        .map(|i| i as f64 / (max_points - 1) as f64 * NUM_DIVISIONS)
        .collect()
}
/// Values written by clients and read by the streaming thread.
#[derive(Clone)]
pub struct Controls {
    inner: Arc<ControlsInner>,
}
struct ControlsInner {
    run: AtomicBool,
    scan_freq: AtomicU32,
    update_time_bits: AtomicU64,
}
impl Controls {
    pub fn new(scan_freq: u32, update_time: f64) -> Self {
        let controls = Self {
            inner: Arc::new(ControlsInner {
                run: AtomicBool::new(false),
                scan_freq: AtomicU32::new(scan_freq),
                update_time_bits: AtomicU64::new(MIN_UPDATE_TIME.to_bits()),
            }),
        };
        controls.set_update_time(update_time);
        controls
    }
    pub fn is_running(&self) -> bool {
        self.inner.run.load(Ordering::Acquire)
    }
    pub fn set_running(&self, run: bool) {
        self.inner.run.store(run, Ordering::Release);
    }
    pub fn scan_freq(&self) -> u32 {
        self.inner.scan_freq.load(Ordering::Relaxed)
    }
    pub fn set_scan_freq(&self, scan_freq: u32) {
        self.inner.scan_freq.store(scan_freq, Ordering::Relaxed);
    }
    pub fn update_time(&self) -> f64 {
        f64::from_bits(self.inner.update_time_bits.load(Ordering::Relaxed))
    }
    /// Stores the refresh interval, raised to `MIN_UPDATE_TIME` if needed.
    /// Returns the value actually stored.
    pub fn set_update_time(&self, seconds: f64) -> f64 {
        let mut value = seconds;
        if !(value >= MIN_UPDATE_TIME) {
            warn!("update time too small, changed from {seconds} to {MIN_UPDATE_TIME}");
            value = MIN_UPDATE_TIME;
        }
        self.inner
            .update_time_bits
            .store(value.to_bits(), Ordering::Relaxed);
        value
    }
}
/// Copy of one published channel waveform.
#[derive(Clone, Debug, Default)]
pub struct WaveformSnapshot {
    pub samples: Vec<f64>,
    pub start_sample: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}
impl WaveformSnapshot {
    fn fill(&mut self, segment: &[f64], start_sample: u64) {
        self.samples.clear();
        self.samples.extend_from_slice(segment);
        self.start_sample = start_sample;
        let (min, max, sum) = segment.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(lo, hi, sum), &v| (lo.min(v), hi.max(v), sum + v),
        );
        if segment.is_empty() {
            self.min = 0.0;
            self.max = 0.0;
            self.mean = 0.0;
        } else {
            self.min = min;
            self.max = max;
            self.mean = sum / segment.len() as f64;
        }
    }
}
/// Everything clients can read back.
#[derive(Clone, Debug, Default)]
pub struct Published {
    pub scalars: Vec<Option<f64>>,
    pub waveforms: Vec<Option<WaveformSnapshot>>,
    pub time_base: Vec<f64>,
    /// Start sample of the frame that completed the latest waveform buffer.
    pub last_buffer_sample: Option<u64>,
    pub flushes: u64,
    pub buffers: u64,
}
/// Thread-safe store of published values, shared between the streaming
/// thread and any number of readers.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Mutex<Published>>,
}
impl Registry {
    pub fn new(nchan: usize, max_points: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Published {
                scalars: vec![None; nchan],
                waveforms: vec![None; nchan],
                time_base: time_base(max_points),
                ..Published::default()
            })),
        }
    }
    fn lock(&self) -> MutexGuard<'_, Published> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn snapshot(&self) -> Published {
        self.lock().clone()
    }
}
#[cfg(test)]
impl Registry {
    pub fn scalar(&self, channel: usize) -> Option<f64> {
        self.lock().scalars.get(channel).copied().flatten()
    }
    pub fn waveform(&self, channel: usize) -> Option<WaveformSnapshot> {
        self.lock().waveforms.get(channel).cloned().flatten()
    }
    pub fn time_base(&self) -> Vec<f64> {
        self.lock().time_base.clone()
    }
}
impl Publisher for Registry {
    fn publish_scalar(&mut self, channel: usize, value: f64) {
        if let Some(slot) = self.lock().scalars.get_mut(channel) {
            *slot = Some(value);
        }
    }
    fn scalars_done(&mut self, _sample_index: u64) {
        self.lock().flushes += 1;
    }
    fn publish_waveform(&mut self, channel: usize, segment: &[f64], start_sample: u64) {
        let mut published = self.lock();
        if let Some(slot) = published.waveforms.get_mut(channel) {
            slot.get_or_insert_with(WaveformSnapshot::default)
                .fill(segment, start_sample);
        }
        // Channel 0 opens each buffer event.
        if channel == 0 {
            published.buffers += 1;
        }
        published.last_buffer_sample = Some(start_sample);
    }
}
/// Records every publication in order.
#[cfg(test)]
#[derive(Default)]
pub struct CollectingPublisher {
    pub scalars: Vec<(usize, f64)>,
    pub flushes: Vec<u64>,
    pub waveforms: Vec<(usize, Vec<f64>, u64)>,
}
#[cfg(test)]
impl Publisher for CollectingPublisher {
    fn publish_scalar(&mut self, channel: usize, value: f64) {
        self.scalars.push((channel, value));
    }
    fn scalars_done(&mut self, sample_index: u64) {
        self.flushes.push(sample_index);
    }
    fn publish_waveform(&mut self, channel: usize, segment: &[f64], start_sample: u64) {
        self.waveforms.push((channel, segment.to_vec(), start_sample));
    }
}
