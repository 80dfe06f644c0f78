use log::{debug, error};

use crate::config::clamp_scan_freq;
use crate::drivers::accumulator::RollingAccumulator;
use crate::drivers::buffer::WaveformBuffer;
use crate::drivers::calibration::CalibrationTable;
use crate::drivers::publish::{publish_means, Controls, Publisher};
use crate::drivers::source::Frame;
use crate::drivers::StreamError;

/// Longest run of zero codes a healthy channel may report.
pub const STUCK_AT_ZERO_LIMIT: u32 = 60;

/// What a single frame triggered downstream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub flushed: bool,
    pub published: bool,
}
/// Calibrates frames into the waveform buffer and rolling averages, and
/// publishes both at their own cadence.
pub struct FrameProcessor<P: Publisher> {
    calibration: CalibrationTable,
    buffer: WaveformBuffer,
    accumulator: RollingAccumulator,
    zero_runs: Vec<u32>,
    frame_samples: usize,
    nsps: u32,
    controls: Controls,
    // Last value read from `controls`, and the clamped value in use.
    requested_scan_freq: u32,
    scan_freq: u32,
    samples_seen: u64,
    publisher: P,
}
impl<P: Publisher> FrameProcessor<P> {
    pub fn new(
        calibration: CalibrationTable,
        max_points: usize,
        frame_samples: usize,
        nsps: u32,
        controls: Controls,
        publisher: P,
    ) -> Self {
        let nchan = calibration.len();
        let frame_samples = frame_samples.max(1);
        let nsps = nsps.max(1);
        let requested_scan_freq = controls.scan_freq();
        let scan_freq = clamp_scan_freq(requested_scan_freq, nsps);
        Self {
            buffer: WaveformBuffer::new(nchan, max_points, frame_samples),
            accumulator: RollingAccumulator::new(nchan),
            zero_runs: vec![0; nchan],
            calibration,
            frame_samples,
            nsps,
            controls,
            requested_scan_freq,
            scan_freq,
            samples_seen: 0,
            publisher,
        }
    }
    #[cfg(test)]
    pub fn cursor(&self) -> usize {
        self.buffer.cursor()
    }
    #[cfg(test)]
    pub fn max_points(&self) -> usize {
        self.buffer.max_points()
    }
    #[cfg(test)]
    pub fn publisher(&self) -> &P {
        &self.publisher
    }
    pub fn process(&mut self, frame: &Frame) -> Result<FrameReport, StreamError> {
        self.check_shape(frame)?;
        let cursor = self.buffer.cursor();
        for channel in 0..self.buffer.num_channels() {
            let cal = self.calibration.channel(channel);
            let segment = &mut self.buffer.segment_mut(channel)[cursor..cursor + self.frame_samples];
            let zeros = &mut self.zero_runs[channel];
            for (slot, &code) in segment.iter_mut().zip(frame.channel(channel)) {
                if code == 0 {
                    *zeros += 1;
                    if *zeros > STUCK_AT_ZERO_LIMIT {
                        error!(
                            "zeros detected on channel {channel} at {}",
                            frame.start_sample()
                        );
                        return Err(StreamError::StuckAtZero {
                            channel,
                            start_sample: frame.start_sample(),
                            limit: STUCK_AT_ZERO_LIMIT,
                        });
                    }
                } else {
                    *zeros = 0;
                }
                let volts = cal.volts(code);
                *slot = volts;
                self.accumulator.accumulate(channel, volts);
            }
        }
        self.buffer.advance(self.frame_samples);
        self.samples_seen += self.frame_samples as u64;
        let flushed = self.flush_if_due();
        let published = if self.buffer.is_full() {
            self.buffer
                .handoff(&mut self.publisher, frame.start_sample());
            true
        } else {
            false
        };
        Ok(FrameReport { flushed, published })
    }
    fn check_shape(&self, frame: &Frame) -> Result<(), StreamError> {
        let nchan = self.buffer.num_channels();
        if frame.num_channels() != nchan || frame.samples_per_channel() != self.frame_samples {
            return Err(StreamError::FrameShape {
                expected_channels: nchan,
                expected_samples: self.frame_samples,
                channels: frame.num_channels(),
                samples: frame.samples_per_channel(),
            });
        }
        Ok(())
    }
    fn flush_if_due(&mut self) -> bool {
        let requested = self.controls.scan_freq();
        if requested != self.requested_scan_freq {
            self.requested_scan_freq = requested;
            self.scan_freq = clamp_scan_freq(requested, self.nsps);
            debug!("scan frequency now {} Hz", self.scan_freq);
        }
        let period = u64::from(self.nsps / self.scan_freq);
        let elapsed = self.accumulator.samples_since_flush(self.samples_seen);
        if !RollingAccumulator::maybe_flush(elapsed, period) {
            return false;
        }
        let means = self.accumulator.flush(self.samples_seen);
        publish_means(&mut self.publisher, means, self.samples_seen);
        true
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::calibration::ChannelCalibration;
    use crate::drivers::publish::CollectingPublisher;
    use crate::drivers::source::VoltageRange;

    /// Counts `warn!` records emitted on the calling thread, so parallel
    /// tests don't see each other's warnings.
    mod warnings {
        use std::cell::Cell;
        use std::sync::Once;

        use log::{Level, LevelFilter, Log, Metadata, Record};

        thread_local! {
            static COUNT: Cell<usize> = Cell::new(0);
        }
        struct Counter;
        impl Log for Counter {
            fn enabled(&self, metadata: &Metadata) -> bool {
                metadata.level() <= Level::Warn
            }
            fn log(&self, record: &Record) {
                if record.level() == Level::Warn {
                    COUNT.with(|c| c.set(c.get() + 1));
                }
            }
            fn flush(&self) {}
        }
        static COUNTER: Counter = Counter;
        static INSTALL: Once = Once::new();

        pub fn reset() {
            INSTALL.call_once(|| {
                log::set_logger(&COUNTER).ok();
                log::set_max_level(LevelFilter::Warn);
            });
            COUNT.with(|c| c.set(0));
        }
        pub fn count() -> usize {
            COUNT.with(|c| c.get())
        }
    }

    fn table(nchan: usize) -> CalibrationTable {
        CalibrationTable::compute(&vec![VoltageRange::new(-5.0, 5.0); nchan], nchan).unwrap()
    }
    fn frame(start: u64, channels: &[Vec<i32>]) -> Frame {
        Frame::from_channels(start, channels).unwrap()
    }
    fn processor(
        nchan: usize,
        max_points: usize,
        frame_samples: usize,
        nsps: u32,
        scan_freq: u32,
    ) -> FrameProcessor<CollectingPublisher> {
        FrameProcessor::new(
            table(nchan),
            max_points,
            frame_samples,
            nsps,
            Controls::new(scan_freq, 0.5),
            CollectingPublisher::default(),
        )
    }
    #[test]
    fn ten_frames_fill_and_publish_both_channels_once() {
        // Flushing is kept out of the way: one flush per 1000 samples.
        let mut proc = processor(2, 100, 10, 1000, 1);
        let cal = ChannelCalibration::from_range(VoltageRange::new(-5.0, 5.0));
        for n in 0..10u64 {
            let base = (n * 10) as i32;
            let ch0: Vec<i32> = (0..10).map(|i| 1000 + base + i).collect();
            let ch1: Vec<i32> = (0..10).map(|i| -(1000 + base + i)).collect();
            let report = proc.process(&frame(n * 10, &[ch0, ch1])).unwrap();
            assert!(proc.cursor() < proc.max_points());
            assert_eq!(report.published, n == 9);
        }
        assert_eq!(proc.cursor(), 0);
        let waveforms = &proc.publisher().waveforms;
        assert_eq!(waveforms.len(), 2);
        assert_eq!(waveforms[0].0, 0);
        assert_eq!(waveforms[1].0, 1);
        assert_eq!(waveforms[0].1.len(), 100);
        assert_eq!(waveforms[1].1.len(), 100);
        assert_eq!(waveforms[0].2, 90);
        assert!((waveforms[0].1[37] - cal.volts(1037)).abs() < 1e-12);
        assert!((waveforms[1].1[99] - cal.volts(-1099)).abs() < 1e-12);
    }
    #[test]
    fn flush_publishes_mean_of_each_window() {
        // period = nsps / scan_freq = 100 / 20 = 5 samples, one frame each.
        let mut proc = processor(2, 100, 5, 100, 20);
        let cal = ChannelCalibration::from_range(VoltageRange::new(-5.0, 5.0));
        let windows = [[10, 20, 30, 40, 50], [7, 7, 7, 7, 9]];
        for (n, codes) in windows.iter().enumerate() {
            let ch0 = codes.to_vec();
            let ch1: Vec<i32> = codes.iter().map(|c| c * 2).collect();
            let report = proc.process(&frame(n as u64 * 5, &[ch0, ch1])).unwrap();
            assert!(report.flushed);
        }
        let scalars = &proc.publisher().scalars;
        assert_eq!(scalars.len(), 4);
        let mean = |codes: &[i32]| codes.iter().map(|&c| cal.volts(c)).sum::<f64>() / 5.0;
        assert_eq!(scalars[0].0, 0);
        assert!((scalars[0].1 - mean(&windows[0])).abs() < 1e-12);
        assert!((scalars[1].1 - mean(&[20, 40, 60, 80, 100])).abs() < 1e-12);
        assert!((scalars[2].1 - mean(&windows[1])).abs() < 1e-12);
        assert_eq!(proc.publisher().flushes, vec![5, 10]);
        assert_eq!(proc.accumulator.count(0), 0);
        assert_eq!(proc.accumulator.mean(1), None);
    }
    #[test]
    fn flush_waits_for_full_period() {
        // period = 10 samples, frames of 4: flush after the third frame.
        let mut proc = processor(1, 120, 4, 100, 10);
        let reports: Vec<FrameReport> = (0..3)
            .map(|n| proc.process(&frame(n * 4, &[vec![1; 4]])).unwrap())
            .collect();
        assert!(!reports[0].flushed);
        assert!(!reports[1].flushed);
        assert!(reports[2].flushed);
    }
    #[test]
    fn scan_freq_change_applies_to_next_window() {
        let mut proc = processor(1, 100, 5, 100, 10);
        let controls = proc.controls.clone();
        assert!(!proc.process(&frame(0, &[vec![1; 5]])).unwrap().flushed);
        controls.set_scan_freq(20);
        assert!(proc.process(&frame(5, &[vec![1; 5]])).unwrap().flushed);
        assert!(proc.process(&frame(10, &[vec![1; 5]])).unwrap().flushed);
    }
    #[test]
    fn zero_scan_freq_does_not_divide_by_zero() {
        let mut proc = processor(1, 100, 5, 100, 10);
        proc.controls.set_scan_freq(0);
        let report = proc.process(&frame(0, &[vec![1; 5]])).unwrap();
        assert!(!report.flushed);
    }
    #[test]
    fn out_of_range_scan_freq_warns_once_per_change() {
        let mut proc = processor(1, 100, 5, 100, 10);
        warnings::reset();
        proc.controls.set_scan_freq(0);
        for n in 0..50u64 {
            proc.process(&frame(n * 5, &[vec![1; 5]])).unwrap();
        }
        assert_eq!(warnings::count(), 1);
        assert_eq!(proc.scan_freq, 1);
        proc.controls.set_scan_freq(500);
        for n in 50..60u64 {
            proc.process(&frame(n * 5, &[vec![1; 5]])).unwrap();
        }
        assert_eq!(warnings::count(), 2);
        assert_eq!(proc.scan_freq, 100);
    }
    #[test]
    fn initial_scan_freq_is_clamped() {
        warnings::reset();
        let mut proc = processor(1, 100, 5, 100, 0);
        assert_eq!(proc.scan_freq, 1);
        assert_eq!(warnings::count(), 1);
        for n in 0..20u64 {
            proc.process(&frame(n * 5, &[vec![1; 5]])).unwrap();
        }
        assert_eq!(warnings::count(), 1);
        assert_eq!(proc.publisher().flushes, vec![100]);
    }
    #[test]
    fn sixty_zeros_then_signal_is_healthy() {
        let mut proc = processor(1, 120, 10, 1000, 1);
        for n in 0..6u64 {
            proc.process(&frame(n * 10, &[vec![0; 10]])).unwrap();
        }
        let mut tail = vec![0; 10];
        tail[0] = 1;
        proc.process(&frame(60, &[tail])).unwrap();
        for n in 7..12u64 {
            proc.process(&frame(n * 10, &[vec![0; 10]])).unwrap();
        }
    }
    #[test]
    fn sixty_one_zeros_fault_with_frame_sample() {
        let mut proc = processor(2, 120, 10, 1000, 1);
        for n in 0..6u64 {
            proc.process(&frame(n * 10, &[vec![5; 10], vec![0; 10]])).unwrap();
        }
        let err = proc
            .process(&frame(60, &[vec![5; 10], vec![0; 10]]))
            .unwrap_err();
        match err {
            StreamError::StuckAtZero {
                channel,
                start_sample,
                limit,
            } => {
                assert_eq!(channel, 1);
                assert_eq!(start_sample, 60);
                assert_eq!(limit, STUCK_AT_ZERO_LIMIT);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
    #[test]
    fn wrong_frame_shape_is_rejected() {
        let mut proc = processor(2, 100, 10, 1000, 1);
        let err = proc.process(&frame(0, &[vec![1; 10]])).unwrap_err();
        assert!(matches!(
            err,
            StreamError::FrameShape {
                expected_channels: 2,
                channels: 1,
                ..
            }
        ));
        assert_eq!(proc.cursor(), 0);
    }
}
