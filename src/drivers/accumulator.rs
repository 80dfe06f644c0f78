/// Running per-channel sums between flushes.
pub struct RollingAccumulator {
    sums: Vec<f64>,
    counts: Vec<u64>,
    last_flush_sample: u64,
}
impl RollingAccumulator {
    pub fn new(nchan: usize) -> Self {
        Self {
            sums: vec![0.0; nchan],
            counts: vec![0; nchan],
            last_flush_sample: 0,
        }
    }
    #[inline]
    pub fn accumulate(&mut self, channel: usize, value: f64) {
        self.sums[channel] += value;
        self.counts[channel] += 1;
    }
    /// True once a full period has elapsed since the last flush.
    pub fn maybe_flush(samples_since_last_flush: u64, period: u64) -> bool {
        samples_since_last_flush >= period
    }
    pub fn samples_since_flush(&self, sample_index: u64) -> u64 {
        sample_index.saturating_sub(self.last_flush_sample)
    }
    #[cfg(test)]
    pub fn count(&self, channel: usize) -> u64 {
        self.counts[channel]
    }
    /// Mean of the current window, `None` while the window is empty.
    pub fn mean(&self, channel: usize) -> Option<f64> {
        match self.counts[channel] {
            0 => None,
            n => Some(self.sums[channel] / n as f64),
        }
    }
    /// Takes every channel's mean and starts a new window at `sample_index`.
    pub fn flush(&mut self, sample_index: u64) -> Vec<Option<f64>> {
        let means = (0..self.sums.len()).map(|ch| self.mean(ch)).collect();
        self.clear();
        self.last_flush_sample = sample_index;
        means
    }
    pub fn clear(&mut self) {
        self.sums.iter_mut().for_each(|s| *s = 0.0);
        self.counts.iter_mut().for_each(|c| *c = 0);
    }
}
