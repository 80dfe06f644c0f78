use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::{info, warn};

use crate::drivers::Publisher;

/// Passes publications through to `inner` and logs every flushed average set
/// as one CSV row: `sample,ch0,ch1,...`.
pub struct RecordingPublisher<P: Publisher, W: Write = BufWriter<File>> {
    inner: P,
    writer: Option<W>,
    row: Vec<Option<f64>>,
}
impl<P: Publisher> RecordingPublisher<P> {
    pub fn create(inner: P, path: &Path, nchan: usize) -> io::Result<Self> {
        let file = File::create(path)?;
        let recorder = Self::with_writer(inner, BufWriter::new(file), nchan)?;
        info!("recording averages to {}", path.display());
        Ok(recorder)
    }
}
impl<P: Publisher, W: Write> RecordingPublisher<P, W> {
    pub fn with_writer(inner: P, mut writer: W, nchan: usize) -> io::Result<Self> {
        write!(writer, "sample")?;
        for ch in 0..nchan {
            write!(writer, ",ch{ch}")?;
        }
        writeln!(writer)?;
        Ok(Self {
            inner,
            writer: Some(writer),
            row: vec![None; nchan],
        })
    }
    pub fn is_recording(&self) -> bool {
        self.writer.is_some()
    }
    #[cfg(test)]
    pub fn into_inner(mut self) -> (P, Option<W>) {
        if let Some(w) = self.writer.as_mut() {
            w.flush().ok();
        }
        (self.inner, self.writer)
    }
    fn write_row(&mut self, sample_index: u64) -> io::Result<()> {
        let Some(w) = self.writer.as_mut() else {
            return Ok(());
        };
        write!(w, "{sample_index}")?;
        for value in &self.row {
            match value {
                Some(v) => write!(w, ",{v:.6}")?,
                None => write!(w, ",")?,
            }
        }
        writeln!(w)
    }
}
impl<P: Publisher, W: Write> Publisher for RecordingPublisher<P, W> {
    fn publish_scalar(&mut self, channel: usize, value: f64) {
        if let Some(slot) = self.row.get_mut(channel) {
            *slot = Some(value);
        }
        self.inner.publish_scalar(channel, value);
    }
    fn scalars_done(&mut self, sample_index: u64) {
        if let Err(e) = self.write_row(sample_index) {
            warn!("recording stopped: {e}");
            self.writer = None;
        }
        self.row.iter_mut().for_each(|v| *v = None);
        self.inner.scalars_done(sample_index);
    }
    fn publish_waveform(&mut self, channel: usize, segment: &[f64], start_sample: u64) {
        self.inner.publish_waveform(channel, segment, start_sample);
    }
}
