use thiserror::Error;

use crate::drivers::source::DeviceState;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("device is not idle (state {state:?}); let it run, or abort it if you want it reconfigured")]
    DeviceBusy { state: DeviceState },
    #[error("device query failed: {0}")]
    DeviceQuery(String),
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("invalid voltage range on channel {channel}: [{vmin}, {vmax}]")]
    InvalidRange { channel: usize, vmin: f64, vmax: f64 },
    #[error("device rejected `{command}`: {response}")]
    CommandRejected { command: String, response: String },
    #[error("frame shape mismatch: expected {expected_channels}x{expected_samples}, got {channels}x{samples}")]
    FrameShape {
        expected_channels: usize,
        expected_samples: usize,
        channels: usize,
        samples: usize,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("channel {channel} stuck at zero: more than {limit} consecutive zeros (frame start sample {start_sample})")]
    StuckAtZero {
        channel: usize,
        start_sample: u64,
        limit: u32,
    },
    #[error("failed to render plot: {0}")]
    Plot(String),
}
impl StreamError {
    /// Data-integrity faults; the stream must not be resumed.
    pub fn is_fault(&self) -> bool {
        matches!(self, StreamError::StuckAtZero { .. })
    }
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            StreamError::DeviceBusy { .. }
                | StreamError::DeviceQuery(_)
                | StreamError::ChannelMismatch { .. }
                | StreamError::InvalidRange { .. }
                | StreamError::CommandRejected { .. }
        )
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for StreamError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        StreamError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for StreamError {
    fn from(value: image::ImageError) -> Self {
        StreamError::Plot(value.to_string())
    }
}
