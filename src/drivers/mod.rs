// src/drivers/mod.rs
pub mod accumulator;
pub mod buffer;
pub mod calibration;
pub mod error;
pub mod pipeline;
pub mod plot;
pub mod publish;
pub mod source;

pub use calibration::CalibrationTable;
pub use error::StreamError;
pub use pipeline::FrameProcessor;
pub use plot::{render_waveform_png, PlotStyle};
pub use publish::{Controls, Publisher, Registry};
#[cfg(test)]
pub use source::ScriptedDevice;
pub use source::{
    CommandChannel, Device, DeviceControl, DeviceState, Frame, FrameSource, VoltageRange,
};
