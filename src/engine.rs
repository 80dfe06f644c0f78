// src/engine.rs
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use log::{error, info, warn};

use crate::config::DriverConfig;
use crate::drivers::{
    CalibrationTable, Controls, Device, DeviceState, FrameProcessor, Publisher, StreamError,
};
use crate::types::{DriverState, StreamMessage, StreamOutcome};

/// Owns the device for the lifetime of one run: checks it is idle,
/// calibrates, arms, then pumps frames until stopped.
pub struct StreamingDriver<D: Device> {
    device: D,
    config: DriverConfig,
    controls: Controls,
    state: DriverState,
    events: Option<Sender<StreamMessage>>,
}
impl<D: Device> StreamingDriver<D> {
    pub fn new(device: D, config: DriverConfig, controls: Controls) -> Self {
        Self {
            device,
            config,
            controls,
            state: DriverState::Unconfigured,
            events: None,
        }
    }
    pub fn with_events(mut self, events: Sender<StreamMessage>) -> Self {
        self.events = Some(events);
        self
    }
    pub fn state(&self) -> DriverState {
        self.state
    }
    #[cfg(test)]
    pub fn device(&self) -> &D {
        &self.device
    }
    fn transition(&mut self, state: DriverState) {
        if self.state != state {
            info!("driver {:?} -> {:?}", self.state, state);
            self.state = state;
            self.send(StreamMessage::State(state));
        }
    }
    fn send(&self, msg: StreamMessage) {
        if let Some(tx) = &self.events {
            tx.send(msg).ok();
        }
    }
    fn log(&self, line: String) {
        info!("{line}");
        self.send(StreamMessage::Log(line));
    }
    /// Idle check, calibration and arm sequence. Leaves the driver
    /// `Unconfigured` on failure.
    fn configure(&mut self) -> Result<CalibrationTable, StreamError> {
        let state = self.device.state()?;
        if state != DeviceState::Idle {
            return Err(StreamError::DeviceBusy { state });
        }
        self.transition(DriverState::Calibrating);
        let ranges = self.device.channel_ranges()?;
        let calibration = CalibrationTable::compute(&ranges, self.config.nchan)?;
        if self.config.verbose {
            for ch in 0..calibration.len().min(3) {
                let cal = calibration.channel(ch);
                info!("[{ch:2}] scale:{:.5e} offset:{:.5}", cal.scale, cal.offset);
            }
        }
        for step in &self.config.arm_sequence {
            let response = self.device.command(step.channel, &step.line)?;
            if response.starts_with("ERROR") {
                return Err(StreamError::CommandRejected {
                    command: step.line.clone(),
                    response,
                });
            }
        }
        self.log(format!("calibrated {} channels, armed", calibration.len()));
        Ok(calibration)
    }
    pub fn run<P: Publisher>(&mut self, publisher: P) -> Result<StreamOutcome, StreamError> {
        let calibration = match self.configure() {
            Ok(calibration) => calibration,
            Err(e) => {
                error!("setup failed: {e}");
                self.transition(DriverState::Unconfigured);
                return Err(e);
            }
        };
        let mut processor = FrameProcessor::new(
            calibration,
            self.config.max_points,
            self.config.frame_samples,
            self.config.nsps,
            self.controls.clone(),
            publisher,
        );
        self.transition(DriverState::Streaming);
        let mut frames = 0u64;
        loop {
            if !self.controls.is_running() {
                self.transition(DriverState::Stopped);
                return Ok(StreamOutcome::Stopped { frames });
            }
            let frame = match self.device.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.log(format!("end of stream after {frames} frames"));
                    self.transition(DriverState::Stopped);
                    return Ok(StreamOutcome::EndOfStream { frames });
                }
                Err(e) => {
                    warn!("transport failed: {e}");
                    self.transition(DriverState::Stopped);
                    return Err(e);
                }
            };
            if let Err(e) = processor.process(&frame) {
                error!("{e}");
                let next = if e.is_fault() {
                    DriverState::Faulted
                } else {
                    DriverState::Stopped
                };
                self.transition(next);
                return Err(e);
            }
            frames += 1;
        }
    }
}
/// Runs a driver on its own thread. `connect` opens the device by name on
/// that thread; the outcome is both returned from the join handle and sent
/// as `StreamMessage::Finished`.
pub fn spawn_thread<D, C, P>(
    connect: C,
    config: DriverConfig,
    controls: Controls,
    publisher: P,
    tx: Sender<StreamMessage>,
) -> std::io::Result<JoinHandle<Result<StreamOutcome, StreamError>>>
where
    D: Device,
    C: FnOnce(&DriverConfig) -> Result<D, StreamError> + Send + 'static,
    P: Publisher + Send + 'static,
{
    thread::Builder::new()
        .name("acq-stream".to_string())
        .spawn(move || {
            let result = connect(&config).and_then(|device| {
                StreamingDriver::new(device, config, controls)
                    .with_events(tx.clone())
                    .run(publisher)
            });
            tx.send(StreamMessage::Finished(
                result.as_ref().map(|o| *o).map_err(|e| e.to_string()),
            ))
            .ok();
            result
        })
}
