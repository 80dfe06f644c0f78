// src/main.rs
mod config;
mod drivers;
mod engine;
mod gui;
mod recorder;
mod simulator;
mod types;
use std::path::Path;
use anyhow::{anyhow, Context, Result};
use eframe::egui;
use log::{info, warn};
use config::DriverConfig;
use drivers::{Controls, Registry};
use engine::StreamingDriver;
use recorder::RecordingPublisher;
use simulator::SimulatedDevice;
fn load_config() -> Result<DriverConfig> {
    match std::env::args().nth(1) {
        Some(path) => DriverConfig::load(Path::new(&path)),
        None => Ok(DriverConfig::default().normalized()),
    }
}
// 无界面模式：在主线程上跑驱动，故障时返回错误
fn run_headless(config: DriverConfig, controls: Controls, registry: Registry) -> Result<()> {
    controls.set_running(true);
    let device = SimulatedDevice::connect(&config.device, &config)?;
    let nchan = config.nchan;
    let record_path = config.record_path.clone();
    let mut driver = StreamingDriver::new(device, config, controls);
    let result = match record_path {
        Some(path) => {
            let mut publisher = RecordingPublisher::create(registry.clone(), &path, nchan)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let result = driver.run(&mut publisher);
            if !publisher.is_recording() {
                warn!("{} is incomplete: recording stopped early", path.display());
            }
            result
        }
        None => driver.run(registry.clone()),
    };
    let outcome = match result {
        Ok(outcome) => outcome,
        // 设备没配置好：数据从未开始流动
        Err(e) if e.is_setup() => return Err(e).context("device setup failed"),
        Err(e) => return Err(e).context("streaming stopped"),
    };
    let published = registry.snapshot();
    info!(
        "{outcome:?}: {} flushes, {} waveform buffers",
        published.flushes, published.buffers
    );
    Ok(())
}
// 入口函数
fn main() -> Result<()> {
    env_logger::init();
    let config = load_config()?;
    let controls = Controls::new(config.scan_freq, config.update_time);
    let registry = Registry::new(config.nchan, config.max_points);
    if config.headless {
        return run_headless(config, controls, registry);
    }
    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1280.0, 800.0])
        .with_min_inner_size([960.0, 600.0])
        .with_title(format!("acqstream - {}", config.device));
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        "acqstream",
        options,
        Box::new(move |_cc| Box::new(gui::MonitorApp::new(config, controls, registry))),
    )
    .map_err(|e| anyhow!("monitor window failed: {e}"))
}
