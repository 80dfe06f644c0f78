// src/gui.rs
use std::fs;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use eframe::egui;
use egui::Color32;
use egui_plot::{Legend, Line, Plot, PlotPoints};
use log::{error, warn};

use crate::config::DriverConfig;
use crate::drivers::{render_waveform_png, Controls, PlotStyle, Registry, StreamError};
use crate::engine;
use crate::recorder::RecordingPublisher;
use crate::simulator::SimulatedDevice;
use crate::types::*;

type Worker = JoinHandle<Result<StreamOutcome, StreamError>>;

const TRACE_COLORS: [Color32; 6] = [
    Color32::from_rgb(0, 255, 255),
    Color32::YELLOW,
    Color32::from_rgb(255, 0, 255),
    Color32::GREEN,
    Color32::from_rgb(255, 128, 0),
    Color32::LIGHT_BLUE,
];

pub struct MonitorApp {
    config: DriverConfig,
    controls: Controls,
    registry: Registry,
    worker: Option<Worker>,
    state: DriverState,
    // 编辑中的参数
    scan_freq: u32,
    update_time: f64,
    shown_channels: usize,
    log_messages: Vec<String>,
    rx: Receiver<StreamMessage>,
    tx: Sender<StreamMessage>,
}

impl MonitorApp {
    pub fn new(config: DriverConfig, controls: Controls, registry: Registry) -> Self {
        let (tx, rx) = channel();
        Self {
            scan_freq: controls.scan_freq(),
            update_time: controls.update_time(),
            shown_channels: config.nchan.min(4),
            config,
            controls,
            registry,
            worker: None,
            state: DriverState::Unconfigured,
            log_messages: vec!["Monitor ready.".to_owned()],
            rx,
            tx,
        }
    }

    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {}", msg));
        if self.log_messages.len() > 8 { self.log_messages.remove(0); }
    }

    fn is_streaming(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn start(&mut self) {
        if self.is_streaming() { return; }
        self.reap_worker();
        self.controls.set_running(true);
        let nchan = self.config.nchan;
        let spawned = match self.config.record_path.clone() {
            Some(path) => match RecordingPublisher::create(self.registry.clone(), &path, nchan) {
                Ok(publisher) => self.spawn(publisher),
                Err(e) => {
                    self.log(&format!("Recording disabled: {e}"));
                    self.spawn(self.registry.clone())
                }
            },
            None => self.spawn(self.registry.clone()),
        };
        match spawned {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => {
                self.controls.set_running(false);
                self.log(&format!("Failed to start worker: {e}"));
            }
        }
    }

    fn spawn<P: crate::drivers::Publisher + Send + 'static>(&self, publisher: P) -> std::io::Result<Worker> {
        engine::spawn_thread(
            |cfg: &DriverConfig| SimulatedDevice::connect(&cfg.device, cfg),
            self.config.clone(),
            self.controls.clone(),
            publisher,
            self.tx.clone(),
        )
    }

    fn reap_worker(&mut self) {
        if self.worker.as_ref().is_some_and(|w| w.is_finished()) {
            if let Some(worker) = self.worker.take() {
                if worker.join().is_err() { error!("streaming thread panicked"); }
            }
        }
    }

    fn export_png(&mut self) {
        let snapshot = self.registry.snapshot();
        let result = render_waveform_png(&snapshot, PlotStyle::default()).and_then(|png| {
            let name = format!("waveform_{}.png", snapshot.last_buffer_sample.unwrap_or(0));
            fs::write(&name, png).map_err(|e| StreamError::Plot(e.to_string()))?;
            Ok(name)
        });
        match result {
            Ok(name) => self.log(&format!("Saved {name}")),
            Err(e) => { warn!("{e}"); self.log(&e.to_string()); }
        }
    }
}

impl eframe::App for MonitorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // 1. 后台消息
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                StreamMessage::Log(s) => self.log(&s),
                StreamMessage::State(s) => self.state = s,
                StreamMessage::Finished(Ok(outcome)) => self.log(&format!("Finished: {outcome:?}")),
                StreamMessage::Finished(Err(e)) => self.log(&format!("Stopped: {e}")),
            }
        }
        self.reap_worker();

        ctx.request_repaint_after(Duration::from_secs_f64(self.controls.update_time()));

        let published = self.registry.snapshot();

        let mut visuals = egui::Visuals::dark();
        visuals.widgets.noninteractive.bg_fill = Color32::from_rgb(10, 10, 15);
        ctx.set_visuals(visuals);

        egui::SidePanel::left("L").min_width(300.0).show(ctx, |ui| {
            ui.add_space(10.0);
            ui.heading("acqstream");
            ui.label(format!("Device: {}", self.config.device));
            ui.separator();

            let state_col = match self.state {
                DriverState::Streaming => Color32::GREEN,
                DriverState::Faulted => Color32::RED,
                _ => Color32::GRAY,
            };
            ui.label(egui::RichText::new(format!("{:?}", self.state)).color(state_col).strong());

            let streaming = self.is_streaming();
            let btn_txt = if streaming { "STOP" } else { "RUN" };
            if ui.button(btn_txt).clicked() {
                if streaming { self.controls.set_running(false); }
                else { self.start(); }
            }

            ui.add_space(10.0);
            ui.horizontal(|ui| {
                ui.label("Scan freq (Hz)");
                let resp = ui.add(egui::DragValue::new(&mut self.scan_freq).clamp_range(1..=self.config.nsps));
                if resp.changed() { self.controls.set_scan_freq(self.scan_freq); }
            });
            ui.horizontal(|ui| {
                ui.label("Update time (s)");
                let resp = ui.add(egui::DragValue::new(&mut self.update_time).speed(0.01));
                if resp.lost_focus() || resp.drag_released() {
                    self.update_time = self.controls.set_update_time(self.update_time);
                }
            });
            ui.horizontal(|ui| {
                ui.label("Channels shown");
                ui.add(egui::DragValue::new(&mut self.shown_channels).clamp_range(1..=self.config.nchan));
            });

            ui.add_space(10.0);
            ui.separator();
            ui.label(format!("Flushes: {}  Buffers: {}", published.flushes, published.buffers));
            if let Some(sample) = published.last_buffer_sample {
                ui.label(format!("Last buffer @ sample {sample}"));
            }
            egui::ScrollArea::vertical().id_source("scalars").max_height(220.0).show(ui, |ui| {
                egui::Grid::new("scalars_grid").striped(true).show(ui, |ui| {
                    ui.label("Ch"); ui.label("Mean (V)"); ui.label("Min"); ui.label("Max");
                    ui.end_row();
                    for (ch, scalar) in published.scalars.iter().enumerate() {
                        ui.monospace(format!("{ch:2}"));
                        ui.monospace(scalar.map(|v| format!("{v:+.4}")).unwrap_or_else(|| "-".into()));
                        match published.waveforms.get(ch).and_then(|w| w.as_ref()) {
                            Some(wf) => { ui.monospace(format!("{:+.3}", wf.min)); ui.monospace(format!("{:+.3}", wf.max)); }
                            None => { ui.monospace("-"); ui.monospace("-"); }
                        }
                        ui.end_row();
                    }
                });
            });

            ui.add_space(10.0);
            if ui.button("EXPORT PNG").clicked() { self.export_png(); }

            ui.add_space(10.0);
            egui::ScrollArea::vertical().id_source("log").max_height(100.0).show(ui, |ui| {
                for m in &self.log_messages { ui.monospace(m); }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            Plot::new("waveforms")
                .legend(Legend::default())
                .include_x(0.0)
                .include_x(crate::drivers::publish::NUM_DIVISIONS)
                .show(ui, |plot_ui| {
                    for (ch, wf) in published.waveforms.iter().enumerate().take(self.shown_channels) {
                        let Some(wf) = wf else { continue };
                        let points: Vec<[f64; 2]> = published.time_base.iter().zip(&wf.samples).map(|(&t, &v)| [t, v]).collect();
                        let col = TRACE_COLORS[ch % TRACE_COLORS.len()];
                        plot_ui.line(Line::new(PlotPoints::new(points)).name(format!("Ch{}", ch)).color(col));
                    }
                });
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.controls.set_running(false);
        if let Some(worker) = self.worker.take() {
            worker.join().ok();
        }
    }
}
