use eframe::egui;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::TryRecvError};

pub mod attempt;
pub mod cloud_reporter;
pub mod config;
pub mod environment;
pub mod error;

pub use attempt::*;
pub use cloud_reporter::*;
pub use config::ClientConfig;
pub use environment::*;
pub use error::{ApiError, ConfigError};

const SUBMIT_RETRY: Duration = Duration::from_secs(3);

// results of background tasks, drained on the UI thread
pub enum AppMsg {
    Log(String),
    Submitted,
    Error(String),
}

/// Native exam window. Plays the browser tab: window events are fed to the
/// monitor and its warning / auto-submit signals drive the dialogs.
pub struct ExamApp {
    service: AntiCheatingService,
    runtime: Handle,
    attempt_id: String,

    warning_rx: broadcast::Receiver<CheatingWarning>,
    auto_submit_rx: broadcast::Receiver<bool>,
    msg_sender: Sender<AppMsg>,
    msg_receiver: Receiver<AppMsg>,

    open_warning: Option<CheatingWarning>,
    confirm_leave: bool,
    is_submitting: bool,
    submitted: bool,
    // earliest time a failed forced submit is tried again
    retry_submit_at: Option<Instant>,
    was_focused: bool,
    was_hidden: bool,
    logs: Vec<String>,
}

// leaving the window must never leave a monitor armed
impl Drop for ExamApp {
    fn drop(&mut self) {
        self.service.stop_monitoring();
    }
}

impl eframe::App for ExamApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_messages();
        self.drain_signals();
        self.retry_forced_submit();
        self.watch_window(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(format!("Exam attempt {}", self.attempt_id));
            ui.add_space(10.0);

            ui.group(|ui| {
                let monitoring = self.service.is_monitoring();
                let (status, color) = if self.submitted {
                    ("Submitted", egui::Color32::GRAY)
                } else if monitoring {
                    ("In progress (monitored)", egui::Color32::YELLOW)
                } else {
                    ("Not started", egui::Color32::GREEN)
                };
                ui.colored_label(color, format!("Status: {}", status));
                ui.label(format!(
                    "Warnings: {} / remaining {}",
                    self.service.warning_count(),
                    self.service.remaining_warnings()
                ));

                ui.add_space(5.0);
                if self.is_submitting || self.service.forced_submit_pending() {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Warning limit reached or submit in progress, submitting...");
                    });
                } else if !self.submitted {
                    let btn_text = if monitoring { "Submit Exam" } else { "Start Exam" };
                    if ui.add_sized([ui.available_width(), 30.0], egui::Button::new(btn_text)).clicked() {
                        if monitoring {
                            self.submit();
                        } else {
                            self.start();
                        }
                    }
                }
            });

            ui.add_space(10.0);
            ui.separator();
            ui.heading("Event Logs");

            egui::ScrollArea::vertical()
                .auto_shrink([false; 2])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for log in &self.logs {
                        ui.monospace(log);
                    }
                });
        });

        self.show_dialogs(ctx);

        if self.service.is_monitoring() || self.is_submitting {
            ctx.request_repaint_after(Duration::from_millis(200));
        }
    }
}

impl ExamApp {
    pub fn new(service: AntiCheatingService, runtime: Handle, attempt_id: String) -> Self {
        let (tx, rx) = channel();

        Self {
            warning_rx: service.subscribe_warnings(),
            auto_submit_rx: service.subscribe_auto_submit(),
            service,
            runtime,
            attempt_id,
            msg_sender: tx,
            msg_receiver: rx,
            open_warning: None,
            confirm_leave: false,
            is_submitting: false,
            submitted: false,
            retry_submit_at: None,
            was_focused: true,
            was_hidden: false,
            logs: vec!["[System Initialized]".into()],
        }
    }

    fn start(&mut self) {
        let service = self.service.clone();
        let attempt_id = self.attempt_id.clone();
        let tx = self.msg_sender.clone();
        self.log(&format!("[monitor]: Starting attempt {}...", attempt_id));

        self.runtime.spawn(async move {
            service.start_monitoring(&attempt_id).await;
            tx.send(AppMsg::Log(format!(
                "[monitor]: Monitoring active ({} warnings so far)",
                service.warning_count()
            )))
            .ok();
        });
    }

    fn submit(&mut self) {
        if self.is_submitting {
            return;
        }
        self.is_submitting = true;

        let service = self.service.clone();
        let tx = self.msg_sender.clone();
        self.runtime.spawn(async move {
            match service.submit_attempt().await {
                Ok(()) => tx.send(AppMsg::Submitted).ok(),
                Err(e) => tx.send(AppMsg::Error(format!("[submit] {}", e))).ok(),
            };
        });
    }

    fn drain_messages(&mut self) {
        while let Ok(msg) = self.msg_receiver.try_recv() {
            match msg {
                AppMsg::Log(text) => self.log(&text),
                AppMsg::Submitted => {
                    self.is_submitting = false;
                    self.submitted = true;
                    self.retry_submit_at = None;
                    self.log("[submit]: Attempt submitted");
                }
                AppMsg::Error(err) => {
                    self.is_submitting = false;
                    self.retry_submit_at = Some(Instant::now() + SUBMIT_RETRY);
                    self.logs.push(format!("[ERROR]: {}", err));
                }
            }
        }
    }

    fn drain_signals(&mut self) {
        loop {
            match self.warning_rx.try_recv() {
                Ok(warning) => {
                    self.log(&format!(
                        "[violation]: {} ({} of {})",
                        warning.action_type, warning.warning_count, warning.max_warnings
                    ));
                    self.open_warning = Some(warning);
                }
                Err(TryRecvError::Lagged(missed)) => {
                    self.log(&format!("[violation]: {} warnings not shown", missed));
                }
                Err(_) => break,
            }
        }

        let mut auto_submit = false;
        loop {
            match self.auto_submit_rx.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => auto_submit = true,
                Err(_) => break,
            }
        }

        if auto_submit {
            // tear down any dialog before the forced submit
            self.open_warning = None;
            self.confirm_leave = false;
            self.log("[violation]: Warning limit reached, submitting exam");
            self.submit();
        }
    }

    // the auto-submit signal fires once, so a failed submit is retried from here
    fn retry_forced_submit(&mut self) {
        if self.is_submitting || self.submitted || !self.service.forced_submit_pending() {
            return;
        }
        if self.retry_submit_at.is_some_and(|at| Instant::now() < at) {
            return;
        }
        self.open_warning = None;
        self.confirm_leave = false;
        self.log("[violation]: Warning limit reached, submitting exam");
        self.submit();
    }

    fn watch_window(&mut self, ctx: &egui::Context) {
        let (focused, hidden, close_requested, secondary_click) = ctx.input(|i| {
            (
                i.focused,
                i.viewport().minimized.unwrap_or(false),
                i.viewport().close_requested(),
                i.pointer.secondary_clicked(),
            )
        });

        if self.was_focused && !focused {
            self.service.handle_event(&BrowserEvent::WindowBlur);
        }
        self.was_focused = focused;

        if hidden != self.was_hidden {
            self.service.handle_event(&BrowserEvent::VisibilityChange { hidden });
        }
        self.was_hidden = hidden;

        if secondary_click {
            self.service.handle_event(&BrowserEvent::ContextMenu);
        }

        if close_requested {
            let detection = self.service.handle_event(&BrowserEvent::BeforeUnload);
            if detection.confirm_unload {
                ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
                self.confirm_leave = true;
            }
        }

        let service = &self.service;
        ctx.input_mut(|i| {
            i.events.retain(|event| match event {
                egui::Event::Key {
                    key,
                    pressed: true,
                    modifiers,
                    ..
                } => {
                    let stroke = KeyStroke {
                        key: map_key(*key),
                        ctrl: modifiers.ctrl,
                        shift: modifiers.shift,
                        alt: modifiers.alt,
                        meta: modifiers.mac_cmd,
                    };
                    !service.handle_event(&BrowserEvent::KeyDown(stroke)).suppress
                }
                _ => true,
            });
        });
    }

    fn show_dialogs(&mut self, ctx: &egui::Context) {
        if let Some(warning) = self.open_warning.clone() {
            egui::Window::new("Warning")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.colored_label(
                        egui::Color32::RED,
                        format!("Suspicious activity detected: {}", warning.action_type.description()),
                    );
                    ui.label(format!(
                        "Warning {} of {}. {} remaining before your exam is submitted automatically.",
                        warning.warning_count, warning.max_warnings, warning.remaining_warnings
                    ));
                    if ui.button("I understand").clicked() {
                        self.open_warning = None;
                    }
                });
        }

        if self.confirm_leave && !self.service.forced_submit_pending() {
            egui::Window::new("Leave exam?")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label("Closing the window counts as a violation and your attempt stays open.");
                    ui.horizontal(|ui| {
                        if ui.button("Stay").clicked() {
                            self.confirm_leave = false;
                        }
                        if ui.button("Leave").clicked() {
                            self.service.stop_monitoring();
                            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                        }
                    });
                });
        }
    }

    fn log(&mut self, msg: &str) {
        self.logs.push(format!("> {}", msg));
    }
}

fn map_key(key: egui::Key) -> Key {
    match key {
        egui::Key::F5 => Key::F5,
        egui::Key::F12 => Key::F12,
        other => {
            let mut chars = other.name().chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => Key::Char(c),
                _ => Key::Other,
            }
        }
    }
}
