//! Headless control loop.
//!
//! Ties the observation surfaces together: when the engine raises
//! track-finished the loop advances the playlist gaplessly, and when the
//! config watcher reports a change it reloads and re-applies what can
//! change at runtime (sort plan, volume, output device).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::config::{self, watcher::ReloadEvent};
use crate::player::PlaybackService;
use crate::runtime::Runtime;

const TICK_INTERVAL: Duration = Duration::from_millis(50);

pub struct App {
    runtime: Runtime,
    service: Arc<PlaybackService>,
    reload_rx: Option<Receiver<ReloadEvent>>,
    running: Arc<AtomicBool>,
}

impl App {
    pub fn new(
        runtime: Runtime,
        service: Arc<PlaybackService>,
        reload_rx: Option<Receiver<ReloadEvent>>,
    ) -> Self {
        Self {
            runtime,
            service,
            reload_rx,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Flag that stops [`run`](Self::run) from another thread.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Drive ticks until the running flag clears.
    pub fn run(&mut self) {
        tracing::info!(target: "app", "control loop started");
        while self.running.load(Ordering::Acquire) {
            self.tick();
            std::thread::sleep(TICK_INTERVAL);
        }
        tracing::info!(target: "app", "control loop stopped");
    }

    /// One iteration of the control loop.
    pub fn tick(&mut self) {
        if self.service.is_track_finished() {
            self.service.clear_track_finished_flag();
            match self.service.next_track_gapless() {
                Ok(Some(handle)) => {
                    tracing::debug!(target: "app", id = handle.id(), "advanced to next track");
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(target: "app", error = %e, "gapless advance failed");
                }
            }
        }

        let mut reload = false;
        if let Some(rx) = &self.reload_rx {
            while rx.try_recv().is_ok() {
                reload = true;
            }
        }
        if reload {
            self.apply_config_reload();
        }
    }

    fn apply_config_reload(&mut self) {
        let new_config = match config::load(&self.runtime.config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(target: "app", error = %e, "config reload failed, keeping old config");
                return;
            }
        };

        if new_config.sort != self.runtime.config.sort {
            self.runtime
                .library
                .apply_sort_plan(&new_config.sort_plan());
            tracing::info!(target: "app", "re-applied sort plan");
        }

        if (new_config.audio.volume - self.runtime.config.audio.volume).abs() > f32::EPSILON {
            self.service.set_volume(new_config.audio.volume);
        }

        if new_config.audio.device != self.runtime.config.audio.device {
            self.service.switch_device(&new_config.audio.device);
        }

        self.runtime.config = new_config;
        tracing::info!(target: "app", "config reloaded");
    }
}
