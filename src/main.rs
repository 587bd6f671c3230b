//! inLimbo: terminal music player core.
//!
//! Startup order matters: logging first (so everything after can talk),
//! then the single-instance gate, then config, then the library index
//! (cached or rebuilt), then the audio engine and the playback service,
//! and finally the control loop that keeps the queue moving.

pub mod app;
pub mod config;
pub mod error;
pub mod instance;
pub mod library;
pub mod logging;
pub mod media;
pub mod paths;
pub mod player;
pub mod runtime;
pub mod tags;
#[cfg(test)]
pub mod test_utils;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::Context;

use crate::app::App;
use crate::config::watcher::ConfigWatcher;
use crate::instance::{InstanceError, InstanceLock};
use crate::media::controls::MediaBridge;
use crate::media::{MediaBackend, ServiceBackend};
use crate::player::{AudioEngine, PlaybackService};
use crate::runtime::Runtime;

fn main() -> ExitCode {
    logging::init();

    let lock_path = paths::lock_file_path();
    let _lock = match InstanceLock::acquire(&lock_path) {
        Ok(lock) => lock,
        Err(InstanceError::AlreadyRunning) => {
            eprintln!("inlimbo: another instance is already running");
            return ExitCode::from(2);
        }
        Err(e) => {
            eprintln!("inlimbo: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "fatal error");
            eprintln!("inlimbo: {e:#}");
            ExitCode::FAILURE
        }
    }
}

static STOP_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

extern "C" fn on_sigint(_signum: libc::c_int) {
    if let Some(flag) = STOP_FLAG.get() {
        flag.store(false, Ordering::Release);
    }
}

/// Let Ctrl-C end the control loop so shutdown runs instead of the
/// process dying mid-write.
fn install_sigint_handler(flag: Arc<AtomicBool>) {
    let _ = STOP_FLAG.set(flag);
    unsafe {
        libc::signal(libc::SIGINT, on_sigint as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_sigint as libc::sighandler_t);
    }
}

fn run() -> anyhow::Result<()> {
    let config_path = paths::config_path().context("cannot resolve the config directory")?;
    let config = config::load(&config_path)?;

    let index_path = paths::library_index_path()
        .unwrap_or_else(|| PathBuf::from(".local/share/inlimbo/lib.bin"));
    let art_dir =
        paths::art_cache_dir().unwrap_or_else(|| PathBuf::from(".cache/inlimbo/art"));

    let runtime = Runtime::bootstrap(config, config_path.clone(), index_path, art_dir)?;
    tracing::info!(
        artists = runtime.library.count_artists(),
        tracks = runtime.library.count_tracks(),
        "library ready"
    );

    let mut engine = AudioEngine::new();
    engine.set_volume(runtime.config.audio.volume);
    engine
        .init_for_device(&runtime.config.audio.device)
        .context("audio backend initialization failed")?;

    let service = Arc::new(PlaybackService::new(engine));

    // Fill the playlist in library order.
    for song in runtime.library.all_songs() {
        let handle = service.register_track(Arc::new(song));
        service.add_to_playlist(handle);
    }
    service.start()?;

    let backend: Arc<dyn MediaBackend> = Arc::new(ServiceBackend::new(Arc::clone(&service)));
    let _bridge = MediaBridge::spawn(backend);

    let (_watcher, reload_rx) = match ConfigWatcher::new(&config_path) {
        Ok((watcher, rx)) => (Some(watcher), Some(rx)),
        Err(e) => {
            tracing::warn!(error = %e, "config watching disabled");
            (None, None)
        }
    };

    let mut app = App::new(runtime, Arc::clone(&service), reload_rx);
    install_sigint_handler(app.running_flag());
    app.run();

    service.shutdown();
    Ok(())
}
