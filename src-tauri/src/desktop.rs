//! Tauri shell: window host, command surface and event forwarding.

use anyhow::{anyhow, Context};
use std::sync::Arc;
use tauri::{AppHandle, Emitter, Manager, State};
use tokio::sync::watch;

use crate::animation::{intro_schedule, AnimationScheduler, CancelHandle, FRAME_INTERVAL};
use crate::backend::WindowHost;
use crate::config::BootstrapConfig;
use crate::error::{ApiError, ApiResult, ToTauriError};
use crate::logger;
use crate::orchestrator::{OrchestratorHandle, OrchestratorState, UserCommand};

struct TauriHost {
    app: AppHandle,
}

impl WindowHost for TauriHost {
    fn show_main_window(&self) -> anyhow::Result<()> {
        let window = self
            .app
            .get_webview_window("main")
            .ok_or_else(|| anyhow!("Main window not found"))?;
        window.show().context("Failed to show main window")
    }

    fn exit(&self, code: i32) {
        self.app.exit(code);
    }
}

struct BootstrapState {
    handle: OrchestratorHandle,
    states: watch::Receiver<OrchestratorState>,
    intro: CancelHandle,
}

impl BootstrapState {
    fn send(&self, command: UserCommand) -> Result<(), String> {
        if self.handle.send(command) {
            Ok(())
        } else {
            ApiResult::<()>::Err(ApiError::internal("Bootstrapper is shutting down")).to_tauri_error()
        }
    }
}

// ============================================================================
// Lifecycle Commands
// ============================================================================

#[tauri::command]
fn start_bootstrap(state: State<'_, BootstrapState>) -> Result<(), String> {
    let current = state.states.borrow().clone();
    if let Err(e) = current.check_start() {
        logger::log_info(&format!("Start rejected: {}", e), Some("app"));
        return ApiResult::<()>::Err(e).to_tauri_error();
    }
    state.send(UserCommand::Start)
}

#[tauri::command]
fn set_purge_previous(state: State<'_, BootstrapState>, purge: bool) -> Result<(), String> {
    state.send(UserCommand::SetPurgePrevious(purge))
}

#[tauri::command]
fn get_bootstrap_state(state: State<'_, BootstrapState>) -> OrchestratorState {
    state.states.borrow().clone()
}

// ============================================================================
// Presentation Helpers
// ============================================================================

#[tauri::command]
fn get_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[tauri::command]
fn minimize_window(window: tauri::Window) -> Result<(), String> {
    window
        .minimize()
        .map_err(|e| format!("Failed to minimize window: {}", e))
}

#[tauri::command]
fn close_window(app: AppHandle) {
    logger::log_info("Window closed by user", Some("app"));
    app.exit(0);
}

#[tauri::command]
fn log_from_frontend(level: String, message: String, context: Option<String>) {
    let ctx = context.as_deref().or(Some("frontend"));
    match logger::LogLevel::parse(&level) {
        logger::LogLevel::Error => logger::log_error(&message, ctx),
        logger::LogLevel::Debug => logger::log_debug(&message, ctx, Some("frontend")),
        logger::LogLevel::Info => logger::log_info(&message, ctx),
    }
}

#[tauri::command]
fn set_log_level(level: String) {
    logger::set_log_level(logger::LogLevel::parse(&level));
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    logger::init();
    let config = BootstrapConfig::from_env();

    tauri::Builder::default()
        .invoke_handler(tauri::generate_handler![
            start_bootstrap,
            set_purge_previous,
            get_bootstrap_state,
            get_app_version,
            minimize_window,
            close_window,
            log_from_frontend,
            set_log_level,
        ])
        .setup(move |app| {
            let host = Arc::new(TauriHost {
                app: app.handle().clone(),
            });
            let (mut orchestrator, handle) = crate::assemble(&config, host)?;
            let states = orchestrator.subscribe();

            // Intro runs regardless of what the lifecycle does
            let cue_app = app.handle().clone();
            let scheduler = AnimationScheduler::new(intro_schedule(move |cue| {
                let _ = cue_app.emit("intro-cue", cue);
            }));
            let intro = scheduler.cancel_handle();
            tauri::async_runtime::spawn(scheduler.run(FRAME_INTERVAL));

            let state_app = app.handle().clone();
            let mut updates = states.clone();
            tauri::async_runtime::spawn(async move {
                while updates.changed().await.is_ok() {
                    let snapshot = updates.borrow_and_update().clone();
                    let _ = state_app.emit("bootstrap-state", &snapshot);
                }
            });

            tauri::async_runtime::spawn(async move {
                orchestrator.startup().await;
                orchestrator.run().await;
            });

            app.manage(BootstrapState {
                handle,
                states,
                intro,
            });
            Ok(())
        })
        .on_window_event(|window, event| {
            if let tauri::WindowEvent::Destroyed = event {
                if let Some(state) = window.try_state::<BootstrapState>() {
                    state.intro.cancel();
                }
            }
        })
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
