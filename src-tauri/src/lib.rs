pub mod animation;
pub mod app_dirs;
pub mod backend;
pub mod config;
pub mod error;
pub mod format;
pub mod logger;
pub mod orchestrator;
pub mod release;

#[cfg(feature = "desktop")]
mod desktop;

use std::sync::Arc;

use backend::{LauncherPaths, NativeBackend, WindowHost};
use config::BootstrapConfig;
use error::ApiResult;
use orchestrator::{Orchestrator, OrchestratorHandle};
use release::HttpReleaseClient;

#[cfg(feature = "desktop")]
pub use desktop::run;

/// Wire the native backend and the release client into an orchestrator.
///
/// The returned handle is the only way to feed it commands; the backend
/// holds a clone for its events.
pub fn assemble(
    config: &BootstrapConfig,
    host: Arc<dyn WindowHost>,
) -> ApiResult<(Orchestrator, OrchestratorHandle)> {
    let (handle, inbox) = orchestrator::channel();
    let backend = NativeBackend::new(config, LauncherPaths::detect(), handle.clone(), host)?;
    let releases = HttpReleaseClient::new(config)?;

    logger::log_info(
        &format!("Install mode: {:?}", config.install_mode),
        Some("app"),
    );

    let orchestrator = Orchestrator::new(
        config.clone(),
        Arc::new(backend),
        Arc::new(releases),
        inbox,
    );
    Ok((orchestrator, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::HeadlessHost;
    use orchestrator::{LifecyclePhase, UserCommand};

    #[tokio::test]
    async fn test_assemble_starts_idle() {
        let (orchestrator, handle) =
            assemble(&BootstrapConfig::default(), Arc::new(HeadlessHost)).unwrap();
        assert_eq!(orchestrator.state().phase, LifecyclePhase::Idle);
        assert!(handle.send(UserCommand::SetPurgePrevious(true)));

        drop(orchestrator);
        assert!(!handle.send(UserCommand::Start));
    }
}
