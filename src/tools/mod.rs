//! The tool surfaces: uniform thin adapters over the driver capability set,
//! one registered descriptor per recognized tool name.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::capture::ArtifactStore;
use crate::dispatch::ToolRegistry;
use crate::driver::{DriverError, DriverResult};
use crate::session::SessionRegistry;

pub mod conditions;
pub mod dialogs;
pub mod extraction;
pub mod frames;
pub mod interaction;
pub mod media;
pub mod navigation;
pub mod network;
pub mod performance;
pub mod script;
pub mod scripts;
pub mod session;
pub mod storage;
pub mod windows;

/// Per-call deadline for script execution round trips.
pub const SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-call deadline for dialog handling.
pub const DIALOG_TIMEOUT: Duration = Duration::from_secs(10);
/// Default navigation deadline; tools accept an override parameter.
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// How many extra attempts an idempotent find gets after a stale-element
/// failure. Only find-shaped reads use this; interactions never retry.
const STALE_RETRIES: usize = 2;

pub(crate) async fn with_stale_retry<T, F, Fut>(mut op: F) -> DriverResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DriverResult<T>>,
{
    let mut attempts = 0;
    loop {
        match op().await {
            Err(DriverError::StaleElement(_)) if attempts < STALE_RETRIES => {
                attempts += 1;
            }
            other => return other,
        }
    }
}

/// Shared dependencies the tool constructors need.
pub struct ToolDeps {
    pub sessions: Arc<SessionRegistry>,
    pub artifacts: Arc<ArtifactStore>,
}

/// Build the full registration table. One entry per recognized tool; the
/// dispatcher resolves names against exactly this set.
#[must_use]
pub fn register_all(deps: &ToolDeps) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    // Session lifecycle
    registry.register(session::CreateSessionTool::descriptor(deps.sessions.clone()));
    registry.register(session::CloseSessionTool::descriptor(deps.sessions.clone()));
    registry.register(session::ListSessionsTool::descriptor(deps.sessions.clone()));
    registry.register(session::GetSessionInfoTool::descriptor(deps.sessions.clone()));

    // Navigation
    registry.register(navigation::NavigateTool::descriptor());
    registry.register(navigation::BackTool::descriptor());
    registry.register(navigation::ForwardTool::descriptor());
    registry.register(navigation::ReloadTool::descriptor());
    registry.register(navigation::GetCurrentUrlTool::descriptor());

    // DOM interaction
    registry.register(interaction::ClickTool::descriptor());
    registry.register(interaction::TypeTool::descriptor());
    registry.register(interaction::SelectTool::descriptor());
    registry.register(interaction::HoverTool::descriptor());
    registry.register(interaction::ScrollTool::descriptor());

    // Extraction
    registry.register(extraction::GetPageContentTool::descriptor(deps.artifacts.clone()));
    registry.register(extraction::GetElementTextTool::descriptor());
    registry.register(extraction::GetElementAttributeTool::descriptor());
    registry.register(extraction::GetElementCssTool::descriptor());
    registry.register(extraction::TakeScreenshotTool::descriptor(deps.artifacts.clone()));

    // Conditions
    registry.register(conditions::WaitForElementTool::descriptor());
    registry.register(conditions::ElementExistsTool::descriptor());

    // Script execution
    registry.register(script::EvaluateTool::descriptor());
    registry.register(script::ExecuteScriptTool::descriptor());
    registry.register(script::InjectScriptTagTool::descriptor());

    // Dialogs
    registry.register(dialogs::DialogAcceptTool::descriptor());
    registry.register(dialogs::DialogDismissTool::descriptor());
    registry.register(dialogs::DialogGetTextTool::descriptor());
    registry.register(dialogs::DialogSendTextTool::descriptor());

    // Windows
    registry.register(windows::ListWindowsTool::descriptor());
    registry.register(windows::SwitchWindowTool::descriptor());
    registry.register(windows::OpenWindowTool::descriptor());
    registry.register(windows::CloseWindowTool::descriptor());
    registry.register(windows::SetWindowRectTool::descriptor());

    // Frames
    registry.register(frames::ListFramesTool::descriptor());
    registry.register(frames::SwitchFrameTool::descriptor());
    registry.register(frames::ParentFrameTool::descriptor());
    registry.register(frames::ExecuteInFrameTool::descriptor());

    // Network capture
    registry.register(network::NetworkCaptureStartTool::descriptor());
    registry.register(network::NetworkCaptureStopTool::descriptor(deps.artifacts.clone()));
    registry.register(network::NetworkBlockTool::descriptor());

    // Performance
    registry.register(performance::PerformanceMetricsTool::descriptor());
    registry.register(performance::PerformanceResourceSampleTool::descriptor());
    registry.register(performance::PerformanceRenderAnalysisTool::descriptor());

    // Storage
    registry.register(storage::GetCookiesTool::descriptor());
    registry.register(storage::SetCookieTool::descriptor());
    registry.register(storage::DeleteCookieTool::descriptor());
    registry.register(storage::ClearCookiesTool::descriptor());
    registry.register(storage::GetStorageTool::descriptor());
    registry.register(storage::SetStorageItemTool::descriptor());
    registry.register(storage::ClearStorageTool::descriptor());

    // Media
    registry.register(media::MediaDetectTool::descriptor());
    registry.register(media::MediaStateTool::descriptor());
    registry.register(media::MediaPlaybackCheckTool::descriptor());
    registry.register(media::MediaControlTool::descriptor());
    registry.register(media::MediaMonitorTool::descriptor());

    registry
}
