//! Broadcast event names.
//!
//! Used by `ocs_events::ServerEvent::to_envelope` when turning typed
//! lifecycle events into `{id: "", func, data}` broadcasts.

// ---------------------------------------------------------------------------
// ItemHandler events
// ---------------------------------------------------------------------------

/// The set of in-progress item metadata changed.
pub const EVT_METADATA_SET_CHANGED: &str = "ItemHandler::metadataSetChanged";

pub const EVT_DOWNLOAD_STARTED: &str = "ItemHandler::downloadStarted";
pub const EVT_DOWNLOAD_PROGRESS: &str = "ItemHandler::downloadProgress";
pub const EVT_DOWNLOAD_FINISHED: &str = "ItemHandler::downloadFinished";

pub const EVT_SAVE_STARTED: &str = "ItemHandler::saveStarted";
pub const EVT_SAVE_FINISHED: &str = "ItemHandler::saveFinished";

pub const EVT_INSTALL_STARTED: &str = "ItemHandler::installStarted";
pub const EVT_INSTALL_FINISHED: &str = "ItemHandler::installFinished";

pub const EVT_UNINSTALL_STARTED: &str = "ItemHandler::uninstallStarted";
pub const EVT_UNINSTALL_FINISHED: &str = "ItemHandler::uninstallFinished";

// ---------------------------------------------------------------------------
// UpdateHandler events
// ---------------------------------------------------------------------------

pub const EVT_CHECK_ALL_STARTED: &str = "UpdateHandler::checkAllStarted";
pub const EVT_CHECK_ALL_FINISHED: &str = "UpdateHandler::checkAllFinished";

pub const EVT_UPDATE_STARTED: &str = "UpdateHandler::updateStarted";
pub const EVT_UPDATE_PROGRESS: &str = "UpdateHandler::updateProgress";
pub const EVT_UPDATE_FINISHED: &str = "UpdateHandler::updateFinished";
