//! Typed server events and their broadcast envelope form.

use ocs_core::funcs::*;
use ocs_core::types::JobKey;
use ocs_core::Envelope;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// ItemResult
// ---------------------------------------------------------------------------

/// Result object carried by item lifecycle events.
///
/// `status` is `success_<phase>` or `error_<phase>`, e.g.
/// `"success_downloadstart"` or `"error_install"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub status: String,
    pub message: String,
    pub metadata: Value,
}

impl ItemResult {
    pub fn success(phase: &str, message: impl Into<String>, metadata: Value) -> Self {
        Self {
            status: format!("success_{phase}"),
            message: message.into(),
            metadata,
        }
    }

    pub fn error(phase: &str, message: impl Into<String>, metadata: Value) -> Self {
        Self {
            status: format!("error_{phase}"),
            message: message.into(),
            metadata,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.starts_with("success_")
    }

    fn to_value(&self) -> Value {
        json!({
            "status": self.status,
            "message": self.message,
            "metadata": self.metadata,
        })
    }
}

/// Phase of an item pipeline (download, save, install, uninstall).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemPhase {
    DownloadStarted,
    DownloadFinished,
    SaveStarted,
    SaveFinished,
    InstallStarted,
    InstallFinished,
    UninstallStarted,
    UninstallFinished,
}

impl ItemPhase {
    pub fn func(self) -> &'static str {
        match self {
            ItemPhase::DownloadStarted => EVT_DOWNLOAD_STARTED,
            ItemPhase::DownloadFinished => EVT_DOWNLOAD_FINISHED,
            ItemPhase::SaveStarted => EVT_SAVE_STARTED,
            ItemPhase::SaveFinished => EVT_SAVE_FINISHED,
            ItemPhase::InstallStarted => EVT_INSTALL_STARTED,
            ItemPhase::InstallFinished => EVT_INSTALL_FINISHED,
            ItemPhase::UninstallStarted => EVT_UNINSTALL_STARTED,
            ItemPhase::UninstallFinished => EVT_UNINSTALL_FINISHED,
        }
    }
}

// ---------------------------------------------------------------------------
// ServerEvent
// ---------------------------------------------------------------------------

/// A lifecycle event to be delivered to every connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    MetadataSetChanged,

    Item { phase: ItemPhase, result: ItemResult },

    /// `received` and `total` are byte counts; `total` is 0 when unknown.
    DownloadProgress {
        item_key: JobKey,
        progress: f64,
        received: u64,
        total: u64,
    },

    CheckAllStarted { status: bool },

    CheckAllFinished { status: bool },

    UpdateStarted { item_key: JobKey, status: bool },

    UpdateProgress { item_key: JobKey, progress: f64 },

    /// `detail` is the failure reason; `None` on success.
    UpdateFinished {
        item_key: JobKey,
        success: bool,
        detail: Option<String>,
    },
}

impl ServerEvent {
    /// The broadcast `func` name for this event.
    pub fn func(&self) -> &'static str {
        match self {
            ServerEvent::MetadataSetChanged => EVT_METADATA_SET_CHANGED,
            ServerEvent::Item { phase, .. } => phase.func(),
            ServerEvent::DownloadProgress { .. } => EVT_DOWNLOAD_PROGRESS,
            ServerEvent::CheckAllStarted { .. } => EVT_CHECK_ALL_STARTED,
            ServerEvent::CheckAllFinished { .. } => EVT_CHECK_ALL_FINISHED,
            ServerEvent::UpdateStarted { .. } => EVT_UPDATE_STARTED,
            ServerEvent::UpdateProgress { .. } => EVT_UPDATE_PROGRESS,
            ServerEvent::UpdateFinished { .. } => EVT_UPDATE_FINISHED,
        }
    }

    /// Positional payload, in the order clients expect for `func`.
    pub fn data(&self) -> Vec<Value> {
        match self {
            ServerEvent::MetadataSetChanged => Vec::new(),
            ServerEvent::Item { result, .. } => vec![result.to_value()],
            ServerEvent::DownloadProgress {
                item_key,
                progress,
                received,
                total,
            } => vec![json!(item_key), json!(progress), json!(received), json!(total)],
            ServerEvent::UpdateProgress { item_key, progress } => {
                vec![json!(item_key), json!(progress)]
            }
            ServerEvent::CheckAllStarted { status } | ServerEvent::CheckAllFinished { status } => {
                vec![json!(status)]
            }
            ServerEvent::UpdateStarted { item_key, status } => {
                vec![json!(item_key), json!(status)]
            }
            ServerEvent::UpdateFinished {
                item_key,
                success,
                detail,
            } => {
                let mut data = vec![json!(item_key), json!(success)];
                if let Some(detail) = detail {
                    data.push(json!(detail));
                }
                data
            }
        }
    }

    /// Build the broadcast envelope (`id` is always empty).
    pub fn to_envelope(&self) -> Envelope {
        Envelope::event(self.func(), self.data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_started_envelope_matches_wire_shape() {
        let env = ServerEvent::UpdateStarted {
            item_key: "item-42".into(),
            status: true,
        }
        .to_envelope();

        assert_eq!(env.id, "");
        assert_eq!(env.func, "UpdateHandler::updateStarted");
        assert_eq!(env.data, vec![json!("item-42"), json!(true)]);
    }

    #[test]
    fn metadata_set_changed_has_no_payload() {
        let env = ServerEvent::MetadataSetChanged.to_envelope();
        assert_eq!(env.func, "ItemHandler::metadataSetChanged");
        assert!(env.data.is_empty());
    }

    #[test]
    fn item_event_carries_result_object() {
        let result = ItemResult::error(
            "download",
            "connection refused",
            json!({"url": "https://example.com/a.tar.gz"}),
        );
        assert!(!result.is_success());

        let env = ServerEvent::Item {
            phase: ItemPhase::DownloadFinished,
            result,
        }
        .to_envelope();

        assert_eq!(env.func, "ItemHandler::downloadFinished");
        assert_eq!(env.data[0]["status"], "error_download");
        assert_eq!(env.data[0]["message"], "connection refused");
        assert_eq!(env.data[0]["metadata"]["url"], "https://example.com/a.tar.gz");
    }

    #[test]
    fn download_progress_carries_fraction_and_byte_counts() {
        let env = ServerEvent::DownloadProgress {
            item_key: "k".into(),
            progress: 0.5,
            received: 512,
            total: 1024,
        }
        .to_envelope();
        assert_eq!(env.func, "ItemHandler::downloadProgress");
        assert_eq!(env.data, vec![json!("k"), json!(0.5), json!(512), json!(1024)]);
    }

    #[test]
    fn update_progress_carries_key_and_fraction() {
        let env = ServerEvent::UpdateProgress {
            item_key: "k".into(),
            progress: 0.25,
        }
        .to_envelope();
        assert_eq!(env.data, vec![json!("k"), json!(0.25)]);
    }

    #[test]
    fn failed_update_carries_detail() {
        let failed = ServerEvent::UpdateFinished {
            item_key: "k".into(),
            success: false,
            detail: Some("No update available".into()),
        }
        .to_envelope();
        assert_eq!(failed.func, "UpdateHandler::updateFinished");
        assert_eq!(
            failed.data,
            vec![json!("k"), json!(false), json!("No update available")]
        );

        let succeeded = ServerEvent::UpdateFinished {
            item_key: "k".into(),
            success: true,
            detail: None,
        }
        .to_envelope();
        assert_eq!(succeeded.data, vec![json!("k"), json!(true)]);
    }
}
