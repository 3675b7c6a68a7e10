//! Host platform queries.

use std::sync::Arc;

use serde_json::json;

use crate::dispatch::HandlerRegistry;

#[derive(Debug, Default)]
pub struct SystemHandler;

impl SystemHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn is_unix(&self) -> bool {
        cfg!(unix)
    }

    pub fn is_mobile_device(&self) -> bool {
        cfg!(any(target_os = "android", target_os = "ios"))
    }

    /// Open `url` with the desktop's default handler.
    ///
    /// Returns whether the opener process could be launched; its exit status
    /// is not awaited.
    pub fn open_url(&self, url: &str) -> bool {
        if url.trim().is_empty() {
            return false;
        }

        let (program, leading) = opener();
        let mut command = tokio::process::Command::new(program);
        command.args(leading).arg(url);

        match command.spawn() {
            Ok(_) => {
                tracing::debug!(url, program, "Opened URL");
                true
            }
            Err(e) => {
                tracing::warn!(url, program, error = %e, "Failed to open URL");
                false
            }
        }
    }
}

/// Platform URL opener and its leading arguments.
fn opener() -> (&'static str, &'static [&'static str]) {
    if cfg!(target_os = "macos") {
        ("open", &[])
    } else if cfg!(windows) {
        ("cmd", &["/C", "start", ""])
    } else {
        ("xdg-open", &[])
    }
}

pub fn register(registry: &mut HandlerRegistry, handler: &Arc<SystemHandler>) {
    registry.bind("SystemHandler::isUnix", 0, handler, |h, _| async move {
        Ok(vec![json!(h.is_unix())])
    });
    registry.bind("SystemHandler::isMobileDevice", 0, handler, |h, _| async move {
        Ok(vec![json!(h.is_mobile_device())])
    });
    registry.bind("SystemHandler::openUrl", 1, handler, |h, args| async move {
        let url = args.string(0)?;
        Ok(vec![json!(h.open_url(&url))])
    });
}
