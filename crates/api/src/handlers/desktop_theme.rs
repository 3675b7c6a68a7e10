//! Desktop environment detection and theme application.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::dispatch::HandlerRegistry;

/// Install types each desktop can apply directly.
fn applicable_types(desktop: &str) -> &'static [&'static str] {
    match desktop {
        "kde" => &[
            "wallpapers",
            "icons",
            "cursors",
            "plasma_desktopthemes",
            "plasma_look_and_feel",
            "color_schemes",
        ],
        "gnome" | "unity" | "budgie" => {
            &["wallpapers", "icons", "cursors", "gtk3_themes", "gnome_shell_themes"]
        }
        "cinnamon" => &["wallpapers", "icons", "cursors", "gtk3_themes"],
        "xfce" => &["wallpapers", "icons", "cursors", "gtk2_themes", "xfwm4_themes"],
        "mate" => &["wallpapers", "icons", "cursors", "gtk3_themes"],
        _ => &[],
    }
}

/// Map `XDG_CURRENT_DESKTOP` (or `DESKTOP_SESSION`) to a known desktop.
pub fn detect_desktop(current_desktop: Option<&str>, session: Option<&str>) -> &'static str {
    const KNOWN: &[(&str, &str)] = &[
        ("kde", "kde"),
        ("plasma", "kde"),
        ("gnome", "gnome"),
        ("unity", "unity"),
        ("budgie", "budgie"),
        ("x-cinnamon", "cinnamon"),
        ("cinnamon", "cinnamon"),
        ("xfce", "xfce"),
        ("mate", "mate"),
    ];

    for value in [current_desktop, session].into_iter().flatten() {
        let value = value.to_ascii_lowercase();
        for part in value.split(':') {
            if let Some((_, desktop)) = KNOWN.iter().find(|(name, _)| part.contains(name)) {
                return *desktop;
            }
        }
    }
    ""
}

/// The command that applies `path` as `install_type` on `desktop`.
pub fn theme_command(desktop: &str, path: &Path, install_type: &str) -> Option<Vec<String>> {
    let full = path.to_string_lossy();
    let full = &*full;
    let name = path.file_name()?.to_string_lossy();
    let name = &*name;
    let args = |parts: &[&str]| parts.iter().map(|part| part.to_string()).collect::<Vec<_>>();

    let command = match (desktop, install_type) {
        ("kde", "wallpapers") => args(&["plasma-apply-wallpaperimage", full]),
        ("kde", "icons") => args(&["/usr/lib/plasma-changeicons", name]),
        ("kde", "cursors") => args(&["plasma-apply-cursortheme", name]),
        ("kde", "plasma_desktopthemes") => args(&["plasma-apply-desktoptheme", name]),
        ("kde", "plasma_look_and_feel") => args(&["lookandfeeltool", "-a", name]),
        ("kde", "color_schemes") => args(&["plasma-apply-colorscheme", name]),

        ("gnome" | "unity" | "budgie" | "cinnamon" | "mate", _) => {
            let (schema, key, value) = gsettings_target(desktop, install_type, full, name)?;
            args(&["gsettings", "set", schema, key, value.as_str()])
        }

        ("xfce", "wallpapers") => args(&[
            "xfconf-query",
            "-c",
            "xfce4-desktop",
            "-p",
            "/backdrop/screen0/monitor0/workspace0/last-image",
            "-s",
            full,
        ]),
        ("xfce", "icons") => args(&["xfconf-query", "-c", "xsettings", "-p", "/Net/IconThemeName", "-s", name]),
        ("xfce", "cursors") => args(&["xfconf-query", "-c", "xsettings", "-p", "/Gtk/CursorThemeName", "-s", name]),
        ("xfce", "gtk2_themes") => args(&["xfconf-query", "-c", "xsettings", "-p", "/Net/ThemeName", "-s", name]),
        ("xfce", "xfwm4_themes") => args(&["xfconf-query", "-c", "xfwm4", "-p", "/general/theme", "-s", name]),

        _ => return None,
    };
    Some(command)
}

/// gsettings schema, key and value for GNOME-family desktops.
fn gsettings_target(
    desktop: &str,
    install_type: &str,
    full: &str,
    name: &str,
) -> Option<(&'static str, &'static str, String)> {
    let interface = match desktop {
        "cinnamon" => "org.cinnamon.desktop.interface",
        "mate" => "org.mate.interface",
        _ => "org.gnome.desktop.interface",
    };
    let target = match install_type {
        "wallpapers" => match desktop {
            "cinnamon" => ("org.cinnamon.desktop.background", "picture-uri", format!("file://{full}")),
            "mate" => ("org.mate.background", "picture-filename", full.to_string()),
            _ => ("org.gnome.desktop.background", "picture-uri", format!("file://{full}")),
        },
        "icons" => (interface, "icon-theme", name.to_string()),
        "cursors" if desktop == "mate" => ("org.mate.peripherals-mouse", "cursor-theme", name.to_string()),
        "cursors" => (interface, "cursor-theme", name.to_string()),
        "gtk3_themes" => (interface, "gtk-theme", name.to_string()),
        "gnome_shell_themes" => ("org.gnome.shell.extensions.user-theme", "name", name.to_string()),
        _ => return None,
    };
    Some(target)
}

pub struct DesktopThemeHandler {
    desktop: String,
}

impl DesktopThemeHandler {
    /// Detect the desktop from the session environment.
    pub fn from_env() -> Self {
        let current = std::env::var("XDG_CURRENT_DESKTOP").ok();
        let session = std::env::var("DESKTOP_SESSION").ok();
        Self::with_desktop(detect_desktop(current.as_deref(), session.as_deref()))
    }

    pub fn with_desktop(desktop: impl Into<String>) -> Self {
        Self {
            desktop: desktop.into(),
        }
    }

    pub fn desktop_environment(&self) -> &str {
        &self.desktop
    }

    pub fn is_applicable_type(&self, install_type: &str) -> bool {
        applicable_types(&self.desktop).contains(&install_type)
    }

    /// Apply an installed theme. Returns whether the desktop accepted it.
    pub async fn apply_theme(&self, path: &str, install_type: &str) -> bool {
        if !self.is_applicable_type(install_type) {
            return false;
        }
        let Some(command) = theme_command(&self.desktop, Path::new(path), install_type) else {
            return false;
        };
        let Some((program, args)) = command.split_first() else {
            return false;
        };

        match tokio::process::Command::new(program).args(args).status().await {
            Ok(status) if status.success() => {
                tracing::info!(desktop = %self.desktop, install_type, path, "Theme applied");
                true
            }
            Ok(status) => {
                tracing::warn!(program = %program, code = ?status.code(), "Theme command failed");
                false
            }
            Err(e) => {
                tracing::warn!(program = %program, error = %e, "Theme command could not run");
                false
            }
        }
    }
}

pub fn register(registry: &mut HandlerRegistry, handler: &Arc<DesktopThemeHandler>) {
    registry.bind(
        "DesktopThemeHandler::desktopEnvironment",
        0,
        handler,
        |h, _| async move { Ok(vec![json!(h.desktop_environment())]) },
    );
    registry.bind(
        "DesktopThemeHandler::isApplicableType",
        1,
        handler,
        |h, args| async move {
            let install_type = args.string(0)?;
            Ok(vec![json!(h.is_applicable_type(&install_type))])
        },
    );
    registry.bind(
        "DesktopThemeHandler::applyTheme",
        2,
        handler,
        |h, args| async move {
            let path = args.string(0)?;
            let install_type = args.string(1)?;
            Ok(vec![json!(h.apply_theme(&path, &install_type).await)])
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desktop_is_detected_from_colon_separated_list() {
        assert_eq!(detect_desktop(Some("ubuntu:GNOME"), None), "gnome");
        assert_eq!(detect_desktop(Some("KDE"), None), "kde");
        assert_eq!(detect_desktop(Some("X-Cinnamon"), None), "cinnamon");
        assert_eq!(detect_desktop(None, Some("xfce")), "xfce");
        assert_eq!(detect_desktop(Some("sway"), None), "");
        assert_eq!(detect_desktop(None, None), "");
    }

    #[test]
    fn applicable_types_depend_on_desktop() {
        let kde = DesktopThemeHandler::with_desktop("kde");
        assert!(kde.is_applicable_type("plasma_look_and_feel"));
        assert!(!kde.is_applicable_type("gnome_shell_themes"));

        let unknown = DesktopThemeHandler::with_desktop("");
        assert!(!unknown.is_applicable_type("wallpapers"));
    }

    #[test]
    fn gnome_wallpaper_uses_file_uri() {
        let command = theme_command("gnome", Path::new("/home/u/wallpapers/sunset.png"), "wallpapers")
            .expect("command");
        assert_eq!(
            command,
            vec![
                "gsettings",
                "set",
                "org.gnome.desktop.background",
                "picture-uri",
                "file:///home/u/wallpapers/sunset.png",
            ]
        );
    }

    #[test]
    fn theme_names_come_from_the_last_path_component() {
        let command = theme_command("xfce", Path::new("/data/icons/Papirus"), "icons").unwrap();
        assert_eq!(command.last().map(String::as_str), Some("Papirus"));

        let command = theme_command("kde", Path::new("/data/plasma/look-and-feel/Sweet"), "plasma_look_and_feel").unwrap();
        assert_eq!(command, vec!["lookandfeeltool", "-a", "Sweet"]);
    }

    #[tokio::test]
    async fn inapplicable_type_is_not_applied() {
        let handler = DesktopThemeHandler::with_desktop("xfce");
        assert!(!handler.apply_theme("/data/themes/Foo", "plasma_desktopthemes").await);
    }
}
