//! Desktop appearance overrides held for the lifetime of a real session.
//!
//! Wallpaper, font smoothing, and visual effects are disabled while a remote
//! viewer is attached to cut capture bandwidth, then restored. The platform
//! mechanism lives behind [`AppearanceToggler`]; it must act as the
//! logged-on interactive user, not the service account.

use std::sync::Arc;

use tracing::{debug, info};

use crate::models::desktop::DesktopConfig;

/// Platform capability that applies and reverts appearance overrides.
pub trait AppearanceToggler: Send + Sync {
    /// Disable every feature whose flag is `false`.
    fn apply_settings(&self, wallpaper: bool, font_smoothing: bool, effects: bool);

    /// Restore the user's own settings.
    fn revert(&self);
}

/// Toggler for platforms without an implementation; records intent in logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingToggler;

impl AppearanceToggler for LoggingToggler {
    fn apply_settings(&self, wallpaper: bool, font_smoothing: bool, effects: bool) {
        info!(wallpaper, font_smoothing, effects, "desktop appearance applied");
    }

    fn revert(&self) {
        info!("desktop appearance reverted");
    }
}

/// Active set of overrides. Applies on construction, reverts on drop.
pub struct DesktopEnvironment {
    toggler: Arc<dyn AppearanceToggler>,
    config: DesktopConfig,
}

impl std::fmt::Debug for DesktopEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesktopEnvironment")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DesktopEnvironment {
    /// Apply `config` through `toggler`.
    #[must_use]
    pub fn new(toggler: Arc<dyn AppearanceToggler>, config: DesktopConfig) -> Self {
        let env = Self { toggler, config };
        env.apply();
        env
    }

    /// Current flags.
    #[must_use]
    pub fn config(&self) -> DesktopConfig {
        self.config
    }

    /// Keep or drop the wallpaper.
    pub fn set_wallpaper(&mut self, enable: bool) {
        self.update(DesktopConfig {
            wallpaper: enable,
            ..self.config
        });
    }

    /// Keep or drop font smoothing.
    pub fn set_font_smoothing(&mut self, enable: bool) {
        self.update(DesktopConfig {
            font_smoothing: enable,
            ..self.config
        });
    }

    /// Keep or drop visual effects.
    pub fn set_effects(&mut self, enable: bool) {
        self.update(DesktopConfig {
            effects: enable,
            ..self.config
        });
    }

    /// Replace all flags. A no-op when nothing changed; otherwise the user's
    /// settings are restored before the new overrides are applied.
    pub fn update(&mut self, config: DesktopConfig) {
        if self.config == config {
            debug!("desktop appearance unchanged");
            return;
        }
        self.config = config;
        self.toggler.revert();
        self.apply();
    }

    fn apply(&self) {
        self.toggler.apply_settings(
            self.config.wallpaper,
            self.config.font_smoothing,
            self.config.effects,
        );
    }
}

impl Drop for DesktopEnvironment {
    fn drop(&mut self) {
        self.toggler.revert();
    }
}
