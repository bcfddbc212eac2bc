//! Display driver collaborator.
//!
//! The server never touches the framebuffer itself. It only needs to answer
//! screen-mode queries, which it delegates to a [`DisplayDriver`].

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Description of a display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMode {
    /// Horizontal resolution in pixels.
    pub width: u32,
    /// Vertical resolution in pixels.
    pub height: u32,
    /// Bits per pixel.
    pub depth: u32,
    /// Refresh rate in hertz.
    pub refresh_hz: u32,
}

impl DisplayMode {
    /// Create a mode descriptor.
    pub const fn new(width: u32, height: u32, depth: u32, refresh_hz: u32) -> Self {
        Self {
            width,
            height,
            depth,
            refresh_hz,
        }
    }
}

impl Default for DisplayMode {
    fn default() -> Self {
        Self::new(640, 480, 32, 60)
    }
}

/// Interface to the display hardware (or its stand-in).
pub trait DisplayDriver: Send + Sync {
    /// The mode currently in effect. Must always return a mode, falling back
    /// to the driver's default when none has been configured.
    fn current_mode(&self) -> DisplayMode;

    /// Switch to `mode`. Returns `false` if the driver cannot display it.
    fn set_mode(&self, mode: DisplayMode) -> bool;
}

/// A display driver with no output device.
#[derive(Debug, Default)]
pub struct HeadlessDriver {
    configured: RwLock<Option<DisplayMode>>,
    default_mode: DisplayMode,
}

impl HeadlessDriver {
    /// Create a driver that reports [`DisplayMode::default`] until configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a driver with a different default mode.
    pub fn with_default_mode(mode: DisplayMode) -> Self {
        Self {
            configured: RwLock::new(None),
            default_mode: mode,
        }
    }
}

impl DisplayDriver for HeadlessDriver {
    fn current_mode(&self) -> DisplayMode {
        self.configured.read().unwrap_or(self.default_mode)
    }

    fn set_mode(&self, mode: DisplayMode) -> bool {
        if mode.width == 0 || mode.height == 0 || mode.depth == 0 {
            return false;
        }
        *self.configured.write() = Some(mode);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_reports_default() {
        let driver = HeadlessDriver::new();
        assert_eq!(driver.current_mode(), DisplayMode::new(640, 480, 32, 60));
    }

    #[test]
    fn test_set_mode() {
        let driver = HeadlessDriver::with_default_mode(DisplayMode::new(800, 600, 16, 60));
        assert_eq!(driver.current_mode().width, 800);

        assert!(driver.set_mode(DisplayMode::new(1024, 768, 32, 75)));
        assert_eq!(driver.current_mode(), DisplayMode::new(1024, 768, 32, 75));

        assert!(!driver.set_mode(DisplayMode::new(0, 768, 32, 75)));
        assert_eq!(driver.current_mode().width, 1024);
    }
}
