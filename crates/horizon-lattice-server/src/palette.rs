//! The system color palette.
//!
//! A [`Palette`] is a fixed table with one [`Rgba`] entry per [`ColorRole`].
//! It is small and `Clone`, so readers always get a value copy rather than a
//! reference into shared state.
//!
//! On disk the palette is a JSON object keyed by role name; roles missing from
//! the file keep their default color.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// An 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "opaque")]
    pub a: u8,
}

fn opaque() -> u8 {
    255
}

impl Rgba {
    /// An opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

/// The named color roles of the palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorRole {
    PanelBackground,
    PanelText,
    DocumentBackground,
    DocumentText,
    ControlBackground,
    ControlText,
    ControlBorder,
    ControlHighlight,
    TooltipBackground,
    TooltipText,
    MenuBackground,
    MenuSelectedBackground,
    MenuText,
    MenuSelectedText,
    MenuSelectedBorder,
    KeyboardNavigation,
    WindowTab,
    WindowTabText,
    InactiveWindowTab,
    InactiveWindowTabText,
    Desktop,
}

impl ColorRole {
    /// Number of roles in the palette.
    pub const COUNT: usize = 21;

    /// All roles, in table order.
    pub const ALL: [ColorRole; Self::COUNT] = [
        Self::PanelBackground,
        Self::PanelText,
        Self::DocumentBackground,
        Self::DocumentText,
        Self::ControlBackground,
        Self::ControlText,
        Self::ControlBorder,
        Self::ControlHighlight,
        Self::TooltipBackground,
        Self::TooltipText,
        Self::MenuBackground,
        Self::MenuSelectedBackground,
        Self::MenuText,
        Self::MenuSelectedText,
        Self::MenuSelectedBorder,
        Self::KeyboardNavigation,
        Self::WindowTab,
        Self::WindowTabText,
        Self::InactiveWindowTab,
        Self::InactiveWindowTabText,
        Self::Desktop,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Factory color for this role.
    pub fn default_color(self) -> Rgba {
        match self {
            Self::PanelBackground => Rgba::rgb(216, 216, 216),
            Self::PanelText => Rgba::rgb(0, 0, 0),
            Self::DocumentBackground => Rgba::rgb(255, 255, 255),
            Self::DocumentText => Rgba::rgb(0, 0, 0),
            Self::ControlBackground => Rgba::rgb(245, 245, 245),
            Self::ControlText => Rgba::rgb(0, 0, 0),
            Self::ControlBorder => Rgba::rgb(0, 0, 0),
            Self::ControlHighlight => Rgba::rgb(115, 120, 184),
            Self::TooltipBackground => Rgba::rgb(255, 255, 0),
            Self::TooltipText => Rgba::rgb(0, 0, 0),
            Self::MenuBackground => Rgba::rgb(216, 216, 216),
            Self::MenuSelectedBackground => Rgba::rgb(115, 120, 184),
            Self::MenuText => Rgba::rgb(0, 0, 0),
            Self::MenuSelectedText => Rgba::rgb(255, 255, 255),
            Self::MenuSelectedBorder => Rgba::rgb(0, 0, 0),
            Self::KeyboardNavigation => Rgba::rgb(0, 0, 229),
            Self::WindowTab => Rgba::rgb(255, 203, 0),
            Self::WindowTabText => Rgba::rgb(0, 0, 0),
            Self::InactiveWindowTab => Rgba::rgb(232, 232, 232),
            Self::InactiveWindowTabText => Rgba::rgb(80, 80, 80),
            Self::Desktop => Rgba::rgb(51, 102, 160),
        }
    }
}

/// A complete color table, one entry per [`ColorRole`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<ColorRole, Rgba>", into = "BTreeMap<ColorRole, Rgba>")]
pub struct Palette {
    colors: [Rgba; ColorRole::COUNT],
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: ColorRole::ALL.map(ColorRole::default_color),
        }
    }
}

impl Palette {
    /// The factory palette.
    pub fn new() -> Self {
        Self::default()
    }

    /// Color assigned to `role`.
    pub fn get(&self, role: ColorRole) -> Rgba {
        self.colors[role.index()]
    }

    /// Assign a color to `role`.
    pub fn set(&mut self, role: ColorRole, color: Rgba) {
        self.colors[role.index()] = color;
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, role: ColorRole, color: Rgba) -> Self {
        self.set(role, color);
        self
    }

    /// Iterate over every role and its color.
    pub fn iter(&self) -> impl Iterator<Item = (ColorRole, Rgba)> + '_ {
        ColorRole::ALL.iter().map(|&role| (role, self.get(role)))
    }

    /// Read a palette from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| SettingsError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write this palette to a JSON file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text).map_err(io_err)
    }
}

impl From<BTreeMap<ColorRole, Rgba>> for Palette {
    fn from(map: BTreeMap<ColorRole, Rgba>) -> Self {
        let mut palette = Palette::default();
        for (role, color) in map {
            palette.set(role, color);
        }
        palette
    }
}

impl From<Palette> for BTreeMap<ColorRole, Rgba> {
    fn from(palette: Palette) -> Self {
        palette.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_table_is_complete() {
        for (index, role) in ColorRole::ALL.iter().enumerate() {
            assert_eq!(role.index(), index);
        }
    }

    #[test]
    fn test_set_and_get() {
        let mut palette = Palette::new();
        assert_eq!(palette.get(ColorRole::Desktop), Rgba::rgb(51, 102, 160));

        palette.set(ColorRole::Desktop, Rgba::rgb(1, 2, 3));
        assert_eq!(palette.get(ColorRole::Desktop), Rgba::rgb(1, 2, 3));
        assert_eq!(
            palette.get(ColorRole::PanelBackground),
            ColorRole::PanelBackground.default_color()
        );
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let palette: Palette =
            serde_json::from_str(r#"{ "window_tab": { "r": 10, "g": 20, "b": 30 } }"#).unwrap();

        assert_eq!(palette.get(ColorRole::WindowTab), Rgba::rgb(10, 20, 30));
        assert_eq!(
            palette.get(ColorRole::MenuText),
            ColorRole::MenuText.default_color()
        );
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ColorSet.json");
        let palette = Palette::new().with(ColorRole::TooltipBackground, Rgba::rgb(9, 9, 9));

        palette.save(&path).unwrap();
        assert_eq!(Palette::load(&path).unwrap(), palette);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Palette::load(dir.path().join("missing.json")),
            Err(SettingsError::Io { .. })
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "[1, 2, 3]").unwrap();
        assert!(matches!(
            Palette::load(&bad),
            Err(SettingsError::Json { .. })
        ));
    }
}
