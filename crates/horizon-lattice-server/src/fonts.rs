//! The font catalog collaborator.
//!
//! The server never rasterizes fonts. It only needs to know which families
//! exist, which ones are the system defaults, and whether clients have picked
//! up the latest list.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use fontdb::{Style, Weight};

use crate::config::FontSpec;
use crate::logging::targets;

/// System font roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FontRole {
    Plain,
    Bold,
    Fixed,
}

/// Font catalog interface used by the server.
///
/// The server keeps the catalog behind a mutex; every method is called with
/// that lock held.
pub trait FontCatalog: Send {
    /// Add every font face found under `dir`, including subdirectories.
    /// Returns how many were added.
    fn scan_directory(&mut self, dir: &Path) -> usize;

    /// Make `spec` the system font for `role`. Fails if no known face has
    /// that family and style.
    fn set_system_font(&mut self, role: FontRole, spec: &FontSpec) -> bool;

    /// The system font for `role`, if one is set.
    fn system_font(&self, role: FontRole) -> Option<FontSpec>;

    /// Clients have refreshed their font lists.
    fn fonts_updated(&mut self);

    /// Whether the catalog changed since clients last refreshed.
    fn needs_update(&self) -> bool;
}

/// A catalog of the font faces found on disk.
///
/// Faces are read with [`fontdb`], so families and styles come from each
/// face's own tables. A face's style name is its weight name followed by
/// `"Italic"` or `"Oblique"` when slanted, e.g. `"Bold Italic"`; an upright
/// normal-weight face is `"Regular"`.
pub struct DirectoryFontCatalog {
    db: fontdb::Database,
    system: BTreeMap<FontRole, FontSpec>,
    needs_update: bool,
}

impl fmt::Debug for DirectoryFontCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryFontCatalog")
            .field("faces", &self.db.len())
            .field("system", &self.system)
            .field("needs_update", &self.needs_update)
            .finish()
    }
}

impl Default for DirectoryFontCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryFontCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self {
            db: fontdb::Database::new(),
            system: BTreeMap::new(),
            needs_update: false,
        }
    }

    /// Add the faces in a font file held in memory. Returns how many were
    /// added.
    pub fn load_font_data(&mut self, data: Vec<u8>) -> usize {
        let before = self.db.len();
        self.db.load_font_data(data);
        self.note_added(before)
    }

    /// Number of faces in the catalog.
    pub fn face_count(&self) -> usize {
        self.db.len()
    }

    /// Known family names, sorted.
    pub fn families(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .db
            .faces()
            .flat_map(|face| face.families.iter().map(|(name, _)| name.clone()))
            .collect();
        names.into_iter().collect()
    }

    /// Known styles of `family`, sorted.
    pub fn styles(&self, family: &str) -> Vec<String> {
        let styles: BTreeSet<String> = self
            .faces_of(family)
            .map(|face| style_name(face.weight, face.style))
            .collect();
        styles.into_iter().collect()
    }

    fn faces_of<'a>(&'a self, family: &'a str) -> impl Iterator<Item = &'a fontdb::FaceInfo> + 'a {
        self.db
            .faces()
            .filter(move |face| face.families.iter().any(|(name, _)| name == family))
    }

    fn note_added(&mut self, before: usize) -> usize {
        let added = self.db.len().saturating_sub(before);
        if added > 0 {
            self.needs_update = true;
        }
        added
    }
}

impl FontCatalog for DirectoryFontCatalog {
    fn scan_directory(&mut self, dir: &Path) -> usize {
        if !dir.is_dir() {
            tracing::warn!(
                target: targets::COLLABORATORS,
                dir = %dir.display(),
                "cannot scan font directory"
            );
            return 0;
        }

        let before = self.db.len();
        self.db.load_fonts_dir(dir);
        let added = self.note_added(before);

        tracing::debug!(
            target: targets::COLLABORATORS,
            dir = %dir.display(),
            added,
            "font directory scanned"
        );
        added
    }

    fn set_system_font(&mut self, role: FontRole, spec: &FontSpec) -> bool {
        let wanted = parse_style(&spec.style);
        let known = self.faces_of(&spec.family).any(|face| match wanted {
            Some((weight, style)) => {
                style_name(face.weight, face.style) == style_name(weight, style)
            }
            None => style_name(face.weight, face.style).eq_ignore_ascii_case(&spec.style),
        });
        if known {
            self.system.insert(role, spec.clone());
        }
        known
    }

    fn system_font(&self, role: FontRole) -> Option<FontSpec> {
        self.system.get(&role).cloned()
    }

    fn fonts_updated(&mut self) {
        self.needs_update = false;
    }

    fn needs_update(&self) -> bool {
        self.needs_update
    }
}

fn weight_name(weight: Weight) -> &'static str {
    match weight.0 {
        0..=149 => "Thin",
        150..=249 => "ExtraLight",
        250..=349 => "Light",
        350..=449 => "Regular",
        450..=549 => "Medium",
        550..=649 => "SemiBold",
        650..=749 => "Bold",
        750..=849 => "ExtraBold",
        _ => "Black",
    }
}

/// Style name of a face with `weight` and `style`.
fn style_name(weight: Weight, style: Style) -> String {
    let slant = match style {
        Style::Normal => None,
        Style::Italic => Some("Italic"),
        Style::Oblique => Some("Oblique"),
    };
    match (weight_name(weight), slant) {
        (weight, None) => weight.to_string(),
        ("Regular", Some(slant)) => slant.to_string(),
        (weight, Some(slant)) => format!("{weight} {slant}"),
    }
}

/// Parse a requested style such as `"Book"`, `"Bold Italic"` or
/// `"Semi-Bold"` into a weight and slant. `None` if any part is unknown.
fn parse_style(name: &str) -> Option<(Weight, Style)> {
    let key: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    let (rest, style) = if let Some(rest) = key.strip_suffix("italic") {
        (rest, Style::Italic)
    } else if let Some(rest) = key.strip_suffix("oblique") {
        (rest, Style::Oblique)
    } else {
        (key.as_str(), Style::Normal)
    };

    let weight = match rest {
        "thin" | "hairline" => 100,
        "extralight" | "ultralight" => 200,
        "light" => 300,
        "" | "regular" | "normal" | "book" | "roman" | "plain" => 400,
        "medium" => 500,
        "semibold" | "demibold" | "demi" => 600,
        "bold" => 700,
        "extrabold" | "ultrabold" => 800,
        "black" | "heavy" => 900,
        _ => return None,
    };
    Some((Weight(weight), style))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::minimal_font;

    fn write_font(path: &Path, family: &str, weight: u16, italic: bool) {
        std::fs::write(path, minimal_font(family, weight, italic)).unwrap();
    }

    #[test]
    fn test_scan_directory_reads_face_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("truetype").join("swiss");
        std::fs::create_dir_all(&nested).unwrap();
        // File names say nothing about the faces inside.
        write_font(&dir.path().join("a.ttf"), "Swis721 BT", 400, false);
        write_font(&nested.join("b.TTF"), "Swis721 BT", 700, false);
        write_font(&nested.join("c.otf"), "Courier10 BT", 400, true);
        std::fs::write(dir.path().join("readme.txt"), "not a font").unwrap();
        std::fs::write(dir.path().join("broken.ttf"), b"").unwrap();

        let mut catalog = DirectoryFontCatalog::new();
        assert_eq!(catalog.scan_directory(dir.path()), 3);
        assert_eq!(catalog.families(), ["Courier10 BT", "Swis721 BT"]);
        assert_eq!(catalog.styles("Swis721 BT"), ["Bold", "Regular"]);
        assert_eq!(catalog.styles("Courier10 BT"), ["Italic"]);
        assert!(catalog.needs_update());
    }

    #[test]
    fn test_scan_missing_directory() {
        let mut catalog = DirectoryFontCatalog::new();
        assert_eq!(catalog.scan_directory(Path::new("/nonexistent/fonts")), 0);
        assert!(!catalog.needs_update());
    }

    #[test]
    fn test_system_font_requires_known_face() {
        let mut catalog = DirectoryFontCatalog::new();
        let plain = FontSpec::new("DejaVu Sans", "Book", 12.0);
        assert!(!catalog.set_system_font(FontRole::Plain, &plain));
        assert!(catalog.system_font(FontRole::Plain).is_none());

        assert_eq!(catalog.load_font_data(minimal_font("DejaVu Sans", 400, false)), 1);
        assert!(catalog.set_system_font(FontRole::Plain, &plain));
        assert_eq!(catalog.system_font(FontRole::Plain), Some(plain));
        assert!(catalog.system_font(FontRole::Bold).is_none());

        let bold = FontSpec::new("DejaVu Sans", "Bold", 12.0);
        assert!(!catalog.set_system_font(FontRole::Bold, &bold));
        catalog.load_font_data(minimal_font("DejaVu Sans", 700, false));
        assert!(catalog.set_system_font(FontRole::Bold, &bold));
        assert!(!catalog.set_system_font(FontRole::Fixed, &FontSpec::new("DejaVu Sans", "Condensed", 12.0)));
    }

    #[test]
    fn test_style_names() {
        assert_eq!(style_name(Weight(400), Style::Normal), "Regular");
        assert_eq!(style_name(Weight(400), Style::Italic), "Italic");
        assert_eq!(style_name(Weight(700), Style::Oblique), "Bold Oblique");
        assert_eq!(style_name(Weight(590), Style::Normal), "SemiBold");

        assert_eq!(parse_style("Book"), Some((Weight(400), Style::Normal)));
        assert_eq!(parse_style("Roman"), Some((Weight(400), Style::Normal)));
        assert_eq!(parse_style("Bold Italic"), Some((Weight(700), Style::Italic)));
        assert_eq!(parse_style("Semi-Bold"), Some((Weight(600), Style::Normal)));
        assert_eq!(parse_style("Oblique"), Some((Weight(400), Style::Oblique)));
        assert_eq!(parse_style("Condensed"), None);
    }

    #[test]
    fn test_update_flag() {
        let mut catalog = DirectoryFontCatalog::new();
        catalog.load_font_data(minimal_font("A", 400, false));
        assert!(catalog.needs_update());

        catalog.fonts_updated();
        assert!(!catalog.needs_update());

        assert_eq!(catalog.load_font_data(b"garbage".to_vec()), 0);
        assert!(!catalog.needs_update());
        catalog.load_font_data(minimal_font("A", 400, true));
        assert!(catalog.needs_update());
        assert_eq!(catalog.face_count(), 2);
    }
}
