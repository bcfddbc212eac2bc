//! Process-wide UI state: palette, cursor and active decorator.
//!
//! Each piece sits behind its own `RwLock`. Writers take the lock only long
//! enough to swap a value in; readers get value copies (`Palette`, `CursorId`,
//! `String`) or a shared `Arc` to the immutable factory, so no reader can ever
//! observe half an update.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::decorator::loader::{ModuleLoader, PluginHandle};
use crate::decorator::{
    BUILTIN_DECORATOR_NAME, Decorator, DecoratorFactory, DefaultDecoratorFactory, Rect,
    RenderBackend, WindowClass,
};
use crate::error::SettingsError;
use crate::logging::targets;
use crate::palette::Palette;

/// System cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CursorId {
    #[default]
    Default,
    Text,
    Move,
    Resize,
    NotAllowed,
    Busy,
}

/// Persisted decorator choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratorSettings {
    /// File name of the add-on under the decorators directory, or
    /// [`BUILTIN_DECORATOR_NAME`].
    pub decorator: String,
}

impl DecoratorSettings {
    /// Read the settings from a JSON file.
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

    /// Write the settings to a JSON file, creating parent directories.
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

/// Shared UI state.
pub struct UiState {
    palette: RwLock<Palette>,
    cursor: RwLock<CursorId>,
    decorator: RwLock<Option<PluginHandle>>,
    loader: Box<dyn ModuleLoader>,
}

impl UiState {
    /// Create the state with the given palette, the default cursor and the
    /// built-in decorator.
    pub fn new(palette: Palette, loader: Box<dyn ModuleLoader>) -> Self {
        Self {
            palette: RwLock::new(palette),
            cursor: RwLock::new(CursorId::Default),
            decorator: RwLock::new(None),
            loader,
        }
    }

    /// A copy of the active palette.
    pub fn palette(&self) -> Palette {
        self.palette.read().clone()
    }

    /// Replace the active palette.
    pub fn set_palette(&self, palette: Palette) {
        *self.palette.write() = palette;
    }

    /// The active cursor.
    pub fn cursor(&self) -> CursorId {
        *self.cursor.read()
    }

    /// Change the active cursor.
    pub fn set_cursor(&self, cursor: CursorId) {
        *self.cursor.write() = cursor;
    }

    /// Restore the system cursor defaults.
    pub fn reset_cursor(&self) {
        self.set_cursor(CursorId::Default);
    }

    /// Load a decorator add-on, or revert to the built-in decorator.
    ///
    /// `None` or an empty path always succeeds and selects the built-in
    /// decorator. Otherwise the module is opened and its factory resolved
    /// before anything changes; on failure the active decorator stays as it
    /// was and `false` is returned.
    pub fn load_decorator(&self, path: Option<&Path>) -> bool {
        let Some(path) = path.filter(|path| !path.as_os_str().is_empty()) else {
            let previous = self.decorator.write().take();
            drop(previous);
            tracing::info!(target: targets::DECORATOR, "using built-in decorator");
            return true;
        };

        match PluginHandle::load(self.loader.as_ref(), path) {
            Ok(handle) => {
                tracing::info!(
                    target: targets::DECORATOR,
                    name = handle.name(),
                    path = %path.display(),
                    "decorator loaded"
                );
                let previous = self.decorator.write().replace(handle);
                drop(previous);
                true
            }
            Err(err) => {
                tracing::warn!(target: targets::DECORATOR, error = %err, "decorator not loaded");
                false
            }
        }
    }

    /// Display name of the active decorator.
    pub fn decorator_name(&self) -> String {
        self.decorator
            .read()
            .as_ref()
            .map(|handle| handle.name().to_string())
            .unwrap_or_else(|| BUILTIN_DECORATOR_NAME.to_string())
    }

    /// The active add-on factory, or `None` for the built-in decorator.
    pub fn active_factory(&self) -> Option<Arc<dyn DecoratorFactory>> {
        self.decorator.read().as_ref().map(PluginHandle::factory)
    }

    /// Create the chrome for a new window.
    ///
    /// Uses the active add-on factory, falling back to the built-in decorator,
    /// then binds the backend, the current palette and the title. The palette
    /// is held for reading while binding so the decorator starts from one
    /// consistent color table.
    pub fn new_decorator(
        &self,
        frame: Rect,
        title: &str,
        class: WindowClass,
        backend: Arc<dyn RenderBackend>,
    ) -> Box<dyn Decorator> {
        let mut decorator = match self.active_factory() {
            Some(factory) => factory.create(frame, class),
            None => DefaultDecoratorFactory.create(frame, class),
        };

        let palette = self.palette.read();
        decorator.set_backend(backend);
        decorator.set_colors(&palette);
        decorator.set_title(title);
        drop(palette);

        decorator
    }

    /// Current decorator choice, in persistable form.
    pub fn decorator_settings(&self) -> DecoratorSettings {
        DecoratorSettings {
            decorator: self.decorator_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::thread;

    use crate::palette::{ColorRole, Rgba};
    use crate::testing::{RecordingBackend, StaticModules};

    fn state_with(modules: StaticModules) -> UiState {
        UiState::new(Palette::default(), Box::new(modules))
    }

    #[test]
    fn test_builtin_by_default() {
        let state = state_with(StaticModules::new());
        assert_eq!(state.decorator_name(), BUILTIN_DECORATOR_NAME);
        assert!(state.active_factory().is_none());
        assert_eq!(state.cursor(), CursorId::Default);
    }

    #[test]
    fn test_load_valid_plugin() {
        let modules = StaticModules::new();
        modules.insert_factory("/decor/AmigaOS", Arc::new(DefaultDecoratorFactory));
        let state = state_with(modules);

        assert!(state.load_decorator(Some(Path::new("/decor/AmigaOS"))));
        assert_eq!(state.decorator_name(), "AmigaOS");
        assert!(state.active_factory().is_some());
    }

    #[test]
    fn test_failed_load_keeps_previous() {
        let modules = StaticModules::new();
        modules.insert_factory("/decor/BeOS", Arc::new(DefaultDecoratorFactory));
        modules.insert_without_factory("/decor/Broken");
        let state = state_with(modules);

        assert!(state.load_decorator(Some(Path::new("/decor/BeOS"))));
        assert!(!state.load_decorator(Some(Path::new("/decor/Broken"))));
        assert_eq!(state.decorator_name(), "BeOS");
        assert!(!state.load_decorator(Some(Path::new("/decor/Missing"))));
        assert_eq!(state.decorator_name(), "BeOS");
    }

    #[test]
    fn test_empty_path_reverts() {
        let modules = StaticModules::new();
        modules.insert_factory("/decor/Windows", Arc::new(DefaultDecoratorFactory));
        let state = state_with(modules);

        assert!(state.load_decorator(Some(Path::new("/decor/Windows"))));
        assert!(state.load_decorator(Some(&PathBuf::new())));
        assert_eq!(state.decorator_name(), BUILTIN_DECORATOR_NAME);

        assert!(state.load_decorator(None));
        assert_eq!(state.decorator_name(), BUILTIN_DECORATOR_NAME);
    }

    #[test]
    fn test_revert_keeps_module_until_decorators_drop() {
        let modules = Arc::new(StaticModules::new());
        modules.insert_factory("/decor/Zeta", Arc::new(DefaultDecoratorFactory));
        let state = UiState::new(Palette::default(), Box::new(modules.clone()));

        assert!(state.load_decorator(Some(Path::new("/decor/Zeta"))));
        let backend = Arc::new(RecordingBackend::default());
        let mut decorator = state.new_decorator(
            Rect::new(0.0, 0.0, 80.0, 60.0),
            "Terminal",
            WindowClass::default(),
            backend.clone(),
        );

        assert!(state.load_decorator(None));
        assert_eq!(modules.open_modules(), 1);

        decorator.draw(Rect::new(0.0, 0.0, 100.0, 100.0));
        assert!(!backend.calls().is_empty());
        drop(decorator);
        assert_eq!(modules.open_modules(), 0);
    }

    #[test]
    fn test_palette_returns_copy() {
        let state = state_with(StaticModules::new());
        let before = state.palette();

        let updated = Palette::new().with(ColorRole::Desktop, Rgba::rgb(0, 0, 0));
        state.set_palette(updated.clone());

        assert_eq!(state.palette(), updated);
        assert_eq!(before.get(ColorRole::Desktop), ColorRole::Desktop.default_color());
    }

    #[test]
    fn test_concurrent_palette_reads_never_tear() {
        let state = Arc::new(state_with(StaticModules::new()));
        let uniform = |v: u8| {
            ColorRole::ALL
                .iter()
                .fold(Palette::new(), |p, &role| p.with(role, Rgba::rgb(v, v, v)))
        };

        let writer = {
            let state = state.clone();
            thread::spawn(move || {
                for v in 0..200u8 {
                    state.set_palette(uniform(v));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let state = state.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let palette = state.palette();
                        let first = palette.get(ColorRole::ALL[0]);
                        if first == ColorRole::ALL[0].default_color() {
                            continue;
                        }
                        assert!(palette.iter().all(|(_, color)| color == first));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(state.palette(), uniform(199));
    }

    #[test]
    fn test_new_decorator_binds_palette_and_title() {
        let state = state_with(StaticModules::new());
        state.set_palette(Palette::new().with(ColorRole::WindowTabText, Rgba::rgb(7, 7, 7)));
        let backend = Arc::new(RecordingBackend::default());

        let mut decorator = state.new_decorator(
            Rect::new(10.0, 40.0, 110.0, 140.0),
            "Tracker",
            WindowClass::default(),
            backend.clone(),
        );
        assert_eq!(decorator.title(), "Tracker");

        decorator.draw(Rect::new(0.0, 0.0, 200.0, 200.0));
        assert!(backend.text_colors().contains(&Rgba::rgb(7, 7, 7)));
    }

    #[test]
    fn test_cursor_reset() {
        let state = state_with(StaticModules::new());
        state.set_cursor(CursorId::Busy);
        assert_eq!(state.cursor(), CursorId::Busy);
        state.reset_cursor();
        assert_eq!(state.cursor(), CursorId::Default);
    }

    #[test]
    fn test_decorator_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DecoratorSettings.json");

        let settings = DecoratorSettings {
            decorator: "MacOS".to_string(),
        };
        settings.save(&path).unwrap();
        assert_eq!(DecoratorSettings::load(&path).unwrap(), settings);
    }
}
