//! Decorator add-on loading.
//!
//! A decorator add-on is a dynamic library that exports one function,
//! [`FACTORY_SYMBOL`], returning a boxed [`DecoratorFactory`]. Plugin crates
//! export it with [`declare_decorator!`](crate::declare_decorator):
//!
//! ```ignore
//! use horizon_lattice_server::decorator::{DecoratorFactory, DefaultDecoratorFactory};
//!
//! horizon_lattice_server::declare_decorator!(DefaultDecoratorFactory);
//! ```
//!
//! The add-on must be built with the same compiler and the same version of
//! this crate as the server, since the factory crosses the boundary as a Rust
//! trait object.
//!
//! Opening a module and resolving its factory is abstracted behind
//! [`ModuleLoader`] so the server can be exercised without real libraries.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;

use super::{Decorator, DecoratorFactory, Rect, RenderBackend, WindowClass};
use crate::error::PluginError;
use crate::palette::Palette;

/// Name of the factory function every decorator add-on must export.
pub const FACTORY_SYMBOL: &str = "instantiate_decorator";

/// Signature of the exported factory function.
pub type InstantiateFn = fn() -> Box<dyn DecoratorFactory>;

/// Export the factory function of a decorator add-on.
///
/// The argument is an expression producing a value that implements
/// [`DecoratorFactory`].
#[macro_export]
macro_rules! declare_decorator {
    ($factory:expr) => {
        #[unsafe(no_mangle)]
        pub fn instantiate_decorator() -> ::std::boxed::Box<dyn $crate::decorator::DecoratorFactory> {
            ::std::boxed::Box::new($factory)
        }
    };
}

/// An opened module.
///
/// The module stays loaded until the last factory or decorator created from
/// it is dropped.
pub trait PluginModule: Send + Sync {
    /// Resolve the factory exported under `symbol`, if any.
    fn resolve_factory(&self, symbol: &str) -> Option<Box<dyn DecoratorFactory>>;
}

/// Opens modules by path.
pub trait ModuleLoader: Send + Sync {
    /// Open the module at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn PluginModule>, PluginError>;
}

impl<L: ModuleLoader + ?Sized> ModuleLoader for Arc<L> {
    fn open(&self, path: &Path) -> Result<Box<dyn PluginModule>, PluginError> {
        (**self).open(path)
    }
}

/// The currently loaded decorator add-on.
pub struct PluginHandle {
    name: String,
    path: PathBuf,
    factory: Arc<dyn DecoratorFactory>,
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl PluginHandle {
    /// Open `path` with `loader` and resolve its factory.
    ///
    /// The display name is the module's base file name.
    pub fn load(loader: &dyn ModuleLoader, path: &Path) -> Result<Self, PluginError> {
        let module: Arc<dyn PluginModule> = Arc::from(loader.open(path)?);
        let factory =
            module
                .resolve_factory(FACTORY_SYMBOL)
                .ok_or_else(|| PluginError::MissingSymbol {
                    path: path.to_path_buf(),
                    symbol: FACTORY_SYMBOL,
                })?;
        let factory: Arc<dyn DecoratorFactory> = Arc::new(ModuleFactory { factory, module });

        let name = path
            .file_name()
            .map(|leaf| leaf.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            path: path.to_path_buf(),
            factory,
        })
    }

    /// Display name of the add-on.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path the add-on was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The add-on's factory.
    pub fn factory(&self) -> Arc<dyn DecoratorFactory> {
        self.factory.clone()
    }
}

/// [`ModuleLoader`] for shared libraries on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibraryLoader;

impl ModuleLoader for LibraryLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn PluginModule>, PluginError> {
        // SAFETY: loading runs the library's initializers. Decorator add-ons
        // are trusted system components installed next to the server.
        let library = unsafe { Library::new(path) }.map_err(|err| PluginError::Open {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Ok(Box::new(DynamicModule { library }))
    }
}

struct DynamicModule {
    library: Library,
}

impl PluginModule for DynamicModule {
    fn resolve_factory(&self, symbol: &str) -> Option<Box<dyn DecoratorFactory>> {
        // SAFETY: the symbol is declared by `declare_decorator!` with the
        // `InstantiateFn` signature.
        let instantiate = unsafe { self.library.get::<InstantiateFn>(symbol.as_bytes()) }.ok()?;
        Some(instantiate())
    }
}

/// A factory whose code lives in `module`.
struct ModuleFactory {
    // Fields drop in declaration order: the module goes last.
    factory: Box<dyn DecoratorFactory>,
    module: Arc<dyn PluginModule>,
}

impl DecoratorFactory for ModuleFactory {
    fn create(&self, frame: Rect, class: WindowClass) -> Box<dyn Decorator> {
        Box::new(ModuleDecorator {
            decorator: self.factory.create(frame, class),
            _module: self.module.clone(),
        })
    }
}

/// A decorator created by a module, holding that module loaded.
struct ModuleDecorator {
    decorator: Box<dyn Decorator>,
    _module: Arc<dyn PluginModule>,
}

impl Decorator for ModuleDecorator {
    fn set_backend(&mut self, backend: Arc<dyn RenderBackend>) {
        self.decorator.set_backend(backend);
    }

    fn set_colors(&mut self, palette: &Palette) {
        self.decorator.set_colors(palette);
    }

    fn set_title(&mut self, title: &str) {
        self.decorator.set_title(title);
    }

    fn title(&self) -> &str {
        self.decorator.title()
    }

    fn frame(&self) -> Rect {
        self.decorator.frame()
    }

    fn set_frame(&mut self, frame: Rect) {
        self.decorator.set_frame(frame);
    }

    fn bounds(&self) -> Rect {
        self.decorator.bounds()
    }

    fn draw(&mut self, update: Rect) {
        self.decorator.draw(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::DefaultDecoratorFactory;
    use crate::testing::StaticModules;

    mod exported {
        crate::declare_decorator!(crate::decorator::DefaultDecoratorFactory);
    }

    #[test]
    fn test_declared_factory_builds_decorators() {
        let instantiate: InstantiateFn = exported::instantiate_decorator;
        let factory = instantiate();
        let decorator = factory.create(Rect::new(0.0, 0.0, 10.0, 10.0), WindowClass::default());
        assert_eq!(decorator.frame(), Rect::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_load_uses_base_name() {
        let modules = StaticModules::new();
        modules.insert_factory("/decorators/BeOS", Arc::new(DefaultDecoratorFactory));

        let handle = PluginHandle::load(&modules, Path::new("/decorators/BeOS")).unwrap();
        assert_eq!(handle.name(), "BeOS");
        assert_eq!(handle.path(), Path::new("/decorators/BeOS"));
    }

    #[test]
    fn test_missing_symbol() {
        let modules = StaticModules::new();
        modules.insert_without_factory("/decorators/Broken");

        let err = PluginHandle::load(&modules, Path::new("/decorators/Broken")).unwrap_err();
        assert!(matches!(
            err,
            PluginError::MissingSymbol {
                symbol: FACTORY_SYMBOL,
                ..
            }
        ));
    }

    #[test]
    fn test_decorators_keep_their_module_open() {
        let modules = StaticModules::new();
        modules.insert_factory("/decorators/Haiku", Arc::new(DefaultDecoratorFactory));

        let handle = PluginHandle::load(&modules, Path::new("/decorators/Haiku")).unwrap();
        let frame = Rect::new(0.0, 0.0, 50.0, 50.0);
        let mut decorator = handle.factory().create(frame, WindowClass::default());
        drop(handle);
        assert_eq!(modules.open_modules(), 1);

        decorator.set_title("still here");
        assert_eq!(decorator.title(), "still here");
        assert_eq!(decorator.frame(), frame);
        drop(decorator);
        assert_eq!(modules.open_modules(), 0);
    }

    #[test]
    fn test_failed_resolve_closes_module() {
        let modules = StaticModules::new();
        modules.insert_without_factory("/decorators/Broken");

        assert!(PluginHandle::load(&modules, Path::new("/decorators/Broken")).is_err());
        assert_eq!(modules.open_modules(), 0);
    }

    #[test]
    fn test_library_loader_missing_file() {
        let err = PluginHandle::load(&LibraryLoader, Path::new("/nonexistent/decorator.so"))
            .unwrap_err();
        assert!(matches!(err, PluginError::Open { .. }));
    }
}
