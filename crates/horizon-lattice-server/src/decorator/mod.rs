//! Window decorators.
//!
//! A decorator draws a window's non-content chrome: the tab, title and border.
//! Decorators are produced by a [`DecoratorFactory`]; the server ships the
//! built-in [`DefaultDecoratorFactory`] and can swap in a factory exported by a
//! decorator add-on (see [`loader`]).
//!
//! The factory only builds the object. The server then binds it to a
//! [`RenderBackend`] and the current [`Palette`](crate::Palette), after which
//! the decorator lives on its own and never talks to the loader again.

pub mod loader;

use std::sync::Arc;

use crate::palette::{ColorRole, Palette, Rgba};

/// Name reported for the built-in decorator.
pub const BUILTIN_DECORATOR_NAME: &str = "Default";

/// An axis-aligned rectangle in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    /// Create a rectangle from its edges.
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Width of the rectangle.
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    /// Height of the rectangle.
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Grow (or shrink, with negative values) every edge.
    pub fn inset(&self, dx: f32, dy: f32) -> Self {
        Self::new(
            self.left + dx,
            self.top + dy,
            self.right - dx,
            self.bottom - dy,
        )
    }
}

/// How a window looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowLook {
    #[default]
    Titled,
    Document,
    Modal,
    Floating,
    Bordered,
    NoBorder,
}

impl WindowLook {
    /// Whether this look has a title tab.
    pub fn has_tab(self) -> bool {
        matches!(self, Self::Titled | Self::Document | Self::Floating)
    }

    /// Whether this look has a border.
    pub fn has_border(self) -> bool {
        !matches!(self, Self::NoBorder)
    }
}

/// How a window behaves relative to others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowFeel {
    #[default]
    Normal,
    ModalApp,
    ModalAll,
    FloatingApp,
    FloatingAll,
    Desktop,
}

/// Window behavior flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowFlags(u32);

impl WindowFlags {
    pub const NOT_MOVABLE: Self = Self(0x0001);
    pub const NOT_CLOSABLE: Self = Self(0x0020);
    pub const NOT_ZOOMABLE: Self = Self(0x0040);
    pub const NOT_MINIMIZABLE: Self = Self(0x4000);
    pub const NOT_RESIZABLE: Self = Self(0x0002);

    /// No flags.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for WindowFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Look, feel and flags of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowClass {
    pub look: WindowLook,
    pub feel: WindowFeel,
    pub flags: WindowFlags,
}

impl WindowClass {
    /// Create a window classification.
    pub fn new(look: WindowLook, feel: WindowFeel, flags: WindowFlags) -> Self {
        Self { look, feel, flags }
    }
}

/// Drawing primitives available to decorators.
///
/// Implemented by the rendering backend; the server treats it as a black box.
pub trait RenderBackend: Send + Sync {
    /// Fill a rectangle.
    fn fill_rect(&self, rect: Rect, color: Rgba);
    /// Outline a rectangle.
    fn stroke_rect(&self, rect: Rect, color: Rgba);
    /// Draw a single line of text with its baseline origin at `(x, y)`.
    fn draw_text(&self, x: f32, y: f32, text: &str, color: Rgba);
}

/// A per-window chrome renderer.
pub trait Decorator: Send {
    /// Bind the rendering backend.
    fn set_backend(&mut self, backend: Arc<dyn RenderBackend>);
    /// Adopt the colors of `palette`.
    fn set_colors(&mut self, palette: &Palette);
    /// Set the title shown in the tab.
    fn set_title(&mut self, title: &str);
    /// The current title.
    fn title(&self) -> &str;
    /// Frame of the window content this decorator surrounds.
    fn frame(&self) -> Rect;
    /// Move or resize the window content frame.
    fn set_frame(&mut self, frame: Rect);
    /// Full area covered by content plus chrome.
    fn bounds(&self) -> Rect;
    /// Draw the chrome intersecting `update`.
    fn draw(&mut self, update: Rect);
}

/// Builds decorators. This is the single entry point a decorator add-on
/// exports.
pub trait DecoratorFactory: Send + Sync {
    /// Create a decorator for a window with content `frame`.
    fn create(&self, frame: Rect, class: WindowClass) -> Box<dyn Decorator>;
}

const TAB_HEIGHT: f32 = 19.0;
const BORDER_WIDTH: f32 = 5.0;

/// The built-in decorator.
pub struct DefaultDecorator {
    frame: Rect,
    class: WindowClass,
    title: String,
    backend: Option<Arc<dyn RenderBackend>>,
    tab_color: Rgba,
    tab_text_color: Rgba,
    border_color: Rgba,
    border_highlight: Rgba,
}

impl DefaultDecorator {
    /// Create a decorator using the factory palette until colors are set.
    pub fn new(frame: Rect, class: WindowClass) -> Self {
        let mut decorator = Self {
            frame,
            class,
            title: String::new(),
            backend: None,
            tab_color: Rgba::rgb(0, 0, 0),
            tab_text_color: Rgba::rgb(0, 0, 0),
            border_color: Rgba::rgb(0, 0, 0),
            border_highlight: Rgba::rgb(0, 0, 0),
        };
        decorator.set_colors(&Palette::default());
        decorator
    }

    /// Rectangle occupied by the title tab, if the look has one.
    pub fn tab_rect(&self) -> Option<Rect> {
        if !self.class.look.has_tab() {
            return None;
        }
        let border = self.border_width();
        Some(Rect::new(
            self.frame.left - border,
            self.frame.top - border - TAB_HEIGHT,
            self.frame.right + border,
            self.frame.top - border,
        ))
    }

    fn border_width(&self) -> f32 {
        if self.class.look.has_border() {
            BORDER_WIDTH
        } else {
            0.0
        }
    }
}

impl Decorator for DefaultDecorator {
    fn set_backend(&mut self, backend: Arc<dyn RenderBackend>) {
        self.backend = Some(backend);
    }

    fn set_colors(&mut self, palette: &Palette) {
        self.tab_color = palette.get(ColorRole::WindowTab);
        self.tab_text_color = palette.get(ColorRole::WindowTabText);
        self.border_color = palette.get(ColorRole::PanelBackground);
        self.border_highlight = palette.get(ColorRole::ControlBorder);
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn frame(&self) -> Rect {
        self.frame
    }

    fn set_frame(&mut self, frame: Rect) {
        self.frame = frame;
    }

    fn bounds(&self) -> Rect {
        let border = self.border_width();
        let mut bounds = self.frame.inset(-border, -border);
        if let Some(tab) = self.tab_rect() {
            bounds.top = tab.top;
        }
        bounds
    }

    fn draw(&mut self, _update: Rect) {
        let Some(backend) = &self.backend else {
            return;
        };

        if self.class.look.has_border() {
            let outer = self.frame.inset(-BORDER_WIDTH, -BORDER_WIDTH);
            backend.fill_rect(outer, self.border_color);
            backend.stroke_rect(outer, self.border_highlight);
        }

        if let Some(tab) = self.tab_rect() {
            backend.fill_rect(tab, self.tab_color);
            backend.stroke_rect(tab, self.border_highlight);
            backend.draw_text(tab.left + 5.0, tab.bottom - 5.0, &self.title, self.tab_text_color);
        }
    }
}

/// Factory for [`DefaultDecorator`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDecoratorFactory;

impl<F: DecoratorFactory + ?Sized> DecoratorFactory for Arc<F> {
    fn create(&self, frame: Rect, class: WindowClass) -> Box<dyn Decorator> {
        (**self).create(frame, class)
    }
}

impl DecoratorFactory for DefaultDecoratorFactory {
    fn create(&self, frame: Rect, class: WindowClass) -> Box<dyn Decorator> {
        Box::new(DefaultDecorator::new(frame, class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DrawCall, RecordingBackend};

    fn titled() -> WindowClass {
        WindowClass::new(WindowLook::Titled, WindowFeel::Normal, WindowFlags::empty())
    }

    #[test]
    fn test_flags() {
        let flags = WindowFlags::NOT_CLOSABLE | WindowFlags::NOT_ZOOMABLE;
        assert!(flags.contains(WindowFlags::NOT_CLOSABLE));
        assert!(!flags.contains(WindowFlags::NOT_MOVABLE));
        assert_eq!(WindowFlags::from_bits(flags.bits()), flags);
    }

    #[test]
    fn test_bounds_include_tab_and_border() {
        let decorator = DefaultDecorator::new(Rect::new(100.0, 100.0, 300.0, 200.0), titled());
        let bounds = decorator.bounds();

        assert_eq!(bounds.left, 95.0);
        assert_eq!(bounds.right, 305.0);
        assert_eq!(bounds.bottom, 205.0);
        assert_eq!(bounds.top, 100.0 - BORDER_WIDTH - TAB_HEIGHT);
    }

    #[test]
    fn test_borderless_has_no_chrome() {
        let class = WindowClass::new(WindowLook::NoBorder, WindowFeel::Normal, WindowFlags::empty());
        let frame = Rect::new(0.0, 0.0, 10.0, 10.0);
        let decorator = DefaultDecorator::new(frame, class);

        assert!(decorator.tab_rect().is_none());
        assert_eq!(decorator.bounds(), frame);
    }

    #[test]
    fn test_draw_uses_palette_and_title() {
        let backend = Arc::new(RecordingBackend::default());
        let palette = Palette::new().with(ColorRole::WindowTab, Rgba::rgb(1, 2, 3));

        let mut decorator = DefaultDecoratorFactory.create(Rect::new(0.0, 30.0, 50.0, 80.0), titled());
        decorator.set_backend(backend.clone());
        decorator.set_colors(&palette);
        decorator.set_title("Terminal");
        let bounds = decorator.bounds();
        decorator.draw(bounds);

        let calls = backend.calls();
        assert!(calls.contains(&DrawCall::Text("Terminal".to_string())));
        assert!(calls
            .iter()
            .any(|call| matches!(call, DrawCall::Fill(_, color) if *color == Rgba::rgb(1, 2, 3))));
    }

    #[test]
    fn test_draw_without_backend_is_noop() {
        let mut decorator = DefaultDecorator::new(Rect::new(0.0, 0.0, 1.0, 1.0), titled());
        decorator.draw(Rect::default());
    }
}
