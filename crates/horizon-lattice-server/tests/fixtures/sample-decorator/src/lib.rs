//! A decorator add-on that prefixes every title it draws with "sample: ".

use std::sync::Arc;

use horizon_lattice_server::decorator::{Decorator, DecoratorFactory, Rect, RenderBackend, WindowClass};
use horizon_lattice_server::{ColorRole, Palette, Rgba};

struct SampleDecorator {
    frame: Rect,
    title: String,
    text: Rgba,
    backend: Option<Arc<dyn RenderBackend>>,
}

impl Decorator for SampleDecorator {
    fn set_backend(&mut self, backend: Arc<dyn RenderBackend>) {
        self.backend = Some(backend);
    }

    fn set_colors(&mut self, palette: &Palette) {
        self.text = palette.get(ColorRole::WindowTabText);
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
        self.frame
    }

    fn draw(&mut self, _update: Rect) {
        if let Some(backend) = &self.backend {
            let label = format!("sample: {}", self.title);
            backend.draw_text(self.frame.left, self.frame.top, &label, self.text);
        }
    }
}

struct SampleFactory;

impl DecoratorFactory for SampleFactory {
    fn create(&self, frame: Rect, _class: WindowClass) -> Box<dyn Decorator> {
        Box::new(SampleDecorator {
            frame,
            title: String::new(),
            text: Rgba::rgb(0, 0, 0),
            backend: None,
        })
    }
}

horizon_lattice_server::declare_decorator!(SampleFactory);
