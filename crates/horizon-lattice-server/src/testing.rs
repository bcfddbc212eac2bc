//! In-memory collaborators for exercising the server without an operating
//! system, shared libraries or a display.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::decorator::loader::{ModuleLoader, PluginModule};
use crate::decorator::{DecoratorFactory, Rect, RenderBackend};
use crate::error::{PluginError, ProcessError};
use crate::input::Desktop;
use crate::palette::Rgba;
use crate::port::Envelope;
use crate::process::{ProcessControl, ProcessId};

/// A font file holding one face of `family`, readable by the font catalog.
///
/// The face has only the `OS/2` and `name` tables, enough to describe its
/// family, weight and slant. It has no glyphs.
pub fn minimal_font(family: &str, weight: u16, italic: bool) -> Vec<u8> {
    let mut os2 = vec![0u8; 78];
    os2[4..6].copy_from_slice(&weight.to_be_bytes());
    // usWidthClass: medium
    os2[6..8].copy_from_slice(&5u16.to_be_bytes());
    if italic {
        // fsSelection bit 0
        os2[62..64].copy_from_slice(&1u16.to_be_bytes());
    }

    let postscript: String = family.chars().filter(|c| !c.is_whitespace()).collect();
    let postscript = format!("{postscript}-{weight}{}", if italic { "Italic" } else { "" });
    let name = name_table(&[(1, family), (6, &postscript)]);

    // Table records must be sorted by tag.
    sfnt(&[(*b"OS/2", os2), (*b"name", name)])
}

fn name_table(records: &[(u16, &str)]) -> Vec<u8> {
    let count = records.len() as u16;
    let mut header = Vec::new();
    let mut storage = Vec::new();
    header.extend_from_slice(&0u16.to_be_bytes());
    header.extend_from_slice(&count.to_be_bytes());
    header.extend_from_slice(&(6 + 12 * count).to_be_bytes());
    for &(name_id, text) in records {
        let encoded: Vec<u8> = text.encode_utf16().flat_map(u16::to_be_bytes).collect();
        // Windows platform, Unicode BMP, US English.
        for field in [3, 1, 0x0409, name_id, encoded.len() as u16, storage.len() as u16] {
            header.extend_from_slice(&u16::to_be_bytes(field));
        }
        storage.extend_from_slice(&encoded);
    }
    header.extend_from_slice(&storage);
    header
}

fn sfnt(tables: &[([u8; 4], Vec<u8>)]) -> Vec<u8> {
    let count = tables.len() as u16;
    let mut font = Vec::new();
    font.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    font.extend_from_slice(&count.to_be_bytes());
    font.extend_from_slice(&[0; 6]);

    let mut offset = 12 + 16 * tables.len();
    for (tag, data) in tables {
        font.extend_from_slice(tag);
        font.extend_from_slice(&0u32.to_be_bytes());
        font.extend_from_slice(&(offset as u32).to_be_bytes());
        font.extend_from_slice(&(data.len() as u32).to_be_bytes());
        offset += data.len().next_multiple_of(4);
    }
    for (_, data) in tables {
        font.extend_from_slice(data);
        font.resize(font.len().next_multiple_of(4), 0);
    }
    font
}

/// Wait on `condvar` until `done` holds or `timeout` elapses.
fn wait_until<T>(
    lock: &Mutex<T>,
    condvar: &Condvar,
    timeout: Duration,
    mut done: impl FnMut(&T) -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    let mut guard = lock.lock();
    while !done(&guard) {
        if condvar.wait_until(&mut guard, deadline).timed_out() {
            return done(&guard);
        }
    }
    true
}

#[derive(Default)]
struct ProcessTable {
    alive: HashSet<ProcessId>,
    killed: Vec<ProcessId>,
    liveness_checks: usize,
}

/// A process table the test controls.
#[derive(Default)]
pub struct FakeProcesses {
    table: Mutex<ProcessTable>,
    checked: Condvar,
}

impl FakeProcesses {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `pid` as running.
    pub fn spawn(&self, pid: ProcessId) {
        self.table.lock().alive.insert(pid);
    }

    /// Mark `pid` as exited.
    pub fn exit(&self, pid: ProcessId) {
        self.table.lock().alive.remove(&pid);
    }

    /// Processes terminated through [`ProcessControl::kill`], in order.
    pub fn killed(&self) -> Vec<ProcessId> {
        self.table.lock().killed.clone()
    }

    /// Number of liveness checks so far.
    pub fn liveness_checks(&self) -> usize {
        self.table.lock().liveness_checks
    }

    /// Wait until at least `count` liveness checks have been made.
    pub fn wait_for_liveness_checks(&self, count: usize, timeout: Duration) -> bool {
        wait_until(&self.table, &self.checked, timeout, |table| table.liveness_checks >= count)
    }
}

impl ProcessControl for FakeProcesses {
    fn is_alive(&self, pid: ProcessId) -> bool {
        let mut table = self.table.lock();
        table.liveness_checks += 1;
        self.checked.notify_all();
        table.alive.contains(&pid)
    }

    fn kill(&self, pid: ProcessId) -> Result<(), ProcessError> {
        let mut table = self.table.lock();
        if !table.alive.remove(&pid) {
            return Err(ProcessError::NotFound(pid));
        }
        table.killed.push(pid);
        Ok(())
    }
}

/// Decorator modules registered by path instead of loaded from disk.
#[derive(Default)]
pub struct StaticModules {
    modules: Mutex<HashMap<PathBuf, Option<Arc<dyn DecoratorFactory>>>>,
    open: Arc<AtomicUsize>,
}

impl StaticModules {
    /// No modules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module at `path` that exports `factory`.
    pub fn insert_factory(&self, path: impl Into<PathBuf>, factory: Arc<dyn DecoratorFactory>) {
        self.modules.lock().insert(path.into(), Some(factory));
    }

    /// Register a module at `path` that opens but exports no factory.
    pub fn insert_without_factory(&self, path: impl Into<PathBuf>) {
        self.modules.lock().insert(path.into(), None);
    }

    /// Number of opened modules not yet dropped.
    pub fn open_modules(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

struct StaticModule {
    factory: Option<Arc<dyn DecoratorFactory>>,
    open: Arc<AtomicUsize>,
}

impl PluginModule for StaticModule {
    fn resolve_factory(&self, _symbol: &str) -> Option<Box<dyn DecoratorFactory>> {
        let factory = self.factory.clone()?;
        Some(Box::new(factory))
    }
}

impl Drop for StaticModule {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ModuleLoader for StaticModules {
    fn open(&self, path: &Path) -> Result<Box<dyn PluginModule>, PluginError> {
        let factory = self
            .modules
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| PluginError::Open {
                path: path.to_path_buf(),
                reason: "no such module".to_string(),
            })?;
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StaticModule {
            factory,
            open: self.open.clone(),
        }))
    }
}

/// A primitive drawn through [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    Fill(Rect, Rgba),
    Stroke(Rect, Rgba),
    Text(String),
}

/// A render backend that records what it is asked to draw.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<DrawCall>>,
    text_colors: Mutex<Vec<Rgba>>,
}

impl RecordingBackend {
    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<DrawCall> {
        self.calls.lock().clone()
    }

    /// Colors used for text so far.
    pub fn text_colors(&self) -> Vec<Rgba> {
        self.text_colors.lock().clone()
    }
}

impl RenderBackend for RecordingBackend {
    fn fill_rect(&self, rect: Rect, color: Rgba) {
        self.calls.lock().push(DrawCall::Fill(rect, color));
    }

    fn stroke_rect(&self, rect: Rect, color: Rgba) {
        self.calls.lock().push(DrawCall::Stroke(rect, color));
    }

    fn draw_text(&self, _x: f32, _y: f32, text: &str, color: Rgba) {
        self.calls.lock().push(DrawCall::Text(text.to_string()));
        self.text_colors.lock().push(color);
    }
}

/// An input event as seen by [`RecordingDesktop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Mouse { code: i32, attachments: usize },
    Keyboard { code: i32, attachments: usize },
}

/// A desktop that records routed input.
#[derive(Default)]
pub struct RecordingDesktop {
    events: Mutex<Vec<Routed>>,
    arrived: Condvar,
}

impl RecordingDesktop {
    /// Every event so far, in order.
    pub fn events(&self) -> Vec<Routed> {
        self.events.lock().clone()
    }

    /// Wait until at least `count` events have arrived.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        wait_until(&self.events, &self.arrived, timeout, |events| events.len() >= count)
    }

    fn record(&self, event: Routed) {
        self.events.lock().push(event);
        self.arrived.notify_all();
    }
}

impl Desktop for RecordingDesktop {
    fn mouse_event(&self, code: i32, event: &mut Envelope) {
        self.record(Routed::Mouse {
            code,
            attachments: event.remaining(),
        });
    }

    fn keyboard_event(&self, code: i32, event: &mut Envelope) {
        self.record(Routed::Keyboard {
            code,
            attachments: event.remaining(),
        });
    }
}
