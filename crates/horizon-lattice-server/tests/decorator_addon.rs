//! Loading a real decorator add-on built as a shared library.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use horizon_lattice_server::decorator::loader::LibraryLoader;
use horizon_lattice_server::decorator::{BUILTIN_DECORATOR_NAME, Rect, WindowClass};
use horizon_lattice_server::testing::{DrawCall, RecordingBackend};
use horizon_lattice_server::{Palette, UiState};

/// Build the add-on under `tests/fixtures/sample-decorator` and return the
/// path of its shared library.
fn build_sample_decorator() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("sample-decorator")
        .join("Cargo.toml");
    let target_dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join("sample-decorator");

    let status = Command::new(env!("CARGO"))
        .args(["build", "--quiet", "--offline", "--manifest-path"])
        .arg(&manifest)
        .arg("--target-dir")
        .arg(&target_dir)
        .status()
        .unwrap();
    assert!(status.success(), "building the sample add-on failed");

    let file = format!(
        "{}sample_decorator{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    );
    target_dir.join("debug").join(file)
}

#[test]
fn test_addon_decorators_outlive_revert() {
    let library = build_sample_decorator();
    let ui = UiState::new(Palette::default(), Box::new(LibraryLoader));

    assert!(ui.load_decorator(Some(&library)));
    assert!(ui.decorator_name().contains("sample_decorator"));

    let backend = Arc::new(RecordingBackend::default());
    let frame = Rect::new(10.0, 30.0, 210.0, 130.0);
    let mut decorator = ui.new_decorator(frame, "Tracker", WindowClass::default(), backend.clone());

    // The add-on's code must stay mapped while its decorator is alive.
    assert!(ui.load_decorator(None));
    assert_eq!(ui.decorator_name(), BUILTIN_DECORATOR_NAME);

    decorator.draw(frame);
    decorator.set_title("Terminal");
    decorator.draw(frame);
    assert_eq!(
        backend.calls(),
        vec![
            DrawCall::Text("sample: Tracker".to_string()),
            DrawCall::Text("sample: Terminal".to_string()),
        ]
    );
    drop(decorator);

    assert!(ui.load_decorator(Some(&library)));
    let replaced = ui.new_decorator(frame, "Deskbar", WindowClass::default(), backend);
    assert!(ui.load_decorator(Some(&library)));
    assert_eq!(replaced.title(), "Deskbar");
}
