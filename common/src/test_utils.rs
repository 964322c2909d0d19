use std::path::PathBuf;
use std::sync::OnceLock;

/// Workspace root: the parent of the calling crate's manifest directory.
fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .map(PathBuf::from)
        .unwrap_or(manifest_dir)
}

/// Ensures the test output directory exists. Safe to call multiple times.
pub fn ensure_test_output_dir() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        std::fs::create_dir_all(workspace_root().join("test_output"))
            .expect("Failed to create test_output directory");
    });
}

/// Path of a scratch file under `<workspace>/test_output/`.
pub fn test_output_path(name: &str) -> PathBuf {
    ensure_test_output_dir();
    workspace_root().join("test_output").join(name)
}
