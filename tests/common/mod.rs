//! Shared helpers for the integration tests

#![allow(dead_code)] // each test binary uses a different subset

pub mod builders;
pub mod mock_helpers;

use std::fs;
use std::path::Path;

/// Write `body` to `dir/rel`, creating category sub-directories as needed
pub fn write_script(dir: &Path, rel: &str, body: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, body).unwrap();
}
