//! On-disk size accounting
//!
//! Sizes are allocated blocks in kilobytes, the same figure `du -sk` reports.
//! Symbolic links are counted as themselves and never followed.

use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::thread;
use walkdir::WalkDir;

/// Size of `path` in kilobytes; 0 when it does not exist
pub fn size_kb(path: &Path) -> u64 {
    let blocks: u64 = WalkDir::new(path)
        .follow_links(false)
        .follow_root_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.blocks())
        .sum();
    // st_blocks is in 512-byte units
    blocks.div_ceil(2)
}

/// Per-path sizes, computed concurrently, in input order.
///
/// Each path gets its own thread and its own result slot; a thread that
/// fails contributes 0.
pub fn sizes_kb<P: AsRef<Path> + Sync>(paths: &[P]) -> Vec<u64> {
    thread::scope(|scope| {
        let handles: Vec<_> = paths
            .iter()
            .map(|path| scope.spawn(move || size_kb(path.as_ref())))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(0))
            .collect()
    })
}

/// Sum of [`sizes_kb`] once every unit has finished
pub fn total_size_kb<P: AsRef<Path> + Sync>(paths: &[P]) -> u64 {
    sizes_kb(paths).into_iter().sum()
}

/// Human-readable rendering of a kilobyte count
pub fn format_kb(kb: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    let mut value = kb as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{kb} KB")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
