// src/watch/path_utils.rs

//! Utility functions for path handling in the matcher.

/// Normalise a path or pattern string to forward slashes.
///
/// - Backslashes become `/`.
/// - Empty and `.` segments are dropped (`./a//b/` → `a/b`).
/// - A leading `/` is kept, so absolute paths stay absolute.
pub fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');

    let joined = unified
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/");

    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Last segment of a normalised path.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Every segment suffix of a normalised path, longest first.
///
/// `a/b/c` yields `a/b/c`, `b/c`, `c`. A leading `/` is not part of any
/// suffix.
pub fn segment_suffixes(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.trim_start_matches('/');
    let starts = std::iter::once(0).chain(
        trimmed
            .match_indices('/')
            .map(|(i, _)| i + 1)
            .filter(move |&i| i < trimmed.len()),
    );
    starts.map(move |i| &trimmed[i..])
}
