//! Skip-marker evaluation for commit subjects.
//!
//! Station commits carry `[skip line]` so they never retrigger the pipeline.
//! The CI-style markers are honored too, since users already put them on
//! commits they consider uninteresting.

/// Marker appended to every station commit subject.
pub const COMMIT_SKIP_MARKER: &str = "[skip line]";

/// Markers that suppress triggering when present in a commit subject.
pub const SKIP_MARKERS: [&str; 4] = ["[skip ci]", "[ci skip]", "[skip line]", "[line skip]"];

/// Whether a commit subject contains any skip marker.
pub fn contains_skip_marker(subject: &str) -> bool {
    SKIP_MARKERS
        .iter()
        .any(|marker| subject.contains(marker))
}

/// Whether a non-empty list of subjects is skip-marked throughout.
///
/// Returns false for an empty list: "nothing happened" is not the same as
/// "only skip-marked commits happened".
pub fn all_skip_marked<S: AsRef<str>>(subjects: &[S]) -> bool {
    if subjects.is_empty() {
        return false;
    }
    subjects
        .iter()
        .all(|subject| contains_skip_marker(subject.as_ref()))
}
