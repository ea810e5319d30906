//! Log markers delimiting the regions of a container's output
//!
//! An external log processor splits a container's stdout on these exact
//! strings into setup, measured, and teardown segments. The text is a stable
//! contract: changing it breaks every existing parser.

/// Printed once, after setup and before the measured region begins
pub const SEPARATOR: &str = "METRICS OPERATOR TIMEPOINT";

/// Printed immediately before the instrumented invocation
pub const COLLECTION_START: &str = "METRICS OPERATOR COLLECTION START";

/// Printed immediately after the instrumented invocation returns
pub const COLLECTION_END: &str = "METRICS OPERATOR COLLECTION END";

/// All markers in the order they appear in a rendered script
pub const ALL: [&str; 3] = [SEPARATOR, COLLECTION_START, COLLECTION_END];

/// Return the first marker contained in `text`, if any.
///
/// Plugins must not emit markers themselves; the script composer inserts
/// each one exactly once.
pub fn find_marker(text: &str) -> Option<&'static str> {
    ALL.iter().copied().find(|marker| text.contains(marker))
}
