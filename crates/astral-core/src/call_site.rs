//! Call-site capture for failure diagnostics.
//!
//! Registration functions are `#[track_caller]`, so the location captured at
//! step creation is the innermost frame outside the registration API. A
//! [`Denylist`] of internal source prefixes then decides whether that frame
//! belongs to user code; if it does not, the location is reported as unknown.

use std::panic::Location;
use std::path::Path;

/// Reported when no qualifying frame exists.
pub const UNKNOWN_LOCATION: &str =
    "Unknown location (could not determine call site from stack trace)";

/// Source prefixes that never count as user code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denylist {
    prefixes: Vec<String>,
}

impl Default for Denylist {
    /// Standard library sources plus this crate's own sources.
    fn default() -> Self {
        Self {
            prefixes: vec!["/rustc/".to_string(), source_dir_of(file!())],
        }
    }
}

impl Denylist {
    /// An empty denylist; every captured frame qualifies.
    pub fn empty() -> Self {
        Self {
            prefixes: Vec::new(),
        }
    }

    /// Add another internal prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = normalize(&prefix.into());
        if !prefix.is_empty() && !self.prefixes.contains(&prefix) {
            self.prefixes.push(prefix);
        }
        self
    }

    /// Add several prefixes at once (e.g. from configuration).
    pub fn extend<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for prefix in prefixes {
            self = self.with_prefix(prefix);
        }
        self
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Whether `file` lives under one of the internal prefixes.
    ///
    /// Prefixes match at the start of the path or after a path separator, so
    /// a relative workspace prefix also matches an absolute registry path.
    pub fn is_internal(&self, file: &str) -> bool {
        let file = normalize(file);
        self.prefixes.iter().any(|prefix| {
            file.starts_with(prefix.as_str())
                || (!prefix.starts_with('/') && file.contains(&format!("/{prefix}")))
        })
    }
}

/// Source directory of `file` with a trailing separator.
///
/// Used with `file!()` to denylist a whole crate's `src/` directory.
pub fn source_dir_of(file: &str) -> String {
    let dir = Path::new(file)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    if dir.is_empty() {
        String::new()
    } else {
        format!("{}/", normalize(&dir).trim_end_matches('/'))
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// Location captured when a step was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    location: Option<&'static Location<'static>>,
}

impl CallSite {
    /// Capture the caller of the current `#[track_caller]` chain.
    #[track_caller]
    pub fn capture() -> Self {
        Self {
            location: Some(Location::caller()),
        }
    }

    /// A call site with no frames.
    pub fn unknown() -> Self {
        Self { location: None }
    }

    /// The captured frame, unless it belongs to the denylist.
    pub fn first_external(&self, denylist: &Denylist) -> Option<&'static Location<'static>> {
        self.location
            .filter(|frame| !denylist.is_internal(frame.file()))
    }

    /// `file:line` of the first external frame, or [`UNKNOWN_LOCATION`].
    pub fn describe(&self, denylist: &Denylist) -> String {
        self.first_external(denylist).map_or_else(
            || UNKNOWN_LOCATION.to_string(),
            |frame| format!("{}:{}", frame.file(), frame.line()),
        )
    }
}
