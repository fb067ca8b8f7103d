//! Package name extraction from resolution failures.

use regex_lite::Regex;
use std::sync::OnceLock;

/// Both the legacy and the current bundler phrasing of a missing module.
const MISSING_MODULE: &str = r"(?:(?:Cannot resolve module)|(?:Can't resolve)) '([@\w/.-]+)' in";

fn pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(MISSING_MODULE).ok()).as_ref()
}

/// Extract the specifier that failed to resolve from a failure message.
///
/// Deep paths such as `bootswatch/lumen/bootstrap.css` are returned whole.
/// Messages that do not describe a missing module yield `None`.
#[must_use]
pub fn package_from_error(message: &str) -> Option<String> {
    pattern()?
        .captures(message)?
        .get(1)
        .map(|m| m.as_str().to_string())
}
