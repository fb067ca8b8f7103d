//! Import discovery and request splitting.
//!
//! Finds `import`, `export ... from`, dynamic `import()` and `require()`
//! specifiers without a full parse.

use regex_lite::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

const PATTERNS: &[&str] = &[
    r#"\bimport\s+(?:[\w*{}\s,$]+?\s+from\s+)?['"]([^'"\n]+)['"]"#,
    r#"\bexport\s+[\w*{}\s,$]+?\s+from\s+['"]([^'"\n]+)['"]"#,
    r#"\bimport\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#,
    r#"\brequire\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#,
];

fn patterns() -> &'static [Regex] {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| PATTERNS.iter().filter_map(|p| Regex::new(p).ok()).collect())
}

/// Scan source code for import specifiers.
///
/// Returns specifiers in first-appearance order, deduplicated. Lines that are
/// entirely comments are ignored.
#[must_use]
pub fn scan_imports(source: &str) -> Vec<String> {
    let code: String = source
        .lines()
        .filter(|line| {
            let t = line.trim_start();
            !(t.starts_with("//") || t.starts_with("/*") || t.starts_with('*'))
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut found: Vec<(usize, String)> = patterns()
        .iter()
        .flat_map(|re| {
            re.captures_iter(&code)
                .filter_map(|caps| caps.get(1).map(|m| (m.start(), m.as_str().to_string())))
                .collect::<Vec<_>>()
        })
        .collect();
    found.sort_by_key(|(pos, _)| *pos);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter_map(|(_, spec)| seen.insert(spec.clone()).then_some(spec))
        .collect()
}

/// A request split into its inline loaders and the resource.
///
/// `style!css?modules!./app.css?inline` has loaders `style`, `css?modules`,
/// resource `./app.css` and query `inline`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub loaders: Vec<String>,
    pub resource: String,
    pub query: Option<String>,
}

impl ParsedRequest {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw
            .strip_prefix("-!")
            .or_else(|| raw.strip_prefix("!!"))
            .or_else(|| raw.strip_prefix('!'))
            .unwrap_or(raw);

        let mut parts: Vec<&str> = trimmed.split('!').collect();
        let last = parts.pop().unwrap_or_default();
        let loaders = parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        let (resource, query) = match last.split_once('?') {
            Some((resource, query)) => (resource.to_string(), Some(query.to_string())),
            None => (last.to_string(), None),
        };

        Self {
            loaders,
            resource,
            query,
        }
    }
}
