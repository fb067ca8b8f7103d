//! Loader name normalization.

/// Suffix loader packages conventionally carry.
pub const LOADER_SUFFIX: &str = "-loader";

/// Map a loader specifier to the package that provides it.
///
/// Options after `?` are dropped. `babel` becomes `babel-loader`. A name is
/// returned unchanged when its package segment (`name` or `@scope/name`)
/// already ends in `-loader`, or when it points at a sub-path inside a
/// package, as in `react-hot-loader/webpack`.
#[must_use]
pub fn normalize_loader(loader: &str) -> String {
    let name = loader.split('?').next().unwrap_or(loader).trim();
    if name.is_empty() {
        return String::new();
    }
    let (package, sub_path) = split_package(name);
    if package.ends_with(LOADER_SUFFIX) || sub_path.is_some() {
        return name.to_string();
    }
    format!("{name}{LOADER_SUFFIX}")
}

/// Split `name` into its package segment and the sub-path after it.
fn split_package(name: &str) -> (&str, Option<&str>) {
    let skip = usize::from(name.starts_with('@'));
    match name.match_indices('/').nth(skip).map(|(i, _)| i) {
        Some(i) => (&name[..i], Some(&name[i + 1..])),
        None => (name, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_suffix() {
        assert_eq!(normalize_loader("babel"), "babel-loader");
        assert_eq!(normalize_loader("css"), "css-loader");
    }

    #[test]
    fn test_idempotent() {
        for name in ["babel", "babel-loader", "@svgr/webpack", "@scope/foo-loader", "style?x=1", "react-hot-loader/webpack"] {
            let once = normalize_loader(name);
            assert_eq!(normalize_loader(&once), once);
        }
        assert_eq!(normalize_loader("babel-loader"), "babel-loader");
    }

    #[test]
    fn test_scoped_and_query() {
        assert_eq!(normalize_loader("@scope/foo-loader"), "@scope/foo-loader");
        assert_eq!(normalize_loader("@svgr/webpack"), "@svgr/webpack-loader");
        assert_eq!(normalize_loader("babel?cacheDirectory"), "babel-loader");
        assert_eq!(normalize_loader(""), "");
    }

    #[test]
    fn test_sub_path_passes_through() {
        assert_eq!(
            normalize_loader("@scope/foo-loader/sub"),
            "@scope/foo-loader/sub"
        );
        assert_eq!(
            normalize_loader("react-hot-loader/webpack"),
            "react-hot-loader/webpack"
        );
        assert_eq!(
            normalize_loader("react-hot-loader/webpack?x=1"),
            "react-hot-loader/webpack"
        );
        assert_eq!(normalize_loader("@scope/foo-loader"), "@scope/foo-loader");
    }
}
