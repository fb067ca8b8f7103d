//! Request resolution.
//!
//! [`Resolver`] maps import specifiers to files using `node_modules` lookup.
//! [`NodeResolvers`] exposes it through the [`BundlerResolvers`] call
//! contract, whose argument shape depends on the bundler generation:
//!
//! - generation 1: `(path, request)`
//! - generations 2 and 3: `(context, path, request)`
//!
//! [`ResolverContract`] picks the shape once from a version string.

#![allow(clippy::unused_self)]

use super::plugin::{ResolutionRequest, ResolveKind};
use crate::error::Error;
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const EXTENSIONS: &[&str] = &[".js", ".mjs", ".cjs", ".jsx", ".ts", ".tsx", ".json"];

/// Error during resolution.
///
/// The display form is `Can't resolve '<specifier>' in '<from>'`, the same
/// phrasing the bundler reports to users.
#[derive(Debug, Clone)]
pub struct ResolveError {
    pub specifier: String,
    pub from: String,
    pub message: String,
}

impl ResolveError {
    fn new(specifier: &str, from: &Path, message: impl Into<String>) -> Self {
        Self {
            specifier: specifier.to_string(),
            from: from.display().to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Can't resolve '{}' in '{}': {}",
            self.specifier, self.from, self.message
        )
    }
}

impl std::error::Error for ResolveError {}

/// Leading context argument of generation 2+ resolvers. Carries nothing yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveContext;

/// Argument shape of one resolver invocation.
#[derive(Debug, Clone, Copy)]
pub enum ResolverCall<'a> {
    /// Generation 1: `(path, request)`.
    Legacy { path: &'a Path, request: &'a str },
    /// Generations 2 and 3: `(context, path, request)`.
    Contextual {
        context: &'a ResolveContext,
        path: &'a Path,
        request: &'a str,
    },
}

impl<'a> ResolverCall<'a> {
    pub fn path(&self) -> &'a Path {
        match *self {
            Self::Legacy { path, .. } | Self::Contextual { path, .. } => path,
        }
    }

    pub fn request(&self) -> &'a str {
        match *self {
            Self::Legacy { request, .. } | Self::Contextual { request, .. } => request,
        }
    }
}

/// The bundler's resolvers, one per [`ResolveKind`].
pub trait BundlerResolvers: Send + Sync {
    /// Resolve a request. The future completes with the resolved path or the
    /// resolution failure.
    fn resolve(
        &self,
        kind: ResolveKind,
        call: ResolverCall<'_>,
    ) -> BoxFuture<'static, Result<PathBuf, ResolveError>>;
}

/// Resolver call shape for one bundler generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverContract {
    /// Major version 1.
    Legacy,
    /// Major versions 2 and 3.
    Contextual,
}

impl ResolverContract {
    /// Select the contract for a bundler version string such as `"3.8.1"`.
    pub fn for_version(version: &str) -> Result<Self, Error> {
        match version.trim().split('.').next() {
            Some("1") => Ok(Self::Legacy),
            Some("2" | "3") => Ok(Self::Contextual),
            _ => Err(Error::unsupported_bundler(version)),
        }
    }

    /// Invoke `resolvers` with the argument shape this contract requires.
    pub fn invoke(
        self,
        resolvers: &dyn BundlerResolvers,
        request: &ResolutionRequest,
    ) -> BoxFuture<'static, Result<PathBuf, ResolveError>> {
        let kind = match request.kind {
            ResolveKind::Loader => ResolveKind::Loader,
            ResolveKind::Normal | ResolveKind::External => ResolveKind::Normal,
        };
        match self {
            Self::Legacy => resolvers.resolve(
                kind,
                ResolverCall::Legacy {
                    path: &request.context,
                    request: &request.request,
                },
            ),
            Self::Contextual => {
                let context = ResolveContext::default();
                resolvers.resolve(
                    kind,
                    ResolverCall::Contextual {
                        context: &context,
                        path: &request.context,
                        request: &request.request,
                    },
                )
            }
        }
    }
}

/// The compiler's own resolvers.
///
/// Each instance owns a fresh [`Resolver`] cache. Calls with the wrong
/// argument shape for the configured contract are rejected.
#[derive(Debug)]
pub struct NodeResolvers {
    contract: ResolverContract,
    resolver: Resolver,
}

impl NodeResolvers {
    #[must_use]
    pub fn new(contract: ResolverContract) -> Self {
        Self {
            contract,
            resolver: Resolver::new(),
        }
    }
}

impl BundlerResolvers for NodeResolvers {
    fn resolve(
        &self,
        kind: ResolveKind,
        call: ResolverCall<'_>,
    ) -> BoxFuture<'static, Result<PathBuf, ResolveError>> {
        let shape_ok = matches!(
            (self.contract, call),
            (ResolverContract::Legacy, ResolverCall::Legacy { .. })
                | (ResolverContract::Contextual, ResolverCall::Contextual { .. })
        );
        let result = if shape_ok {
            self.resolver.resolve(call.request(), call.path(), kind)
        } else {
            Err(ResolveError::new(
                call.request(),
                call.path(),
                format!("resolver called with the wrong argument shape for {:?}", self.contract),
            ))
        };
        future::ready(result).boxed()
    }
}

/// Import resolver with a success cache.
#[derive(Debug, Default)]
pub struct Resolver {
    cache: RwLock<HashMap<(String, PathBuf, ResolveKind), PathBuf>>,
}

impl Resolver {
    /// Create a new resolver with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `specifier` requested from directory `context`.
    ///
    /// Only successful resolutions are cached, so a package installed after
    /// a failure is picked up by the next attempt.
    pub fn resolve(
        &self,
        specifier: &str,
        context: &Path,
        kind: ResolveKind,
    ) -> Result<PathBuf, ResolveError> {
        let key = (specifier.to_string(), context.to_path_buf(), kind);
        if let Some(hit) = self.cache.read().ok().and_then(|c| c.get(&key).cloned()) {
            return Ok(hit);
        }

        let resolved = match kind {
            ResolveKind::Loader => self.resolve_loader(specifier, context)?,
            ResolveKind::Normal | ResolveKind::External => {
                self.resolve_uncached(specifier, context)?
            }
        };

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, resolved.clone());
        }
        Ok(resolved)
    }

    /// Number of cached resolutions.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Loaders are looked up as given, then with the `-loader` suffix.
    fn resolve_loader(&self, specifier: &str, context: &Path) -> Result<PathBuf, ResolveError> {
        let bare = specifier.split('?').next().unwrap_or(specifier);
        match self.resolve_uncached(bare, context) {
            Ok(path) => Ok(path),
            Err(err) if bare.ends_with("-loader") => Err(err),
            Err(_) => self
                .resolve_uncached(&format!("{bare}-loader"), context)
                .map_err(|_| ResolveError::new(specifier, context, "Loader not found")),
        }
    }

    fn resolve_uncached(&self, specifier: &str, context: &Path) -> Result<PathBuf, ResolveError> {
        if specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." {
            return self.resolve_file_or_directory(&context.join(specifier), specifier, context);
        }

        if Path::new(specifier).is_absolute() {
            return self.resolve_file_or_directory(Path::new(specifier), specifier, context);
        }

        self.resolve_bare(specifier, context)
    }

    /// Resolve a bare specifier by walking up through `node_modules`.
    fn resolve_bare(&self, specifier: &str, context: &Path) -> Result<PathBuf, ResolveError> {
        let (pkg_name, subpath) = parse_bare_specifier(specifier);

        for dir in context.ancestors() {
            let pkg_dir = dir.join("node_modules").join(&pkg_name);
            if !pkg_dir.is_dir() {
                continue;
            }

            if let Some(sub) = &subpath {
                return self.resolve_file_or_directory(&pkg_dir.join(sub), specifier, context);
            }

            if let Some(entry) = self.package_entry(&pkg_dir) {
                return Ok(entry);
            }
            return self.resolve_file_or_directory(&pkg_dir.join("index"), specifier, context);
        }

        Err(ResolveError::new(
            specifier,
            context,
            format!("Cannot find package '{pkg_name}' in node_modules"),
        ))
    }

    /// Entry point from package.json `module` / `main`.
    fn package_entry(&self, pkg_dir: &Path) -> Option<PathBuf> {
        let content = std::fs::read_to_string(pkg_dir.join("package.json")).ok()?;
        let json: serde_json::Value = serde_json::from_str(&content).ok()?;

        ["module", "main"]
            .iter()
            .filter_map(|field| json.get(*field).and_then(|v| v.as_str()))
            .map(|entry| pkg_dir.join(entry))
            .find_map(|target| find_file(&target))
    }

    fn resolve_file_or_directory(
        &self,
        target: &Path,
        specifier: &str,
        context: &Path,
    ) -> Result<PathBuf, ResolveError> {
        find_file(target).ok_or_else(|| ResolveError::new(specifier, context, "File not found"))
    }
}

/// Try `target` as a file, with known extensions, then as a directory index.
fn find_file(target: &Path) -> Option<PathBuf> {
    if target.is_file() {
        return dunce::canonicalize(target).ok();
    }

    for ext in EXTENSIONS {
        let with_ext = PathBuf::from(format!("{}{}", target.display(), ext));
        if with_ext.is_file() {
            return dunce::canonicalize(with_ext).ok();
        }
    }

    if target.is_dir() {
        for ext in EXTENSIONS {
            let index = target.join(format!("index{ext}"));
            if index.is_file() {
                return dunce::canonicalize(index).ok();
            }
        }
    }

    None
}

/// Split a bare specifier into package name and subpath.
fn parse_bare_specifier(specifier: &str) -> (String, Option<String>) {
    let split_at = if specifier.starts_with('@') { 3 } else { 2 };
    let parts: Vec<&str> = specifier.splitn(split_at, '/').collect();
    if parts.len() < split_at - 1 {
        return (specifier.to_string(), None);
    }
    let pkg = parts[..split_at - 1].join("/");
    let subpath = parts.get(split_at - 1).map(|s| (*s).to_string());
    (pkg, subpath)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_parse_bare_specifier() {
        assert_eq!(parse_bare_specifier("lodash"), ("lodash".into(), None));
        assert_eq!(
            parse_bare_specifier("lodash/get"),
            ("lodash".into(), Some("get".into()))
        );
        assert_eq!(parse_bare_specifier("@types/node"), ("@types/node".into(), None));
        assert_eq!(
            parse_bare_specifier("@babel/core/lib/parse"),
            ("@babel/core".into(), Some("lib/parse".into()))
        );
    }

    #[test]
    fn test_contract_for_version() {
        assert_eq!(
            ResolverContract::for_version("1.15.0").unwrap(),
            ResolverContract::Legacy
        );
        assert_eq!(
            ResolverContract::for_version("2.7.0").unwrap(),
            ResolverContract::Contextual
        );
        assert_eq!(
            ResolverContract::for_version("3").unwrap(),
            ResolverContract::Contextual
        );

        let err = ResolverContract::for_version("4.0.0").unwrap_err();
        assert!(err.to_string().contains("Unsupported bundler version: 4.0.0"));
        assert!(ResolverContract::for_version("").is_err());
    }

    #[test]
    fn test_resolve_relative_and_package() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("src/utils.js"), "export const x = 1;");
        write(
            &root.join("node_modules/react-lite/package.json"),
            r#"{"main": "dist/react-lite.js"}"#,
        );
        write(&root.join("node_modules/react-lite/dist/react-lite.js"), "");

        let resolver = Resolver::new();
        let src = root.join("src");

        let utils = resolver.resolve("./utils", &src, ResolveKind::Normal).unwrap();
        assert!(utils.ends_with("utils.js"));

        let pkg = resolver.resolve("react-lite", &src, ResolveKind::Normal).unwrap();
        assert!(pkg.ends_with("dist/react-lite.js"));
        assert_eq!(resolver.cached(), 2);
    }

    #[test]
    fn test_missing_package_message() {
        let dir = tempdir().unwrap();
        let resolver = Resolver::new();
        let err = resolver
            .resolve("react-lite", dir.path(), ResolveKind::Normal)
            .unwrap_err();

        assert!(err.to_string().starts_with("Can't resolve 'react-lite' in '"));
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn test_resolve_loader_with_suffix() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("node_modules/babel-loader/index.js"), "");

        let resolver = Resolver::new();
        let path = resolver
            .resolve("babel?cacheDirectory", dir.path(), ResolveKind::Loader)
            .unwrap();
        assert!(path.ends_with("babel-loader/index.js"));

        let err = resolver
            .resolve("css", dir.path(), ResolveKind::Loader)
            .unwrap_err();
        assert_eq!(err.specifier, "css");
    }

    #[tokio::test]
    async fn test_node_resolvers_reject_wrong_shape() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("node_modules/lodash/index.js"), "");

        let resolvers = NodeResolvers::new(ResolverContract::Legacy);
        let request = ResolutionRequest::new(dir.path(), "lodash", ResolveKind::Normal);

        let ok = ResolverContract::Legacy.invoke(&resolvers, &request).await;
        assert!(ok.is_ok());

        let err = ResolverContract::Contextual
            .invoke(&resolvers, &request)
            .await
            .unwrap_err();
        assert!(err.message.contains("wrong argument shape"));
    }
}
