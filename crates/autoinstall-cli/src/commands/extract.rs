//! `autoinstall extract` command implementation.
//!
//! Shows which package a resolution failure message would install.

use autoinstall_core::installer::package_name;
use autoinstall_core::package_from_error;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

#[derive(Serialize)]
struct ExtractResult {
    ok: bool,
    /// Specifier as it appears in the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<String>,
    /// Installable package name.
    #[serde(skip_serializing_if = "Option::is_none")]
    package: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run the extract command.
pub fn run(message: &str, json: bool) -> Result<()> {
    let request = package_from_error(message);
    let package = request
        .as_deref()
        .and_then(package_name)
        .map(str::to_string);

    let error = match (&request, &package) {
        (None, _) => Some("message does not describe a missing module".to_string()),
        (Some(request), None) => Some(format!("'{request}' is not an installable package")),
        (Some(_), Some(_)) => None,
    };

    let result = ExtractResult {
        ok: package.is_some(),
        request,
        package,
        error,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
    } else if let Some(package) = &result.package {
        println!("{package}");
    } else if let Some(error) = &result.error {
        eprintln!("error: {error}");
    }

    if !result.ok {
        std::process::exit(1);
    }
    Ok(())
}
