//! In-flight install tracking.
//!
//! One [`InstallCoordinator`] belongs to one plugin instance. It guarantees at
//! most one outstanding install per package name; duplicate requests made
//! while an install is running are dropped, not queued.

use crate::installer::{InstallOptions, InstallSpec, Installer};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What `install` decided to do.
#[derive(Debug)]
pub enum Dispatch {
    /// Nothing to install.
    Skipped,
    /// An install for the same name is already running.
    Suppressed,
    /// A new install was started. Completes when the in-flight marker is cleared.
    Started(JoinHandle<()>),
}

impl Dispatch {
    #[must_use]
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

#[derive(Debug, Default)]
struct InFlight {
    names: Mutex<HashSet<String>>,
    drained: Notify,
}

/// Removes a name from the in-flight set when the install task ends,
/// including when the installer future panics.
struct Marker {
    state: Arc<InFlight>,
    name: String,
}

impl Drop for Marker {
    fn drop(&mut self) {
        if let Ok(mut names) = self.state.names.lock() {
            names.remove(&self.name);
        }
        self.state.drained.notify_waiters();
    }
}

/// Deduplicating front end to an [`Installer`].
#[derive(Clone)]
pub struct InstallCoordinator {
    installer: Arc<dyn Installer>,
    state: Arc<InFlight>,
}

impl InstallCoordinator {
    pub fn new(installer: Arc<dyn Installer>) -> Self {
        Self {
            installer,
            state: Arc::new(InFlight::default()),
        }
    }

    pub fn installer(&self) -> &Arc<dyn Installer> {
        &self.installer
    }

    /// Canonical package name to install for `request`, if any.
    #[must_use]
    pub fn check(&self, request: Option<&str>) -> Option<String> {
        let request = request.map(str::trim).filter(|r| !r.is_empty())?;
        self.installer.check(request)
    }

    /// Start installing `package` unless it is `None` or already in flight.
    ///
    /// Never waits for the install. Failures are logged and clear the marker.
    pub fn install(&self, package: Option<String>, options: InstallOptions) -> Dispatch {
        let Some(package) = package.filter(|p| !p.is_empty()) else {
            return Dispatch::Skipped;
        };

        let Ok(runtime) = Handle::try_current() else {
            warn!(package = %package, "No async runtime, install skipped");
            return Dispatch::Skipped;
        };

        {
            let Ok(mut names) = self.state.names.lock() else {
                return Dispatch::Skipped;
            };
            if !names.insert(package.clone()) {
                debug!(package = %package, "Install already in flight");
                return Dispatch::Suppressed;
            }
        }

        let marker = Marker {
            state: Arc::clone(&self.state),
            name: package.clone(),
        };
        info!(package = %package, dev = options.dev, "Installing");
        let install = self.installer.install(InstallSpec { package, options });

        Dispatch::Started(runtime.spawn(async move {
            match install.await {
                Ok(()) => info!(package = %marker.name, "Installed"),
                Err(e) => warn!(
                    package = %marker.name,
                    code = e.code(),
                    "Install failed: {}",
                    e.message()
                ),
            }
        }))
    }

    /// Whether an install for `package` is outstanding.
    #[must_use]
    pub fn is_installing(&self, package: &str) -> bool {
        self.state
            .names
            .lock()
            .map(|names| names.contains(package))
            .unwrap_or(false)
    }

    /// Number of outstanding installs.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state.names.lock().map(|n| n.len()).unwrap_or(0)
    }

    /// Wait until no install is outstanding.
    pub async fn idle(&self) {
        loop {
            let drained = self.state.drained.notified();
            if self.in_flight() == 0 {
                return;
            }
            drained.await;
        }
    }
}

impl std::fmt::Debug for InstallCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallCoordinator")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}
