use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::{BrowserLauncher, BrowserPage, LaunchOptions};

/// One async lock per profile directory.
///
/// Chrome refuses to share a `--user-data-dir` between two running
/// instances, so sessions on the same profile are handed out one at a time.
#[derive(Default)]
pub struct ProfileLocks {
    locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl ProfileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, dir: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(dir.to_path_buf())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Waits for the profile lease (if any) and launches a browser holding it.
    pub async fn acquire(
        &self,
        launcher: &dyn BrowserLauncher,
        options: &LaunchOptions,
    ) -> Result<BrowserSession> {
        let lease = match &options.profile_dir {
            Some(dir) => {
                let lock = self.lock_for(dir);
                if lock.try_lock().is_err() {
                    info!("Profile {:?} is in use, waiting for the current session to finish", dir);
                }
                Some(lock.lock_owned().await)
            }
            None => None,
        };

        let page = launcher.launch(options).await?;
        debug!("Browser session opened");

        Ok(BrowserSession {
            page: Some(page),
            lease,
        })
    }
}

/// A launched browser plus the profile lease it runs under.
///
/// `close` must be awaited on every exit path. Dropping an unclosed session
/// schedules the close on the current runtime and logs a warning.
pub struct BrowserSession {
    page: Option<Box<dyn BrowserPage>>,
    lease: Option<OwnedMutexGuard<()>>,
}

impl BrowserSession {
    pub fn page(&self) -> &dyn BrowserPage {
        // Only `close` and `drop` take the page, and both consume the session.
        self.page
            .as_deref()
            .expect("browser session used after close")
    }

    /// Quits the browser. The profile directory is left on disk.
    pub async fn close(mut self) -> Result<()> {
        match self.page.take() {
            Some(page) => {
                let result = page.close().await;
                debug!("Browser session closed");
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };

        warn!("Browser session dropped without close, closing in background");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let lease = self.lease.take();
                handle.spawn(async move {
                    if let Err(e) = page.close().await {
                        warn!("Background browser close failed: {}", e);
                    }
                    drop(lease);
                });
            }
            Err(_) => warn!("No async runtime available, browser process may be left running"),
        }
    }
}
