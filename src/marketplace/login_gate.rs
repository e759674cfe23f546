use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Why the procedure stopped for a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginGate {
    /// The browser was redirected to a login page.
    LoginPage,
    /// The "log in to continue" popup is covering the page.
    LoginPopup,
}

impl LoginGate {
    pub fn prompt(&self) -> &'static str {
        match self {
            LoginGate::LoginPage => "🔐 Please log into Facebook in the opened browser window.",
            LoginGate::LoginPopup => "🔐 Login popup detected! Please complete manual login.",
        }
    }
}

/// Login page redirects win over the popup when both are present.
pub fn detect_login_gate(current_url: &str, popup_present: bool) -> Option<LoginGate> {
    if current_url.contains("login") {
        Some(LoginGate::LoginPage)
    } else if popup_present {
        Some(LoginGate::LoginPopup)
    } else {
        None
    }
}

/// Parks a scrape until an operator confirms the login is done.
#[async_trait]
pub trait LoginNotifier: Send + Sync {
    async fn await_login(&self, gate: LoginGate) -> Result<()>;
}

type ConfirmationReader = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Waits for ENTER on the terminal that runs the process.
///
/// At most one blocking read is in flight. A wait that is cancelled leaves
/// its read pending and the next login wait picks it up, so a later ENTER
/// is never consumed on behalf of a scrape that is gone.
pub struct ConsoleNotifier {
    read_confirmation: ConfirmationReader,
    pending: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self::with_reader(read_stdin_confirmation)
    }

    pub fn with_reader(read: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        Self {
            read_confirmation: Arc::new(read),
            pending: Mutex::new(None),
        }
    }
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

fn read_stdin_confirmation() -> Result<()> {
    print!("✅ After you finish logging in, press ENTER here to continue...");
    io::stdout()
        .flush()
        .context("Failed to flush stdout while prompting for login")?;

    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read login confirmation")?;
    if read == 0 {
        anyhow::bail!("stdin closed before login was confirmed");
    }
    Ok(())
}

#[async_trait]
impl LoginNotifier for ConsoleNotifier {
    async fn await_login(&self, gate: LoginGate) -> Result<()> {
        println!("{}", gate.prompt());

        let mut pending = self.pending.lock().await;
        if pending.is_some() {
            debug!("Reusing login confirmation read left by a cancelled scrape");
        }
        let read = self.read_confirmation.clone();
        let handle = pending.get_or_insert_with(|| tokio::task::spawn_blocking(move || read()));

        let result = handle.await;
        *pending = None;
        result.context("Login prompt task panicked")?
    }
}

/// Resumed from outside the scrape, e.g. by `POST /login/resume`.
#[derive(Default)]
pub struct ChannelNotifier {
    notify: Notify,
    waiting: AtomicUsize,
}

/// Counts one parked scrape for as long as it is alive.
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ChannelNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::SeqCst) > 0
    }

    /// Wakes every parked scrape. Returns false when nothing was waiting.
    pub fn resume(&self) -> bool {
        if !self.is_waiting() {
            return false;
        }
        self.notify.notify_waiters();
        true
    }
}

#[async_trait]
impl LoginNotifier for ChannelNotifier {
    async fn await_login(&self, gate: LoginGate) -> Result<()> {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before publishing `waiting` so a resume in between is not lost.
        notified.as_mut().enable();

        let waiting = WaitingGuard::enter(&self.waiting);
        info!("{} Waiting for POST /login/resume ...", gate.prompt());
        notified.await;
        drop(waiting);

        info!("Login confirmed, resuming scrape");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_detect_login_gate() {
        assert_eq!(
            detect_login_gate("https://www.facebook.com/login/?next=x", false),
            Some(LoginGate::LoginPage)
        );
        assert_eq!(
            detect_login_gate("https://www.facebook.com/marketplace", true),
            Some(LoginGate::LoginPopup)
        );
        assert_eq!(
            detect_login_gate("https://www.facebook.com/login", true),
            Some(LoginGate::LoginPage)
        );
        assert_eq!(
            detect_login_gate("https://www.facebook.com/marketplace", false),
            None
        );
    }

    #[tokio::test]
    async fn test_resume_without_waiter_is_rejected() {
        let notifier = ChannelNotifier::new();
        assert!(!notifier.is_waiting());
        assert!(!notifier.resume());
    }

    #[tokio::test]
    async fn test_channel_notifier_resumes_waiter() {
        let notifier = Arc::new(ChannelNotifier::new());
        let waiter = {
            let notifier = notifier.clone();
            tokio::spawn(async move { notifier.await_login(LoginGate::LoginPopup).await })
        };

        for _ in 0..100 {
            if notifier.is_waiting() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(notifier.is_waiting());
        assert!(notifier.resume());

        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter was not resumed")
            .unwrap()
            .unwrap();
        assert!(!notifier.is_waiting());
    }

    #[tokio::test]
    async fn test_cancelled_wait_is_no_longer_counted() {
        let notifier = Arc::new(ChannelNotifier::new());
        let waiter = {
            let notifier = notifier.clone();
            tokio::spawn(async move { notifier.await_login(LoginGate::LoginPage).await })
        };

        for _ in 0..100 {
            if notifier.is_waiting() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(notifier.is_waiting());

        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());
        assert!(!notifier.is_waiting());
        assert!(!notifier.resume());
    }

    #[tokio::test]
    async fn test_console_notifier_adopts_read_of_cancelled_wait() {
        let reads = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel::<()>();
        let rx = std::sync::Mutex::new(rx);
        let notifier = {
            let reads = reads.clone();
            Arc::new(ConsoleNotifier::with_reader(move || {
                reads.fetch_add(1, Ordering::SeqCst);
                rx.lock()
                    .unwrap()
                    .recv()
                    .context("confirmation input closed")?;
                Ok(())
            }))
        };

        let first = {
            let notifier = notifier.clone();
            tokio::spawn(async move { notifier.await_login(LoginGate::LoginPopup).await })
        };
        for _ in 0..100 {
            if reads.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        first.abort();
        let _ = first.await;

        let second = {
            let notifier = notifier.clone();
            tokio::spawn(async move { notifier.await_login(LoginGate::LoginPopup).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), second)
            .await
            .expect("second wait did not finish")
            .unwrap()
            .unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }
}
