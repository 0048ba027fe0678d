//! Interrupt handling.
//!
//! A single background task turns SIGINT, SIGTERM and SIGHUP into a flag
//! that every part of the session can observe. The flag never resets: once
//! a run is interrupted it stays interrupted.

use tokio::sync::watch;

/// Sending half: flips the interrupt flag.
#[derive(Debug, Clone)]
pub struct Interrupter {
    tx: watch::Sender<bool>,
}

impl Interrupter {
    pub fn interrupt(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving half: cheap to clone, polled between tests and awaited while a
/// child runs.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    rx: watch::Receiver<bool>,
}

impl InterruptHandle {
    pub fn is_interrupted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the flag is set. Pending forever if every
    /// [`Interrupter`] was dropped without interrupting.
    pub async fn interrupted(&mut self) {
        if self.rx.wait_for(|flag| *flag).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Create a linked interrupter/handle pair.
pub fn channel() -> (Interrupter, InterruptHandle) {
    let (tx, rx) = watch::channel(false);
    (Interrupter { tx }, InterruptHandle { rx })
}

/// A handle that is never interrupted.
pub fn never() -> InterruptHandle {
    let (_, handle) = channel();
    handle
}

/// Install the process signal listener and return its handle.
#[cfg(unix)]
pub fn install() -> std::io::Result<InterruptHandle> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let (interrupter, handle) = channel();

    tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                Some(()) = sigint.recv() => "SIGINT",
                Some(()) = sigterm.recv() => "SIGTERM",
                Some(()) = sighup.recv() => "SIGHUP",
                else => break,
            };
            tracing::info!(signal = name, "interrupt received");
            interrupter.interrupt();
        }
    });

    Ok(handle)
}

#[cfg(not(unix))]
pub fn install() -> std::io::Result<InterruptHandle> {
    let (interrupter, handle) = channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            interrupter.interrupt();
        }
    });
    Ok(handle)
}
