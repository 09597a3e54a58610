// src/shutdown.rs

//! Cancellation shared by every detector loop, plus OS signal handling.
//!
//! `Shutdown` owns a `watch` channel; each detector holds a cloned
//! [`ShutdownToken`] and checks it at every timer firing. Dropping the
//! `Shutdown` counts as cancellation too.

use tokio::sync::watch;
use tracing::info;

#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Cancel every token handed out so far (and any handed out later).
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                // Sender gone: nobody can keep us running.
                return;
            }
        }
    }
}

/// Wait for Ctrl-C or (on unix) SIGTERM.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received Ctrl-C"),
                    _ = term.recv() => info!("received SIGTERM"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler; Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
                info!("received Ctrl-C");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("received Ctrl-C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn tokens_observe_trigger() {
        let shutdown = Shutdown::new();
        let mut token = shutdown.token();
        assert!(!token.is_cancelled());

        let waiter = tokio::spawn(async move {
            token.cancelled().await;
        });
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("token should resolve after trigger")
            .unwrap();
    }

    #[tokio::test]
    async fn token_created_after_trigger_is_already_cancelled() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut token = shutdown.token();
        assert!(token.is_cancelled());
        token.cancelled().await;
    }

    #[tokio::test]
    async fn dropping_shutdown_cancels() {
        let shutdown = Shutdown::new();
        let mut token = shutdown.token();
        drop(shutdown);
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("dropped sender should release waiters");
    }
}
