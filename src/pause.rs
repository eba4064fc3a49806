use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;

/// Sleep that can be interrupted by a shutdown signal.
#[derive(Clone)]
pub struct Pause {
    shutdown: watch::Receiver<bool>,
}

/// Sender half; triggering it wakes every pending [`Pause::wait`].
pub struct PauseHandle {
    tx: watch::Sender<bool>,
}

impl PauseHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Pause {
    pub fn new() -> (PauseHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (PauseHandle { tx }, Self { shutdown: rx })
    }

    /// A pause nothing can cancel, for tests and one-shot tools.
    pub fn uncancellable() -> Self {
        let (_handle, pause) = Self::new();
        pause
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub async fn wait(&self, dur: Duration) -> Result<()> {
        if self.is_cancelled() {
            anyhow::bail!("cancelled");
        }
        let mut rx = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(dur) => Ok(()),
            res = rx.wait_for(|stop| *stop) => match res {
                Ok(_) => anyhow::bail!("cancelled"),
                // Sender gone: nobody can cancel any more.
                Err(_) => {
                    tokio::time::sleep(dur).await;
                    Ok(())
                }
            },
        }
    }
}
