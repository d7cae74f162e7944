//! Cooperative shutdown shared by the listener and scans.
//!
//! Producers check the signal between units of work (one event, one page) and while waiting,
//! never in the middle of an upsert.

use tokio::sync::watch;

/// Fires the shutdown. Dropping the trigger without firing leaves receivers running.
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Cloneable receiver side handed to every producer.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl ShutdownSignal {
    /// A signal that never fires, for one-shot runs and tests.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // the receiver keeps reading `false` once the sender is gone
        drop(tx);
        Self { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown fires; pends forever if the trigger is dropped unfired.
    pub async fn triggered(&mut self) {
        let fired = self.rx.wait_for(|stop| *stop).await.is_ok();
        if !fired {
            std::future::pending::<()>().await;
        }
    }
}
