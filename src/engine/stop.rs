//! Cooperative stop signal shared by runners, sessions and the scheduler.

use std::sync::Arc;
use tokio::sync::watch;

/// Owner side. Dropping it does not count as a stop request.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

/// Listener side, cheap to clone into every session.
#[derive(Debug, Clone)]
pub struct StopListener {
    rx: watch::Receiver<bool>,
    _owner: Option<Arc<watch::Sender<bool>>>,
}

impl StopSignal {
    pub fn new() -> (Self, StopListener) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, StopListener { rx, _owner: None })
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn listener(&self) -> StopListener {
        StopListener {
            rx: self.tx.subscribe(),
            _owner: None,
        }
    }
}

impl StopListener {
    /// A listener that never fires.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _owner: Some(Arc::new(tx)),
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop has been requested. Pends forever if the
    /// signal owner is dropped without stopping.
    pub async fn stopped(&mut self) {
        if self.rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
