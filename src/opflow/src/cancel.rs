//! Flow teardown signal.
//!
//! A [`CancelSignal`] is owned by whoever may tear a flow down; every component that mutates
//! flow state holds a [`Liveness`] and checks it first. Dropping the signal counts as
//! cancellation.

use tokio::sync::watch;

pub fn channel() -> (CancelSignal, Liveness) {
    let (tx, rx) = watch::channel(false);
    (CancelSignal(tx), Liveness(Some(rx)))
}

#[derive(Debug)]
pub struct CancelSignal(watch::Sender<bool>);

impl CancelSignal {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

#[derive(Clone, Debug)]
pub struct Liveness(Option<watch::Receiver<bool>>);

impl Liveness {
    /// Never torn down; for callers driving a component directly.
    pub fn detached() -> Self {
        Self(None)
    }

    pub fn is_live(&self) -> bool {
        match &self.0 {
            None => true,
            Some(rx) => rx.has_changed().is_ok() && !*rx.borrow(),
        }
    }

    /// Resolves once the flow is cancelled or its signal dropped.
    pub async fn cancelled(&mut self) {
        let Some(rx) = self.0.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
