use tokio::sync::watch;

/// Cooperative stop condition for background tasks.
///
/// Fires when either the owning exchange context shuts down or the owning
/// component (market, trader) is uninitialized on its own.
#[derive(Debug, Clone)]
pub struct StopSignal {
    context: watch::Receiver<bool>,
    local: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn new(context: watch::Receiver<bool>, local: watch::Receiver<bool>) -> Self {
        Self { context, local }
    }

    pub fn is_stopped(&self) -> bool {
        *self.context.borrow() || *self.local.borrow()
    }

    /// Resolve once stopped. A dropped sender counts as a stop.
    pub async fn stopped(&mut self) {
        loop {
            if self.is_stopped() {
                return;
            }
            tokio::select! {
                r = self.context.changed() => if r.is_err() { return },
                r = self.local.changed() => if r.is_err() { return },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_either_side_stops() {
        let (ctx_tx, ctx_rx) = watch::channel(false);
        let (local_tx, local_rx) = watch::channel(false);
        let mut signal = StopSignal::new(ctx_rx.clone(), local_rx);
        assert!(!signal.is_stopped());

        local_tx.send_replace(true);
        signal.stopped().await;
        assert!(signal.is_stopped());

        let (_other_tx, other_rx) = watch::channel(false);
        let mut signal = StopSignal::new(ctx_rx, other_rx);
        ctx_tx.send_replace(true);
        signal.stopped().await;
    }

    #[tokio::test]
    async fn test_dropped_sender_stops() {
        let (ctx_tx, ctx_rx) = watch::channel(false);
        let (_local_tx, local_rx) = watch::channel(false);
        let mut signal = StopSignal::new(ctx_rx, local_rx);
        drop(ctx_tx);
        signal.stopped().await;
    }
}
