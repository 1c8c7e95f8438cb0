use tokio::sync::watch;
use tokio::task::JoinHandle;
use voicequote_core::intake::Snapshot;

/// Write side of the snapshot channel. Owned by the session runtime.
#[derive(Debug)]
pub struct SnapshotPublisher {
    sender: watch::Sender<Snapshot>,
}

impl SnapshotPublisher {
    pub fn new(initial: Snapshot) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Publishing never waits on observers and succeeds with none attached.
    pub fn publish(&self, snapshot: Snapshot) {
        self.sender.send_replace(snapshot);
    }

    pub fn observer(&self) -> PayloadObserver {
        PayloadObserver { receiver: self.sender.subscribe() }
    }
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new(Snapshot::initial())
    }
}

/// Read-only, current-value view of the session payload.
#[derive(Clone, Debug)]
pub struct PayloadObserver {
    receiver: watch::Receiver<Snapshot>,
}

impl PayloadObserver {
    pub fn current(&self) -> Snapshot {
        self.receiver.borrow().clone()
    }

    /// A receiver whose first `changed()` resolves immediately with the
    /// current snapshot.
    pub fn changes(&self) -> watch::Receiver<Snapshot> {
        let mut receiver = self.receiver.clone();
        receiver.mark_changed();
        receiver
    }

    /// Delivers the current snapshot, then every later one in order. A lagging
    /// callback sees only the latest of several rapid publishes.
    pub fn subscribe<F>(&self, mut on_next: F) -> Subscription
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        let mut receiver = self.receiver.clone();
        let task = tokio::spawn(async move {
            loop {
                let snapshot = receiver.borrow_and_update().clone();
                on_next(snapshot);
                if receiver.changed().await.is_err() {
                    break;
                }
            }
        });
        Subscription { task }
    }
}

/// Delivery stops when this is dropped or unsubscribed.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {}

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
