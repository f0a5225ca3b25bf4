use tokio::sync::broadcast::{error::TryRecvError, Receiver, Sender};

/// Broadcasts a stop signal to background tasks owned by the listener, such as the
/// publisher's delivery task. The host tears the listener down exactly once, at which
/// point every listener created from this handle is released.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Sender<()>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: tokio::sync::broadcast::channel(1).0,
        }
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.sender.send(()) {
            // Nothing is listening, which happens if the task has already exited.
            log::debug!("Failed to send shutdown signal: {e:?}");
        }
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

/// The receiving end of a [ShutdownHandle], handed to a single background task.
#[derive(Debug)]
pub struct DelegatedShutdownListener {
    receiver: Receiver<()>,
}

impl DelegatedShutdownListener {
    fn new(receiver: Receiver<()>) -> Self {
        Self { receiver }
    }

    /// Point in time check whether the shutdown signal has been sent. A closed channel
    /// counts as a shutdown because the handle has been dropped.
    pub fn should_shutdown(&mut self) -> bool {
        matches!(self.receiver.try_recv(), Ok(()) | Err(TryRecvError::Closed))
    }

    /// Wait for the shutdown signal. Safe to race against other futures in a `select!`
    /// so that in-progress work can be cancelled.
    pub async fn wait_for_shutdown(&mut self) {
        // Also returns when the channel closes, for the same reason as `should_shutdown`.
        let _ = self.receiver.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_sees_shutdown_signal() {
        let handle = ShutdownHandle::new();
        let mut listener = handle.new_listener();

        assert!(!listener.should_shutdown());
        handle.shutdown();
        assert!(listener.should_shutdown());
    }

    #[tokio::test]
    async fn test_dropped_handle_counts_as_shutdown() {
        let handle = ShutdownHandle::new();
        let mut listener = handle.new_listener();

        drop(handle);
        listener.wait_for_shutdown().await;
        assert!(listener.should_shutdown());
    }
}
