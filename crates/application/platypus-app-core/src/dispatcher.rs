//! Marshaling from background work onto the thread that owns view state.
//!
//! Background code holds a [`DispatcherHandle`] and posts messages; the owning
//! thread drains them with [`UiDispatcher::pump`]. One FIFO queue backs each
//! dispatcher, so messages from a single sender are applied in send order.

use std::sync::mpsc;
use std::time::Duration;

pub struct UiDispatcher<M> {
    tx: mpsc::Sender<M>,
    rx: mpsc::Receiver<M>,
}

pub struct DispatcherHandle<M> {
    tx: mpsc::Sender<M>,
}

impl<M> Clone for DispatcherHandle<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M> std::fmt::Debug for DispatcherHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle").finish_non_exhaustive()
    }
}

impl<M> DispatcherHandle<M> {
    /// Queues `message` for the owning thread. Returns `false` once the
    /// dispatcher has been dropped; the message is discarded in that case.
    pub fn post(&self, message: M) -> bool {
        self.tx.send(message).is_ok()
    }

    /// A handle whose dispatcher is already gone. Every post is discarded.
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::channel();
        Self { tx }
    }
}

impl<M> Default for UiDispatcher<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> UiDispatcher<M> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub fn handle(&self) -> DispatcherHandle<M> {
        DispatcherHandle {
            tx: self.tx.clone(),
        }
    }

    /// Runs `handler` for every queued message, oldest first, without blocking.
    pub fn pump(&self, mut handler: impl FnMut(M)) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.rx.try_recv() {
            handler(message);
            handled += 1;
        }
        handled
    }

    /// Blocks up to `timeout` for the first message, then drains the rest.
    pub fn wait_and_pump(&self, timeout: Duration, mut handler: impl FnMut(M)) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(first) => {
                handler(first);
                1 + self.pump(handler)
            }
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_from_one_sender_keep_their_order() {
        let dispatcher = UiDispatcher::new();
        let handle = dispatcher.handle();
        let worker = std::thread::spawn(move || {
            for i in 0..100u32 {
                assert!(handle.post(i));
            }
        });
        worker.join().unwrap();

        let mut seen = Vec::new();
        assert_eq!(dispatcher.pump(|m| seen.push(m)), 100);
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn post_after_teardown_is_ignored() {
        let dispatcher = UiDispatcher::<&'static str>::new();
        let handle = dispatcher.handle();
        drop(dispatcher);
        assert!(!handle.post("late"));
        assert!(!DispatcherHandle::<u8>::disconnected().post(1));
    }

    #[test]
    fn wait_and_pump_times_out_on_empty_queue() {
        let dispatcher = UiDispatcher::<u8>::new();
        let handled = dispatcher.wait_and_pump(Duration::from_millis(5), |_| {});
        assert_eq!(handled, 0);
    }
}
