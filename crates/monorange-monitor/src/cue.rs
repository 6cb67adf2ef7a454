use std::io::Write;
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

use log::debug;

use crate::AudioCue;

/// Plays cues on a background thread.
///
/// Requests go through a channel with room for one pending cue. When a cue is
/// still queued, further requests are dropped instead of blocking the frame
/// loop.
pub struct CueWorker {
    tx: Option<SyncSender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CueWorker {
    pub fn spawn<F>(mut play: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, rx) = sync_channel::<()>(1);
        let handle = thread::spawn(move || {
            while rx.recv().is_ok() {
                play();
            }
        });
        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Queue a cue. Returns `false` when it was dropped.
    pub fn try_play(&self) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                debug!("cue dropped, previous one still pending");
                false
            }
            Err(TrySendError::Disconnected(())) => false,
        }
    }
}

impl AudioCue for CueWorker {
    fn play(&self) {
        self.try_play();
    }
}

impl Drop for CueWorker {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Terminal bell (`BEL`) written to stderr from a [`CueWorker`].
pub fn terminal_bell() -> CueWorker {
    CueWorker::spawn(|| {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::sync::Arc;

    #[test]
    fn every_queued_cue_is_played() {
        let count = Arc::new(AtomicUsize::new(0));
        let worker = {
            let count = Arc::clone(&count);
            CueWorker::spawn(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        assert!(worker.try_play());
        drop(worker);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn busy_worker_drops_extra_cues() {
        let (started_tx, started_rx) = channel::<()>();
        let (release_tx, release_rx) = channel::<()>();
        let count = Arc::new(AtomicUsize::new(0));

        let worker = {
            let count = Arc::clone(&count);
            CueWorker::spawn(move || {
                let _ = started_tx.send(());
                let _ = release_rx.recv();
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert!(worker.try_play());
        // The worker is now inside the first cue, the channel is empty.
        started_rx.recv().unwrap();
        assert!(worker.try_play());
        assert!(!worker.try_play());

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        drop(worker);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
