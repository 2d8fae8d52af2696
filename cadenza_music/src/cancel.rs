// Cooperative cancellation and progress reporting for long generations.
//
// A `CancelToken` is a shared flag (the relay server's `keep_running`
// pattern, inverted). Generators check it before every note and the
// orchestrator before every part; once set, generation stops with
// `MusicError::Cancelled` and no partial document is produced.
//
// Progress goes out through a `ProgressSink`, so a caller running generation
// on a worker thread can forward updates to a UI without blocking it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use crate::error::{MusicError, Result};

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone of the token observes it.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(MusicError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    Started,
    Finished,
}

/// One progress update from the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub part_index: usize,
    pub part_count: usize,
    pub part_name: String,
    pub stage: ProgressStage,
}

impl Progress {
    /// Completion as a percentage, counting finished parts only.
    pub fn percent(&self) -> u8 {
        if self.part_count == 0 {
            return 100;
        }
        let done = match self.stage {
            ProgressStage::Started => self.part_index,
            ProgressStage::Finished => self.part_index + 1,
        };
        (done * 100 / self.part_count) as u8
    }
}

/// Receiver of progress updates. Must not block for long; parts running in
/// parallel report from worker threads.
pub trait ProgressSink: Sync {
    fn report(&self, progress: Progress);
}

/// Discards all updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: Progress) {}
}

impl<F: Fn(Progress) + Sync> ProgressSink for F {
    fn report(&self, progress: Progress) {
        self(progress)
    }
}

/// Forwards updates over an mpsc channel. A closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelProgress(pub Sender<Progress>);

impl ProgressSink for ChannelProgress {
    fn report(&self, progress: Progress) {
        let _ = self.0.send(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(MusicError::Cancelled)));
    }

    #[test]
    fn channel_sink_delivers_updates() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelProgress(tx);
        sink.report(Progress {
            part_index: 0,
            part_count: 2,
            part_name: "Piano".into(),
            stage: ProgressStage::Finished,
        });
        let got = rx.recv().unwrap();
        assert_eq!(got.part_name, "Piano");
        assert_eq!(got.percent(), 50);
    }

    #[test]
    fn closure_sink_is_called() {
        let seen = std::sync::Mutex::new(Vec::new());
        let sink = |p: Progress| seen.lock().unwrap().push(p.part_index);
        sink.report(Progress {
            part_index: 3,
            part_count: 4,
            part_name: String::new(),
            stage: ProgressStage::Started,
        });
        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }
}
