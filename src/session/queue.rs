use std::fmt;

use crate::media::ImageAsset;

/// Unique per submission for the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Pending,
    Processing,
    Errored,
}

#[derive(Debug)]
pub struct QueueEntry {
    pub id: EntryId,
    pub asset: ImageAsset,
    pub status: QueueStatus,
}

#[derive(Debug)]
pub enum QueueEvent {
    Submitted(ImageAsset),
    Completed(EntryId),
    Failed(EntryId),
}

#[derive(Debug)]
pub enum QueueEffect {
    /// Start the remote analysis call for this entry.
    Analyze(EntryId),
    /// The entry left the queue after a successful analysis; the caller turns
    /// it into a history entry and then re-invokes [`UploadQueue::drain`].
    Promoted(QueueEntry),
}

/// FIFO analysis queue. Core invariant: at most one entry is `Processing` and
/// at most one remote call is in flight, guarded by the `analyzing` flag.
/// Errored entries are terminal — kept for visibility, never retried, and
/// never blocking other entries.
#[derive(Debug, Default)]
pub struct UploadQueue {
    entries: Vec<QueueEntry>,
    analyzing: bool,
    next_id: u64,
}

impl UploadQueue {
    pub fn new() -> Self {
        UploadQueue::default()
    }

    /// Appends a pending entry and immediately tries to drain.
    pub fn enqueue(&mut self, asset: ImageAsset) -> (EntryId, Option<QueueEffect>) {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        self.entries.push(QueueEntry {
            id,
            asset,
            status: QueueStatus::Pending,
        });
        (id, self.drain())
    }

    /// The transition function: applies one event and returns at most one
    /// effect for the scheduling loop to execute.
    pub fn apply(&mut self, event: QueueEvent) -> Option<QueueEffect> {
        match event {
            QueueEvent::Submitted(asset) => self.enqueue(asset).1,
            QueueEvent::Completed(id) => {
                self.analyzing = false;
                let index = self
                    .entries
                    .iter()
                    .position(|entry| entry.id == id && entry.status == QueueStatus::Processing)?;
                Some(QueueEffect::Promoted(self.entries.remove(index)))
            }
            QueueEvent::Failed(id) => {
                self.analyzing = false;
                if let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) {
                    entry.status = QueueStatus::Errored;
                }
                self.drain()
            }
        }
    }

    /// Idempotent and safe to call redundantly: a no-op while a call is in
    /// flight or when nothing is pending. Otherwise moves the oldest pending
    /// entry to `Processing` and asks for its analysis.
    pub fn drain(&mut self) -> Option<QueueEffect> {
        if self.analyzing
            || self
                .entries
                .iter()
                .any(|entry| entry.status == QueueStatus::Processing)
        {
            return None;
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.status == QueueStatus::Pending)?;
        entry.status = QueueStatus::Processing;
        self.analyzing = true;
        Some(QueueEffect::Analyze(entry.id))
    }

    pub fn get(&self, id: EntryId) -> Option<&QueueEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn is_analyzing(&self) -> bool {
        self.analyzing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset() -> ImageAsset {
        ImageAsset::from_bytes(vec![0u8; 8])
    }

    fn processing_count(queue: &UploadQueue) -> usize {
        queue
            .entries()
            .iter()
            .filter(|entry| entry.status == QueueStatus::Processing)
            .count()
    }

    #[test]
    fn two_submissions_drain_in_fifo_order() {
        let mut queue = UploadQueue::new();

        let (first, effect) = queue.enqueue(asset());
        assert!(matches!(effect, Some(QueueEffect::Analyze(id)) if id == first));

        let (second, effect) = queue.enqueue(asset());
        assert!(effect.is_none(), "second submission must wait its turn");
        assert_eq!(queue.get(first).map(|e| e.status), Some(QueueStatus::Processing));
        assert_eq!(queue.get(second).map(|e| e.status), Some(QueueStatus::Pending));
        assert_eq!(processing_count(&queue), 1);

        let promoted = queue.apply(QueueEvent::Completed(first));
        assert!(matches!(promoted, Some(QueueEffect::Promoted(entry)) if entry.id == first));
        assert!(queue.get(first).is_none(), "completed entry leaves the queue");

        let effect = queue.drain();
        assert!(matches!(effect, Some(QueueEffect::Analyze(id)) if id == second));
        assert_eq!(processing_count(&queue), 1);
    }

    #[test]
    fn drain_is_a_no_op_while_a_call_is_in_flight() {
        let mut queue = UploadQueue::new();
        queue.enqueue(asset());
        queue.enqueue(asset());

        assert!(queue.is_analyzing());
        assert!(queue.drain().is_none());
        assert!(queue.drain().is_none());
        assert_eq!(processing_count(&queue), 1);
    }

    #[test]
    fn failed_entries_are_terminal_and_do_not_block() {
        let mut queue = UploadQueue::new();
        let (first, _) = queue.enqueue(asset());
        let (second, _) = queue.enqueue(asset());

        let effect = queue.apply(QueueEvent::Failed(first));
        assert_eq!(queue.get(first).map(|e| e.status), Some(QueueStatus::Errored));
        assert!(
            matches!(effect, Some(QueueEffect::Analyze(id)) if id == second),
            "failure drains straight into the next pending entry"
        );

        queue.apply(QueueEvent::Completed(second));
        assert_eq!(queue.entries().len(), 1);
        assert_eq!(queue.get(first).map(|e| e.status), Some(QueueStatus::Errored));
        assert!(queue.drain().is_none(), "errored entries are never retried");
    }

    #[test]
    fn completing_an_unknown_entry_yields_nothing() {
        let mut queue = UploadQueue::new();
        let (first, _) = queue.enqueue(asset());
        queue.apply(QueueEvent::Completed(first));
        assert!(queue.apply(QueueEvent::Completed(first)).is_none());
    }
}
