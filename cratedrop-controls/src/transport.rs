use std::sync::Arc;

use async_trait::async_trait;
use cratedrop_models::{Context, QueueItem};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, instrument, warn};

use crate::{Result, error::Error, tracklist::Tracklist};

/// Number of tracks requested whenever the queue runs dry.
pub const REFILL_PAGE_SIZE: u32 = 100;

/// Handle of a background refill. Dropping it detaches the fetch.
pub type Refill = JoinHandle<()>;

#[async_trait]
pub trait TrackSource: Send + Sync {
    async fn tracks(&self, context: &Context, limit: u32) -> Result<Vec<QueueItem>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Mutating side of the shared [`Tracklist`]. Every change is published to
/// subscribers through a watch channel.
#[derive(Clone)]
pub struct Transport {
    tracklist: Arc<watch::Sender<Tracklist>>,
    source: Arc<dyn TrackSource>,
}

impl Transport {
    pub fn new(source: Arc<dyn TrackSource>) -> Self {
        let (tracklist, _) = watch::channel(Tracklist::new());
        Self {
            tracklist: Arc::new(tracklist),
            source,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Tracklist> {
        self.tracklist.subscribe()
    }

    pub fn tracklist(&self) -> Tracklist {
        self.tracklist.borrow().clone()
    }

    /// Queues `item` and requests playback. With `replace` the queue becomes
    /// just this item; otherwise it is appended, unless the queue is empty.
    #[instrument(skip(self, item), fields(track = %item.id))]
    pub fn play(&self, item: QueueItem, replace: bool) {
        self.tracklist.send_modify(|tracklist| {
            if replace || tracklist.queue.is_empty() {
                tracklist.replace(item);
            } else {
                tracklist.append(item);
            }
            tracklist.is_playing = true;
        });
    }

    pub fn toggle(&self) {
        self.tracklist.send_modify(|tracklist| {
            tracklist.is_playing = !tracklist.is_playing;
        });
    }

    pub fn set_context(&self, context: Context) {
        self.tracklist.send_if_modified(|tracklist| {
            if tracklist.context.as_ref() == Some(&context) {
                return false;
            }
            tracklist.context = Some(context);
            true
        });
    }

    /// Moves to the following entry. A queue with at most one entry is
    /// refilled from the current context instead, and the handle of that
    /// fetch is returned.
    pub fn next(&self) -> Option<Refill> {
        let mut refill_from = None;
        self.tracklist.send_if_modified(|tracklist| {
            if tracklist.skip_forward() {
                return true;
            }
            if tracklist.total() <= 1 {
                refill_from = Some(tracklist.total());
            }
            false
        });

        refill_from.map(|len| self.refill(Direction::Forward, len))
    }

    pub fn prev(&self) -> Option<Refill> {
        let mut refill_from = None;
        self.tracklist.send_if_modified(|tracklist| {
            if tracklist.skip_backward() {
                return true;
            }
            if tracklist.total() <= 1 {
                refill_from = Some(tracklist.total());
            }
            false
        });

        refill_from.map(|len| self.refill(Direction::Backward, len))
    }

    fn refill(&self, direction: Direction, prefetch_len: usize) -> Refill {
        let context = self.tracklist.borrow().context.clone().unwrap_or_default();
        let tracklist = self.tracklist.clone();
        let source = self.source.clone();
        debug!(%context, ?direction, "queue exhausted, refilling");

        tokio::spawn(async move {
            // The fetch runs in its own task so a panicking source still
            // counts as a failed refill.
            let fetch = {
                let context = context.clone();
                tokio::spawn(async move { source.tracks(&context, REFILL_PAGE_SIZE).await })
            };
            let fetched = match fetch.await {
                Ok(fetched) => fetched,
                Err(error) => Err(Error::Client {
                    message: error.to_string(),
                }),
            };

            match fetched {
                Ok(items) => {
                    debug!(%context, count = items.len(), "queue refilled");
                    // Decided on the length seen before the fetch. Refills only
                    // start from a queue of at most one entry, so this stays at 0.
                    let advance = direction == Direction::Forward && prefetch_len > 1;
                    tracklist.send_modify(|tracklist| tracklist.refill(items, advance));
                }
                Err(error) => {
                    warn!(%context, "unable to refill queue: {error}");
                    tracklist.send_modify(|tracklist| tracklist.clear());
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::sync::Notify;

    use super::*;

    fn item(id: &str) -> QueueItem {
        QueueItem {
            id: id.to_string(),
            stream_url: format!("http://localhost/api/tracks/{id}/stream"),
            ..Default::default()
        }
    }

    fn ids(tracklist: &Tracklist) -> Vec<String> {
        tracklist.queue().iter().map(|i| i.id.clone()).collect()
    }

    #[derive(Default)]
    struct FakeSource {
        items: Vec<QueueItem>,
        fail: bool,
        panic: bool,
        gate: Option<Arc<Notify>>,
        requests: Mutex<Vec<(Context, u32)>>,
    }

    impl FakeSource {
        fn with(ids: &[&str]) -> Self {
            Self {
                items: ids.iter().map(|id| item(id)).collect(),
                ..Default::default()
            }
        }

        fn requests(&self) -> Vec<(Context, u32)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TrackSource for FakeSource {
        async fn tracks(&self, context: &Context, limit: u32) -> Result<Vec<QueueItem>> {
            self.requests.lock().unwrap().push((context.clone(), limit));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.panic {
                panic!("malformed track record");
            }
            if self.fail {
                return Err(Error::Client {
                    message: "server unavailable".to_string(),
                });
            }
            Ok(self.items.clone())
        }
    }

    fn transport(source: FakeSource) -> (Transport, Arc<FakeSource>) {
        let source = Arc::new(source);
        (Transport::new(source.clone()), source)
    }

    #[test]
    fn play_with_replace_resets_the_queue() {
        let (transport, _) = transport(FakeSource::default());
        transport.play(item("a"), true);
        transport.play(item("b"), false);
        transport.play(item("c"), true);

        let tracklist = transport.tracklist();
        assert_eq!(ids(&tracklist), ["c"]);
        assert_eq!(tracklist.index(), 0);
        assert!(tracklist.is_playing());
    }

    #[test]
    fn play_without_replace_appends_and_keeps_index() {
        let (transport, _) = transport(FakeSource::default());
        transport.play(item("a"), true);
        transport.play(item("b"), false);
        transport.play(item("c"), false);

        let tracklist = transport.tracklist();
        assert_eq!(ids(&tracklist), ["a", "b", "c"]);
        assert_eq!(tracklist.current_item().unwrap().id, "a");
    }

    #[test]
    fn play_without_replace_on_empty_queue_starts_it() {
        let (transport, _) = transport(FakeSource::default());
        transport.play(item("a"), false);

        let tracklist = transport.tracklist();
        assert_eq!(ids(&tracklist), ["a"]);
        assert_eq!(tracklist.index(), 0);
    }

    #[test]
    fn toggle_flips_intent_only() {
        let (transport, _) = transport(FakeSource::default());
        transport.play(item("a"), true);
        transport.toggle();
        assert!(!transport.tracklist().is_playing());
        transport.toggle();

        let tracklist = transport.tracklist();
        assert!(tracklist.is_playing());
        assert_eq!(ids(&tracklist), ["a"]);
    }

    #[test]
    fn set_context_leaves_the_queue_alone() {
        let (transport, _) = transport(FakeSource::default());
        transport.play(item("a"), true);
        transport.set_context(Context::Crate("crate-1".to_string()));

        let tracklist = transport.tracklist();
        assert_eq!(tracklist.context(), Some(&Context::Crate("crate-1".to_string())));
        assert_eq!(ids(&tracklist), ["a"]);
    }

    #[tokio::test]
    async fn next_within_the_queue_does_not_fetch() {
        let (transport, source) = transport(FakeSource::with(&["x"]));
        transport.play(item("a"), true);
        transport.play(item("b"), false);

        assert!(transport.next().is_none());
        assert_eq!(transport.tracklist().current_item().unwrap().id, "b");
        assert!(source.requests().is_empty());
    }

    #[tokio::test]
    async fn next_at_the_end_of_a_longer_queue_is_a_no_op() {
        let (transport, source) = transport(FakeSource::with(&["x"]));
        transport.play(item("a"), true);
        transport.play(item("b"), false);
        transport.next();

        assert!(transport.next().is_none());
        let tracklist = transport.tracklist();
        assert_eq!(tracklist.index(), 1);
        assert_eq!(ids(&tracklist), ["a", "b"]);
        assert!(source.requests().is_empty());
    }

    #[tokio::test]
    async fn prev_at_the_start_of_a_longer_queue_is_a_no_op() {
        let (transport, source) = transport(FakeSource::with(&["x"]));
        transport.play(item("a"), true);
        transport.play(item("b"), false);

        assert!(transport.prev().is_none());
        assert_eq!(transport.tracklist().index(), 0);
        assert!(source.requests().is_empty());
    }

    #[tokio::test]
    async fn next_on_single_entry_refills_from_context() {
        let (transport, source) = transport(FakeSource::with(&["1", "2", "3", "4", "5"]));
        transport.set_context(Context::Crate("digging".to_string()));
        transport.play(item("a"), true);

        let refill = transport.next().expect("refill should start");
        refill.await.unwrap();

        let tracklist = transport.tracklist();
        assert_eq!(ids(&tracklist), ["1", "2", "3", "4", "5"]);
        // The advance check sees the pre-fetch length of 1, so the refilled
        // queue starts at its first entry.
        assert_eq!(tracklist.index(), 0);
        assert_eq!(
            source.requests(),
            [(Context::Crate("digging".to_string()), REFILL_PAGE_SIZE)]
        );
    }

    #[tokio::test]
    async fn refill_without_context_uses_the_whole_library() {
        let (transport, source) = transport(FakeSource::with(&["1", "2"]));

        transport.next().expect("refill should start").await.unwrap();

        assert_eq!(source.requests(), [(Context::All, REFILL_PAGE_SIZE)]);
        assert_eq!(ids(&transport.tracklist()), ["1", "2"]);
    }

    #[tokio::test]
    async fn prev_on_single_entry_refills_and_stays_at_start() {
        let (transport, _) = transport(FakeSource::with(&["1", "2", "3"]));
        transport.play(item("a"), true);

        transport.prev().expect("refill should start").await.unwrap();

        let tracklist = transport.tracklist();
        assert_eq!(ids(&tracklist), ["1", "2", "3"]);
        assert_eq!(tracklist.index(), 0);
    }

    #[tokio::test]
    async fn failed_refill_empties_the_queue() {
        let (transport, _) = transport(FakeSource {
            fail: true,
            ..Default::default()
        });
        transport.play(item("a"), true);

        transport.next().expect("refill should start").await.unwrap();

        let tracklist = transport.tracklist();
        assert!(tracklist.queue().is_empty());
        assert_eq!(tracklist.index(), 0);
        assert!(tracklist.current_item().is_none());
    }

    #[tokio::test]
    async fn panicking_source_still_empties_the_queue() {
        let (transport, _) = transport(FakeSource {
            panic: true,
            ..Default::default()
        });
        transport.play(item("a"), true);

        transport.next().expect("refill should start").await.unwrap();

        let tracklist = transport.tracklist();
        assert!(tracklist.queue().is_empty());
        assert_eq!(tracklist.index(), 0);
    }

    #[tokio::test]
    async fn refill_overwrites_changes_made_while_fetching() {
        let gate = Arc::new(Notify::new());
        let (transport, _) = transport(FakeSource {
            gate: Some(gate.clone()),
            ..FakeSource::with(&["1", "2"])
        });
        transport.play(item("a"), true);

        let refill = transport.next().expect("refill should start");
        tokio::task::yield_now().await;
        transport.play(item("b"), true);
        gate.notify_one();
        refill.await.unwrap();

        // Last write wins: the fetched page replaces the track queued meanwhile.
        assert_eq!(ids(&transport.tracklist()), ["1", "2"]);
    }

    #[tokio::test]
    async fn subscribers_see_every_index_change() {
        let (transport, _) = transport(FakeSource::default());
        let mut rx = transport.subscribe();
        transport.play(item("a"), true);
        transport.play(item("b"), false);
        rx.borrow_and_update();

        transport.next();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().index(), 1);

        transport.next();
        assert!(!rx.has_changed().unwrap());
    }
}
