use cratedrop_models::{Context, QueueItem};
use tracing::instrument;

/// Shared playback queue. `index` always addresses an entry of `queue`
/// unless the queue is empty, in which case it is zero.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Tracklist {
    pub(crate) queue: Vec<QueueItem>,
    pub(crate) index: usize,
    pub(crate) is_playing: bool,
    pub(crate) context: Option<Context>,
}

impl Tracklist {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn queue(&self) -> &Vec<QueueItem> {
        &self.queue
    }

    pub fn total(&self) -> usize {
        self.queue.len()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    #[instrument(skip(self))]
    pub fn current_item(&self) -> Option<&QueueItem> {
        self.queue.get(self.index)
    }

    pub(crate) fn replace(&mut self, item: QueueItem) {
        self.queue = vec![item];
        self.index = 0;
    }

    pub(crate) fn append(&mut self, item: QueueItem) {
        self.queue.push(item);
    }

    pub(crate) fn skip_forward(&mut self) -> bool {
        if self.index + 1 < self.queue.len() {
            self.index += 1;
            return true;
        }
        false
    }

    pub(crate) fn skip_backward(&mut self) -> bool {
        if self.index > 0 {
            self.index -= 1;
            return true;
        }
        false
    }

    pub(crate) fn refill(&mut self, items: Vec<QueueItem>, advance: bool) {
        self.index = if advance && items.len() > 1 { 1 } else { 0 };
        self.queue = items;
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
        self.index = 0;
    }
}
