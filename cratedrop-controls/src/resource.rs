use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// How much of the loaded stream the resource can serve, in increasing order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    #[default]
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

impl ReadyState {
    /// Enough data for playback to begin at the current position.
    pub fn can_play(self) -> bool {
        self >= ReadyState::HaveCurrentData
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    MetadataLoaded { duration: Option<Duration> },
    DataAvailable,
    CanPlay,
    TimeUpdate { position: Duration },
    Ended,
    Error { message: String },
}

/// The single audio output the player drives. Commands return immediately;
/// outcomes are reported as [`ResourceEvent`]s.
pub trait MediaResource {
    fn load(&mut self, stream_url: &str);
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    fn seek(&mut self, position: Duration) -> Result<()>;
    fn ready_state(&self) -> ReadyState;
}

#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self) -> Result<()>;
}
