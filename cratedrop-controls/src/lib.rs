pub use cratedrop_models::{Context, QueueItem};
pub use player::{Phase, Player, Progress};
pub use resource::{MediaResource, ReadyState, ResourceEvent};
pub use seek::ProgressBar;
pub use tracklist::Tracklist;
pub use transport::{Refill, TrackSource, Transport};

pub mod client;
pub mod controls;
pub mod error;
pub mod player;
pub mod resource;
pub mod seek;
pub mod sink;
pub mod tracklist;
pub mod transport;

pub type Result<T, E = error::Error> = std::result::Result<T, E>;
