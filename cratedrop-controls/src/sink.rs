use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use rodio::{Source, decoder::DecoderBuilder};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::Result;
use crate::client::Client;
use crate::error::Error;
use crate::resource::{MediaResource, ReadyState, ResourceEvent};

const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

/// [`MediaResource`] backed by the default audio output. Each load downloads
/// the whole stream, then decodes and plays it from memory.
pub struct RodioResource {
    stream_handle: Option<rodio::OutputStream>,
    sink: Option<Arc<rodio::Sink>>,
    current_download: Option<JoinHandle<()>>,
    client: Arc<Client>,
    events: UnboundedSender<ResourceEvent>,
    ready: Arc<AtomicU8>,
    generation: Arc<AtomicU64>,
}

/// Event sender bound to one load. Anything from a superseded load is dropped.
#[derive(Clone)]
struct LoadHandle {
    events: UnboundedSender<ResourceEvent>,
    ready: Arc<AtomicU8>,
    generation: Arc<AtomicU64>,
    load: u64,
}

impl LoadHandle {
    fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.load
    }

    fn emit(&self, event: ResourceEvent) {
        if self.is_current() {
            let _ = self.events.send(event);
        }
    }

    fn set_ready(&self, state: ReadyState) {
        if self.is_current() {
            self.ready.store(state as u8, Ordering::SeqCst);
        }
    }

    fn fail(&self, error: Error) {
        warn!("stream failed: {error}");
        self.emit(ResourceEvent::Error {
            message: error.to_string(),
        });
    }
}

impl RodioResource {
    pub fn new(client: Arc<Client>, events: UnboundedSender<ResourceEvent>) -> Self {
        Self {
            stream_handle: Default::default(),
            sink: Default::default(),
            current_download: Default::default(),
            client,
            events,
            ready: Default::default(),
            generation: Default::default(),
        }
    }

    fn clear(&mut self) {
        if let Some(handle) = self.current_download.take() {
            handle.abort();
        }
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn open_sink(&mut self) -> Result<Arc<rodio::Sink>> {
        if self.stream_handle.is_none() {
            let mut stream_handle = rodio::OutputStreamBuilder::from_default_device()?.open_stream()?;
            stream_handle.log_on_drop(false);
            self.stream_handle = Some(stream_handle);
        }

        let Some(stream_handle) = &self.stream_handle else {
            return Err(Error::NotLoaded);
        };
        let sink = rodio::Sink::connect_new(stream_handle.mixer());
        sink.pause();
        Ok(Arc::new(sink))
    }
}

impl MediaResource for RodioResource {
    fn load(&mut self, stream_url: &str) {
        self.clear();
        let load = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.ready
            .store(ReadyState::HaveNothing as u8, Ordering::SeqCst);

        let handle = LoadHandle {
            events: self.events.clone(),
            ready: self.ready.clone(),
            generation: self.generation.clone(),
            load,
        };

        let sink = match self.open_sink() {
            Ok(sink) => sink,
            Err(error) => {
                handle.fail(error);
                return;
            }
        };
        self.sink = Some(sink.clone());

        let client = self.client.clone();
        let stream_url = stream_url.to_string();

        self.current_download = Some(tokio::spawn(async move {
            debug!("downloading {stream_url}");
            let bytes = match client.stream(&stream_url).await {
                Ok(bytes) => bytes,
                Err(error) => return handle.fail(error),
            };

            let source = match DecoderBuilder::new()
                .with_data(Cursor::new(bytes))
                .with_seekable(true)
                .build()
            {
                Ok(source) => source,
                Err(error) => return handle.fail(error.into()),
            };

            if !handle.is_current() {
                return;
            }

            handle.set_ready(ReadyState::HaveMetadata);
            handle.emit(ResourceEvent::MetadataLoaded {
                duration: source.total_duration(),
            });

            sink.append(source);
            handle.set_ready(ReadyState::HaveEnoughData);
            handle.emit(ResourceEvent::DataAvailable);
            handle.emit(ResourceEvent::CanPlay);

            let mut ticker = tokio::time::interval(TIME_UPDATE_INTERVAL);
            loop {
                ticker.tick().await;
                if !handle.is_current() {
                    break;
                }
                if sink.empty() {
                    handle.emit(ResourceEvent::Ended);
                    break;
                }
                if !sink.is_paused() {
                    handle.emit(ResourceEvent::TimeUpdate {
                        position: sink.get_pos(),
                    });
                }
            }
        }));
    }

    fn play(&mut self) -> Result<()> {
        match &self.sink {
            Some(sink) => {
                sink.play();
                Ok(())
            }
            None => Err(Error::NotLoaded),
        }
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        match &self.sink {
            Some(sink) => {
                sink.try_seek(position)?;
                Ok(())
            }
            None => Err(Error::NotLoaded),
        }
    }

    fn ready_state(&self) -> ReadyState {
        match self.ready.load(Ordering::SeqCst) {
            0 => ReadyState::HaveNothing,
            1 => ReadyState::HaveMetadata,
            2 => ReadyState::HaveCurrentData,
            3 => ReadyState::HaveFutureData,
            _ => ReadyState::HaveEnoughData,
        }
    }
}

impl Drop for RodioResource {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.clear();
    }
}
