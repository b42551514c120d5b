use std::{sync::Arc, time::Duration};

use cratedrop_models::QueueItem;
use tokio::{
    select,
    sync::{mpsc, watch},
    time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until},
};
use tracing::{debug, info, warn};

use crate::{
    Result,
    controls::{ControlCommand, Controls},
    resource::{CredentialRefresher, MediaResource, ResourceEvent},
    seek::{self, ProgressBar, SeekInput},
    tracklist::Tracklist,
    transport::Transport,
};

pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);
pub const POSITION_THROTTLE: Duration = Duration::from_millis(250);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    AwaitingReady,
    Playing,
    Paused,
    Seeking,
    Recovering,
}

/// What the player is doing right now, as shown to the user.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Progress {
    pub phase: Phase,
    pub track_id: Option<String>,
    pub position: Duration,
    pub duration: Option<Duration>,
}

struct ReadyWait {
    poll: Interval,
    deadline: Instant,
}

impl ReadyWait {
    fn start() -> Self {
        let now = Instant::now();
        let mut poll = interval_at(now + READY_POLL_INTERVAL, READY_POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            poll,
            deadline: now + READY_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitTick {
    Poll,
    Timeout,
}

async fn wait_tick(wait: &mut Option<ReadyWait>) -> WaitTick {
    match wait {
        Some(wait) => select! {
            biased;
            _ = sleep_until(wait.deadline) => WaitTick::Timeout,
            _ = wait.poll.tick() => WaitTick::Poll,
        },
        None => std::future::pending().await,
    }
}

struct RecoveryOutcome {
    track_id: String,
    result: Result<()>,
}

#[derive(Debug, Default)]
struct Recovery {
    attempted: bool,
    in_flight: bool,
}

/// Keeps one [`MediaResource`] in step with the shared tracklist.
pub struct Player<R> {
    transport: Transport,
    tracklist: watch::Receiver<Tracklist>,
    resource: R,
    events: mpsc::UnboundedReceiver<ResourceEvent>,
    refresher: Arc<dyn CredentialRefresher>,
    commands_tx: mpsc::UnboundedSender<ControlCommand>,
    commands: mpsc::UnboundedReceiver<ControlCommand>,
    recovery_tx: mpsc::UnboundedSender<RecoveryOutcome>,
    recovery_rx: mpsc::UnboundedReceiver<RecoveryOutcome>,
    progress: watch::Sender<Progress>,
    phase: Phase,
    bound: Option<QueueItem>,
    intent: bool,
    ready_wait: Option<ReadyWait>,
    recovery: Recovery,
    dragging: bool,
    last_position_update: Option<Instant>,
}

impl<R: MediaResource> Player<R> {
    pub fn new(
        transport: Transport,
        resource: R,
        events: mpsc::UnboundedReceiver<ResourceEvent>,
        refresher: Arc<dyn CredentialRefresher>,
    ) -> Self {
        let tracklist = transport.subscribe();
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (recovery_tx, recovery_rx) = mpsc::unbounded_channel();
        let (progress, _) = watch::channel(Progress::default());

        Self {
            transport,
            tracklist,
            resource,
            events,
            refresher,
            commands_tx,
            commands,
            recovery_tx,
            recovery_rx,
            progress,
            phase: Phase::Idle,
            bound: None,
            intent: false,
            ready_wait: None,
            recovery: Recovery::default(),
            dragging: false,
            last_position_update: None,
        }
    }

    pub fn controls(&self) -> Controls {
        Controls::new(self.commands_tx.clone())
    }

    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub async fn player_loop(&mut self) {
        info!("Player loop started");
        self.sync_with_tracklist();

        loop {
            select! {
                changed = self.tracklist.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.sync_with_tracklist();
                }

                Some(event) = self.events.recv() => self.handle_event(event),

                Some(outcome) = self.recovery_rx.recv() => self.finish_recovery(outcome),

                tick = wait_tick(&mut self.ready_wait) => self.handle_wait_tick(tick),

                Some(command) = self.commands.recv() => match command {
                    ControlCommand::Seek(input) => self.handle_seek(input),
                    ControlCommand::Quit => break,
                },
            }
        }

        self.shutdown();
        info!("Player loop stopped");
    }

    fn shutdown(&mut self) {
        self.teardown_ready_wait();
        self.dragging = false;
        if self.bound.is_some() {
            self.resource.pause();
        }
    }

    fn sync_with_tracklist(&mut self) {
        let (current, is_playing) = {
            let tracklist = self.tracklist.borrow_and_update();
            (tracklist.current_item().cloned(), tracklist.is_playing())
        };

        let bound_id = self.bound.as_ref().map(|item| item.id.as_str());
        let current_id = current.as_ref().map(|item| item.id.as_str());
        if bound_id != current_id {
            self.intent = is_playing;
            match current {
                Some(item) => self.bind(item),
                None => self.unbind(),
            }
            return;
        }

        if is_playing != self.intent {
            self.intent = is_playing;
            self.apply_intent();
        }
    }

    fn bind(&mut self, item: QueueItem) {
        info!(track = %item.id, "Loading {}", item.label());
        self.teardown_ready_wait();
        self.recovery = Recovery::default();
        self.dragging = false;

        self.resource.load(&item.stream_url);

        let track_id = item.id.clone();
        let duration = item.duration;
        self.bound = Some(item);
        self.progress.send_modify(|progress| {
            progress.track_id = Some(track_id);
            progress.position = Duration::ZERO;
            progress.duration = duration;
        });
        self.last_position_update = None;

        self.set_phase(Phase::AwaitingReady);
        self.arm_ready_wait();
    }

    fn unbind(&mut self) {
        self.teardown_ready_wait();
        self.recovery = Recovery::default();
        self.dragging = false;

        if self.bound.take().is_some() {
            debug!("queue emptied, releasing track");
            self.resource.pause();
        }
        self.progress.send_modify(|progress| {
            progress.track_id = None;
            progress.position = Duration::ZERO;
            progress.duration = None;
        });
        self.set_phase(Phase::Idle);
    }

    fn apply_intent(&mut self) {
        match self.phase {
            Phase::Playing | Phase::Paused => {
                self.command_intent();
                self.set_phase(self.settled_phase());
            }
            Phase::Seeking => self.command_intent(),
            Phase::AwaitingReady => {
                if self.ready_wait.is_none() {
                    self.arm_ready_wait();
                }
            }
            Phase::Recovering | Phase::Idle => {
                debug!(intent = self.intent, "intent recorded for later");
            }
        }
    }

    fn command_intent(&mut self) {
        if self.intent {
            if let Err(error) = self.resource.play() {
                debug!("play rejected: {error}");
            }
        } else {
            self.resource.pause();
        }
    }

    fn settled_phase(&self) -> Phase {
        if self.intent {
            Phase::Playing
        } else {
            Phase::Paused
        }
    }

    fn arm_ready_wait(&mut self) {
        if !self.try_start() {
            debug!("waiting for resource to become ready");
            self.ready_wait = Some(ReadyWait::start());
        }
    }

    /// Settles into the requested intent if the resource can play. Returns
    /// whether it did.
    fn try_start(&mut self) -> bool {
        if self.phase != Phase::AwaitingReady || !self.resource.ready_state().can_play() {
            return false;
        }

        self.teardown_ready_wait();
        if self.intent {
            if let Err(error) = self.resource.play() {
                debug!("play rejected: {error}");
            }
        }
        self.set_phase(self.settled_phase());
        true
    }

    fn teardown_ready_wait(&mut self) {
        if self.ready_wait.take().is_some() {
            debug!("readiness wait released");
        }
    }

    fn handle_wait_tick(&mut self, tick: WaitTick) {
        match tick {
            WaitTick::Poll => {
                self.try_start();
            }
            WaitTick::Timeout => {
                warn!("resource not ready after {READY_TIMEOUT:?}, giving up");
                self.teardown_ready_wait();
            }
        }
    }

    fn handle_event(&mut self, event: ResourceEvent) {
        match event {
            ResourceEvent::MetadataLoaded { duration } => {
                self.publish_discovered_duration(duration);
                self.ready_signal();
            }
            ResourceEvent::DataAvailable | ResourceEvent::CanPlay => self.ready_signal(),
            ResourceEvent::TimeUpdate { position } => self.position_advanced(position),
            ResourceEvent::Ended => self.track_ended(),
            ResourceEvent::Error { message } => self.begin_recovery(&message),
        }
    }

    fn ready_signal(&mut self) {
        if self.ready_wait.is_some() {
            self.try_start();
        }
    }

    fn publish_discovered_duration(&mut self, discovered: Option<Duration>) {
        let Some(bound) = &self.bound else {
            return;
        };
        if bound.duration.is_some() {
            return;
        }

        let duration = discovered.filter(|d| !d.is_zero());
        self.progress.send_if_modified(|progress| {
            if progress.duration == duration {
                return false;
            }
            progress.duration = duration;
            true
        });
    }

    fn position_advanced(&mut self, position: Duration) {
        if self.bound.is_none() || self.dragging || self.phase == Phase::Seeking {
            return;
        }

        if let Some(last) = self.last_position_update
            && last.elapsed() < POSITION_THROTTLE
        {
            return;
        }
        self.publish_position(position);
    }

    fn publish_position(&mut self, position: Duration) {
        self.progress.send_modify(|progress| progress.position = position);
        self.last_position_update = Some(Instant::now());
    }

    fn track_ended(&mut self) {
        if self.bound.is_none() {
            return;
        }
        debug!("track ended");
        // A refill started here runs detached.
        let _ = self.transport.next();
    }

    fn begin_recovery(&mut self, message: &str) {
        let Some(track_id) = self.bound.as_ref().map(|item| item.id.clone()) else {
            return;
        };
        warn!(track = %track_id, "Playback failed: {message}");

        if self.recovery.in_flight {
            return;
        }

        self.teardown_ready_wait();
        self.dragging = false;
        self.set_phase(Phase::Recovering);

        if self.recovery.attempted {
            warn!(track = %track_id, "already refreshed credentials once, giving up");
            return;
        }
        self.recovery.attempted = true;
        self.recovery.in_flight = true;

        let refresher = self.refresher.clone();
        let recovery_tx = self.recovery_tx.clone();
        tokio::spawn(async move {
            let result = refresher.refresh().await;
            let _ = recovery_tx.send(RecoveryOutcome { track_id, result });
        });
    }

    fn finish_recovery(&mut self, outcome: RecoveryOutcome) {
        let Some(item) = self.bound.clone() else {
            return;
        };
        if item.id != outcome.track_id || self.phase != Phase::Recovering {
            debug!(track = %outcome.track_id, "ignoring credential refresh for released track");
            return;
        }
        self.recovery.in_flight = false;

        match outcome.result {
            Ok(()) => {
                info!(track = %item.id, "Credentials refreshed, reloading");
                self.resource.load(&item.stream_url);
                self.publish_position(Duration::ZERO);
                self.set_phase(Phase::AwaitingReady);
                self.arm_ready_wait();
            }
            Err(error) => {
                warn!(track = %item.id, "Unable to refresh credentials: {error}");
            }
        }
    }

    fn handle_seek(&mut self, input: SeekInput) {
        match input {
            SeekInput::Click { bar, x } => {
                if let Some(target) = self.seek_target(bar, x) {
                    self.seek_to(target);
                }
            }
            SeekInput::Press { bar, x } => {
                let Some(target) = self.seek_target(bar, x) else {
                    return;
                };
                self.dragging = true;
                if matches!(self.phase, Phase::Playing | Phase::Paused) {
                    self.set_phase(Phase::Seeking);
                }
                self.seek_to(target);
            }
            SeekInput::Move { bar, x } => {
                if !self.dragging {
                    return;
                }
                if let Some(target) = self.seek_target(bar, x) {
                    self.seek_to(target);
                }
            }
            SeekInput::Release => {
                if !self.dragging {
                    return;
                }
                self.dragging = false;
                if self.phase == Phase::Seeking {
                    self.set_phase(self.settled_phase());
                }
            }
        }
    }

    fn seek_target(&self, bar: ProgressBar, x: f64) -> Option<Duration> {
        if self.bound.is_none() || matches!(self.phase, Phase::Idle | Phase::Recovering) {
            return None;
        }
        seek::seek_target(bar, x, self.progress.borrow().duration)
    }

    fn seek_to(&mut self, target: Duration) {
        if let Err(error) = self.resource.seek(target) {
            debug!("seek to {target:?} rejected: {error}");
        }
        self.publish_position(target);
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase == phase {
            return;
        }
        debug!(from = ?self.phase, to = ?phase, "phase change");
        self.phase = phase;
        self.progress.send_modify(|progress| progress.phase = phase);
    }
}
