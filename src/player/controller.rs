use anyhow::Result;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::adapter::{AdapterEvent, ProviderAdapter};
use crate::player::state::{PlaybackState, SeekOrigin, SeekRequest, SessionPhase};
use crate::reporter::ProgressReporter;
use crate::session::SessionEvent;

/// Commands that can be sent to the watch-gate controller
#[derive(Debug)]
pub enum GateCommand {
    /// Start playback
    Play { respond_to: oneshot::Sender<()> },
    /// Pause playback
    Pause { respond_to: oneshot::Sender<()> },
    /// Flip between playing and paused; responds with the new playing flag
    TogglePlayback { respond_to: oneshot::Sender<bool> },
    /// Seek to an absolute position; responds with the effective target
    /// after ceiling clamping
    Seek {
        request: SeekRequest,
        respond_to: oneshot::Sender<f64>,
    },
    /// Relative skip ahead by the configured step
    SkipForward { respond_to: oneshot::Sender<f64> },
    /// Relative skip back by the configured step
    SkipBack { respond_to: oneshot::Sender<f64> },
    /// The user grabbed the timeline; playback pauses for the drag
    BeginScrub { respond_to: oneshot::Sender<()> },
    /// The user released the timeline; the committed position goes
    /// through the ordinary clamp
    CommitScrub {
        position: f64,
        respond_to: oneshot::Sender<f64>,
    },
    /// Set volume (0.0 to 1.0)
    SetVolume {
        volume: f64,
        respond_to: oneshot::Sender<()>,
    },
    /// Get the current playback state
    Snapshot {
        respond_to: oneshot::Sender<PlaybackState>,
    },
    /// Tear the session down: final progress flush, adapter destroy
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Tunables for one gated session.
#[derive(Debug, Clone, Copy)]
pub struct GateSettings {
    /// Resume position from previously persisted progress, in seconds
    pub initial_progress: f64,
    /// Relative skip step, in seconds
    pub skip_step: f64,
    /// Volume applied once the session goes ready, in `[0, 1]`
    pub initial_volume: f64,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            initial_progress: 0.0,
            skip_step: 10.0,
            initial_volume: 1.0,
        }
    }
}

/// Controller that owns the bound provider and processes commands.
///
/// Every provider event and user intent funnels through the one event
/// loop in [`run`](WatchGateController::run), so each is reduced against
/// the current state rather than a snapshot captured at subscription
/// time.
pub struct WatchGateController {
    adapter: Box<dyn ProviderAdapter>,
    state: PlaybackState,
    commands: mpsc::UnboundedReceiver<GateCommand>,
    adapter_events: mpsc::UnboundedReceiver<AdapterEvent>,
    reporter: ProgressReporter,
    events: mpsc::UnboundedSender<SessionEvent>,
    settings: GateSettings,
    completion_sent: bool,
}

impl WatchGateController {
    /// Wire a controller around a bound adapter. Returns the handle the
    /// embedding UI talks to and the controller to spawn.
    pub fn new(
        adapter: Box<dyn ProviderAdapter>,
        adapter_events: mpsc::UnboundedReceiver<AdapterEvent>,
        reporter: ProgressReporter,
        events: mpsc::UnboundedSender<SessionEvent>,
        settings: GateSettings,
    ) -> (GateHandle, WatchGateController) {
        let (sender, commands) = mpsc::unbounded_channel();

        let controller = WatchGateController {
            adapter,
            state: PlaybackState::new(settings.initial_progress),
            commands,
            adapter_events,
            reporter,
            events,
            settings,
            completion_sent: false,
        };

        (GateHandle { sender }, controller)
    }

    /// Run the controller event loop.
    pub async fn run(mut self) {
        debug!("watch gate event loop started");

        self.resume().await;

        let mut shutdown_ack = None;
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(GateCommand::Shutdown { respond_to }) => {
                        shutdown_ack = Some(respond_to);
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                event = self.adapter_events.recv() => match event {
                    Some(event) => self.handle_adapter_event(event),
                    None => {
                        debug!("provider event channel closed");
                        break;
                    }
                },
            }
        }

        self.teardown();
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
        debug!("watch gate event loop terminated");
    }

    /// Resolve the duration and apply the resume position before the loop
    /// accepts commands. `target = max(initial_progress, max_watched_time)`;
    /// the position is committed only once the provider confirms the seek
    /// landed. A failed resume never dead-locks playback: the session goes
    /// ready with whatever position the provider reports.
    async fn resume(&mut self) {
        match self.adapter.ready().await {
            Ok(duration) => {
                self.state.absorb_early_report(None, Some(duration));
            }
            Err(e) => {
                warn!("metadata never resolved, proceeding without a duration: {e}");
            }
        }

        let target = self
            .settings
            .initial_progress
            .max(self.state.max_watched_time);
        if target > 0.0 {
            match self.adapter.seek_to(target).await {
                Ok(()) => {
                    self.state.apply_resume(target);
                    info!(target, "resume position applied");
                }
                Err(e) => {
                    warn!(target, "resume seek failed: {e}");
                    self.state.max_watched_time = self.state.max_watched_time.max(target);
                }
            }
        }

        if let Err(e) = self
            .adapter
            .set_volume(self.settings.initial_volume.clamp(0.0, 1.0))
            .await
        {
            warn!("initial volume rejected: {e}");
        }

        self.drain_early_events();
        if self.state.phase != SessionPhase::Ended {
            self.state.mark_ready();
        }
        self.emit_state();
    }

    /// Events that queued up while the resume was pending only discover
    /// the duration and raise the ceiling; they never drag the displayed
    /// position behind the resume target.
    fn drain_early_events(&mut self) {
        while let Ok(event) = self.adapter_events.try_recv() {
            match event {
                AdapterEvent::TimeUpdate {
                    seconds,
                    duration_hint,
                    ..
                } => self.state.absorb_early_report(seconds, duration_hint),
                AdapterEvent::Play => self.state.is_playing = true,
                AdapterEvent::Pause => self.state.is_playing = false,
                AdapterEvent::Ended => self.handle_ended(),
            }
        }
    }

    async fn handle_command(&mut self, command: GateCommand) {
        match command {
            GateCommand::Play { respond_to } => {
                trace!("play requested");
                match self.adapter.play().await {
                    Ok(()) => {
                        self.state.is_playing = true;
                        self.emit_state();
                    }
                    Err(e) => warn!("play rejected: {e}"),
                }
                let _ = respond_to.send(());
            }
            GateCommand::Pause { respond_to } => {
                trace!("pause requested");
                match self.adapter.pause().await {
                    Ok(()) => {
                        self.state.is_playing = false;
                        self.emit_state();
                    }
                    Err(e) => warn!("pause rejected: {e}"),
                }
                let _ = respond_to.send(());
            }
            GateCommand::TogglePlayback { respond_to } => {
                let result = if self.state.is_playing {
                    self.adapter.pause().await.map(|()| false)
                } else {
                    self.adapter.play().await.map(|()| true)
                };
                match result {
                    Ok(playing) => {
                        self.state.is_playing = playing;
                        self.emit_state();
                    }
                    Err(e) => warn!("toggle rejected: {e}"),
                }
                let _ = respond_to.send(self.state.is_playing);
            }
            GateCommand::Seek {
                request,
                respond_to,
            } => {
                let effective = self.perform_seek(request).await;
                let _ = respond_to.send(effective);
            }
            GateCommand::SkipForward { respond_to } => {
                let request = SeekRequest {
                    target_time: self.state.current_time + self.settings.skip_step,
                    origin: SeekOrigin::SkipForward,
                };
                let effective = self.perform_seek(request).await;
                let _ = respond_to.send(effective);
            }
            GateCommand::SkipBack { respond_to } => {
                let request = SeekRequest {
                    target_time: self.state.current_time - self.settings.skip_step,
                    origin: SeekOrigin::SkipBack,
                };
                let effective = self.perform_seek(request).await;
                let _ = respond_to.send(effective);
            }
            GateCommand::BeginScrub { respond_to } => {
                trace!("scrub started");
                self.state.is_scrubbing = true;
                // Pausing during the drag keeps playback and drag preview
                // from fighting over the timeline
                if let Err(e) = self.adapter.pause().await {
                    warn!("pause for scrub rejected: {e}");
                }
                self.state.is_playing = false;
                self.emit_state();
                let _ = respond_to.send(());
            }
            GateCommand::CommitScrub {
                position,
                respond_to,
            } => {
                trace!(position, "scrub committed");
                self.state.is_scrubbing = false;
                let request = SeekRequest {
                    target_time: position,
                    origin: SeekOrigin::Drag,
                };
                let effective = self.perform_seek(request).await;
                let _ = respond_to.send(effective);
            }
            GateCommand::SetVolume { volume, respond_to } => {
                trace!(volume, "setting volume");
                if let Err(e) = self.adapter.set_volume(volume.clamp(0.0, 1.0)).await {
                    warn!("set volume rejected: {e}");
                }
                let _ = respond_to.send(());
            }
            GateCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.state.clone());
            }
            GateCommand::Shutdown { .. } => {
                debug!("shutdown reached the command handler");
            }
        }
    }

    /// Clamp and forward one seek. The effective target is reported back
    /// to the caller even when the provider rejects the call; the state
    /// then keeps its prior position and the next action retries.
    async fn perform_seek(&mut self, request: SeekRequest) -> f64 {
        let effective = self.state.clamp_seek(request);
        trace!(
            requested = request.target_time,
            effective,
            origin = ?request.origin,
            "seek"
        );
        match self.adapter.seek_to(effective).await {
            Ok(()) => {
                self.state.apply_committed_seek(effective);
                self.emit_state();
            }
            Err(e) => warn!("seek rejected: {e}"),
        }
        effective
    }

    fn handle_adapter_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::Play => {
                self.state.is_playing = true;
                self.emit_state();
            }
            AdapterEvent::Pause => {
                self.state.is_playing = false;
                self.emit_state();
            }
            AdapterEvent::TimeUpdate {
                seconds,
                percent_hint,
                duration_hint,
            } => {
                if self.state.phase == SessionPhase::Ended {
                    return;
                }
                let Some(progress) =
                    self.state
                        .record_time_update(seconds, percent_hint, duration_hint)
                else {
                    return;
                };
                if !self.state.is_scrubbing {
                    self.reporter.offer(progress);
                }
                self.emit_state();
            }
            AdapterEvent::Ended => self.handle_ended(),
        }
    }

    fn handle_ended(&mut self) {
        if self.state.phase == SessionPhase::Ended {
            return;
        }
        let terminal = self.state.mark_ended();
        info!(seconds = terminal.seconds, "video ended");
        self.reporter.flush(terminal);
        self.emit_state();
        if !self.completion_sent {
            self.completion_sent = true;
            let _ = self.events.send(SessionEvent::Completed);
        }
    }

    fn teardown(&mut self) {
        debug!("tearing down watch-gate session");
        self.reporter.finalize();
        self.adapter.destroy();
        self.state.phase = SessionPhase::Idle;
    }

    fn emit_state(&self) {
        let _ = self
            .events
            .send(SessionEvent::StateChanged(self.state.clone()));
    }
}

/// Handle to send commands to the watch-gate controller
#[derive(Debug, Clone)]
pub struct GateHandle {
    sender: mpsc::UnboundedSender<GateCommand>,
}

impl GateHandle {
    /// Start playback
    pub async fn play(&self) -> Result<()> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(GateCommand::Play { respond_to })
            .map_err(|_| anyhow::anyhow!("watch gate disconnected"))?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("no response from watch gate"))
    }

    /// Pause playback
    pub async fn pause(&self) -> Result<()> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(GateCommand::Pause { respond_to })
            .map_err(|_| anyhow::anyhow!("watch gate disconnected"))?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("no response from watch gate"))
    }

    /// Flip between playing and paused; returns the new playing flag
    pub async fn toggle_playback(&self) -> Result<bool> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(GateCommand::TogglePlayback { respond_to })
            .map_err(|_| anyhow::anyhow!("watch gate disconnected"))?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("no response from watch gate"))
    }

    /// Seek to an absolute position; returns the effective target after
    /// ceiling clamping
    pub async fn seek(&self, target_time: f64, origin: SeekOrigin) -> Result<f64> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(GateCommand::Seek {
                request: SeekRequest {
                    target_time,
                    origin,
                },
                respond_to,
            })
            .map_err(|_| anyhow::anyhow!("watch gate disconnected"))?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("no response from watch gate"))
    }

    /// Skip ahead by the configured step
    pub async fn skip_forward(&self) -> Result<f64> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(GateCommand::SkipForward { respond_to })
            .map_err(|_| anyhow::anyhow!("watch gate disconnected"))?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("no response from watch gate"))
    }

    /// Skip back by the configured step
    pub async fn skip_back(&self) -> Result<f64> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(GateCommand::SkipBack { respond_to })
            .map_err(|_| anyhow::anyhow!("watch gate disconnected"))?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("no response from watch gate"))
    }

    /// The user grabbed the timeline
    pub async fn begin_scrub(&self) -> Result<()> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(GateCommand::BeginScrub { respond_to })
            .map_err(|_| anyhow::anyhow!("watch gate disconnected"))?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("no response from watch gate"))
    }

    /// The user released the timeline; returns the effective committed
    /// position
    pub async fn commit_scrub(&self, position: f64) -> Result<f64> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(GateCommand::CommitScrub {
                position,
                respond_to,
            })
            .map_err(|_| anyhow::anyhow!("watch gate disconnected"))?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("no response from watch gate"))
    }

    /// Set volume (0.0 to 1.0)
    pub async fn set_volume(&self, volume: f64) -> Result<()> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(GateCommand::SetVolume { volume, respond_to })
            .map_err(|_| anyhow::anyhow!("watch gate disconnected"))?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("no response from watch gate"))
    }

    /// Get the current playback state
    pub async fn snapshot(&self) -> Result<PlaybackState> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(GateCommand::Snapshot { respond_to })
            .map_err(|_| anyhow::anyhow!("watch gate disconnected"))?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("no response from watch gate"))
    }

    /// Tear the session down; resolves once the final progress flush has
    /// been initiated and the adapter released
    pub async fn shutdown(&self) -> Result<()> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(GateCommand::Shutdown { respond_to })
            .map_err(|_| anyhow::anyhow!("watch gate disconnected"))?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("no response from watch gate"))
    }
}
