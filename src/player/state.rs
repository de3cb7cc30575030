use serde::Serialize;

/// Lifecycle of one bound video session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// No session bound
    Idle,
    /// Adapter bound, duration or resume position not yet resolved
    Loading,
    /// Accepting seeks and playback commands
    Ready,
    /// Duration reached; the watch ceiling equals the duration
    Ended,
}

/// Where a seek request came from. Relative skips are resolved to an
/// absolute target before they reach the clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Click,
    Drag,
    SkipForward,
    SkipBack,
}

/// A user seek intent, validated and clamped before it is forwarded
/// to the provider.
#[derive(Debug, Clone, Copy)]
pub struct SeekRequest {
    pub target_time: f64,
    pub origin: SeekOrigin,
}

/// One progress sample surfaced to the reporter and the embedding UI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub seconds: f64,
    pub percentage: f64,
}

/// Playback position state for one video session.
///
/// `max_watched_time` is the high-water mark of playback position ever
/// reached in the session. It only moves forward: every provider time
/// report folds in with `max`, so reports arriving out of order cannot
/// lower it. It is what permits rewinding freely while fast-forwarding
/// stays bounded by what was already watched.
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackState {
    pub phase: SessionPhase,
    pub current_time: f64,
    pub duration: Option<f64>,
    pub max_watched_time: f64,
    pub is_playing: bool,
    pub is_scrubbing: bool,
}

impl PlaybackState {
    /// Fresh state for a newly bound session, seeded from previously
    /// persisted progress.
    pub fn new(initial_progress: f64) -> Self {
        Self {
            phase: SessionPhase::Loading,
            current_time: 0.0,
            duration: None,
            max_watched_time: initial_progress.max(0.0),
            is_playing: false,
            is_scrubbing: false,
        }
    }

    /// Fold one provider time report into the state.
    ///
    /// Returns the progress sample to surface, or `None` when the report
    /// carried no usable position (malformed reports are dropped, never
    /// fatal). The watch ceiling is raised even mid-scrub; only the
    /// displayed position is withheld while the user is dragging.
    pub fn record_time_update(
        &mut self,
        seconds: Option<f64>,
        percent_hint: Option<f64>,
        duration_hint: Option<f64>,
    ) -> Option<ProgressEvent> {
        if let Some(duration) = duration_hint {
            if duration.is_finite() && duration > 0.0 {
                self.duration = Some(duration);
            }
        }

        let seconds = seconds?;
        if !seconds.is_finite() || seconds < 0.0 {
            return None;
        }

        self.max_watched_time = self.max_watched_time.max(seconds);
        if !self.is_scrubbing {
            self.current_time = match self.duration {
                Some(duration) => seconds.min(duration),
                None => seconds,
            };
        }

        Some(self.progress(percent_hint))
    }

    /// Fold a report that arrived before the resume position was applied:
    /// duration discovery and ceiling raises only. The displayed position
    /// stays untouched so a stale early report cannot undercut the resume
    /// target.
    pub fn absorb_early_report(&mut self, seconds: Option<f64>, duration_hint: Option<f64>) {
        if let Some(duration) = duration_hint {
            if duration.is_finite() && duration > 0.0 {
                self.duration = Some(duration);
            }
        }
        if let Some(seconds) = seconds {
            if seconds.is_finite() && seconds >= 0.0 {
                self.max_watched_time = self.max_watched_time.max(seconds);
            }
        }
    }

    /// Clamp a seek request against the watch ceiling.
    ///
    /// Backward requests pass through untouched; forward requests cannot
    /// pass the furthest point already watched. The result is bounded to
    /// `[0, duration]` once the duration is known.
    pub fn clamp_seek(&self, request: SeekRequest) -> f64 {
        let target = if request.target_time > self.current_time {
            request.target_time.min(self.max_watched_time)
        } else {
            request.target_time
        };

        match self.duration {
            Some(duration) => target.clamp(0.0, duration),
            None => target.max(0.0),
        }
    }

    /// Commit a seek the provider accepted.
    pub fn apply_committed_seek(&mut self, effective: f64) {
        self.current_time = effective;
    }

    /// Commit the resume position after the resume seek completed.
    pub fn apply_resume(&mut self, target: f64) {
        self.current_time = target;
        self.max_watched_time = self.max_watched_time.max(target);
    }

    pub fn mark_ready(&mut self) {
        self.phase = SessionPhase::Ready;
    }

    /// The provider reached the end of the video. Forces the ceiling and
    /// position to the full duration and produces the terminal 100%
    /// sample, covering positions lost to skipped buffering.
    pub fn mark_ended(&mut self) -> ProgressEvent {
        if let Some(duration) = self.duration {
            self.max_watched_time = self.max_watched_time.max(duration);
            self.current_time = duration;
        } else {
            self.current_time = self.current_time.max(self.max_watched_time);
        }
        self.is_playing = false;
        self.is_scrubbing = false;
        self.phase = SessionPhase::Ended;

        ProgressEvent {
            seconds: self.current_time.max(self.max_watched_time),
            percentage: 100.0,
        }
    }

    /// Current progress sample. Percentage is computed from the high-water
    /// mark when the duration is known, else from the provider's fraction
    /// hint.
    pub fn progress(&self, percent_hint: Option<f64>) -> ProgressEvent {
        let reached = self.current_time.max(self.max_watched_time);
        let percentage = match self.duration {
            Some(duration) if duration > 0.0 => (100.0 * reached / duration).min(100.0),
            _ => percent_hint
                .filter(|hint| hint.is_finite())
                .map(|hint| (hint * 100.0).clamp(0.0, 100.0))
                .unwrap_or(0.0),
        };

        ProgressEvent {
            seconds: self.current_time,
            percentage,
        }
    }
}
