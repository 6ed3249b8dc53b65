//! The audio output pipeline.
//!
//! Fragments are scheduled back to back on a playback cursor that advances by
//! each slice's declared duration, never by arrival time. A background task
//! keeps the sink fed a fixed lead ahead of the wall clock and publishes the
//! level of whatever is audible on a `watch` channel.

use crate::{AudioFragment, AudioSink, PlaybackQueue, meter::VolumeMeter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, trace, warn};

/// Timing parameters of the playback task.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// How often the scheduler tops up the sink.
    pub tick: Duration,
    /// How far ahead of the wall clock audio is handed to the sink.
    pub lead: Duration,
    /// Largest unit handed to the sink in one write.
    pub slice: Duration,
    /// Cadence of volume samples.
    pub meter_interval: Duration,
    /// Per-sample falloff of the held level.
    pub meter_decay: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(10),
            lead: Duration::from_millis(60),
            slice: Duration::from_millis(20),
            meter_interval: Duration::from_micros(16_667),
            meter_decay: 0.85,
        }
    }
}

struct PlaybackState {
    queue: PlaybackQueue,
    sink: Box<dyn AudioSink>,
    /// End of the audio already handed to the sink.
    cursor: Option<Instant>,
    meter: VolumeMeter,
}

struct Shared {
    config: PipelineConfig,
    state: Mutex<PlaybackState>,
    wake: Notify,
    level: watch::Sender<f32>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands slices to the sink until the cursor is `lead` ahead of `now`.
    fn pump(&self, now: Instant) {
        let mut state = self.lock();
        if state.queue.is_empty() {
            return;
        }
        let horizon = now + self.config.lead;
        // A lapsed cursor means the queue ran dry; restart at now.
        let mut cursor = state.cursor.filter(|c| *c >= now).unwrap_or(now);
        while cursor < horizon {
            let Some(slice) = state.queue.next_slice(self.config.slice) else {
                break;
            };
            let duration = slice.duration();
            if let Err(e) = state.sink.write(slice.format, &slice.data) {
                warn!(error = %e, seq = slice.seq, "Audio sink rejected a slice");
            }
            let rms = slice.rms();
            state.meter.record(cursor, cursor + duration, rms);
            cursor += duration;
        }
        state.cursor = Some(cursor);
    }

    fn publish_level(&self, now: Instant) {
        let level = self.lock().meter.sample(now);
        self.level.send_if_modified(|current| {
            if *current == level {
                return false;
            }
            *current = level;
            true
        });
    }
}

/// Owns the playback queue and the task that drains it into an [`AudioSink`].
///
/// Must be created inside a tokio runtime. Dropping the pipeline stops the
/// task; the sink is released with it.
pub struct OutputPipeline {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl OutputPipeline {
    pub fn spawn(sink: impl AudioSink + 'static, config: PipelineConfig) -> Self {
        let (level, _) = watch::channel(0.0);
        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(PlaybackState {
                queue: PlaybackQueue::new(),
                sink: Box::new(sink),
                cursor: None,
                meter: VolumeMeter::new(config.meter_decay),
            }),
            wake: Notify::new(),
            level,
        });
        let task = tokio::spawn(run(shared.clone()));
        Self { shared, task }
    }

    /// Takes ownership of `fragment` and schedules it after everything queued.
    pub fn enqueue(&self, fragment: AudioFragment) {
        trace!(
            seq = fragment.seq(),
            bytes = fragment.len(),
            "Enqueued audio fragment"
        );
        self.shared.lock().queue.push(fragment);
        self.shared.wake.notify_one();
    }

    /// Drops every queued fragment, including the unplayed tail of the one
    /// currently playing, and stops the sink. Returns the number dropped.
    ///
    /// Runs under the same lock as the scheduler, so no slice of a dropped
    /// fragment can reach the sink afterwards.
    pub fn discard_queued(&self) -> usize {
        let dropped = {
            let mut state = self.shared.lock();
            let dropped = state.queue.clear();
            state.sink.stop();
            state.cursor = None;
            state.meter.reset();
            dropped
        };
        self.shared.level.send_replace(0.0);
        debug!(dropped, "Discarded queued playback");
        dropped
    }

    /// Fragments not yet fully handed to the sink.
    pub fn queued(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Audio not yet handed to the sink.
    pub fn buffered(&self) -> Duration {
        self.shared.lock().queue.remaining()
    }

    /// Smoothed output level in `[0, 1]`, updated at the meter cadence.
    pub fn level(&self) -> watch::Receiver<f32> {
        self.shared.level.subscribe()
    }
}

impl Drop for OutputPipeline {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(shared: Arc<Shared>) {
    let mut tick = interval(shared.config.tick);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut meter = interval(shared.config.meter_interval);
    meter.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shared.wake.notified() => shared.pump(Instant::now()),
            _ = tick.tick() => shared.pump(Instant::now()),
            _ = meter.tick() => shared.publish_level(Instant::now()),
        }
    }
}
