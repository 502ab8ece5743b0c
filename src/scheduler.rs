//! The cooperative scheduler.
//!
//! One [`Scheduler::tick`] runs, in order:
//!
//! 1. the firmware-update channel
//! 2. queued control commands, then the idle check (which may switch the
//!    default display to streaming)
//! 3. while streaming: drain every queued datagram, push if any arrived
//! 4. otherwise, when the animation cadence has elapsed: dispatch and push
//!
//! While streaming, steps 1 and 2 only run once per control interval so the
//! stream gets the time. Nothing in a tick waits on I/O.
//!
//! ## Rust concepts
//! - **Generics**: `Scheduler<O, P>` is monomorphised over the output driver
//!   and packet source, so tests plug in fakes with no dynamic dispatch.
//! - **Single ownership**: the scheduler owns the frame buffer and render
//!   state outright; other threads can only send [`ControlCommand`]s.

use crate::config::ControllerConfig;
use crate::dispatch::{RenderState, dispatch};
use crate::effect::{EffectRegistry, FrameClock, PatternId, ids, pattern_info};
use crate::error::{Error, Result};
use crate::frame::{FrameBuffer, PixelBuffer};
use crate::layout::GridLayout;
use crate::mode::{ModeMachine, RenderMode, Transition};
use crate::output::OutputDriver;
use crate::render::{ControllerStatus, FrameSnapshot};
use crate::stream::{self, PacketSource, StreamingSession};
use crate::upload::{UploadParseResult, clamp_scroll_speed};
use serde::Serialize;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

// ── Commands ───────────────────────────────────────────────────────

/// Control-plane requests, applied between ticks.
#[derive(Debug)]
pub enum ControlCommand {
    SelectPattern(PatternId),
    SetActiveCount(usize),
    SetPanelGrid { rows: u16, cols: u16 },
    SetScrollText {
        text: Option<String>,
        speed_ms: Option<u64>,
    },
    EnterStreaming,
    /// A decoded upload, ready to become the custom pattern.
    InstallCustomPattern {
        pixels: PixelBuffer,
        result: UploadParseResult,
    },
    /// Reply with the timing averages and start a fresh window.
    TakeTiming(oneshot::Sender<TimingReport>),
}

/// Reject ids that are not in the built-in catalogue.
pub fn validate_pattern(id: PatternId) -> Result<()> {
    match pattern_info(id) {
        Some(_) => Ok(()),
        None => Err(Error::UnknownPattern(id.into())),
    }
}

/// Reject pixel counts outside `1..=capacity`.
pub fn validate_active_count(count: usize, capacity: usize) -> Result<()> {
    if count == 0 || count > capacity {
        return Err(Error::PixelCountOutOfRange { count, capacity });
    }
    Ok(())
}

/// Build and capacity-check a panel grid.
pub fn validate_panel_grid(rows: u16, cols: u16, capacity: usize) -> Result<GridLayout> {
    let layout = GridLayout::from_grid(rows, cols)?;
    layout.check_capacity(capacity)?;
    Ok(layout)
}

// ── Controller context ─────────────────────────────────────────────

/// Everything a tick reads and writes, owned in one place.
pub struct ControllerContext {
    pub layout: GridLayout,
    pub frame: FrameBuffer,
    pub state: RenderState,
    pub mode: ModeMachine,
    pub session: StreamingSession,
    pub registry: EffectRegistry,
}

impl ControllerContext {
    pub fn new(config: &ControllerConfig, now: Instant) -> Result<Self> {
        let layout = config.layout()?;
        let mut frame = FrameBuffer::new(config.capacity);
        frame.set_active_count(layout.pixel_count());

        let mut state = RenderState::new(config.capacity);
        state.status_line = config.status_text.to_uppercase();

        Ok(Self {
            layout,
            frame,
            state,
            mode: ModeMachine::new(now, config.idle_timeout),
            session: StreamingSession::default(),
            registry: EffectRegistry::builtin(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.frame.capacity()
    }

    /// Apply one control command.
    pub fn apply(&mut self, command: ControlCommand, now: Instant) -> Result<()> {
        match command {
            ControlCommand::SelectPattern(id) => self.select_pattern(id, now),
            ControlCommand::SetActiveCount(count) => self.set_active_count(count, now),
            ControlCommand::SetPanelGrid { rows, cols } => self.set_panel_grid(rows, cols, now),
            ControlCommand::SetScrollText { text, speed_ms } => {
                self.set_scroll_text(text, speed_ms, now);
                Ok(())
            }
            ControlCommand::EnterStreaming => {
                self.enter_streaming(now);
                Ok(())
            }
            ControlCommand::InstallCustomPattern { pixels, result } => {
                self.install_custom_pattern(pixels, result, now);
                Ok(())
            }
            // Timing lives in the scheduler, which answers before this.
            ControlCommand::TakeTiming(_) => Ok(()),
        }
    }

    fn on_transition(&mut self, transition: Transition, reason: &str) {
        let Transition::Entered(mode) = transition else {
            return;
        };
        if mode == RenderMode::Streaming {
            self.session.start();
            self.state.pattern_id = ids::STREAMING;
        } else if self.session.active {
            self.session.reset();
        }
        info!("Mode changed to {:?} ({})", mode, reason);
    }

    pub fn select_pattern(&mut self, id: PatternId, now: Instant) -> Result<()> {
        if !self.registry.contains(id) {
            return Err(Error::UnknownPattern(id.into()));
        }
        let transition = self.mode.select_pattern(id, now);
        self.on_transition(transition, "pattern selected");
        self.state.pattern_id = id;
        self.registry.reset(id);
        debug!("Pattern {}", id);
        Ok(())
    }

    pub fn set_active_count(&mut self, count: usize, now: Instant) -> Result<()> {
        validate_active_count(count, self.capacity())?;
        self.mode.touch(now);
        self.frame.set_active_count(count);
        self.frame.clear();
        info!("Active pixels: {}", count);
        Ok(())
    }

    /// Switch to a `rows` x `cols` panel grid. The active count follows the
    /// grid size and the frame is cleared.
    pub fn set_panel_grid(&mut self, rows: u16, cols: u16, now: Instant) -> Result<()> {
        let layout = validate_panel_grid(rows, cols, self.capacity())?;
        self.mode.touch(now);
        self.layout = layout;
        self.frame.set_active_count(layout.pixel_count());
        self.frame.clear();
        info!(
            "Panel grid {}x{} ({}x{} pixels)",
            rows,
            cols,
            layout.width(),
            layout.height()
        );
        Ok(())
    }

    /// New text restarts the scroll and switches to the text pattern.
    pub fn set_scroll_text(&mut self, text: Option<String>, speed_ms: Option<u64>, now: Instant) {
        self.mode.touch(now);
        if let Some(speed) = speed_ms {
            self.state.scroll_speed_ms = clamp_scroll_speed(speed);
        }
        if let Some(text) = text {
            self.state.scroll_text = text.to_uppercase();
            self.state.scroll_offset = 0;
            let transition = self.mode.select_pattern(ids::SCROLLING_TEXT, now);
            self.on_transition(transition, "scroll text set");
            self.state.pattern_id = ids::SCROLLING_TEXT;
            self.registry.reset(ids::SCROLLING_TEXT);
            info!(
                "Scroll text {:?} at {} ms/step",
                self.state.scroll_text, self.state.scroll_speed_ms
            );
        }
    }

    pub fn enter_streaming(&mut self, now: Instant) {
        let transition = self.mode.enter_streaming(now);
        self.on_transition(transition, "stream requested");
    }

    /// The stream sent its exit packet.
    pub fn exit_streaming(&mut self, now: Instant) {
        let transition = self.mode.exit_streaming(now);
        if transition == Transition::Unchanged {
            return;
        }
        self.on_transition(transition, "exit packet");
        self.state.pattern_id = ids::STATUS_CLOCK;
        self.registry.reset(ids::STATUS_CLOCK);
    }

    pub fn install_custom_pattern(&mut self, pixels: PixelBuffer, result: UploadParseResult, now: Instant) {
        self.state.custom_pattern = pixels;
        self.state.has_custom_pattern = true;
        self.state.custom_pattern_scrolls = result.scroll_speed_ms.is_some();
        if let Some(speed) = result.scroll_speed_ms {
            self.state.scroll_speed_ms = speed;
        }
        let transition = self.mode.select_pattern(ids::CUSTOM_PATTERN, now);
        self.on_transition(transition, "pattern uploaded");
        self.state.pattern_id = ids::CUSTOM_PATTERN;
        self.registry.reset(ids::CUSTOM_PATTERN);
        info!(
            "Custom pattern installed: {} pixels, scroll {:?}",
            result.pixel_count, result.scroll_speed_ms
        );
    }

    /// Dispatch the current pattern into the frame.
    pub fn render(&mut self, clock: FrameClock) {
        let pattern_id = self.state.pattern_id;
        dispatch(
            &mut self.registry,
            pattern_id,
            &mut self.frame,
            &mut self.state,
            &self.layout,
            clock,
        );
    }
}

// ── Timing ─────────────────────────────────────────────────────────

/// "Every N milliseconds" task with an explicit last-run time.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicTask {
    period: Duration,
    last_run: Option<Instant>,
}

impl PeriodicTask {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_run: None,
        }
    }

    /// True (and records the run) when the period has elapsed. Always true
    /// the first time.
    pub fn due(&mut self, now: Instant) -> bool {
        let due = self
            .last_run
            .is_none_or(|last| now.saturating_duration_since(last) >= self.period);
        if due {
            self.last_run = Some(now);
        }
        due
    }

    /// Record a run that happened outside [`PeriodicTask::due`].
    pub fn mark(&mut self, now: Instant) {
        self.last_run = Some(now);
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Average {
    samples: u64,
    total: Duration,
}

impl Average {
    fn record(&mut self, sample: Duration) {
        self.samples += 1;
        self.total += sample;
    }

    fn micros(&self) -> u64 {
        if self.samples == 0 {
            return 0;
        }
        (self.total.as_micros() / u128::from(self.samples)) as u64
    }
}

/// Running averages of the expensive tick steps.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimingProfile {
    tick: Average,
    drain: Average,
    push: Average,
}

/// Averages since the last reset, in microseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct TimingReport {
    pub ticks: u64,
    pub avg_tick_us: u64,
    pub drains: u64,
    pub avg_drain_us: u64,
    pub pushes: u64,
    pub avg_push_us: u64,
}

impl TimingProfile {
    pub fn report(&self) -> TimingReport {
        TimingReport {
            ticks: self.tick.samples,
            avg_tick_us: self.tick.micros(),
            drains: self.drain.samples,
            avg_drain_us: self.drain.micros(),
            pushes: self.push.samples,
            avg_push_us: self.push.micros(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Report and reset in one step, so no sample falls between the two.
    pub fn take(&mut self) -> TimingReport {
        std::mem::take(self).report()
    }
}

// ── Update channel ─────────────────────────────────────────────────

/// State reported by the firmware-update channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    Idle,
    Started,
    Finished,
    Failed(String),
}

/// Hook for an over-the-air update transport, polled in step 1.
pub trait UpdateChannel: Send {
    fn poll(&mut self) -> UpdateEvent;
}

/// No update transport configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUpdates;

impl UpdateChannel for NoUpdates {
    fn poll(&mut self) -> UpdateEvent {
        UpdateEvent::Idle
    }
}

// ── Scheduler ──────────────────────────────────────────────────────

/// What one tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub serviced_control: bool,
    pub commands: usize,
    pub packets: usize,
    pub rendered: bool,
    pub pushed: bool,
}

impl TickReport {
    pub fn idle(&self) -> bool {
        self.packets == 0 && !self.rendered && !self.pushed
    }
}

pub struct Scheduler<O, P> {
    ctx: ControllerContext,
    commands: Receiver<ControlCommand>,
    packets: P,
    output: O,
    updates: Box<dyn UpdateChannel>,
    animation: PeriodicTask,
    control: PeriodicTask,
    packet_buf: Vec<u8>,
    utc_offset: UtcOffset,
    brightness: u8,
    timing: TimingProfile,
    started: Instant,
}

impl<O: OutputDriver, P: PacketSource> Scheduler<O, P> {
    pub fn new(
        config: &ControllerConfig,
        commands: Receiver<ControlCommand>,
        packets: P,
        output: O,
        now: Instant,
    ) -> Result<Self> {
        Ok(Self {
            ctx: ControllerContext::new(config, now)?,
            commands,
            packets,
            output,
            updates: Box::new(NoUpdates),
            animation: PeriodicTask::new(config.frame_interval),
            control: PeriodicTask::new(config.streaming_control_interval),
            packet_buf: vec![0; config.capacity * 3],
            utc_offset: config.utc_offset(),
            brightness: config.brightness,
            timing: TimingProfile::default(),
            started: now,
        })
    }

    pub fn with_update_channel(mut self, updates: Box<dyn UpdateChannel>) -> Self {
        self.updates = updates;
        self
    }

    pub fn context(&self) -> &ControllerContext {
        &self.ctx
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn timing(&self) -> TimingReport {
        self.timing.report()
    }

    /// Run one scheduler iteration at monotonic time `now`.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let tick_started = Instant::now();
        let mut report = TickReport::default();

        let service = if self.ctx.mode.is_streaming() {
            self.control.due(now)
        } else {
            self.control.mark(now);
            true
        };
        if service {
            report.pushed |= self.service_updates(now);
            report.commands = self.service_commands(now);
            report.serviced_control = true;
        }

        // After commands, so a selection queued just before the timeout
        // still counts as activity.
        let transition = self.ctx.mode.poll_idle(now);
        self.ctx.on_transition(transition, "idle timeout");

        if self.ctx.mode.is_streaming() {
            let drain_started = Instant::now();
            let drained = stream::drain(
                &mut self.packets,
                &mut self.packet_buf,
                &mut self.ctx.frame,
                &mut self.ctx.session,
                now,
            );
            if drained.packets > 0 {
                self.timing.drain.record(drain_started.elapsed());
                self.push();
                report.pushed = true;
            }
            report.packets = drained.packets;
            if drained.exit_requested {
                self.ctx.exit_streaming(now);
            }
        } else if self.animation.due(now) {
            let clock = FrameClock::new(now, self.wall_clock());
            self.ctx.render(clock);
            self.push();
            report.rendered = true;
            report.pushed = true;
        }

        self.timing.tick.record(tick_started.elapsed());
        report
    }

    fn wall_clock(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.utc_offset)
    }

    fn push(&mut self) {
        let push_started = Instant::now();
        self.output.push(&self.ctx.frame, &self.ctx.layout);
        self.timing.push.record(push_started.elapsed());
    }

    /// Returns true when the frame was pushed.
    fn service_updates(&mut self, now: Instant) -> bool {
        match self.updates.poll() {
            UpdateEvent::Idle => false,
            UpdateEvent::Started => {
                info!("Firmware update started, blanking display");
                if let Err(e) = self.ctx.select_pattern(ids::OFF, now) {
                    warn!("Could not switch off for update: {}", e);
                }
                self.ctx.frame.clear();
                self.push();
                true
            }
            UpdateEvent::Finished => {
                info!("Firmware update finished");
                false
            }
            UpdateEvent::Failed(reason) => {
                warn!("Firmware update failed: {}", reason);
                false
            }
        }
    }

    /// Apply every queued command; returns how many there were.
    fn service_commands(&mut self, now: Instant) -> usize {
        let mut count = 0;
        while let Ok(command) = self.commands.try_recv() {
            count += 1;
            match command {
                ControlCommand::TakeTiming(reply) => {
                    if reply.send(self.timing.take()).is_err() {
                        debug!("Timing reader went away");
                    }
                }
                command => {
                    if let Err(e) = self.ctx.apply(command, now) {
                        warn!("Rejected control command: {}", e);
                    }
                }
            }
        }
        count
    }

    /// Copy of the active pixels for the preview.
    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            layout: self.ctx.layout,
            pixels: self.ctx.frame.active().to_vec(),
        }
    }

    /// Snapshot for the control plane.
    pub fn status(&self, now: Instant) -> ControllerStatus {
        let ctx = &self.ctx;
        ControllerStatus {
            mode: ctx.mode.mode(),
            pattern_id: ctx.state.pattern_id,
            pattern_name: ctx
                .registry
                .info(ctx.state.pattern_id)
                .map_or("Streaming", |info| info.name)
                .to_string(),
            active_count: ctx.frame.active_count(),
            capacity: ctx.capacity(),
            layout: ctx.layout,
            scroll_text: ctx.state.scroll_text.clone(),
            scroll_speed_ms: ctx.state.scroll_speed_ms,
            has_custom_pattern: ctx.state.has_custom_pattern,
            streaming: ctx.session.stats(now),
            timing: self.timing.report(),
            brightness: self.brightness,
            uptime_secs: now.saturating_duration_since(self.started).as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::RecordingOutput;
    use crate::stream::tests::QueuedPackets;
    use crate::Rgb;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::mpsc::{self, Sender};

    const MS: Duration = Duration::from_millis(1);

    type TestScheduler = Scheduler<RecordingOutput, QueuedPackets>;

    fn config() -> ControllerConfig {
        ControllerConfig {
            panel_rows: 2,
            panels_wide: 1,
            capacity: 1024,
            ..ControllerConfig::default()
        }
    }

    fn scheduler() -> (TestScheduler, Sender<ControlCommand>, Instant) {
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();
        let scheduler = Scheduler::new(
            &config(),
            rx,
            QueuedPackets::default(),
            RecordingOutput::default(),
            start,
        )
        .unwrap();
        (scheduler, tx, start)
    }

    fn streaming_scheduler() -> (TestScheduler, Sender<ControlCommand>, Instant) {
        let (mut s, tx, start) = scheduler();
        tx.send(ControlCommand::EnterStreaming).unwrap();
        s.tick(start);
        assert_eq!(s.context().mode.mode(), RenderMode::Streaming);
        (s, tx, start)
    }

    // ── Context ────────────────────────────────────────────────────

    fn context() -> (ControllerContext, Instant) {
        let now = Instant::now();
        (ControllerContext::new(&config(), now).unwrap(), now)
    }

    #[test]
    fn boots_into_status_display() {
        let (ctx, _) = context();
        assert_eq!(ctx.state.pattern_id, ids::STATUS_CLOCK);
        assert_eq!(ctx.mode.mode(), RenderMode::Default);
        assert_eq!(ctx.frame.active_count(), 512);
    }

    #[test]
    fn unknown_pattern_is_rejected_and_state_kept() {
        let (mut ctx, now) = context();
        ctx.select_pattern(ids::RAINBOW, now).unwrap();
        assert!(matches!(ctx.select_pattern(42, now), Err(Error::UnknownPattern(42))));
        assert_eq!(ctx.state.pattern_id, ids::RAINBOW);
    }

    #[rstest]
    #[case(0)]
    #[case(1025)]
    fn active_count_out_of_range_is_rejected(#[case] count: usize) {
        let (mut ctx, now) = context();
        assert!(ctx.set_active_count(count, now).is_err());
        assert_eq!(ctx.frame.active_count(), 512);
    }

    #[test]
    fn active_count_change_clears_frame() {
        let (mut ctx, now) = context();
        ctx.frame.overwrite_bytes(&[255; 30]);
        ctx.set_active_count(1024, now).unwrap();
        assert_eq!(ctx.frame.active_count(), 1024);
        assert!(ctx.frame.pixels().iter().all(|p| p.is_black()));
    }

    #[test]
    fn panel_grid_updates_layout_and_active_count_together() {
        let (mut ctx, now) = context();
        ctx.set_panel_grid(2, 2, now).unwrap();
        assert_eq!(ctx.layout.width(), 64);
        assert_eq!(ctx.layout.height(), 16);
        assert_eq!(ctx.frame.active_count(), 1024);
    }

    #[rstest]
    #[case(0, 1)]
    #[case(17, 1)]
    #[case(2, 4)] // 2048 pixels, over the 1024 capacity
    fn invalid_panel_grid_keeps_prior_layout(#[case] rows: u16, #[case] cols: u16) {
        let (mut ctx, now) = context();
        let before = ctx.layout;
        assert!(ctx.set_panel_grid(rows, cols, now).is_err());
        assert_eq!(ctx.layout, before);
        assert_eq!(ctx.frame.active_count(), 512);
    }

    #[test]
    fn scroll_text_is_uppercased_and_selected() {
        let (mut ctx, now) = context();
        ctx.state.scroll_offset = 17;
        ctx.set_scroll_text(Some("hello".to_string()), Some(5), now);
        assert_eq!(ctx.state.scroll_text, "HELLO");
        assert_eq!(ctx.state.scroll_offset, 0);
        assert_eq!(ctx.state.scroll_speed_ms, 20);
        assert_eq!(ctx.state.pattern_id, ids::SCROLLING_TEXT);
        assert_eq!(ctx.mode.mode(), RenderMode::Animating);
    }

    #[test]
    fn speed_only_keeps_pattern() {
        let (mut ctx, now) = context();
        ctx.set_scroll_text(None, Some(900), now);
        assert_eq!(ctx.state.scroll_speed_ms, 200);
        assert_eq!(ctx.state.pattern_id, ids::STATUS_CLOCK);
    }

    #[test]
    fn zero_pixel_upload_still_installs() {
        let (mut ctx, now) = context();
        ctx.install_custom_pattern(PixelBuffer::new(1024), UploadParseResult::default(), now);
        assert!(ctx.state.has_custom_pattern);
        assert!(!ctx.state.custom_pattern_scrolls);
        assert_eq!(ctx.state.pattern_id, ids::CUSTOM_PATTERN);
    }

    // ── Ticks ──────────────────────────────────────────────────────

    #[test]
    fn animation_runs_on_cadence() {
        let (mut s, _tx, start) = scheduler();
        assert!(s.tick(start).rendered);
        assert!(!s.tick(start + 10 * MS).rendered);
        assert!(s.tick(start + 20 * MS).rendered);
        assert_eq!(s.output().frames.len(), 2);
    }

    #[test]
    fn commands_land_before_render() {
        let (mut s, tx, start) = scheduler();
        tx.send(ControlCommand::SelectPattern(ids::RED)).unwrap();
        s.tick(start);
        let frame = s.output().frames.last().unwrap();
        assert!(frame.active().iter().all(|&p| p == Rgb::RED));
    }

    #[test]
    fn rendered_frames_blank_past_active_count() {
        let (mut s, tx, start) = scheduler();
        tx.send(ControlCommand::SelectPattern(ids::RED)).unwrap();
        tx.send(ControlCommand::SetActiveCount(100)).unwrap();
        s.tick(start);
        let frame = s.output().frames.last().unwrap();
        assert!(frame.pixels()[100..].iter().all(|p| p.is_black()));
    }

    #[test]
    fn streaming_skips_dispatch_and_pushes_packets() {
        let (mut s, _tx, start) = streaming_scheduler();
        s.packets.push(&[9, 8, 7]);
        let report = s.tick(start + MS);
        assert_eq!(report.packets, 1);
        assert!(!report.rendered);
        assert_eq!(s.output().frames.last().unwrap().pixels()[0], Rgb::new(9, 8, 7));
        assert_eq!(s.context().session.packets_displayed, 1);
    }

    #[test]
    fn streaming_without_packets_pushes_nothing() {
        let (mut s, _tx, start) = streaming_scheduler();
        let pushed_before = s.output().frames.len();
        for i in 1..100 {
            s.tick(start + i * 20 * MS);
        }
        assert_eq!(s.output().frames.len(), pushed_before);
        assert!(s.context().mode.is_streaming());
    }

    #[test]
    fn control_is_throttled_while_streaming() {
        let (mut s, tx, start) = streaming_scheduler();
        tx.send(ControlCommand::SelectPattern(ids::RAINBOW)).unwrap();

        let report = s.tick(start + 50 * MS);
        assert!(!report.serviced_control);
        assert!(s.context().mode.is_streaming());

        let report = s.tick(start + 200 * MS);
        assert!(report.serviced_control);
        assert_eq!(s.context().mode.mode(), RenderMode::Animating);
    }

    #[test]
    fn packets_drain_every_tick_while_streaming() {
        let (mut s, _tx, start) = streaming_scheduler();
        for i in 1..=5u32 {
            s.packets.push(&[i as u8, 0, 0]);
            assert_eq!(s.tick(start + i * MS).packets, 1);
        }
    }

    #[test]
    fn exit_packet_returns_to_default() {
        let (mut s, _tx, start) = streaming_scheduler();
        s.packets.push(&[1, 1, 1]);
        s.packets.push(b"EXIT");
        s.tick(start + MS);

        let ctx = s.context();
        assert_eq!(ctx.mode.mode(), RenderMode::Default);
        assert_eq!(ctx.state.pattern_id, ids::STATUS_CLOCK);
        assert_eq!(ctx.session, StreamingSession::default());

        assert!(s.tick(start + 100 * MS).rendered);
    }

    #[test]
    fn near_miss_exit_keeps_streaming() {
        let (mut s, _tx, start) = streaming_scheduler();
        s.packets.push(b"EXIt");
        s.tick(start + MS);
        assert!(s.context().mode.is_streaming());
    }

    #[test]
    fn idle_default_display_enters_streaming() {
        let (mut s, _tx, start) = scheduler();
        s.tick(start);
        assert!(!s.context().mode.is_streaming());
        s.tick(start + Duration::from_secs(60));
        assert!(s.context().mode.is_streaming());
        assert!(s.context().session.active);
        assert_eq!(s.context().state.pattern_id, ids::STREAMING);
    }

    #[test]
    fn selection_queued_at_idle_deadline_wins() {
        let (mut s, tx, start) = scheduler();
        s.tick(start + Duration::from_millis(59_999));
        tx.send(ControlCommand::SelectPattern(ids::RAINBOW)).unwrap();

        let report = s.tick(start + Duration::from_secs(60));

        assert_eq!(report.commands, 1);
        assert_eq!(s.context().mode.mode(), RenderMode::Animating);
        assert!(!s.context().session.active);
        assert_eq!(s.context().state.pattern_id, ids::RAINBOW);
    }

    #[test]
    fn animating_never_idles_into_streaming() {
        let (mut s, tx, start) = scheduler();
        tx.send(ControlCommand::SelectPattern(ids::RAINBOW)).unwrap();
        s.tick(start);
        s.tick(start + Duration::from_secs(600));
        assert_eq!(s.context().mode.mode(), RenderMode::Animating);
    }

    #[test]
    fn upload_command_switches_to_custom_pattern() {
        let (mut s, tx, start) = scheduler();
        let mut pixels = PixelBuffer::new(1024);
        pixels.set(0, Rgb::BLUE);
        tx.send(ControlCommand::InstallCustomPattern {
            pixels,
            result: UploadParseResult {
                pixel_count: 1,
                scroll_speed_ms: None,
            },
        })
        .unwrap();
        s.tick(start);
        let frame = s.output().frames.last().unwrap();
        assert_eq!(frame.pixels()[0], Rgb::BLUE);
        assert_eq!(s.context().state.pattern_id, ids::CUSTOM_PATTERN);
    }

    #[test]
    fn take_timing_replies_then_resets() {
        let (mut s, tx, start) = scheduler();
        s.tick(start);
        s.tick(start + 20 * MS);
        let (reply_tx, mut reply_rx) = oneshot::channel();
        tx.send(ControlCommand::TakeTiming(reply_tx)).unwrap();
        s.tick(start + 21 * MS);

        let taken = reply_rx.try_recv().unwrap();
        assert_eq!(taken.ticks, 2);
        assert_eq!(taken.pushes, 2);
        // Only the tick that answered has been recorded since.
        assert_eq!(s.timing().ticks, 1);
        assert_eq!(s.timing().pushes, 0);
    }

    #[test]
    fn take_timing_survives_dropped_reader() {
        let (mut s, tx, start) = scheduler();
        s.tick(start);
        let (reply_tx, reply_rx) = oneshot::channel();
        drop(reply_rx);
        tx.send(ControlCommand::TakeTiming(reply_tx)).unwrap();
        let report = s.tick(start + MS);
        assert_eq!(report.commands, 1);
        assert_eq!(s.timing().ticks, 1);
    }

    struct StartsUpdate(bool);

    impl UpdateChannel for StartsUpdate {
        fn poll(&mut self) -> UpdateEvent {
            if std::mem::take(&mut self.0) {
                UpdateEvent::Started
            } else {
                UpdateEvent::Idle
            }
        }
    }

    #[test]
    fn update_start_blanks_and_switches_off() {
        let (s, tx, start) = scheduler();
        let mut s = s.with_update_channel(Box::new(StartsUpdate(true)));
        tx.send(ControlCommand::SelectPattern(ids::RED)).unwrap();
        s.tick(start);
        assert_eq!(s.context().state.pattern_id, ids::RED);

        // The update was polled before the command, so the red frame is
        // what follows the blank push.
        let first = &s.output().frames[0];
        assert!(first.pixels().iter().all(|p| p.is_black()));
    }

    #[test]
    fn status_reflects_context() {
        let (mut s, tx, start) = scheduler();
        tx.send(ControlCommand::SelectPattern(ids::CONFETTI)).unwrap();
        s.tick(start);
        let status = s.status(start + Duration::from_secs(3));
        assert_eq!(status.pattern_id, ids::CONFETTI);
        assert_eq!(status.pattern_name, "Confetti");
        assert_eq!(status.mode, RenderMode::Animating);
        assert_eq!(status.uptime_secs, 3);
    }

    #[rstest]
    #[case(ids::RAINBOW, true)]
    #[case(ids::STATUS_CLOCK, true)]
    #[case(ids::STREAMING, false)]
    #[case(99, false)]
    fn pattern_validation_follows_catalogue(#[case] id: PatternId, #[case] ok: bool) {
        assert_eq!(validate_pattern(id).is_ok(), ok);
    }

    #[test]
    fn periodic_task_first_call_is_due() {
        let start = Instant::now();
        let mut task = PeriodicTask::new(20 * MS);
        assert!(task.due(start));
        assert!(!task.due(start + 19 * MS));
        assert!(task.due(start + 20 * MS));
        task.mark(start + 100 * MS);
        assert!(!task.due(start + 110 * MS));
    }
}
