//! Render thread: runs the scheduler against the real clock and publishes
//! what the HTTP side is allowed to see.
//!
//! The scheduler owns the frame buffer and render state. The async HTTP
//! server never touches them; it sends `ControlCommand`s through an `mpsc`
//! channel and reads the snapshots published here.
//!
//! ## Rust concepts
//! - `Arc<Mutex<T>>` for the read-mostly status and preview cells
//! - `AtomicBool` shutdown flag shared with the ctrl-c handler
//! - A generic function over the scheduler's output driver and packet source

use crate::layout::GridLayout;
use crate::mode::RenderMode;
use crate::output::OutputDriver;
use crate::scheduler::{PeriodicTask, Scheduler, TimingReport};
use crate::stream::{PacketSource, StreamStats};
use crate::{Rgb, is_running};
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// How often status is republished when no command forced it.
const PUBLISH_INTERVAL: Duration = Duration::from_millis(100);

/// Sleep after a tick that did nothing, so an idle loop does not spin.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

// ── Status ───────────────────────────────────────────────────────────

/// What the controller is doing, as reported by `GET /api/v1/status`.
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct ControllerStatus {
    pub mode: RenderMode,
    pub pattern_id: u8,
    pub pattern_name: String,
    /// Pixels the current pattern draws
    pub active_count: usize,
    /// Frame buffer size in pixels
    pub capacity: usize,
    pub layout: GridLayout,
    pub scroll_text: String,
    pub scroll_speed_ms: u16,
    pub has_custom_pattern: bool,
    pub streaming: StreamStats,
    pub timing: TimingReport,
    /// Output brightness (0-100)
    pub brightness: u8,
    pub uptime_secs: u64,
    /// Server version
    pub version: String,
}

/// The last pushed frame, in wire order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub layout: GridLayout,
    pub pixels: Vec<Rgb>,
}

/// Cells the render thread writes and HTTP handlers read.
///
/// Rust concept: Arc<Mutex<T>>
/// Cloning `SharedState` clones the `Arc`s, so every handler sees the same
/// cells. Locks are held only long enough to copy a value in or out.
#[derive(Clone)]
pub struct SharedState {
    status: Arc<Mutex<ControllerStatus>>,
    preview: Arc<Mutex<FrameSnapshot>>,
}

/// A panic while holding the lock cannot leave a half-written snapshot, so a
/// poisoned cell is still readable.
fn lock<T>(cell: &Mutex<T>) -> MutexGuard<'_, T> {
    cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SharedState {
    pub fn new(status: ControllerStatus, preview: FrameSnapshot) -> Self {
        Self {
            status: Arc::new(Mutex::new(status)),
            preview: Arc::new(Mutex::new(preview)),
        }
    }

    pub fn status(&self) -> ControllerStatus {
        lock(&self.status).clone()
    }

    pub fn preview(&self) -> FrameSnapshot {
        lock(&self.preview).clone()
    }

    pub fn publish(&self, status: ControllerStatus, preview: FrameSnapshot) {
        *lock(&self.status) = status;
        *lock(&self.preview) = preview;
    }
}

// ── Render loop ──────────────────────────────────────────────────────

/// Tick until `running` is cleared.
///
/// Status and preview are republished after any tick that applied a
/// command, and otherwise every [`PUBLISH_INTERVAL`].
pub fn render_loop<O: OutputDriver, P: PacketSource>(
    mut scheduler: Scheduler<O, P>,
    shared: SharedState,
    running: Arc<AtomicBool>,
) {
    let mut publish = PeriodicTask::new(PUBLISH_INTERVAL);
    tracing::info!("Render thread started");

    while is_running(&running) {
        let now = Instant::now();
        let report = scheduler.tick(now);

        if report.commands > 0 || publish.due(now) {
            shared.publish(scheduler.status(now), scheduler.snapshot());
        }
        if report.idle() {
            thread::sleep(IDLE_SLEEP);
        }
    }

    tracing::info!("Render thread stopped");
}

// ── Tests ────────────────────────────────────────────────────────────
