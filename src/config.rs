//! Runtime configuration.
//!
//! `main.rs` resolves CLI flags into a [`ControllerConfig`]; everything in
//! the library takes this struct instead of reading flags or globals.

use crate::layout::GridLayout;
use crate::DEFAULT_CAPACITY;
use std::time::Duration;
use time::UtcOffset;

/// Fully resolved controller configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// HTTP control-plane port.
    pub http_port: u16,
    /// UDP port for the pixel stream.
    pub stream_port: u16,
    /// Panels placed side by side before wrapping to a new panel row.
    pub panels_wide: u16,
    /// Number of panel rows.
    pub panel_rows: u16,
    /// Frame buffer capacity in pixels.
    pub capacity: usize,
    /// Animation cadence.
    pub frame_interval: Duration,
    /// How often the control plane is serviced while streaming.
    pub streaming_control_interval: Duration,
    /// Idle time in the status display before streaming is entered.
    /// `None` disables the idle transition.
    pub idle_timeout: Option<Duration>,
    /// Output brightness, 0-100.
    pub brightness: u8,
    /// Offset applied to UTC for the clock effects.
    pub utc_offset_hours: i8,
    /// Line scrolled by the status display.
    pub status_text: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            stream_port: 4210,
            panels_wide: 1,
            panel_rows: 4,
            capacity: DEFAULT_CAPACITY,
            frame_interval: Duration::from_millis(20),
            streaming_control_interval: Duration::from_millis(200),
            idle_timeout: Some(Duration::from_secs(60)),
            brightness: 30,
            utc_offset_hours: 0,
            status_text: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Convert a seconds flag into an idle timeout, where 0 means "never".
    pub fn idle_timeout_from_secs(secs: u64) -> Option<Duration> {
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    /// The boot-time panel layout.
    pub fn layout(&self) -> crate::Result<GridLayout> {
        let layout = GridLayout::from_grid(self.panel_rows, self.panels_wide)?;
        layout.check_capacity(self.capacity)?;
        Ok(layout)
    }

    /// UTC offset for the clock effects; out-of-range hours fall back to UTC.
    pub fn utc_offset(&self) -> UtcOffset {
        UtcOffset::from_hms(self.utc_offset_hours, 0, 0).unwrap_or(UtcOffset::UTC)
    }
}
