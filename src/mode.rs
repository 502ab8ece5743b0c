//! Render-mode state machine.
//!
//! ```text
//!            select(200)                  idle timeout / stream request
//!  ANIMATING ───────────► DEFAULT ──────────────────────────────► STREAMING
//!      ▲  ◄───────────────  │  ◄──────────────── "EXIT" packet ──────┘
//!      └──── select(id) ────┘
//! ```
//!
//! Silence on the stream never leaves STREAMING; only the exit packet or an
//! explicit pattern selection does.

use crate::effect::{PatternId, ids};
use serde::Serialize;
use std::time::{Duration, Instant};
use utoipa::ToSchema;

/// Who is filling the frame buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Status line and clock.
    Default,
    /// A selected pattern.
    Animating,
    /// Pixels come from the stream; dispatch is skipped.
    Streaming,
}

/// What a call into the state machine changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Entered(RenderMode),
}

#[derive(Debug, Clone)]
pub struct ModeMachine {
    mode: RenderMode,
    last_activity: Instant,
    idle_timeout: Option<Duration>,
}

impl ModeMachine {
    /// Start in [`RenderMode::Default`] with the idle timer running from `now`.
    pub fn new(now: Instant, idle_timeout: Option<Duration>) -> Self {
        Self {
            mode: RenderMode::Default,
            last_activity: now,
            idle_timeout,
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn is_streaming(&self) -> bool {
        self.mode == RenderMode::Streaming
    }

    fn enter(&mut self, mode: RenderMode) -> Transition {
        if self.mode == mode {
            return Transition::Unchanged;
        }
        self.mode = mode;
        Transition::Entered(mode)
    }

    /// Control-plane activity: restart the idle timer.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// A pattern was selected. Resets the idle timer.
    pub fn select_pattern(&mut self, id: PatternId, now: Instant) -> Transition {
        self.touch(now);
        let mode = match id {
            ids::STATUS_CLOCK => RenderMode::Default,
            ids::STREAMING => RenderMode::Streaming,
            _ => RenderMode::Animating,
        };
        self.enter(mode)
    }

    /// Explicit request to start streaming.
    pub fn enter_streaming(&mut self, now: Instant) -> Transition {
        self.touch(now);
        self.enter(RenderMode::Streaming)
    }

    /// The stream sent its exit packet. Resets the idle timer so the
    /// status display stays up for a full timeout.
    pub fn exit_streaming(&mut self, now: Instant) -> Transition {
        if !self.is_streaming() {
            return Transition::Unchanged;
        }
        self.touch(now);
        self.enter(RenderMode::Default)
    }

    /// Idle check, once per tick. Only fires from [`RenderMode::Default`].
    pub fn poll_idle(&mut self, now: Instant) -> Transition {
        let Some(timeout) = self.idle_timeout else {
            return Transition::Unchanged;
        };
        if self.mode != RenderMode::Default {
            return Transition::Unchanged;
        }
        if now.saturating_duration_since(self.last_activity) < timeout {
            return Transition::Unchanged;
        }
        self.enter(RenderMode::Streaming)
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn machine() -> (ModeMachine, Instant) {
        let start = Instant::now();
        (ModeMachine::new(start, Some(TIMEOUT)), start)
    }

    #[test]
    fn starts_in_default() {
        let (m, _) = machine();
        assert_eq!(m.mode(), RenderMode::Default);
    }

    #[rstest]
    #[case(ids::STATUS_CLOCK, RenderMode::Default)]
    #[case(ids::RAINBOW, RenderMode::Animating)]
    #[case(ids::CUSTOM_PATTERN, RenderMode::Animating)]
    #[case(ids::STREAMING, RenderMode::Streaming)]
    fn pattern_selects_mode(#[case] id: PatternId, #[case] expected: RenderMode) {
        let (mut m, start) = machine();
        m.select_pattern(id, start);
        assert_eq!(m.mode(), expected);
    }

    #[test]
    fn idle_timeout_enters_streaming_from_default() {
        let (mut m, start) = machine();
        assert_eq!(m.poll_idle(start + TIMEOUT - Duration::from_millis(1)), Transition::Unchanged);
        assert_eq!(
            m.poll_idle(start + TIMEOUT),
            Transition::Entered(RenderMode::Streaming)
        );
    }

    #[test]
    fn idle_timeout_ignored_while_animating() {
        let (mut m, start) = machine();
        m.select_pattern(ids::RAINBOW, start);
        assert_eq!(m.poll_idle(start + TIMEOUT * 10), Transition::Unchanged);
        assert_eq!(m.mode(), RenderMode::Animating);
    }

    #[test]
    fn pattern_selection_resets_idle_timer() {
        let (mut m, start) = machine();
        let later = start + Duration::from_secs(50);
        m.select_pattern(ids::STATUS_CLOCK, later);
        assert_eq!(m.poll_idle(start + TIMEOUT), Transition::Unchanged);
        assert_eq!(
            m.poll_idle(later + TIMEOUT),
            Transition::Entered(RenderMode::Streaming)
        );
    }

    #[test]
    fn disabled_idle_timeout_never_fires() {
        let start = Instant::now();
        let mut m = ModeMachine::new(start, None);
        assert_eq!(m.poll_idle(start + Duration::from_secs(3600)), Transition::Unchanged);
    }

    #[test]
    fn exit_returns_to_default_and_restarts_timer() {
        let (mut m, start) = machine();
        m.enter_streaming(start);
        let exit_at = start + Duration::from_secs(120);
        assert_eq!(m.exit_streaming(exit_at), Transition::Entered(RenderMode::Default));
        assert_eq!(m.poll_idle(exit_at + Duration::from_secs(59)), Transition::Unchanged);
    }

    #[test]
    fn exit_outside_streaming_is_ignored() {
        let (mut m, start) = machine();
        m.select_pattern(ids::RAINBOW, start);
        assert_eq!(m.exit_streaming(start), Transition::Unchanged);
        assert_eq!(m.mode(), RenderMode::Animating);
    }

    #[test]
    fn streaming_survives_silence() {
        let (mut m, start) = machine();
        m.enter_streaming(start);
        assert_eq!(m.poll_idle(start + Duration::from_secs(86_400)), Transition::Unchanged);
        assert!(m.is_streaming());
    }
}
