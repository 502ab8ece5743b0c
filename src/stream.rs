//! Real-time pixel streaming over UDP.
//!
//! Each datagram is a full frame of raw `R, G, B` bytes copied over the live
//! buffer; the newest packet always wins. The only control message is the
//! exact four-byte payload `EXIT`, which hands the display back to the
//! default mode.

use crate::frame::FrameBuffer;
use serde::Serialize;
use std::io;
use std::net::UdpSocket;
use std::time::Instant;
use utoipa::ToSchema;

/// Payload that ends a streaming session. Compared case-sensitively.
pub const EXIT_SENTINEL: &[u8; 4] = b"EXIT";

/// What the scheduler should do after a packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    Continue,
    ExitStreaming,
}

/// Counters for the current streaming session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamingSession {
    pub active: bool,
    pub last_packet_at: Option<Instant>,
    pub packets_received: u64,
    pub packets_displayed: u64,
}

impl StreamingSession {
    /// Mark the session live. Counters carry over until [`StreamingSession::reset`].
    pub fn start(&mut self) {
        self.active = true;
    }

    /// Back to a fresh, inactive session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn stats(&self, now: Instant) -> StreamStats {
        StreamStats {
            active: self.active,
            received: self.packets_received,
            displayed: self.packets_displayed,
            dropped: self.packets_received.saturating_sub(self.packets_displayed),
            last_packet_age_ms: self
                .last_packet_at
                .map(|at| now.saturating_duration_since(at).as_millis() as u64),
        }
    }
}

/// Streaming statistics as reported over HTTP.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct StreamStats {
    pub active: bool,
    pub received: u64,
    pub displayed: u64,
    pub dropped: u64,
    pub last_packet_age_ms: Option<u64>,
}

/// Apply one datagram to the frame.
pub fn ingest(
    packet: &[u8],
    frame: &mut FrameBuffer,
    session: &mut StreamingSession,
    now: Instant,
) -> IngestOutcome {
    if packet == EXIT_SENTINEL {
        return IngestOutcome::ExitStreaming;
    }

    frame.overwrite_bytes(packet);
    session.packets_received += 1;
    session.packets_displayed += 1;
    session.last_packet_at = Some(now);
    IngestOutcome::Continue
}

// ── Packet sources ─────────────────────────────────────────────────

/// Non-blocking datagram source.
///
/// `Ok(None)` means nothing is queued right now.
pub trait PacketSource {
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

/// Expects a socket already switched to non-blocking mode.
impl PacketSource for UdpSocket {
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.recv(buf) {
            Ok(len) => Ok(Some(len)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// A source with nothing to say, for running without a stream socket.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPackets;

impl PacketSource for NoPackets {
    fn try_recv(&mut self, _buf: &mut [u8]) -> io::Result<Option<usize>> {
        Ok(None)
    }
}

/// Result of draining everything currently queued.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub packets: usize,
    pub exit_requested: bool,
}

/// Feed every queued datagram through [`ingest`], stopping early at the
/// exit packet. Never waits for new data.
pub fn drain<P: PacketSource + ?Sized>(
    source: &mut P,
    buf: &mut [u8],
    frame: &mut FrameBuffer,
    session: &mut StreamingSession,
    now: Instant,
) -> DrainReport {
    let mut report = DrainReport::default();
    loop {
        let len = match source.try_recv(buf) {
            Ok(Some(len)) => len.min(buf.len()),
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Stream receive failed: {}", e);
                break;
            }
        };
        if ingest(&buf[..len], frame, session, now) == IngestOutcome::ExitStreaming {
            report.exit_requested = true;
            break;
        }
        report.packets += 1;
    }
    report
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::Rgb;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Queue of canned datagrams.
    #[derive(Default)]
    pub(crate) struct QueuedPackets(pub VecDeque<Vec<u8>>);

    impl QueuedPackets {
        pub(crate) fn push(&mut self, packet: &[u8]) {
            self.0.push_back(packet.to_vec());
        }
    }

    impl PacketSource for QueuedPackets {
        fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
            let Some(packet) = self.0.pop_front() else {
                return Ok(None);
            };
            let len = packet.len().min(buf.len());
            buf[..len].copy_from_slice(&packet[..len]);
            Ok(Some(len))
        }
    }

    #[test]
    fn exit_sentinel_counts_nothing() {
        let mut frame = FrameBuffer::new(4);
        let mut session = StreamingSession::default();
        let outcome = ingest(b"EXIT", &mut frame, &mut session, Instant::now());
        assert_eq!(outcome, IngestOutcome::ExitStreaming);
        assert_eq!(session, StreamingSession::default());
    }

    #[rstest]
    #[case(b"exit")]
    #[case(b"EXIS")]
    #[case(b"EXI")]
    #[case(b"EXIT!")]
    fn near_misses_are_pixel_data(#[case] packet: &[u8]) {
        let mut frame = FrameBuffer::new(4);
        let mut session = StreamingSession::default();
        let outcome = ingest(packet, &mut frame, &mut session, Instant::now());
        assert_eq!(outcome, IngestOutcome::Continue);
        assert_eq!(session.packets_received, 1);
        assert_eq!(frame.pixels()[0].r, packet[0]);
    }

    #[test]
    fn packet_overwrites_frame_and_truncates() {
        let mut frame = FrameBuffer::new(2);
        let mut session = StreamingSession::default();
        let now = Instant::now();
        ingest(&[1, 2, 3, 4, 5, 6, 7, 8, 9], &mut frame, &mut session, now);
        assert_eq!(frame.pixels(), &[Rgb::new(1, 2, 3), Rgb::new(4, 5, 6)]);
        assert_eq!(session.packets_displayed, 1);
        assert_eq!(session.last_packet_at, Some(now));
    }

    #[test]
    fn latest_packet_wins() {
        let mut frame = FrameBuffer::new(1);
        let mut session = StreamingSession::default();
        let mut source = QueuedPackets::default();
        source.push(&[10, 10, 10]);
        source.push(&[20, 20, 20]);
        let mut buf = vec![0; 3];

        let report = drain(&mut source, &mut buf, &mut frame, &mut session, Instant::now());

        assert_eq!(report, DrainReport { packets: 2, exit_requested: false });
        assert_eq!(frame.pixels(), &[Rgb::new(20, 20, 20)]);
    }

    #[test]
    fn drain_stops_at_exit_and_leaves_rest_queued() {
        let mut frame = FrameBuffer::new(1);
        let mut session = StreamingSession::default();
        let mut source = QueuedPackets::default();
        source.push(&[10, 10, 10]);
        source.push(b"EXIT");
        source.push(&[30, 30, 30]);
        let mut buf = vec![0; 8];

        let report = drain(&mut source, &mut buf, &mut frame, &mut session, Instant::now());

        assert!(report.exit_requested);
        assert_eq!(report.packets, 1);
        assert_eq!(source.0.len(), 1);
        assert_eq!(frame.pixels(), &[Rgb::new(10, 10, 10)]);
    }

    #[test]
    fn stats_report_age_and_drops() {
        let start = Instant::now();
        let session = StreamingSession {
            active: true,
            last_packet_at: Some(start),
            packets_received: 10,
            packets_displayed: 7,
        };
        let stats = session.stats(start + Duration::from_millis(250));
        assert_eq!(stats.dropped, 3);
        assert_eq!(stats.last_packet_age_ms, Some(250));
    }

    #[test]
    fn udp_socket_drains_without_blocking() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_nonblocking(true).unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&[1, 2, 3], receiver.local_addr().unwrap()).unwrap();

        let mut receiver = receiver;
        let mut buf = [0u8; 16];
        // Loopback delivery is not instantaneous on every platform.
        let mut got = None;
        for _ in 0..100 {
            if let Some(len) = receiver.try_recv(&mut buf).unwrap() {
                got = Some(len);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(got, Some(3));
        assert_eq!(receiver.try_recv(&mut buf).unwrap(), None);
    }
}
