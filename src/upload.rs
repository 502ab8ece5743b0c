//! Custom-pattern upload decoding.
//!
//! Bodies are scanned, not parsed as JSON: the decoders look for a fixed
//! marker and read a narrow grammar after it. Garbage degrades to fewer
//! decoded pixels and never fails the upload.
//!
//! ```text
//! {"hex":"RRGGBBRRGGBB...", "scrollSpeed": 80}
//! {"sparse":[[idx,r,g,b],[idx,r,g,b],...], "scrollSpeed": 80}
//! ```
//!
//! Raw binary uploads go through [`RawUploadReceiver`], which is fed body
//! chunks as they arrive and refuses the upload up front when the declared
//! length is too large.
//!
//! ## Rust concepts
//! - **Cursor structs**: [`Scanner`] owns a position into a borrowed byte
//!   slice, so every helper is a small method with no index juggling.
//! - **Option chaining**: the tuple parser returns `None` as soon as
//!   anything is off, and `?` keeps that short.

use crate::error::{Error, Result};
use crate::frame::PixelBuffer;
use crate::Rgb;

/// Slowest accepted scroll step.
pub const SCROLL_SPEED_MAX_MS: u16 = 200;
/// Fastest accepted scroll step.
pub const SCROLL_SPEED_MIN_MS: u16 = 20;
/// Scroll step used before anything is configured.
pub const SCROLL_SPEED_DEFAULT_MS: u16 = 50;

/// Slack allowed over `capacity * 3` for a declared raw upload length.
pub const RAW_UPLOAD_MARGIN: usize = 100;

const HEX_MARKER: &[u8] = b"\"hex\":\"";
const SPARSE_MARKER: &[u8] = b"\"sparse\":[";
const SCROLL_SPEED_MARKER: &[u8] = b"\"scrollSpeed\":";

/// Clamp any requested scroll speed into the accepted range.
pub fn clamp_scroll_speed(ms: u64) -> u16 {
    ms.clamp(u64::from(SCROLL_SPEED_MIN_MS), u64::from(SCROLL_SPEED_MAX_MS)) as u16
}

/// Outcome of decoding one upload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadParseResult {
    pub pixel_count: usize,
    /// Clamped scroll step, when the body asked for scrolling.
    pub scroll_speed_ms: Option<u16>,
}

// ── Scanner ────────────────────────────────────────────────────────

/// Byte cursor over an upload body.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Consume `byte` if it is next.
    pub fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Jump just past the first occurrence of `marker`. On a miss the
    /// cursor does not move.
    pub fn seek_past(&mut self, marker: &[u8]) -> bool {
        if marker.is_empty() {
            return true;
        }
        let found = self.bytes[self.pos.min(self.bytes.len())..]
            .windows(marker.len())
            .position(|window| window == marker);
        match found {
            Some(offset) => {
                self.pos += offset + marker.len();
                true
            }
            None => false,
        }
    }

    pub fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Skip commas and whitespace between values.
    pub fn skip_separators(&mut self) {
        while self.peek().is_some_and(|b| b == b',' || b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Read a run of ASCII digits. Saturates instead of overflowing.
    pub fn number(&mut self) -> Option<u64> {
        let start = self.pos;
        let mut value: u64 = 0;
        while let Some(digit) = self.peek().filter(u8::is_ascii_digit) {
            value = value.saturating_mul(10).saturating_add(u64::from(digit - b'0'));
            self.pos += 1;
        }
        (self.pos > start).then_some(value)
    }

    /// Read exactly `N` bytes, or nothing.
    pub fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let chunk = self.bytes.get(self.pos..self.pos + N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(chunk);
        self.pos += N;
        Some(out)
    }

    /// Move forward until the next byte is one of `stops`, or the end.
    pub fn skip_until(&mut self, stops: &[u8]) {
        while self.peek().is_some_and(|b| !stops.contains(&b)) {
            self.pos += 1;
        }
    }
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

fn hex_byte(high: u8, low: u8) -> Option<u8> {
    Some(hex_value(high)? << 4 | hex_value(low)?)
}

fn hex_pixel(run: [u8; 6]) -> Option<Rgb> {
    Some(Rgb::new(
        hex_byte(run[0], run[1])?,
        hex_byte(run[2], run[3])?,
        hex_byte(run[4], run[5])?,
    ))
}

// ── Text decoders ──────────────────────────────────────────────────

/// Dense-hex decoder. Returns `None` when the body has no hex marker.
///
/// Runs of six hex digits fill pixels from index 0. The scan stops at the
/// closing quote, at capacity, or at the first run that is short or not
/// hex.
pub fn decode_hex(body: &[u8], buffer: &mut PixelBuffer) -> Option<usize> {
    let mut scanner = Scanner::new(body);
    if !scanner.seek_past(HEX_MARKER) {
        return None;
    }

    let mut count = 0;
    while count < buffer.capacity() && scanner.peek().is_some_and(|b| b != b'"') {
        let Some(color) = scanner.take::<6>().and_then(hex_pixel) else {
            break;
        };
        buffer.set(count, color);
        count += 1;
    }
    Some(count)
}

/// One `[index, r, g, b]` tuple, cursor just past the opening bracket.
fn sparse_tuple(scanner: &mut Scanner<'_>) -> Option<(u64, Rgb)> {
    let channel = |scanner: &mut Scanner<'_>| {
        scanner.skip_separators();
        u8::try_from(scanner.number()?).ok()
    };

    scanner.skip_whitespace();
    let index = scanner.number()?;
    let r = channel(scanner)?;
    let g = channel(scanner)?;
    let b = channel(scanner)?;
    scanner.skip_whitespace();
    scanner.eat(b']').then_some((index, Rgb::new(r, g, b)))
}

/// Sparse decoder. Returns `None` when the body has no sparse marker.
///
/// Tuples with an out-of-range index are ignored; malformed tuples are
/// skipped by scanning to the next `[` or `]`. The count is the number of
/// pixels written.
pub fn decode_sparse(body: &[u8], buffer: &mut PixelBuffer) -> Option<usize> {
    let mut scanner = Scanner::new(body);
    if !scanner.seek_past(SPARSE_MARKER) {
        return None;
    }

    let mut count = 0;
    loop {
        scanner.skip_separators();
        match scanner.peek() {
            None | Some(b']') => break,
            Some(b'[') => {
                scanner.advance();
                match sparse_tuple(&mut scanner) {
                    Some((index, color)) => {
                        let written = usize::try_from(index).is_ok_and(|i| buffer.set(i, color));
                        if written {
                            count += 1;
                        }
                    }
                    None => {
                        scanner.skip_until(b"[]");
                        // A `]` here closes the broken tuple, not the array.
                        scanner.eat(b']');
                    }
                }
            }
            Some(_) => {
                scanner.advance();
            }
        }
    }
    Some(count)
}

/// Optional `"scrollSpeed": N` field, clamped into range. The number may be
/// quoted; a negative one clamps to the minimum.
pub fn scan_scroll_speed(body: &[u8]) -> Option<u16> {
    let mut scanner = Scanner::new(body);
    if !scanner.seek_past(SCROLL_SPEED_MARKER) {
        return None;
    }
    scanner.skip_whitespace();
    // Clients send the value quoted or signed now and then.
    let quoted = scanner.eat(b'"');
    let negative = scanner.eat(b'-');
    let value = scanner.number()?;
    if quoted && !scanner.eat(b'"') {
        return None;
    }
    Some(clamp_scroll_speed(if negative { 0 } else { value }))
}

/// Decode a textual upload into `buffer`.
///
/// The buffer is cleared first. Hex wins over sparse; a body with neither
/// marker is a valid, all-black pattern.
pub fn parse_pattern_body(body: &[u8], buffer: &mut PixelBuffer) -> UploadParseResult {
    buffer.clear();
    let pixel_count = decode_hex(body, buffer)
        .or_else(|| decode_sparse(body, buffer))
        .unwrap_or(0);
    UploadParseResult {
        pixel_count,
        scroll_speed_ms: scan_scroll_speed(body),
    }
}

// ── Raw binary ─────────────────────────────────────────────────────

/// Where a raw upload stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawUploadProgress {
    Receiving { written: usize },
    Rejected { declared: usize, limit: usize },
}

/// Byte sink for a raw `R, G, B, ...` upload.
///
/// A declared length over `capacity * 3 + RAW_UPLOAD_MARGIN` is refused
/// before any byte is stored, and the rest of the transfer is dropped as it
/// arrives. Accepted bytes beyond capacity are dropped too.
#[derive(Debug)]
pub struct RawUploadReceiver {
    buffer: PixelBuffer,
    progress: RawUploadProgress,
}

impl RawUploadReceiver {
    pub fn new(declared_len: Option<usize>, capacity: usize) -> Self {
        let limit = capacity * 3 + RAW_UPLOAD_MARGIN;
        let progress = match declared_len {
            Some(declared) if declared > limit => RawUploadProgress::Rejected { declared, limit },
            _ => RawUploadProgress::Receiving { written: 0 },
        };
        Self {
            buffer: PixelBuffer::new(capacity),
            progress,
        }
    }

    pub fn progress(&self) -> RawUploadProgress {
        self.progress
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.progress, RawUploadProgress::Rejected { .. })
    }

    /// Take the next body chunk.
    pub fn write(&mut self, chunk: &[u8]) {
        let RawUploadProgress::Receiving { written } = &mut self.progress else {
            return;
        };
        for &byte in chunk {
            if !self.buffer.write_byte(*written, byte) {
                break;
            }
            *written += 1;
        }
    }

    /// Finish the upload, yielding the decoded pattern.
    pub fn finish(self) -> Result<(PixelBuffer, UploadParseResult)> {
        match self.progress {
            RawUploadProgress::Rejected { declared, limit } => {
                Err(Error::UploadTooLarge { declared, limit })
            }
            RawUploadProgress::Receiving { written } => Ok((
                self.buffer,
                UploadParseResult {
                    pixel_count: written / 3,
                    scroll_speed_ms: None,
                },
            )),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
