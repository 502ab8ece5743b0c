//! Pixel storage.
//!
//! [`PixelBuffer`] is a fixed-capacity run of pixels in wire order. The
//! live [`FrameBuffer`] wraps one with an active pixel count; the custom
//! pattern is a bare `PixelBuffer` so uploads never touch the live frame.

use crate::Rgb;

/// Fixed-capacity pixels in physical wire order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    pixels: Vec<Rgb>,
}

impl PixelBuffer {
    /// All-black buffer of `capacity` pixels.
    pub fn new(capacity: usize) -> Self {
        Self {
            pixels: vec![Rgb::BLACK; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.pixels.len()
    }

    /// Size of the raw `R, G, B, R, G, B, ...` byte view.
    pub fn byte_len(&self) -> usize {
        self.pixels.len() * 3
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Rgb] {
        &mut self.pixels
    }

    pub fn get(&self, index: usize) -> Option<Rgb> {
        self.pixels.get(index).copied()
    }

    /// Set one pixel; returns false when `index` is beyond capacity.
    pub fn set(&mut self, index: usize, color: Rgb) -> bool {
        match self.pixels.get_mut(index) {
            Some(pixel) => {
                *pixel = color;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.pixels.fill(Rgb::BLACK);
    }

    /// Write one byte of the raw byte view; returns false past the end.
    pub fn write_byte(&mut self, offset: usize, value: u8) -> bool {
        let Some(pixel) = self.pixels.get_mut(offset / 3) else {
            return false;
        };
        match offset % 3 {
            0 => pixel.r = value,
            1 => pixel.g = value,
            _ => pixel.b = value,
        }
        true
    }

    /// Copy `bytes` over the raw byte view from offset 0, truncated to
    /// capacity. Bytes past the copied prefix keep their old values.
    /// Returns the number of bytes written.
    pub fn overwrite_bytes(&mut self, bytes: &[u8]) -> usize {
        let len = bytes.len().min(self.byte_len());
        let bytes = &bytes[..len];

        let mut chunks = bytes.chunks_exact(3);
        for (pixel, rgb) in self.pixels.iter_mut().zip(&mut chunks) {
            *pixel = Rgb::new(rgb[0], rgb[1], rgb[2]);
        }
        let whole = len - chunks.remainder().len();
        for (i, &byte) in chunks.remainder().iter().enumerate() {
            self.write_byte(whole + i, byte);
        }
        len
    }
}

/// The live frame: pixels plus the number of pixels actually wired up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    buffer: PixelBuffer,
    active_count: usize,
}

impl FrameBuffer {
    /// All-black frame with every pixel active.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: PixelBuffer::new(capacity),
            active_count: capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Change the active pixel count.
    ///
    /// Callers validate against [`FrameBuffer::capacity`] first; exceeding it
    /// is a programming error.
    pub fn set_active_count(&mut self, count: usize) {
        assert!(
            count <= self.capacity(),
            "active count {count} exceeds frame capacity {}",
            self.capacity()
        );
        self.active_count = count;
    }

    pub fn pixels(&self) -> &[Rgb] {
        self.buffer.pixels()
    }

    /// The active prefix.
    pub fn active(&self) -> &[Rgb] {
        &self.buffer.pixels()[..self.active_count]
    }

    pub fn active_mut(&mut self) -> &mut [Rgb] {
        let count = self.active_count;
        &mut self.buffer.pixels_mut()[..count]
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn clear_active(&mut self) {
        self.active_mut().fill(Rgb::BLACK);
    }

    /// Force every pixel at or beyond the active count to black.
    pub fn blank_inactive(&mut self) {
        let count = self.active_count;
        self.buffer.pixels_mut()[count..].fill(Rgb::BLACK);
    }

    /// Raw byte overwrite, see [`PixelBuffer::overwrite_bytes`].
    pub fn overwrite_bytes(&mut self, bytes: &[u8]) -> usize {
        self.buffer.overwrite_bytes(bytes)
    }

    pub fn as_pixel_buffer(&self) -> &PixelBuffer {
        &self.buffer
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn new_buffer_is_black() {
        let buffer = PixelBuffer::new(4);
        assert!(buffer.pixels().iter().all(|p| p.is_black()));
        assert_eq!(buffer.byte_len(), 12);
    }

    #[test]
    fn set_out_of_range_is_ignored() {
        let mut buffer = PixelBuffer::new(2);
        assert!(!buffer.set(2, Rgb::RED));
        assert!(buffer.set(1, Rgb::RED));
        assert_eq!(buffer.get(1), Some(Rgb::RED));
    }

    #[rstest]
    #[case(0, Rgb::new(9, 0, 0))]
    #[case(1, Rgb::new(0, 9, 0))]
    #[case(2, Rgb::new(0, 0, 9))]
    fn write_byte_targets_channel(#[case] offset: usize, #[case] expected: Rgb) {
        let mut buffer = PixelBuffer::new(1);
        assert!(buffer.write_byte(offset, 9));
        assert_eq!(buffer.get(0), Some(expected));
    }

    #[test]
    fn overwrite_bytes_truncates_to_capacity() {
        let mut buffer = PixelBuffer::new(2);
        let written = buffer.overwrite_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(written, 6);
        assert_eq!(buffer.pixels(), &[Rgb::new(1, 2, 3), Rgb::new(4, 5, 6)]);
    }

    #[test]
    fn overwrite_bytes_partial_pixel_keeps_remaining_channels() {
        let mut buffer = PixelBuffer::new(2);
        buffer.set(1, Rgb::WHITE);
        buffer.overwrite_bytes(&[1, 2, 3, 4]);
        assert_eq!(buffer.get(0), Some(Rgb::new(1, 2, 3)));
        assert_eq!(buffer.get(1), Some(Rgb::new(4, 255, 255)));
    }

    #[test]
    fn blank_inactive_only_touches_tail() {
        let mut frame = FrameBuffer::new(4);
        frame.overwrite_bytes(&[255; 12]);
        frame.set_active_count(2);
        frame.blank_inactive();
        assert_eq!(frame.active(), &[Rgb::WHITE, Rgb::WHITE]);
        assert_eq!(&frame.pixels()[2..], &[Rgb::BLACK, Rgb::BLACK]);
    }

    #[test]
    fn clear_active_leaves_tail() {
        let mut frame = FrameBuffer::new(3);
        frame.overwrite_bytes(&[255; 9]);
        frame.set_active_count(1);
        frame.clear_active();
        assert_eq!(frame.pixels(), &[Rgb::BLACK, Rgb::WHITE, Rgb::WHITE]);
    }

    #[test]
    #[should_panic(expected = "exceeds frame capacity")]
    fn active_count_beyond_capacity_panics() {
        FrameBuffer::new(4).set_active_count(5);
    }
}
