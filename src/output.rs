//! Hardware push: hands a finished frame to whatever drives the LEDs.
//!
//! The frame buffer is in wire order. Drivers that address pixels by
//! `(x, y)` walk the logical grid through the layout mapper to find each
//! pixel.

use crate::frame::FrameBuffer;
use crate::layout::GridLayout;

/// Receives every finished frame. Called only between ticks, so the
/// buffer is never half-rendered.
pub trait OutputDriver {
    fn push(&mut self, frame: &FrameBuffer, layout: &GridLayout);
}

/// No LEDs attached; counts frames so the logs show the loop is alive.
#[derive(Debug, Default)]
pub struct HeadlessOutput {
    pushes: u64,
}

impl HeadlessOutput {
    #[cfg(test)]
    pub(crate) fn pushes(&self) -> u64 {
        self.pushes
    }
}

impl OutputDriver for HeadlessOutput {
    fn push(&mut self, frame: &FrameBuffer, _layout: &GridLayout) {
        self.pushes += 1;
        if self.pushes % 500 == 0 {
            tracing::debug!("Pushed {} frames ({} active pixels)", self.pushes, frame.active_count());
        }
    }
}

/// Pixel size an output was opened with.
///
/// Drivers sized at boot cannot grow; a runtime layout change to a larger
/// grid is clipped to this, with one warning per new layout.
#[derive(Debug, Clone, Copy)]
pub struct BootGeometry {
    width: u16,
    height: u16,
    last_seen: Option<GridLayout>,
}

impl BootGeometry {
    pub fn new(layout: &GridLayout) -> Self {
        Self {
            width: layout.width(),
            height: layout.height(),
            last_seen: Some(*layout),
        }
    }

    pub fn width(&self) -> i32 {
        i32::from(self.width)
    }

    pub fn height(&self) -> i32 {
        i32::from(self.height)
    }

    /// True on the first push of a layout that does not fit.
    pub fn newly_clipped(&mut self, layout: &GridLayout) -> bool {
        if self.last_seen == Some(*layout) {
            return false;
        }
        self.last_seen = Some(*layout);
        let clipped = layout.width() > self.width || layout.height() > self.height;
        if clipped {
            tracing::warn!(
                "Layout {}x{} exceeds the {}x{} output opened at boot; extra pixels are not shown until restart",
                layout.width(),
                layout.height(),
                self.width,
                self.height
            );
        }
        clipped
    }
}

#[cfg(feature = "hardware")]
pub use matrix::MatrixOutput;

#[cfg(feature = "hardware")]
mod matrix {
    use super::{BootGeometry, OutputDriver};
    use crate::frame::FrameBuffer;
    use crate::layout::GridLayout;
    use crate::Rgb;
    use rpi_led_matrix::{LedCanvas, LedMatrix, LedMatrixOptions, LedRuntimeOptions};

    /// An `rpi-led-matrix` panel chain.
    ///
    /// # Rust concept: Option::take
    /// `LedMatrix::swap` consumes the offscreen canvas and returns the old
    /// front buffer, so the canvas lives in an `Option` we can move out of.
    pub struct MatrixOutput {
        matrix: LedMatrix,
        canvas: Option<LedCanvas>,
        geometry: BootGeometry,
        brightness: u8,
    }

    impl MatrixOutput {
        /// Open the matrix sized to the boot layout.
        ///
        /// Fails when GPIO is unavailable, e.g. when not running as root.
        pub fn new(layout: &GridLayout, brightness: u8) -> Result<Self, Box<dyn std::error::Error>> {
            let mut options = LedMatrixOptions::new();
            options.set_rows(u32::from(layout.height()));
            options.set_cols(u32::from(layout.width()));
            options.set_hardware_mapping("adafruit-hat");
            options.set_pwm_bits(8)?;
            options.set_pwm_lsb_nanoseconds(130);

            let mut rt_options = LedRuntimeOptions::new();
            rt_options.set_gpio_slowdown(2);

            let matrix = LedMatrix::new(Some(options), Some(rt_options))?;
            let canvas = matrix.offscreen_canvas();

            Ok(Self {
                matrix,
                canvas: Some(canvas),
                geometry: BootGeometry::new(layout),
                brightness,
            })
        }
    }

    impl OutputDriver for MatrixOutput {
        fn push(&mut self, frame: &FrameBuffer, layout: &GridLayout) {
            let Some(mut canvas) = self.canvas.take() else {
                return;
            };
            canvas.clear();
            self.geometry.newly_clipped(layout);

            let active = frame.active();
            for y in 0..self.geometry.height().min(i32::from(layout.height())) {
                for x in 0..self.geometry.width().min(i32::from(layout.width())) {
                    let color = layout
                        .index_of(x, y)
                        .and_then(|index| active.get(index).copied())
                        .unwrap_or(Rgb::BLACK);
                    if !color.is_black() {
                        canvas.set(x, y, &color.apply_brightness(self.brightness).into());
                    }
                }
            }

            self.canvas = Some(self.matrix.swap(canvas));
        }
    }
}
