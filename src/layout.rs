//! Panel grid geometry and the logical-to-physical coordinate mapper.
//!
//! The display is a grid of 32x8 panels on one data wire. Panels are
//! chained left to right on even panel rows and right to left on odd panel
//! rows, and panels on odd rows are mounted upside down. Inside a panel
//! the wire runs down even columns and up odd columns.
//!
//! ## Rust concepts
//! - **Pure functions**: [`GridLayout::map`] reads only `&self`, so it can be
//!   called from any thread without locking.
//! - **Sentinel enums**: [`PixelIndex::OffGrid`] forces every caller to
//!   decide what to do with out-of-range coordinates.

use crate::error::{Error, Result};
use crate::{PANEL_HEIGHT, PANEL_WIDTH};
use serde::Serialize;
use utoipa::ToSchema;

/// Largest number of panel rows or columns accepted from the control plane.
pub const MAX_GRID_SIDE: u16 = 16;

/// Result of mapping a logical coordinate onto the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelIndex {
    /// Position along the data wire.
    At(usize),
    /// The coordinate does not land on a populated panel.
    OffGrid,
}

impl PixelIndex {
    pub fn get(self) -> Option<usize> {
        match self {
            Self::At(index) => Some(index),
            Self::OffGrid => None,
        }
    }
}

/// Geometry of the tiled panel grid.
///
/// Fields are private so the derived values (`width`, `height`) can only
/// change together with the panel count and row width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct GridLayout {
    width: u16,
    height: u16,
    panel_width: u16,
    panel_height: u16,
    panel_count: u16,
    panels_wide: u16,
}

impl GridLayout {
    /// Tile `panel_count` standard panels, `panels_wide` per panel row.
    ///
    /// A final panel row may be partially populated; the missing cells map
    /// to [`PixelIndex::OffGrid`].
    pub fn tiled(panel_count: u16, panels_wide: u16) -> Result<Self> {
        Self::with_panel_size(PANEL_WIDTH, PANEL_HEIGHT, panel_count, panels_wide)
    }

    /// Like [`GridLayout::tiled`] with a custom panel size.
    ///
    /// Fails on an empty geometry or when the grid's pixel dimensions do
    /// not fit in `u16`.
    pub fn with_panel_size(
        panel_width: u16,
        panel_height: u16,
        panel_count: u16,
        panels_wide: u16,
    ) -> Result<Self> {
        let invalid = Error::InvalidPanelGeometry {
            panel_width,
            panel_height,
            panel_count,
        };
        if panel_width == 0 || panel_height == 0 || panel_count == 0 {
            return Err(invalid);
        }
        let panels_wide = panels_wide.clamp(1, panel_count);
        let panel_rows = panel_count.div_ceil(panels_wide);
        let (Some(width), Some(height)) = (
            panels_wide.checked_mul(panel_width),
            panel_rows.checked_mul(panel_height),
        ) else {
            return Err(invalid);
        };

        Ok(Self {
            width,
            height,
            panel_width,
            panel_height,
            panel_count,
            panels_wide,
        })
    }

    /// A full `rows` x `cols` grid of standard panels, validated for the
    /// control plane.
    pub fn from_grid(rows: u16, cols: u16) -> Result<Self> {
        let in_range = |side: u16| (1..=MAX_GRID_SIDE).contains(&side);
        if !in_range(rows) || !in_range(cols) {
            return Err(Error::PanelGridOutOfRange {
                rows,
                cols,
                max: MAX_GRID_SIDE,
            });
        }
        Self::tiled(rows * cols, cols)
    }

    /// Reject layouts with more pixels than the frame buffer holds.
    pub fn check_capacity(&self, capacity: usize) -> Result<()> {
        let needed = self.pixel_count();
        if needed > capacity {
            return Err(Error::LayoutExceedsCapacity { needed, capacity });
        }
        Ok(())
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn panel_width(&self) -> u16 {
        self.panel_width
    }

    pub fn panel_height(&self) -> u16 {
        self.panel_height
    }

    pub fn panel_count(&self) -> u16 {
        self.panel_count
    }

    pub fn panels_wide(&self) -> u16 {
        self.panels_wide
    }

    pub fn panel_rows(&self) -> u16 {
        self.height / self.panel_height
    }

    fn panel_pixels(&self) -> usize {
        usize::from(self.panel_width) * usize::from(self.panel_height)
    }

    /// Total pixels on populated panels.
    pub fn pixel_count(&self) -> usize {
        usize::from(self.panel_count) * self.panel_pixels()
    }

    /// Map a logical coordinate to its position on the data wire.
    pub fn map(&self, x: i32, y: i32) -> PixelIndex {
        if x < 0 || y < 0 || x >= i32::from(self.width) || y >= i32::from(self.height) {
            return PixelIndex::OffGrid;
        }
        let (x, y) = (x as usize, y as usize);
        let pw = usize::from(self.panel_width);
        let ph = usize::from(self.panel_height);
        let wide = usize::from(self.panels_wide);

        let (panel_col, panel_row) = (x / pw, y / ph);
        let (mut local_x, mut local_y) = (x % pw, y % ph);

        // Odd panel rows are mounted upside down.
        if panel_row % 2 == 1 {
            local_x = pw - 1 - local_x;
            local_y = ph - 1 - local_y;
        }

        let panel_index = if panel_row % 2 == 0 {
            panel_row * wide + panel_col
        } else {
            panel_row * wide + (wide - 1 - panel_col)
        };
        if panel_index >= usize::from(self.panel_count) {
            return PixelIndex::OffGrid;
        }

        let within_panel = if local_x % 2 == 0 {
            local_x * ph + local_y
        } else {
            local_x * ph + (ph - 1 - local_y)
        };

        PixelIndex::At(panel_index * self.panel_pixels() + within_panel)
    }

    /// [`GridLayout::map`] as an `Option`.
    pub fn index_of(&self, x: i32, y: i32) -> Option<usize> {
        self.map(x, y).get()
    }

    /// Every logical coordinate, row by row.
    pub fn coordinates(&self) -> impl Iterator<Item = (i32, i32)> + use<> {
        let (width, height) = (i32::from(self.width), i32::from(self.height));
        (0..height).flat_map(move |y| (0..width).map(move |x| (x, y)))
    }
}

/// Four standard panels stacked in one column.
impl Default for GridLayout {
    fn default() -> Self {
        Self {
            width: PANEL_WIDTH,
            height: 4 * PANEL_HEIGHT,
            panel_width: PANEL_WIDTH,
            panel_height: PANEL_HEIGHT,
            panel_count: 4,
            panels_wide: 1,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
