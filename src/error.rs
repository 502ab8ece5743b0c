use derive_more::derive::{Display, Error};

/// A specialized `Result` where the error is this crate's `Error` type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Boundary rejections and the image encoding failure behind the preview.
///
/// Malformed uploads and streaming packets never show up here: they degrade
/// to fewer decoded pixels instead of failing.
#[derive(Debug, Display, Error)]
pub enum Error {
    #[display("Pixel count {count} out of range (1-{capacity})")]
    PixelCountOutOfRange { count: usize, capacity: usize },

    #[display("Panel grid {rows}x{cols} out of range (rows and cols must be 1-{max})")]
    PanelGridOutOfRange { rows: u16, cols: u16, max: u16 },

    #[display("{panel_count} panels of {panel_width}x{panel_height} do not form a usable grid")]
    InvalidPanelGeometry {
        panel_width: u16,
        panel_height: u16,
        panel_count: u16,
    },

    #[display("Layout needs {needed} pixels but capacity is {capacity}")]
    LayoutExceedsCapacity { needed: usize, capacity: usize },

    #[display("Unknown pattern id {_0}")]
    UnknownPattern(#[error(not(source))] u32),

    #[display("Upload of {declared} bytes exceeds limit of {limit} bytes")]
    UploadTooLarge { declared: usize, limit: usize },

    #[display("Upload rejected")]
    UploadRejected,

    #[display("Image encoding failed: {_0}")]
    Image(image::ImageError),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err)
    }
}
