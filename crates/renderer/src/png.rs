//! PNG export of composed frames.

use std::path::Path;

use tiny_skia::Pixmap;

use crate::{RenderError, RenderResult};

/// Encode a frame as an RGBA PNG.
pub fn encode_png(pixmap: &Pixmap) -> RenderResult<Vec<u8>> {
    pixmap
        .encode_png()
        .map_err(|e| RenderError::Encode(e.to_string()))
}

/// Encode and write a frame to disk.
pub fn save_png(pixmap: &Pixmap, path: impl AsRef<Path>) -> RenderResult<()> {
    let bytes = encode_png(pixmap)?;
    std::fs::write(path.as_ref(), bytes).map_err(|e| RenderError::Encode(e.to_string()))
}
