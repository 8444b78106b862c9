pub mod font;
pub mod pdf;
pub mod png;

pub use font::{FontError, TrueTypeFont};
pub use pdf::{DocumentRenderer, PdfRenderer, RenderError};
pub use png::{decode_png, PngError, RgbImage};
