//! Page decoding seam. The reader only depends on [`PageDecoder`]; the default implementation
//! delegates to the `image` crate.

pub mod image;

use std::fmt;

pub use image::{DecodedImage, RasterDecoder, decode_page};

pub type Result<T> = crate::Result<T>;

/// Turns the raw bytes of an archive entry into pixels.
pub trait PageDecoder: fmt::Debug + Send + Sync {
    /// `name` is the entry name inside the archive and serves as a format hint.
    fn decode(&self, name: &str, bytes: &[u8]) -> Result<DecodedImage>;
}
