//! Reading an opened archive page by page.

pub mod prefetch;
pub mod session;

pub use session::{ReaderSession, SessionError};
