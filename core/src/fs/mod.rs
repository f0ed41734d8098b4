//! Archive access layer: sources, container parsers, page ordering and cover selection.

pub mod archive;
pub mod cover;
pub mod encoding;
pub mod natural;
pub mod source;

#[cfg(feature = "rar")]
pub use archive::CbrParser;
pub use archive::{
    ArchiveError, ArchiveParser, CbzParser, FormatRegistry, PageStream, ParserFactory,
};
pub use cover::{
    COVER_KEYWORDS, CoverSelector, IMAGE_EXTENSIONS, extension_priority, is_cover_name,
    is_image_file,
};
pub use encoding::decode_entry_name;
pub use natural::{Token, natural_cmp, natural_cmp_path, sort_naturally, tokenize};
pub use source::{ArchiveSource, FileSource, MemorySource, ReadSeek};
