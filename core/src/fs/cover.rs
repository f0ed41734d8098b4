//! Page classification and cover selection.

use std::cmp::Ordering;

use super::natural::natural_cmp;

/// Supported image file extensions (lowercase, without the dot).
pub const IMAGE_EXTENSIONS: &[&str] = &["bmp", "gif", "jpeg", "jpg", "png", "webp"];

/// Substrings that mark a file as an intended cover, matched case-insensitively against the
/// file stem.
pub const COVER_KEYWORDS: &[&str] =
    &["cover", "front", "poster", "thumbnail", "title", "封面", "表紙", "表纸", "カバー"];

/// Classifies archive entry names and picks a representative cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverSelector {
    image_extensions: Vec<String>,
}

impl Default for CoverSelector {
    fn default() -> Self {
        Self::new(IMAGE_EXTENSIONS.iter().map(|ext| ext.to_string()))
    }
}

impl CoverSelector {
    pub fn new<I, S>(image_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let image_extensions =
            image_extensions.into_iter().map(|ext| ext.into().to_ascii_lowercase()).collect();
        Self { image_extensions }
    }

    /// True when the name carries one of the configured image extensions.
    pub fn is_image_file(&self, name: &str) -> bool {
        extension(name)
            .map(|ext| self.image_extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    /// Index of the cover among `names`, or `None` when `names` is empty.
    ///
    /// Keyword matches win over plain pages; within the chosen group the first name under
    /// natural order is taken, with extension priority deciding between natural-order ties.
    pub fn select_cover<S: AsRef<str>>(&self, names: &[S]) -> Option<usize> {
        let keyword_hits: Vec<usize> =
            (0..names.len()).filter(|&idx| is_cover_name(names[idx].as_ref())).collect();
        let candidates =
            if keyword_hits.is_empty() { (0..names.len()).collect() } else { keyword_hits };

        candidates
            .into_iter()
            .min_by(|&a, &b| cover_order(names[a].as_ref(), names[b].as_ref()))
    }

    /// Reorder names for display: keyword-classified names first (by extension priority, then
    /// natural order), followed by every other name in natural order.
    pub fn sort_images_by_priority<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        let (mut covers, mut pages): (Vec<&str>, Vec<&str>) =
            names.iter().map(|name| name.as_ref()).partition(|name| is_cover_name(name));

        covers.sort_by(|a, b| {
            extension_priority(a).cmp(&extension_priority(b)).then_with(|| natural_cmp(a, b))
        });
        pages.sort_by(|a, b| natural_cmp(a, b));

        covers.into_iter().chain(pages).map(str::to_string).collect()
    }
}

/// Convenience wrapper over the default selector.
pub fn is_image_file(name: &str) -> bool {
    CoverSelector::default().is_image_file(name)
}

/// True when the file stem contains one of [`COVER_KEYWORDS`].
pub fn is_cover_name(name: &str) -> bool {
    let stem = file_stem(name).to_lowercase();
    COVER_KEYWORDS.iter().any(|keyword| stem.contains(keyword))
}

/// Lower is better: jpg/jpeg, then png/webp, then gif/bmp, then anything else.
pub fn extension_priority(name: &str) -> u8 {
    match extension(name).map(str::to_ascii_lowercase).as_deref() {
        Some("jpg" | "jpeg") => 0,
        Some("png" | "webp") => 1,
        Some("gif" | "bmp") => 2,
        _ => 3,
    }
}

/// Natural order of the full names; names that compare equal (`01.jpg` and `1.jpg`) fall back to
/// extension priority, then to byte order so the choice is deterministic.
fn cover_order(a: &str, b: &str) -> Ordering {
    natural_cmp(a, b)
        .then_with(|| extension_priority(a).cmp(&extension_priority(b)))
        .then_with(|| a.cmp(b))
}

fn file_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

fn file_stem(name: &str) -> &str {
    let base = file_name(name);
    match base.rfind('.') {
        Some(0) | None => base,
        Some(dot) => &base[..dot],
    }
}

fn extension(name: &str) -> Option<&str> {
    let base = file_name(name);
    match base.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < base.len() => Some(&base[dot + 1..]),
        _ => None,
    }
}
