mod common;

use std::io::Read;

use comic_core::fs::{
    ArchiveError, ArchiveSource, CoverSelector, FileSource, FormatRegistry, MemorySource,
    ParserFactory,
};
use comic_core::types::ArchiveFormat;

use common::{png, zip_bytes};

fn names(parser: &dyn comic_core::fs::ArchiveParser) -> Vec<String> {
    parser.document().entries().iter().map(|entry| entry.name.clone()).collect()
}

#[test]
fn registry_orders_pages_and_picks_keyword_cover() {
    let bytes = zip_bytes(&[
        ("ch1/page10.jpg", png(1, 1, 10)),
        ("ch1/page2.jpg", png(1, 1, 2)),
        ("ch1/page1.jpg", png(1, 1, 1)),
        ("ch1/Front.png", png(1, 1, 0)),
        ("__MACOSX/ch1/._page1.jpg", vec![0; 4]),
        (".hidden.jpg", vec![0; 4]),
        ("ch1/notes.txt", b"not a page".to_vec()),
    ]);
    let source = MemorySource::new("Series #1.cbz", bytes);
    let parser = FormatRegistry::default().open(&source).expect("open");

    assert_eq!(
        names(parser.as_ref()),
        vec!["ch1/Front.png", "ch1/page1.jpg", "ch1/page2.jpg", "ch1/page10.jpg"]
    );
    let document = parser.document();
    assert_eq!(document.title(), "Series #1");
    assert_eq!(document.format(), ArchiveFormat::Zip);
    assert_eq!(document.cover_entry().map(|e| e.name.as_str()), Some("ch1/Front.png"));
    let ordinals: Vec<usize> = document.entries().iter().map(|e| e.ordinal).collect();
    assert_eq!(ordinals, vec![0, 1, 2, 3]);
}

#[test]
fn cover_falls_back_to_first_page_by_natural_order() {
    let bytes = zip_bytes(&[("010.png", png(1, 1, 1)), ("2.png", png(1, 1, 2))]);
    let source = MemorySource::new("plain.zip", bytes);
    let parser = FormatRegistry::default().open(&source).expect("open");
    assert_eq!(parser.document().cover_index(), Some(0));
    assert_eq!(names(parser.as_ref()), vec!["2.png", "010.png"]);
}

#[test]
fn path_traversal_entries_are_dropped() {
    let bytes = zip_bytes(&[("../escape.jpg", vec![1; 4]), ("ok.jpg", vec![2; 4])]);
    let source = MemorySource::new("evil.cbz", bytes);
    let parser = FormatRegistry::default().open(&source).expect("open");
    assert_eq!(names(parser.as_ref()), vec!["ok.jpg"]);
}

#[test]
fn archive_with_only_non_images_is_empty() {
    let bytes = zip_bytes(&[("readme.md", b"# hi".to_vec()), ("pages/", Vec::new())]);
    let source = MemorySource::new("docs.cbz", bytes);
    let err = FormatRegistry::default().open(&source).unwrap_err();
    assert!(matches!(err, ArchiveError::Empty));
}

#[test]
fn unknown_extension_is_unsupported() {
    let source = MemorySource::new("book.pdf", vec![1, 2, 3]);
    let err = FormatRegistry::default().open(&source).unwrap_err();
    assert!(matches!(err, ArchiveError::UnsupportedFormat(ext) if ext == "pdf"));
}

#[test]
fn custom_image_extensions_narrow_the_page_set() {
    let bytes = zip_bytes(&[("1.png", png(1, 1, 1)), ("2.gif", vec![0; 4])]);
    let source = MemorySource::new("narrow.cbz", bytes);
    let registry = FormatRegistry::new(CoverSelector::new(["png"]));
    let parser = registry.open(&source).expect("open");
    assert_eq!(names(parser.as_ref()), vec!["1.png"]);
}

#[test]
fn file_source_streams_pages_from_disk() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("disk.cbz");
    let page = png(3, 2, 7);
    std::fs::write(&path, zip_bytes(&[("001.png", page.clone())])).unwrap();

    let source = FileSource::new(&path);
    assert_eq!(source.extension().as_deref(), Some("cbz"));
    assert_eq!(source.size_bytes().unwrap(), std::fs::metadata(&path).unwrap().len());

    let mut parser = FormatRegistry::default().open(&source).expect("open");
    let mut bytes = Vec::new();
    parser.page_stream(0).unwrap().read_to_end(&mut bytes).unwrap();
    assert_eq!(bytes, page);

    parser.close();
    assert!(matches!(parser.read_page(0), Err(ArchiveError::Closed)));
}

/// Zip whose single cover entry name is stored as raw GBK bytes without the UTF-8 flag.
fn legacy_named_zip(name: &str) -> Vec<u8> {
    let (raw, _, _) = encoding_rs::GBK.encode(name);
    let placeholder = format!("{}.jpg", "#".repeat(raw.len() - 4));
    let mut bytes =
        zip_bytes(&[(placeholder.as_str(), png(1, 1, 9)), ("001.jpg", png(1, 1, 1))]);

    let needle = placeholder.as_bytes();
    let mut at = 0;
    while let Some(offset) = bytes[at..].windows(needle.len()).position(|w| w == needle) {
        let start = at + offset;
        bytes[start..start + needle.len()].copy_from_slice(&raw);
        at = start + needle.len();
    }
    bytes
}

#[test]
fn legacy_encoded_names_are_repaired_before_ordering() {
    let source = MemorySource::new("legacy.cbz", legacy_named_zip("封面.jpg"));
    let parser = FormatRegistry::default().open(&source).expect("open");

    assert_eq!(names(parser.as_ref()), vec!["001.jpg", "封面.jpg"]);
    assert_eq!(parser.document().cover_entry().map(|e| e.name.as_str()), Some("封面.jpg"));
}
