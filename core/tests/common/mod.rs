#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use comic_core::fs::{
    ArchiveError, ArchiveParser, ArchiveSource, MemorySource, PageStream, ParserFactory,
};
use comic_core::types::{ArchiveEntry, ArchiveFormat, ComicDocument};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
use zip::CompressionMethod;
use zip::write::FileOptions;

/// Zip archive built in memory from `(name, bytes)` pairs. Names ending in `/` become
/// directories.
pub fn zip_bytes(files: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, body) in files {
        if name.ends_with('/') {
            zip.add_directory(name.trim_end_matches('/'), options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(body).unwrap();
        }
    }
    zip.finish().unwrap().into_inner()
}

/// Encoded PNG of `width`x`height` filled with `shade`.
pub fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let image = ImageBuffer::from_pixel(width, height, Rgba([shade, shade, shade, 255]));
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image).write_to(&mut cursor, ImageFormat::Png).unwrap();
    cursor.into_inner()
}

pub fn comic(name: &str, pages: &[&str]) -> Arc<dyn ArchiveSource> {
    let files: Vec<(&str, Vec<u8>)> =
        pages.iter().enumerate().map(|(i, page)| (*page, png(2, 2, i as u8))).collect();
    Arc::new(MemorySource::new(name, zip_bytes(&files)))
}

/// What a [`FakeFactory`] should do when asked to open a source.
#[derive(Debug, Clone)]
pub enum FakeBehaviour {
    Pages(Vec<String>),
    Fail(String),
    Empty,
    Panic(String),
    /// Cancel the given token from inside `open`, then succeed.
    CancelDuringOpen(comic_core::CancelToken, Vec<String>),
    /// Pages whose cover read fails.
    BrokenCover(Vec<String>),
}

/// Parser factory returning scripted parsers and recording their lifecycle.
#[derive(Debug)]
pub struct FakeFactory {
    pub behaviour: FakeBehaviour,
    pub opened: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
}

impl FakeFactory {
    pub fn new(behaviour: FakeBehaviour) -> Arc<Self> {
        let closed = Arc::new(AtomicUsize::new(0));
        Arc::new(Self { behaviour, opened: AtomicUsize::new(0), closed })
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn parser(&self, source: &dyn ArchiveSource, pages: &[String], broken: bool) -> FakeParser {
        let entries = pages
            .iter()
            .map(|name| ArchiveEntry {
                name: name.clone(),
                size_bytes: 4,
                compressed_size: Some(4),
                modified_at: None,
                ordinal: 0,
            })
            .collect();
        let document = ComicDocument::new(
            source.title(),
            source.locator(),
            ArchiveFormat::Zip,
            entries,
            Some(0),
        );
        FakeParser { document, closed: false, counter: Arc::clone(&self.closed), broken }
    }
}

impl ParserFactory for FakeFactory {
    fn open(&self, source: &dyn ArchiveSource) -> Result<Box<dyn ArchiveParser>, ArchiveError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            FakeBehaviour::Pages(pages) => Ok(Box::new(self.parser(source, pages, false))),
            FakeBehaviour::BrokenCover(pages) => Ok(Box::new(self.parser(source, pages, true))),
            FakeBehaviour::Fail(message) => Err(ArchiveError::Corrupt(message.clone())),
            FakeBehaviour::Empty => Err(ArchiveError::Empty),
            FakeBehaviour::Panic(message) => panic!("{}", message),
            FakeBehaviour::CancelDuringOpen(token, pages) => {
                token.cancel();
                Ok(Box::new(self.parser(source, pages, false)))
            }
        }
    }
}

#[derive(Debug)]
pub struct FakeParser {
    document: ComicDocument,
    closed: bool,
    counter: Arc<AtomicUsize>,
    broken: bool,
}

impl ArchiveParser for FakeParser {
    fn document(&self) -> &ComicDocument {
        &self.document
    }

    fn page_stream(&mut self, index: usize) -> Result<PageStream<'_>, ArchiveError> {
        if self.is_closed() {
            return Err(ArchiveError::Closed);
        }
        if self.broken {
            return Err(ArchiveError::Corrupt("bad cover entry".into()));
        }
        Ok(Box::new(Cursor::new(vec![index as u8 + 1; 4])))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
