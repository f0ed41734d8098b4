mod common;

use std::sync::Arc;

use comic_core::codec::{DecodedImage, PageDecoder, RasterDecoder};
use comic_core::fs::{ArchiveSource, FormatRegistry, MemorySource, ParserFactory};
use comic_core::stats::ReaderStats;
use crossbeam_channel::{Receiver, Sender, unbounded};
use comic_core::{CancelToken, PrefetchPolicy, ReaderConfig, ReaderSession, SessionError};

use common::{png, zip_bytes};

/// Six 4x4 pages, 64 decoded bytes each.
fn six_pages() -> Arc<dyn ArchiveSource> {
    let files: Vec<(String, Vec<u8>)> =
        (1..=6).map(|i| (format!("p{i}.png"), png(4, 4, i as u8))).collect();
    let files: Vec<(&str, Vec<u8>)> =
        files.iter().map(|(name, bytes)| (name.as_str(), bytes.clone())).collect();
    Arc::new(MemorySource::new("six.cbz", zip_bytes(&files)))
}

fn config(max_entries: usize, max_bytes: usize) -> ReaderConfig {
    ReaderConfig {
        cache_max_entries: max_entries,
        cache_max_bytes: max_bytes,
        prefetch: PrefetchPolicy { ahead: 2, behind: 1 },
        ..ReaderConfig::default()
    }
}

fn open(max_entries: usize, max_bytes: usize) -> ReaderSession {
    ReaderSession::open(&*six_pages(), &config(max_entries, max_bytes)).expect("open session")
}

#[test]
fn pages_decode_to_rgba_and_are_served_from_cache() {
    let session = open(4, 1 << 20);
    assert_eq!(session.page_count(), 6);

    let first = session.request_page(0).unwrap();
    assert_eq!((first.width(), first.height()), (4, 4));
    assert_eq!(first.size_bytes(), 64);
    assert_eq!(&first.pixels()[..4], &[1, 1, 1, 255]);

    let again = session.request_page(0).unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(session.cache_state().entries, 1);
    assert_eq!(session.cache_state().resident_bytes, 64);
}

#[test]
fn eviction_drops_the_page_furthest_from_the_current_one() {
    let session = open(3, 1 << 20);
    let zero = session.request_page(0).unwrap();
    let one = session.request_page(1).unwrap();
    session.request_page(2).unwrap();
    session.request_page(5).unwrap();
    assert_eq!(session.cache_state().entries, 3);

    assert!(Arc::ptr_eq(&one, &session.request_page(1).unwrap()));
    assert!(!Arc::ptr_eq(&zero, &session.request_page(0).unwrap()));
}

#[test]
fn byte_ceiling_bounds_residency() {
    let session = open(8, 128);
    for index in 0..4 {
        session.request_page(index).unwrap();
    }
    let state = session.cache_state();
    assert_eq!(state.entries, 2);
    assert!(state.resident_bytes <= 128);
}

#[test]
fn oversized_pages_are_returned_but_not_cached() {
    let session = open(8, 32);
    let page = session.request_page(3).unwrap();
    assert_eq!(page.size_bytes(), 64);
    assert_eq!(session.cache_state().entries, 0);
}

#[test]
fn prefetch_warms_neighbours_nearest_first() {
    let session = open(8, 1 << 20);
    let loaded = session.prefetch(2, &CancelToken::new()).unwrap();
    assert_eq!(loaded, 3);
    assert_eq!(session.cache_state().entries, 3);

    // Already resident pages are not decoded twice.
    assert_eq!(session.prefetch(2, &CancelToken::new()).unwrap(), 0);
}

#[test]
fn prefetch_never_displaces_every_resident_page() {
    let session = open(2, 1 << 20);
    let current = session.request_page(2).unwrap();
    let loaded = session.prefetch(2, &CancelToken::new()).unwrap();
    assert_eq!(loaded, 1);
    assert!(Arc::ptr_eq(&current, &session.request_page(2).unwrap()));
}

#[test]
fn cancelled_requests_do_no_work() {
    let session = open(8, 1 << 20);
    let cancel = CancelToken::new();
    cancel.cancel();

    assert!(matches!(session.request_page_with(1, &cancel), Err(SessionError::Cancelled)));
    assert!(matches!(session.prefetch(1, &cancel), Err(SessionError::Cancelled)));
    assert_eq!(session.cache_state().entries, 0);
}

#[test]
fn out_of_range_pages_are_rejected() {
    let session = open(8, 1 << 20);
    let err = session.request_page(6).unwrap_err();
    assert!(matches!(err, SessionError::OutOfRange { index: 6, count: 6 }));
}

#[test]
fn undecodable_page_reports_its_name() {
    let bytes = zip_bytes(&[("001.png", png(1, 1, 1)), ("002.png", b"not a png".to_vec())]);
    let source = MemorySource::new("broken.cbz", bytes);
    let session = ReaderSession::open(&source, &ReaderConfig::default()).unwrap();

    session.request_page(0).unwrap();
    match session.request_page(1) {
        Err(SessionError::Decode { index, name, .. }) => {
            assert_eq!(index, 1);
            assert_eq!(name, "002.png");
        }
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[test]
fn release_all_and_close() {
    let session = open(8, 1 << 20);
    session.request_page(0).unwrap();
    session.request_page(1).unwrap();
    assert_eq!(session.release_all(), 2);
    assert_eq!(session.cache_state().resident_bytes, 0);

    session.request_page(0).unwrap();
    session.close();
    session.close();
    assert!(session.is_closed());
    assert_eq!(session.cache_state().entries, 0);
    assert!(matches!(session.request_page(0), Err(SessionError::Closed)));
}

#[test]
fn stats_observe_hits_misses_and_usage() {
    let stats = Arc::new(ReaderStats::new());
    let session = open(8, 1 << 20).with_stats(Arc::clone(&stats));
    session.request_page(0).unwrap();
    session.request_page(0).unwrap();
    session.request_page(1).unwrap();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.cache_requests, 3);
    assert_eq!(snapshot.cache_hits, 1);
    assert_eq!(snapshot.cache_entries, 2);
    assert_eq!(snapshot.cache_bytes_used, 128);
}

#[test]
fn scattered_requests_evict_the_furthest_page_and_respect_both_ceilings() {
    let session = open(3, 192);
    let expected: [(usize, &[usize]); 8] = [
        (0, &[0]),
        (5, &[0, 5]),
        (1, &[0, 1, 5]),
        (2, &[0, 1, 2]),
        (3, &[1, 2, 3]),
        (4, &[2, 3, 4]),
        (0, &[0, 2, 3]),
        (5, &[2, 3, 5]),
    ];
    for (index, resident) in expected {
        session.request_page(index).unwrap();
        let state = session.cache_state();
        assert!(state.entries <= 3, "after page {index}: {state:?}");
        assert!(state.resident_bytes <= 192, "after page {index}: {state:?}");
        assert_eq!(session.resident_pages(), resident, "after page {index}");
    }
}

#[test]
fn concurrent_readers_and_prefetchers_stay_within_ceilings() {
    let session = open(3, 192);
    std::thread::scope(|scope| {
        for worker in 0..4usize {
            let session = &session;
            scope.spawn(move || {
                for step in 0..100usize {
                    let index = (worker * 7 + step * 5) % 6;
                    if step % 3 == 0 {
                        session.prefetch(index, &CancelToken::new()).unwrap();
                    } else {
                        let page = session.request_page(index).unwrap();
                        assert_eq!(page.pixels()[0], index as u8 + 1);
                    }
                    let state = session.cache_state();
                    assert!(state.entries <= 3, "{state:?}");
                    assert!(state.resident_bytes <= 192, "{state:?}");
                }
            });
        }
    });
}

/// Decoder that parks inside `decode` until released, so a test can act mid-request.
#[derive(Debug)]
struct GatedDecoder {
    entered: Sender<()>,
    release: Receiver<()>,
}

impl PageDecoder for GatedDecoder {
    fn decode(&self, name: &str, bytes: &[u8]) -> comic_core::Result<DecodedImage> {
        self.entered.send(()).unwrap();
        self.release.recv().unwrap();
        RasterDecoder.decode(name, bytes)
    }
}

#[test]
fn close_during_decode_leaves_the_cache_empty() {
    let (entered_tx, entered_rx) = unbounded();
    let (release_tx, release_rx) = unbounded();
    let decoder = Arc::new(GatedDecoder { entered: entered_tx, release: release_rx });

    let source = six_pages();
    let parser = FormatRegistry::default().open(&*source).unwrap();
    let session = ReaderSession::from_parser(parser, decoder, &config(8, 1 << 20));

    std::thread::scope(|scope| {
        let pending = scope.spawn(|| session.request_page(0));
        entered_rx.recv().unwrap();
        session.close();
        release_tx.send(()).unwrap();

        assert!(matches!(pending.join().unwrap(), Err(SessionError::Closed)));
    });
    assert_eq!(session.cache_state().entries, 0);
    assert!(session.resident_pages().is_empty());
}
