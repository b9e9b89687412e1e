use std::path::PathBuf;

use core_io::{IoError, LineProvider, RopeLineProvider};
use core_text::{Language, Totals};
use pretty_assertions::assert_eq;

fn write_temp(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

#[tokio::test]
async fn open_reports_totals_and_serves_ranges() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(&dir, "big.rs", "fn a() {}\n\nfn b() {}");
    let provider = RopeLineProvider::new(1 << 20);

    let totals = provider.open_virtual(&path).await.unwrap();
    assert_eq!(totals, Totals::new(3, "fn a() {}\n\nfn b() {}".chars().count()));

    let range = provider.get_line_range(&path, 1..10).await.unwrap();
    assert_eq!(range.lines, vec![String::new(), "fn b() {}".to_string()]);
    assert_eq!(range.language, Language::Rust);
    assert_eq!(range.totals.total_lines, 3);
}

#[tokio::test]
async fn crlf_file_is_normalized_and_saved_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(&dir, "dos.txt", "one\r\ntwo\r\nthree");
    let provider = RopeLineProvider::new(1 << 20);
    provider.open_virtual(&path).await.unwrap();

    let totals = provider
        .replace_lines(&path, 1..2, vec!["2a".into(), "2b".into()])
        .await
        .unwrap();
    assert_eq!(totals.total_lines, 4);

    provider.save_virtual(&path).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "one\r\n2a\r\n2b\r\nthree"
    );
}

#[tokio::test]
async fn calls_after_close_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(&dir, "x.txt", "x");
    let provider = RopeLineProvider::new(1 << 20);
    provider.open_virtual(&path).await.unwrap();
    assert!(provider.is_open(&path));
    provider.close_virtual(&path).await.unwrap();
    assert!(!provider.is_open(&path));

    let err = provider.get_line_range(&path, 0..1).await.unwrap_err();
    assert!(matches!(err, IoError::NotOpen { .. }));
    // Closing twice is harmless.
    provider.close_virtual(&path).await.unwrap();
}

#[tokio::test]
async fn inverted_replace_range_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(&dir, "r.txt", "a\nb");
    let provider = RopeLineProvider::new(1 << 20);
    provider.open_virtual(&path).await.unwrap();
    let err = provider
        .replace_lines(&path, 5..7, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, IoError::Range { total: 2, .. }));
}

#[tokio::test]
async fn binary_files_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("img.bin");
    std::fs::write(&path, [0x89, b'P', b'N', b'G', 0, 0]).unwrap();
    let provider = RopeLineProvider::new(1 << 20);
    let err = provider.open_virtual(&path).await.unwrap_err();
    assert!(matches!(err, IoError::Binary { .. }));
    assert!(!provider.is_open(&path));
}

#[tokio::test]
async fn adopted_text_is_served_without_reading_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never-written.txt");
    let provider = RopeLineProvider::new(1 << 20);

    let totals = provider
        .adopt_virtual(&path, "a\r\nb\r\nc".to_string())
        .await
        .unwrap();
    assert_eq!(totals.total_lines, 3);
    let range = provider.get_line_range(&path, 0..3).await.unwrap();
    assert_eq!(range.lines, vec!["a", "b", "c"]);

    // The adopted line ending is restored on save.
    provider.save_virtual(&path).await.unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\r\nb\r\nc");
}
