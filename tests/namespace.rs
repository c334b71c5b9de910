mod common;

use std::sync::Arc;

use common::ZipBuilder;
use rangezip::{Entry, Opened, ZipError};
use tokio::io::AsyncReadExt;

fn paths<'a>(entries: impl IntoIterator<Item = Entry<'a>>) -> Vec<String> {
    entries.into_iter().map(|e| e.path().to_owned()).collect()
}

#[tokio::test]
async fn missing_directories_are_synthesized() {
    let (archive, _) = ZipBuilder::new().stored("a/b/c.txt", b"abc").open().await;

    assert_eq!(paths(archive.read_dir(".").unwrap()), ["a"]);
    assert_eq!(paths(archive.read_dir("a").unwrap()), ["a/b"]);
    assert_eq!(paths(archive.read_dir("a/b").unwrap()), ["a/b/c.txt"]);

    let a = archive.stat("a").unwrap();
    assert!(a.is_dir());
    assert!(a.header().is_none());
    assert!(matches!(archive.lookup("a"), Err(ZipError::NotAFile(_))));
}

#[tokio::test]
async fn stored_directory_record_supplies_metadata() {
    let (archive, _) = ZipBuilder::new()
        .dir("docs/")
        .stored("docs/readme.md", b"# hi")
        .open()
        .await;

    let docs = archive.stat("docs").unwrap();
    assert!(docs.is_dir());
    assert_eq!(docs.header().unwrap().mode() & 0o170000, 0o040000);
    assert_eq!(paths(archive.read_dir(".").unwrap()), ["docs"]);
}

#[tokio::test]
async fn escaping_names_stay_inside_the_root() {
    let (archive, _) = ZipBuilder::new()
        .stored("../../etc/passwd", b"root:x:0:0")
        .stored("/abs.txt", b"abs")
        .stored("win\\style.txt", b"win")
        .open()
        .await;

    let header = archive.lookup("etc/passwd").unwrap();
    assert_eq!(header.raw_name, b"../../etc/passwd");
    assert!(archive.stat("../../etc/passwd").is_err());
    assert!(archive.stat("abs.txt").is_ok());
    assert!(archive.stat("win/style.txt").is_ok());
    assert_eq!(
        paths(archive.read_dir(".").unwrap()),
        ["abs.txt", "etc", "win"]
    );
}

#[tokio::test]
async fn repeated_queries_issue_no_requests() {
    let (archive, source) = ZipBuilder::new()
        .stored("x/1", b"1")
        .stored("x/2", b"2")
        .stored("y", b"3")
        .open()
        .await;
    let requests = source.request_count();
    let transferred = source.transferred_bytes();

    let first = paths(archive.read_dir("x").unwrap());
    for _ in 0..3 {
        assert_eq!(paths(archive.read_dir("x").unwrap()), first);
        assert_eq!(archive.lookup("y").unwrap().crc32, crc32fast::hash(b"3"));
        assert!(archive.stat("x").unwrap().is_dir());
    }
    assert_eq!(source.request_count(), requests);
    assert_eq!(source.transferred_bytes(), transferred);
}

#[tokio::test]
async fn path_errors_match_the_operation() {
    let (archive, _) = ZipBuilder::new().stored("d/f.txt", b"f").open().await;

    assert!(matches!(archive.stat("nope"), Err(ZipError::NotFound(_))));
    assert!(matches!(archive.lookup("d"), Err(ZipError::NotAFile(_))));
    assert!(matches!(
        archive.open_file("d").await,
        Err(ZipError::IsADirectory(_))
    ));
    assert!(matches!(
        archive.read_dir("d/f.txt"),
        Err(ZipError::NotADirectory(_))
    ));

    for invalid in ["", "/d", "d/", "d/../d", "./d"] {
        assert!(
            matches!(archive.stat(invalid), Err(ZipError::NotFound(_))),
            "{invalid:?}"
        );
    }
}

#[tokio::test]
async fn open_returns_a_stream_or_a_listing() {
    let (archive, _) = ZipBuilder::new()
        .stored("d/f.txt", b"file body")
        .open()
        .await;

    match archive.open("d/f.txt").await.unwrap() {
        Opened::File { header, mut reader } => {
            assert_eq!(header.uncompressed_size, 9);
            let mut out = String::new();
            reader.read_to_string(&mut out).await.unwrap();
            reader.close().await.unwrap();
            assert_eq!(out, "file body");
        }
        Opened::Dir(_) => panic!("expected a file"),
    }

    match archive.open("d").await.unwrap() {
        Opened::Dir(listing) => assert_eq!(paths(listing), ["d/f.txt"]),
        Opened::File { .. } => panic!("expected a directory"),
    }
    assert!(matches!(archive.open(".").await.unwrap(), Opened::Dir(_)));
}

#[tokio::test]
async fn listings_page_until_exhausted() {
    let mut builder = ZipBuilder::new();
    for i in 0..7 {
        builder = builder.stored(&format!("dir/f{i}"), b"");
    }
    let (archive, _) = builder.open().await;

    let mut listing = archive.read_dir("dir").unwrap();
    assert_eq!(listing.len(), 7);
    let mut seen = Vec::new();
    while let Some(page) = listing.next_page(3) {
        assert!(!page.is_empty() && page.len() <= 3);
        seen.extend(paths(page));
    }
    assert_eq!(seen.len(), 7);
    assert!(listing.next_page(3).is_none());

    let mut listing = archive.read_dir("dir").unwrap();
    listing.next_page(5);
    assert_eq!(paths(listing.remaining()), ["dir/f5", "dir/f6"]);
}

#[tokio::test]
async fn concurrent_first_queries_build_one_consistent_tree() {
    let mut builder = ZipBuilder::new();
    for i in 0..200 {
        builder = builder.stored(&format!("d{}/f{i}", i % 10), b"");
    }
    let (archive, source) = builder.open().await;
    let archive = Arc::new(archive);
    let requests = source.request_count();

    let tasks: Vec<_> = (0..10)
        .map(|d| {
            let archive = Arc::clone(&archive);
            tokio::spawn(async move { archive.read_dir(&format!("d{d}")).unwrap().count() })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), 20);
    }
    assert_eq!(archive.read_dir(".").unwrap().count(), 10);
    assert_eq!(source.request_count(), requests);
}
