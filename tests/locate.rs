mod common;

use std::sync::Arc;

use common::{EntrySpec, ZipBuilder};
use rangezip::{MemorySource, ZipArchive, ZipError};

async fn open_err(data: Vec<u8>) -> ZipError {
    ZipArchive::new(Arc::new(MemorySource::new(data)))
        .await
        .unwrap_err()
}

#[tokio::test]
async fn end_record_within_one_kib_is_found_in_the_first_pass() {
    // 22 + 1002 bytes of comment: the record starts exactly 1 KiB from the end.
    let comment = vec![b'c'; 1002];
    let (archive, source) = ZipBuilder::new()
        .stored("a.txt", b"hello")
        .comment(&comment)
        .open()
        .await;

    assert_eq!(archive.comment().len(), 1002);
    // tail window + central directory
    assert_eq!(source.request_count(), 2);
}

#[tokio::test]
async fn end_record_beyond_one_kib_needs_the_second_pass() {
    let comment = vec![b'c'; 5000];
    let (archive, source) = ZipBuilder::new()
        .stored("a.txt", b"hello")
        .comment(&comment)
        .open()
        .await;

    assert_eq!(archive.files().len(), 1);
    assert_eq!(source.request_count(), 3);
}

#[tokio::test]
async fn missing_end_record_is_a_format_error() {
    let err = open_err(vec![0u8; 100 * 1024]).await;
    assert!(matches!(err, ZipError::Format(_)));

    // A valid archive followed by more trailing bytes than either window covers.
    let data = ZipBuilder::new()
        .stored("a.txt", b"hello")
        .suffix(&vec![0u8; 70 * 1024])
        .build();
    assert!(matches!(open_err(data).await, ZipError::Format(_)));
}

#[tokio::test]
async fn tiny_inputs_are_rejected() {
    assert!(matches!(open_err(Vec::new()).await, ZipError::Format(_)));
    assert!(matches!(open_err(b"PK\x05\x06".to_vec()).await, ZipError::Format(_)));
}

#[tokio::test]
async fn signature_inside_the_comment_is_not_mistaken_for_the_record() {
    // The decoy declares a comment longer than the bytes that follow it.
    let mut comment = b"xxPK\x05\x06".to_vec();
    comment.extend_from_slice(&[0u8; 16]);
    comment.extend_from_slice(&[0xff, 0xff]);
    comment.extend_from_slice(b"tail");
    let (archive, _) = ZipBuilder::new()
        .stored("a.txt", b"hello")
        .comment(&comment)
        .open()
        .await;
    assert_eq!(archive.files().len(), 1);
    assert!(archive.comment().starts_with("xxPK"));
}

#[tokio::test]
async fn prefixed_archive_resolves_absolute_offsets() {
    // Offsets in the directory are relative to the start of the source.
    let (archive, _) = ZipBuilder::new()
        .prefix(b"#!/bin/sh\nexit 0\n")
        .stored("a.txt", b"hello")
        .open()
        .await;
    assert_eq!(archive.lookup("a.txt").unwrap().header_offset, 17);
    let mut reader = archive.open_file("a.txt").await.unwrap();
    let mut out = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut out)
        .await
        .unwrap();
    assert_eq!(out, b"hello");
}

#[tokio::test]
async fn plain_archive_keeps_raw_32_bit_fields() {
    let (archive, _) = ZipBuilder::new()
        .stored("a.txt", b"hello")
        .stored("b.txt", b"world!")
        .open()
        .await;
    let b = archive.lookup("b.txt").unwrap();
    assert_eq!(b.compressed_size, 6);
    assert_eq!(b.uncompressed_size, 6);
    assert_eq!(b.header_offset, 30 + 5 + 5);
}

#[tokio::test]
async fn zip64_records_are_resolved() {
    let (archive, source) = ZipBuilder::new()
        .stored("a.txt", b"hello")
        .entry(EntrySpec::stored("big.bin", b"zip64 body").with_zip64())
        .zip64_end()
        .open()
        .await;

    // tail window, locator, zip64 end record, directory
    assert_eq!(source.request_count(), 4);
    assert_eq!(archive.files().len(), 2);

    let big = archive.lookup("big.bin").unwrap();
    assert_eq!(big.compressed_size, 10);
    assert_eq!(big.uncompressed_size, 10);
    assert_eq!(big.header_offset, 30 + 5 + 5);

    let mut reader = archive.open_file("big.bin").await.unwrap();
    let mut out = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut out)
        .await
        .unwrap();
    assert_eq!(out, b"zip64 body");
}

#[tokio::test]
async fn sentinel_without_zip64_extra_is_a_format_error() {
    let mut data = ZipBuilder::new()
        .entry(EntrySpec::stored("big.bin", b"data").with_zip64())
        .build();

    // Rewrite the zip64 extra tag so the resolver does not recognize it.
    let tag = data
        .windows(4)
        .rposition(|w| w == [0x01u8, 0x00, 24, 0x00])
        .unwrap();
    data[tag] = 0x99;

    assert!(matches!(open_err(data).await, ZipError::Format(_)));
}

#[tokio::test]
async fn truncated_entry_count_is_tolerated() {
    let mut builder = ZipBuilder::new();
    for i in 0..65_537 {
        builder = builder.stored(&format!("f{i:05}"), b"");
    }
    // 65537 entries; a 16-bit field holds 65537 mod 65536 = 1
    let (archive, _) = builder.declared_count(1).open().await;
    assert_eq!(archive.files().len(), 65_537);
    assert_eq!(archive.files()[65_536].name(), "f65536");
}

#[tokio::test]
async fn wrong_entry_count_fails_to_open() {
    let data = ZipBuilder::new()
        .stored("a", b"1")
        .stored("b", b"2")
        .declared_count(3)
        .build();
    assert!(matches!(open_err(data).await, ZipError::Format(_)));
}

#[tokio::test]
async fn corrupt_central_header_aborts_open() {
    let mut data = ZipBuilder::new()
        .stored("a.txt", b"hello")
        .stored("b.txt", b"world")
        .build();
    let second = data
        .windows(4)
        .rposition(|w| w == b"PK\x01\x02")
        .unwrap();
    data[second + 3] = 0x09;
    assert!(matches!(open_err(data).await, ZipError::Format(_)));
}
