mod common;

use common::{ArchiveBuilder, deflate, noise, zip_crate_archive};
use xslview::Error;
use xslview::zip::{ArchiveWalker, CompressionMethod, ZipExtractor, find_descriptor};

#[tokio::test]
async fn sized_entries_extract_in_header_order() {
    let contents: Vec<Vec<u8>> = (0..5).map(|i| format!("<doc n=\"{i}\"/>").repeat(i + 1).into_bytes()).collect();
    let mut builder = ArchiveBuilder::new();
    for (i, content) in contents.iter().enumerate() {
        builder = builder.file(&format!("dir/file{i}.xml"), content);
    }
    let archive = builder.finish();

    let extractor = ZipExtractor::new("batch.zip", &archive);
    let entries = extractor.list_files().unwrap();
    assert_eq!(entries.len(), 5);

    let files = extractor.extract_all().await.unwrap();
    assert_eq!(files.len(), 5);
    for (i, (file, entry)) in files.iter().zip(&entries).enumerate() {
        assert_eq!(file.name, format!("file{i}.xml"));
        assert_eq!(file.bytes, contents[i]);
        assert_eq!(file.bytes.len() as u64, entry.uncompressed_size);
        assert!(!entry.has_descriptor);
    }
}

#[tokio::test]
async fn descriptor_entries_round_trip() {
    let big = noise(200 * 1024);
    let builder = ArchiveBuilder::new().streamed("big.bin", &big);
    let descriptor_at = builder.offset() - 16;
    let archive = builder.streamed("small.xml", b"<a>text</a>").finish();

    // Header is 30 bytes plus the 7-byte name
    assert_eq!(find_descriptor(&archive, 37), Some(descriptor_at));

    let entries = ArchiveWalker::new("s.zip", &archive).walk().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.has_descriptor));
    assert_eq!(entries[0].compressed_size(), deflate(&big).len());
    assert_eq!(entries[0].uncompressed_size, big.len() as u64);
    assert_eq!(entries[1].header_offset, descriptor_at + 16);

    let files = ZipExtractor::new("s.zip", &archive).extract_all().await.unwrap();
    assert_eq!(files[0].bytes, big);
    assert_eq!(files[1].bytes, b"<a>text</a>");
}

#[tokio::test]
async fn directories_never_produce_files() {
    let archive = ArchiveBuilder::new()
        .directory("docs/")
        .streamed("docs/a.xml", b"<a/>")
        .directory("docs/empty/")
        .finish();

    let extractor = ZipExtractor::new("d.zip", &archive);
    let entries = extractor.list_files().unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries[0].is_directory && entries[0].data.is_none());
    assert!(entries[2].is_directory && entries[2].data.is_none());

    let files = extractor.extract_all().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "a.xml");
}

#[tokio::test]
async fn reads_zip_crate_archives() {
    let archive = zip_crate_archive(&[
        ("styles/", ""),
        ("styles/style.xsl", "<xsl:stylesheet/>"),
        ("a.xml", "<root>hi</root>"),
    ]);

    let extractor = ZipExtractor::new("z.zip", &archive).strict(true);
    let entries = extractor.list_files().unwrap();
    let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, ["styles/", "styles/style.xsl", "a.xml"]);
    assert!(
        entries
            .iter()
            .filter(|e| !e.is_directory)
            .all(|e| e.compression_method == CompressionMethod::Deflate)
    );

    let files = extractor.extract_all().await.unwrap();
    let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["style.xsl", "a.xml"]);
    assert_eq!(files[1].bytes, b"<root>hi</root>");
}

#[tokio::test]
async fn truncation_is_lenient_by_default_and_fatal_when_strict() {
    let mut archive = ArchiveBuilder::new()
        .file("a.xml", b"<a/>")
        .file("b.xml", &noise(4096))
        .into_bytes();
    archive.truncate(archive.len() - 100);

    let entries = ArchiveWalker::new("t.zip", &archive).walk().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].data.as_ref().unwrap().end, archive.len());

    let extractor = ZipExtractor::new("t.zip", &archive);
    let err = extractor.extract_all().await.unwrap_err();
    assert!(matches!(&err, Error::Decompression { entry, .. } if entry == "b.xml"));

    let settled = extractor.extract_settled().await.unwrap();
    assert_eq!(settled.len(), 2);
    assert!(settled[0].1.is_ok());
    assert!(settled[1].1.is_err());

    let err = ArchiveWalker::new("t.zip", &archive).strict(true).walk().unwrap_err();
    assert!(matches!(err, Error::ArchiveFormat { ref archive, .. } if archive == "t.zip"));
}

#[tokio::test]
async fn missing_descriptor_ends_the_scan() {
    let mut archive = ArchiveBuilder::new().file("a.xml", b"<a/>").into_bytes();
    let tail = ArchiveBuilder::new().streamed("b.xml", b"<b/>").into_bytes();
    // Drop the descriptor from the streamed entry
    archive.extend_from_slice(&tail[..tail.len() - 16]);

    let entries = ArchiveWalker::new("m.zip", &archive).walk().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "a.xml");

    assert!(ArchiveWalker::new("m.zip", &archive).strict(true).walk().is_err());
}

#[tokio::test]
async fn unsupported_methods_fail_per_entry() {
    let archive = ArchiveBuilder::new()
        .raw("stored.xml", 0, b"<s/>")
        .file("ok.xml", b"<ok/>")
        .finish();

    let settled = ZipExtractor::new("u.zip", &archive).extract_settled().await.unwrap();
    assert_eq!(settled[0].0, "stored.xml");
    assert!(matches!(
        &settled[0].1,
        Err(Error::Decompression { reason, .. }) if reason.contains("unsupported compression method")
    ));
    assert_eq!(settled[1].1.as_ref().unwrap().bytes, b"<ok/>");
}

#[test]
fn strict_mode_rejects_garbage_but_accepts_trailers() {
    let archive = ArchiveBuilder::new().file("a.xml", b"<a/>").finish();
    assert_eq!(ArchiveWalker::new("a.zip", &archive).strict(true).walk().unwrap().len(), 1);

    let mut garbage = ArchiveBuilder::new().file("a.xml", b"<a/>").into_bytes();
    let offset = garbage.len();
    garbage.extend_from_slice(b"junkjunk");
    assert_eq!(ArchiveWalker::new("g.zip", &garbage).walk().unwrap().len(), 1);
    let err = ArchiveWalker::new("g.zip", &garbage).strict(true).walk().unwrap_err();
    assert!(matches!(err, Error::ArchiveFormat { offset: at, .. } if at == offset));

    assert!(ArchiveWalker::new("n.zip", b"not a zip").strict(true).walk().is_err());
    assert!(ArchiveWalker::new("n.zip", b"not a zip").walk().unwrap().is_empty());
}
