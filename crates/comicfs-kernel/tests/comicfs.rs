//! End-to-end behaviour through FilesystemRegistry and ComicMount.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use comicfs_kernel::imgconv::{FormatCodec, ImageEncoder};
use comicfs_kernel::vfs::{DIR_TTL, MEMBER_TTL};
use comicfs_kernel::{
    ComicFsConfig, ComicMount, ConversionRegistry, DirEntry, FilesystemRegistry, VfsError,
    VfsOps, VirtualNode, ZipFactory,
};
use futures::future::join_all;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("comicfs_kernel=debug")
        .with_test_writer()
        .try_init();
}

fn webp_page(shade: u8) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 24, Rgb([shade, 0, 255 - shade])));
    let mut out = Vec::new();
    FormatCodec(ImageFormat::WebP).encode(&image, &mut out).unwrap();
    out
}

fn write_cbz(path: &Path, files: &[(&str, &[u8])]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, data) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// A library with one series: a cbz of three pages and a plain text file.
fn library() -> (TempDir, Vec<u8>) {
    let dir = TempDir::new().unwrap();
    let series = dir.path().join("series");
    std::fs::create_dir(&series).unwrap();

    let page1 = webp_page(10);
    let page2 = webp_page(200);
    write_cbz(
        &series.join("a.cbz"),
        &[
            ("page1.webp", &page1),
            ("page2.webp", &page2),
            ("sub/page3.webp", &page1),
            ("sub/page4.webp", &page2),
        ],
    );
    std::fs::write(series.join("readme.txt"), b"volume one, first printing").unwrap();
    (dir, page1)
}

fn mount_for(dir: &TempDir) -> ComicMount {
    let registry = FilesystemRegistry::from_config(&ComicFsConfig::new(dir.path())).unwrap();
    ComicMount::new(Arc::new(registry))
}

#[tokio::test]
async fn container_is_listed_as_directory() {
    init_tracing();
    let (dir, _) = library();
    let mount = mount_for(&dir);

    let mut entries = mount.readdir(Path::new("/series")).await.unwrap();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(
        entries,
        vec![DirEntry::directory("a.cbz"), DirEntry::file("readme.txt")]
    );

    let attr = mount.getattr(Path::new("/series/a.cbz")).await.unwrap();
    assert!(attr.is_dir());
    assert_eq!(attr.ttl, DIR_TTL);
}

#[tokio::test]
async fn archive_root_lists_direct_children_only() {
    init_tracing();
    let (dir, _) = library();
    let mount = mount_for(&dir);

    assert_eq!(
        mount.readdir(Path::new("/series/a.cbz")).await.unwrap(),
        vec![
            DirEntry::file("page1.webp"),
            DirEntry::file("page2.webp"),
            DirEntry::directory("sub"),
        ]
    );
    assert_eq!(
        mount.readdir(Path::new("/series/a.cbz/sub")).await.unwrap(),
        vec![DirEntry::file("page3.webp"), DirEntry::file("page4.webp")]
    );
}

#[tokio::test]
async fn dual_extension_serves_converted_png() {
    init_tracing();
    let (dir, page1) = library();
    let mount = mount_for(&dir);
    let path = Path::new("/series/a.cbz/sub/page3.webp.png");

    let attr = mount.getattr(path).await.unwrap();
    assert_eq!(attr.ttl, MEMBER_TTL);

    let png = mount.read_all(path).await.unwrap();
    assert_eq!(attr.size, png.len() as u64);
    assert_ne!(attr.size, page1.len() as u64);

    let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (16, 24));

    // The original stays available unconverted.
    let raw = mount.read_all(Path::new("/series/a.cbz/sub/page3.webp")).await.unwrap();
    assert_eq!(raw, page1);

    assert!(matches!(
        mount.getattr(Path::new("/series/a.cbz/page1.webp.bmp")).await,
        Err(VfsError::NotFound(_))
    ));
}

#[tokio::test]
async fn reads_truncate_at_end_of_member() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    write_cbz(&dir.path().join("b.zip"), &[("fifteen.bin", b"0123456789ABCDE")]);
    let mount = mount_for(&dir);

    let fh = mount.open(Path::new("/b.zip/fifteen.bin")).await.unwrap();
    assert_eq!(mount.read(fh, 10, 20).await.unwrap(), b"ABCDE");
    assert!(mount.read(fh, 15, 5).await.unwrap().is_empty());
    assert!(mount.read(fh, 1000, 5).await.unwrap().is_empty());
    mount.release(fh).await.unwrap();
    assert!(matches!(mount.release(fh).await, Err(VfsError::BadHandle(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_first_lookups_open_archive_once() {
    init_tracing();
    let (dir, _) = library();
    let registry = FilesystemRegistry::new(dir.path(), ConversionRegistry::with_defaults());
    let zip = Arc::new(ZipFactory::new());
    registry.register_container_type(".cbz", zip.clone());
    let mount = Arc::new(ComicMount::new(Arc::new(registry)));

    let listings = join_all((0..64).map(|i| {
        let mount = Arc::clone(&mount);
        tokio::spawn(async move {
            let path = if i % 2 == 0 { "/series/a.cbz" } else { "/series/a.cbz/sub" };
            mount.readdir(Path::new(path)).await.unwrap()
        })
    }))
    .await;

    for (i, listing) in listings.into_iter().enumerate() {
        let listing = listing.unwrap();
        assert_eq!(listing.len(), if i % 2 == 0 { 3 } else { 2 });
    }

    let handle = zip
        .cache()
        .get_or_create(&dir.path().join("series/a.cbz").canonicalize().unwrap())
        .await
        .unwrap();
    assert_eq!(handle.open_count(), 1);
    assert_eq!(zip.cache().len(), 1);
}

#[tokio::test]
async fn inodes_are_stable_and_distinct() {
    init_tracing();
    let (dir, _) = library();
    let mount = mount_for(&dir);

    let paths = [
        "/",
        "/series",
        "/series/a.cbz",
        "/series/a.cbz/page1.webp",
        "/series/a.cbz/page1.webp.png",
        "/series/a.cbz/sub",
        "/series/readme.txt",
    ];

    let mut first = Vec::new();
    for path in paths {
        first.push(mount.getattr(Path::new(path)).await.unwrap().ino);
    }
    for (path, ino) in paths.iter().zip(&first) {
        assert_eq!(mount.getattr(Path::new(path)).await.unwrap().ino, *ino, "{path}");
    }

    let mut distinct = first.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), paths.len());
    assert_eq!(mount.registry().inodes().len(), paths.len());
}

#[tokio::test]
async fn corrupt_container_surfaces_archive_corrupt() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("broken.cbz"), b"PK but not really").unwrap();
    let mount = mount_for(&dir);

    assert!(mount.getattr(Path::new("/broken.cbz")).await.unwrap().is_dir());
    let err = mount.readdir(Path::new("/broken.cbz")).await.unwrap_err();
    assert!(matches!(err, VfsError::ArchiveCorrupt { .. }));
    assert_eq!(err.errno(), rustix::io::Errno::IO.raw_os_error());
}

#[tokio::test]
async fn node_api_walks_into_archives() {
    init_tracing();
    let (dir, _) = library();
    let registry = FilesystemRegistry::from_config(&ComicFsConfig::new(dir.path())).unwrap();

    let series = registry.root().lookup("series").await.unwrap();
    let archive = series.lookup("a.cbz").await.unwrap();
    assert!(matches!(archive, VirtualNode::ArchiveDirectory(_)));

    let sub = archive.lookup("sub").await.unwrap();
    assert!(sub.is_dir());
    let page = sub.lookup("page4.webp").await.unwrap();
    assert!(matches!(page, VirtualNode::ArchiveMember(_)));

    let handle = page.open().await.unwrap();
    assert_eq!(&handle.read(0, 4).await.unwrap(), b"RIFF");
    handle.release().unwrap();

    assert!(matches!(sub.lookup("page9.webp").await, Err(VfsError::NotFound(_))));
    assert!(matches!(page.list_children().await, Err(VfsError::NotADirectory(_))));
}
