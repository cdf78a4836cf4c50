//! Subcommand implementations. Each writes to the given writer so tests can
//! capture the output.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use comicfs_kernel::vfs::VfsOps;
use comicfs_kernel::{ComicMount, DirEntry, FileAttr, FileType};

const CHUNK: u32 = 256 * 1024;

fn kind_char(kind: FileType) -> char {
    if kind.is_dir() { 'd' } else { '-' }
}

fn mtime_secs(attr: &FileAttr) -> u64 {
    attr.mtime
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub async fn ls(mount: &ComicMount, path: &Path, long: bool, out: &mut impl Write) -> Result<()> {
    let entries = mount
        .readdir(path)
        .await
        .with_context(|| format!("cannot list {}", path.display()))?;

    for DirEntry { name, kind } in entries {
        if !long {
            writeln!(out, "{name}")?;
            continue;
        }
        let attr = mount
            .getattr(&path.join(&name))
            .await
            .with_context(|| format!("cannot stat {}", path.join(&name).display()))?;
        writeln!(
            out,
            "{}{:04o} {:>8} {:>10} {name}",
            kind_char(kind),
            attr.perm(),
            attr.ino,
            attr.size
        )?;
    }
    Ok(())
}

pub async fn stat(mount: &ComicMount, path: &Path, out: &mut impl Write) -> Result<()> {
    let attr = mount
        .getattr(path)
        .await
        .with_context(|| format!("cannot stat {}", path.display()))?;

    writeln!(out, "  path: {}", path.display())?;
    writeln!(out, "  kind: {:?}", attr.kind)?;
    writeln!(out, " inode: {}", attr.ino)?;
    writeln!(out, "  size: {}", attr.size)?;
    writeln!(out, "  mode: {:o}", attr.mode)?;
    writeln!(out, " mtime: {}", mtime_secs(&attr))?;
    writeln!(out, "   ttl: {}s", attr.ttl.as_secs())?;
    Ok(())
}

pub async fn cat(mount: &ComicMount, path: &Path, out: &mut impl Write) -> Result<()> {
    let fh = mount
        .open(path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))?;

    let mut offset = 0u64;
    let copied = loop {
        let chunk = match mount.read(fh, offset, CHUNK).await {
            Ok(chunk) => chunk,
            Err(e) => break Err(e.into()),
        };
        if chunk.is_empty() {
            break Ok(());
        }
        offset += chunk.len() as u64;
        if let Err(e) = out.write_all(&chunk) {
            break Err(e.into());
        }
    };

    if let Err(e) = mount.release(fh).await {
        tracing::warn!(path = %path.display(), error = %e, "release failed");
    }
    copied
}

pub async fn tree(
    mount: &ComicMount,
    path: &Path,
    max_depth: Option<usize>,
    out: &mut impl Write,
) -> Result<()> {
    writeln!(out, "{}", path.display())?;

    // Depth-first, children in listing order.
    let mut stack: Vec<(PathBuf, usize)> = vec![(path.to_path_buf(), 0)];
    while let Some((dir, depth)) = stack.pop() {
        if max_depth.is_some_and(|max| depth >= max) {
            continue;
        }
        let entries = match mount.readdir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                writeln!(out, "{}[error: {e}]", "  ".repeat(depth + 1))?;
                continue;
            }
        };

        // Print this level, then queue subdirectories so the first one is
        // visited next.
        let mut subdirs = Vec::new();
        for entry in entries {
            let suffix = if entry.kind.is_dir() { "/" } else { "" };
            writeln!(out, "{}{}{suffix}", "  ".repeat(depth + 1), entry.name)?;
            if entry.kind.is_dir() {
                subdirs.push(dir.join(&entry.name));
            }
        }
        stack.extend(subdirs.into_iter().rev().map(|p| (p, depth + 1)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use comicfs_kernel::{ComicFsConfig, FilesystemRegistry};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup() -> (ComicMount, TempDir) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("series/vol1")).unwrap();
        std::fs::write(dir.path().join("series/notes.txt"), b"read me").unwrap();
        std::fs::write(dir.path().join("series/vol1/cover.txt"), b"cover").unwrap();

        let config = ComicFsConfig::new(dir.path());
        let registry = FilesystemRegistry::from_config(&config).unwrap();
        (ComicMount::new(Arc::new(registry)), dir)
    }

    #[tokio::test]
    async fn test_cat_copies_whole_file() {
        let (mount, _dir) = setup();
        let mut out = Vec::new();
        cat(&mount, Path::new("/series/notes.txt"), &mut out).await.unwrap();
        assert_eq!(out, b"read me");
        assert_eq!(mount.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_ls_and_stat() {
        let (mount, _dir) = setup();

        let mut out = Vec::new();
        ls(&mount, Path::new("/series"), false, &mut out).await.unwrap();
        let mut names: Vec<_> = String::from_utf8(out).unwrap().lines().map(str::to_owned).collect();
        names.sort();
        assert_eq!(names, vec!["notes.txt", "vol1"]);

        let mut out = Vec::new();
        stat(&mount, Path::new("/series/notes.txt"), &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("size: 7"));
        assert!(text.contains("kind: File"));
    }

    #[tokio::test]
    async fn test_tree_respects_depth() {
        let (mount, _dir) = setup();

        let mut out = Vec::new();
        tree(&mount, Path::new("/"), None, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("      cover.txt"));

        let mut out = Vec::new();
        tree(&mount, Path::new("/"), Some(1), &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("  series/"));
        assert!(!text.contains("notes.txt"));
    }

    #[tokio::test]
    async fn test_missing_path_has_context() {
        let (mount, _dir) = setup();
        let err = cat(&mount, Path::new("/nope.txt"), &mut Vec::new()).await.unwrap_err();
        assert!(err.to_string().contains("/nope.txt"));
    }
}
