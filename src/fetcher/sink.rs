//! Destination for streamed content

use bytes::{Bytes, BytesMut};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::types::DownloadedContent;
use crate::task::DownloadTarget;

/// Numbered names tried before giving up on a crowded directory
const MAX_NAME_ATTEMPTS: u32 = 1000;

pub(crate) enum ContentSink {
    Memory(BytesMut),
    /// Content goes to a private temporary file in the target directory.
    /// Dropping the `TempPath` removes it, so an aborted future cleans up too.
    File {
        file: File,
        partial: TempPath,
        destination: PathBuf,
        written: u64,
    },
}

impl ContentSink {
    pub(crate) async fn open(
        target: &DownloadTarget,
        file_name: &str,
        size_hint: Option<u64>,
    ) -> std::io::Result<Self> {
        match target {
            DownloadTarget::Memory => {
                let capacity = size_hint.unwrap_or(0).min(16 * 1024 * 1024) as usize;
                Ok(ContentSink::Memory(BytesMut::with_capacity(capacity)))
            }
            DownloadTarget::Directory(dir) => {
                fs::create_dir_all(dir).await?;
                let (file, partial) = tempfile::Builder::new()
                    .prefix(&format!(".{file_name}."))
                    .suffix(".part")
                    .tempfile_in(dir)?
                    .into_parts();

                Ok(ContentSink::File {
                    file: File::from_std(file),
                    partial,
                    destination: dir.join(file_name),
                    written: 0,
                })
            }
        }
    }

    pub(crate) async fn write(&mut self, chunk: &Bytes) -> std::io::Result<()> {
        match self {
            ContentSink::Memory(buf) => buf.extend_from_slice(chunk),
            ContentSink::File { file, written, .. } => {
                file.write_all(chunk).await?;
                *written += chunk.len() as u64;
            }
        }
        Ok(())
    }

    /// Flush and move the content to its final place. An existing file is
    /// never replaced: the content lands on the first free `name (n).ext`.
    pub(crate) async fn commit(self) -> std::io::Result<DownloadedContent> {
        match self {
            ContentSink::Memory(buf) => Ok(DownloadedContent::Memory(buf.freeze())),
            ContentSink::File {
                mut file,
                partial,
                destination,
                written,
            } => {
                file.flush().await?;
                file.sync_all().await?;
                drop(file);

                let path = persist_without_clobbering(partial, &destination)?;
                Ok(DownloadedContent::File { path, len: written })
            }
        }
    }
}

fn persist_without_clobbering(
    mut partial: TempPath,
    destination: &Path,
) -> std::io::Result<PathBuf> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = numbered(destination, attempt);
        match partial.persist_noclobber(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %candidate.display(), "Destination taken, trying next name");
                partial = e.path;
            }
            Err(e) => return Err(e.error),
        }
    }

    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free file name for {}", destination.display()),
    ))
}

/// `cat.png`, `cat (1).png`, `cat (2).png`, ...
fn numbered(destination: &Path, attempt: u32) -> PathBuf {
    if attempt == 0 {
        return destination.to_path_buf();
    }

    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match destination.extension() {
        Some(ext) => format!("{stem} ({attempt}).{}", ext.to_string_lossy()),
        None => format!("{stem} ({attempt})"),
    };
    destination.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_file_commit_renames_partial() {
        let dir = TempDir::new().unwrap();
        let target = DownloadTarget::Directory(dir.path().to_path_buf());

        let mut sink = ContentSink::open(&target, "cat.png", None).await.unwrap();
        sink.write(&Bytes::from_static(b"meow")).await.unwrap();
        assert_eq!(entries(&dir), 1);
        assert!(!dir.path().join("cat.png").exists());

        let content = sink.commit().await.unwrap();
        assert_eq!(
            content,
            DownloadedContent::File {
                path: dir.path().join("cat.png"),
                len: 4
            }
        );
        assert_eq!(entries(&dir), 1);
        assert_eq!(std::fs::read(dir.path().join("cat.png")).unwrap(), b"meow");
    }

    #[tokio::test]
    async fn test_dropped_sink_discards_partial() {
        let dir = TempDir::new().unwrap();
        let target = DownloadTarget::Directory(dir.path().to_path_buf());

        let mut sink = ContentSink::open(&target, "cat.png", None).await.unwrap();
        sink.write(&Bytes::from_static(b"me")).await.unwrap();
        drop(sink);

        assert_eq!(entries(&dir), 0);
    }

    #[tokio::test]
    async fn test_commit_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cat.png"), b"old").unwrap();
        std::fs::write(dir.path().join("cat (1).png"), b"older").unwrap();
        let target = DownloadTarget::Directory(dir.path().to_path_buf());

        let mut sink = ContentSink::open(&target, "cat.png", None).await.unwrap();
        sink.write(&Bytes::from_static(b"new")).await.unwrap();
        let content = sink.commit().await.unwrap();

        let expected = dir.path().join("cat (2).png");
        assert_eq!(
            content,
            DownloadedContent::File {
                path: expected.clone(),
                len: 3
            }
        );
        assert_eq!(std::fs::read(dir.path().join("cat.png")).unwrap(), b"old");
        assert_eq!(std::fs::read(expected).unwrap(), b"new");
        assert_eq!(entries(&dir), 3);
    }

    #[tokio::test]
    async fn test_concurrent_sinks_use_separate_files() {
        let dir = TempDir::new().unwrap();
        let target = DownloadTarget::Directory(dir.path().to_path_buf());

        let mut first = ContentSink::open(&target, "cat.png", None).await.unwrap();
        let mut second = ContentSink::open(&target, "cat.png", None).await.unwrap();
        first.write(&Bytes::from_static(b"AAAA")).await.unwrap();
        second.write(&Bytes::from_static(b"BB")).await.unwrap();
        assert_eq!(entries(&dir), 2);

        first.commit().await.unwrap();
        second.commit().await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("cat.png")).unwrap(), b"AAAA");
        assert_eq!(std::fs::read(dir.path().join("cat (1).png")).unwrap(), b"BB");
    }

    #[test]
    fn test_numbered_names() {
        let destination = Path::new("/tmp/cat.png");
        assert_eq!(numbered(destination, 0), PathBuf::from("/tmp/cat.png"));
        assert_eq!(numbered(destination, 3), PathBuf::from("/tmp/cat (3).png"));
        assert_eq!(
            numbered(Path::new("/tmp/README"), 1),
            PathBuf::from("/tmp/README (1)")
        );
    }

    #[tokio::test]
    async fn test_memory_sink() {
        let mut sink = ContentSink::open(&DownloadTarget::Memory, "x", Some(3)).await.unwrap();
        sink.write(&Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(
            sink.commit().await.unwrap(),
            DownloadedContent::Memory(Bytes::from_static(b"abc"))
        );
    }
}
