//! Export to zip archives
//!
//! Posts are bundled as `<nanos>-posts.zip` with one `<domain>/<slug>-<id>.md`
//! entry per non-empty file. Uploads are bundled as `<nanos>-uploads.zip`
//! with one `<id>-<name>` entry each; gzip payloads are decompressed first.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::read::GzDecoder;
use serde::Serialize;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::storage::{StoreError, StoreResult};
use crate::store::Store;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A written export archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportArchive {
    pub path: PathBuf,
    pub entries: Vec<String>,
}

/// Make a string usable as a single path component
fn path_component(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '-',
            c => c,
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

fn archive_path(dir: &Path, kind: &str) -> PathBuf {
    let now = Utc::now();
    let stamp = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_millis());
    dir.join(format!("{}-{}.zip", stamp, kind))
}

/// Payload of an upload as it was originally sent
fn unpack_upload(id: &str, data: Vec<u8>) -> StoreResult<Vec<u8>> {
    if !data.starts_with(&GZIP_MAGIC) {
        return Ok(data);
    }
    let mut decoded = Vec::new();
    GzDecoder::new(&data[..])
        .read_to_end(&mut decoded)
        .map_err(|source| StoreError::Decompress {
            id: id.to_string(),
            source,
        })?;
    Ok(decoded)
}

/// Write `entries` into a deflated zip archive at `path`
fn write_archive(path: &Path, entries: Vec<(String, Vec<u8>)>) -> StoreResult<ExportArchive> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = fs::File::create(path).map_err(io_err)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut names = Vec::with_capacity(entries.len());
    for (name, data) in entries {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&data).map_err(io_err)?;
        debug!("archived {}", name);
        names.push(name);
    }
    zip.finish()?;

    Ok(ExportArchive {
        path: path.to_path_buf(),
        entries: names,
    })
}

fn create_dir(path: &Path) -> StoreResult<()> {
    fs::create_dir_all(path).map_err(|source| StoreError::CreateDirectory {
        path: path.to_path_buf(),
        source,
    })
}

impl Store {
    /// Archive every non-empty file of every domain under `dir`
    pub fn export_posts(&self, dir: &Path) -> StoreResult<ExportArchive> {
        let mut entries = Vec::new();
        for domain in self.list_domains()? {
            for file in self.get_all(&domain, false)? {
                let name = format!(
                    "{}/{}-{}.md",
                    path_component(&domain),
                    path_component(&file.slug),
                    file.id
                );
                entries.push((name, file.data.into_bytes()));
            }
        }

        create_dir(dir)?;
        let archive = write_archive(&archive_path(dir, "posts"), entries)?;
        info!("exported {} posts to {:?}", archive.entries.len(), archive.path);
        Ok(archive)
    }

    /// Archive every upload under `dir`
    ///
    /// Reading an upload for export counts as a view.
    pub fn export_uploads(&self, dir: &Path) -> StoreResult<ExportArchive> {
        let mut entries = Vec::new();
        for id in self.blob_ids()? {
            let blob = self.get_blob(&id)?;
            let name = format!("{}-{}", path_component(&id), path_component(&blob.name));
            entries.push((name, unpack_upload(&id, blob.data)?));
        }

        create_dir(dir)?;
        let archive = write_archive(&archive_path(dir, "uploads"), entries)?;
        info!("exported {} uploads to {:?}", archive.entries.len(), archive.path);
        Ok(archive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::File;
    use crate::store::test_support::test_store;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn read_entry(path: &Path, name: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
        let mut entry = archive.by_name(name).unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        data
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_path_component() {
        assert_eq!(path_component("a/b"), "a-b");
        assert_eq!(path_component("../up"), "-up");
        assert_eq!(path_component("plain.md"), "plain.md");
    }

    #[test]
    fn test_export_posts() {
        let store = test_store();
        let temp_dir = TempDir::new().unwrap();
        store.create_domain("notes", "").unwrap();

        let public = File::new("hello", "# Hello");
        let private = File::new("todo", "- milk").in_domain("notes");
        let empty = File::new("blank", "");
        store.save(&public).unwrap();
        store.save(&private).unwrap();
        store.save(&empty).unwrap();

        let archive = store.export_posts(temp_dir.path()).unwrap();
        assert_eq!(archive.path.parent(), Some(temp_dir.path()));
        let file_name = archive.path.file_name().unwrap().to_string_lossy();
        assert!(file_name.ends_with("-posts.zip"));

        let mut entries = archive.entries.clone();
        entries.sort();
        let public_entry = format!("public/hello-{}.md", public.id);
        let private_entry = format!("notes/todo-{}.md", private.id);
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&public_entry));
        assert!(entries.contains(&private_entry));

        assert_eq!(read_entry(&archive.path, &public_entry), b"# Hello");
        assert_eq!(read_entry(&archive.path, &private_entry), b"- milk");
    }

    #[test]
    fn test_export_uploads_decompresses_gzip() {
        let store = test_store();
        let temp_dir = TempDir::new().unwrap();
        store
            .save_blob("gz", "notes.txt", &gzip(b"compressed upload"))
            .unwrap();
        store.save_blob("raw", "cat.png", &[0, 1, 2]).unwrap();

        let out = temp_dir.path().join("uploads");
        let archive = store.export_uploads(&out).unwrap();
        assert!(archive.path.starts_with(&out));

        assert_eq!(read_entry(&archive.path, "gz-notes.txt"), b"compressed upload");
        assert_eq!(read_entry(&archive.path, "raw-cat.png"), vec![0, 1, 2]);
        assert_eq!(store.get_blob("raw").unwrap().views, 1);
    }

    #[test]
    fn test_export_uploads_rejects_broken_gzip() {
        let store = test_store();
        let temp_dir = TempDir::new().unwrap();
        store.save_blob("bad", "x.txt", &[0x1f, 0x8b, 0, 0]).unwrap();

        let err = store.export_uploads(temp_dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::Decompress { ref id, .. } if id == "bad"));
    }
}
