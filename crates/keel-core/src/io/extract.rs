//! Unpack fetched artifacts into a scratch directory.
//!
//! Handles tar.gz and plain tar. Anything else is treated as a single file
//! and written as-is.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Archive error: {0}")]
    Archive(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    TarGz,
    Tar,
    Raw,
}

fn sniff(data: &[u8]) -> Format {
    if data.starts_with(&[0x1f, 0x8b]) {
        Format::TarGz
    } else if data.len() > 262 && &data[257..262] == b"ustar" {
        Format::Tar
    } else {
        Format::Raw
    }
}

/// Unpack `data` into `dest` and return the source root.
///
/// Archives wrapped in a single top-level directory (`grpc-0.6.0/...`)
/// return that directory. `file_name` names the output for raw artifacts.
///
/// # Errors
///
/// Returns [`ExtractError`] if the archive is corrupt or an entry would
/// escape `dest`.
pub fn unpack(data: &[u8], file_name: &str, dest: &Path) -> Result<PathBuf, ExtractError> {
    fs::create_dir_all(dest)?;

    match sniff(data) {
        Format::TarGz => unpack_tar(GzDecoder::new(Cursor::new(data)), dest)?,
        Format::Tar => unpack_tar(Cursor::new(data), dest)?,
        Format::Raw => {
            let name = Path::new(file_name)
                .file_name()
                .ok_or_else(|| ExtractError::Archive(format!("bad file name '{file_name}'")))?;
            fs::write(dest.join(name), data)?;
        }
    }

    Ok(source_root(dest)?)
}

fn unpack_tar<R: Read>(reader: R, dest: &Path) -> Result<(), ExtractError> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        // unpack_in refuses paths that would land outside dest
        if !entry.unpack_in(dest)? {
            let path = entry.path()?.display().to_string();
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {path}"
            )));
        }
    }
    Ok(())
}

fn source_root(dest: &Path) -> io::Result<PathBuf> {
    let mut children = fs::read_dir(dest)?.collect::<Result<Vec<_>, _>>()?;
    if children.len() == 1 && children[0].file_type()?.is_dir() {
        return Ok(children.remove(0).path());
    }
    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        io::Write::write_all(&mut enc, data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_tar_gz_single_root() {
        let dir = tempfile::tempdir().unwrap();
        let data = gzip(&tarball(&[
            ("grpc-0.6.0/Makefile", b"all:"),
            ("grpc-0.6.0/src/main.c", b"int main;"),
        ]));

        let root = unpack(&data, "grpc.tar.gz", dir.path()).unwrap();
        assert_eq!(root, dir.path().join("grpc-0.6.0"));
        assert!(root.join("src/main.c").is_file());
    }

    #[test]
    fn test_plain_tar_flat() {
        let dir = tempfile::tempdir().unwrap();
        let data = tarball(&[("a.txt", b"a"), ("b.txt", b"b")]);

        let root = unpack(&data, "flat.tar", dir.path()).unwrap();
        assert_eq!(root, dir.path());
        assert_eq!(fs::read(root.join("b.txt")).unwrap(), b"b");
    }

    #[test]
    fn test_raw_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = unpack(b"#!/bin/sh\necho hi\n", "tool.sh", dir.path()).unwrap();
        assert_eq!(root, dir.path());
        assert!(dir.path().join("tool.sh").is_file());
    }

    #[test]
    fn test_corrupt_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let err = unpack(&[0x1f, 0x8b, 0, 1, 2, 3], "x.tar.gz", dir.path());
        assert!(err.is_err());
    }
}
