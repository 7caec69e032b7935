//! Symlink-aware stat and readlink for archive sources.

use std::{io, path::Path};

use chrono::{DateTime, Utc};
use rustix::fs::{fstat, major, minor, readlinkat, statat, AtFlags, FileType, CWD};

use crate::error::{Error, Result};

/// The on-disk kind of a source, before any option has had a say.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    CharDevice { major: u32, minor: u32 },
    BlockDevice { major: u32, minor: u32 },
    Fifo,
    /// Sockets, and anything else we have no way of archiving.
    Other,
}

impl FileKind {
    /// Devices and FIFOs can't be archived as typed entries, but reading them gives content.
    pub fn is_opaque(&self) -> bool {
        matches!(
            self,
            FileKind::CharDevice { .. } | FileKind::BlockDevice { .. } | FileKind::Fifo
        )
    }
}

/// What stat told us about one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub kind: FileKind,
    /// Permission bits, including setuid/setgid/sticky.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Only meaningful for regular files.
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

impl From<rustix::fs::Stat> for Metadata {
    fn from(buf: rustix::fs::Stat) -> Self {
        let kind = match FileType::from_raw_mode(buf.st_mode) {
            FileType::RegularFile => FileKind::Regular,
            FileType::Directory => FileKind::Directory,
            FileType::Symlink => FileKind::Symlink,
            FileType::CharacterDevice => FileKind::CharDevice {
                major: major(buf.st_rdev),
                minor: minor(buf.st_rdev),
            },
            FileType::BlockDevice => FileKind::BlockDevice {
                major: major(buf.st_rdev),
                minor: minor(buf.st_rdev),
            },
            FileType::Fifo => FileKind::Fifo,
            FileType::Socket | FileType::Unknown => FileKind::Other,
        };

        Metadata {
            kind,
            mode: buf.st_mode as u32 & 0o7777,
            uid: buf.st_uid,
            gid: buf.st_gid,
            size: buf.st_size as u64,
            mtime: DateTime::from_timestamp(buf.st_mtime as i64, buf.st_mtime_nsec as u32)
                .unwrap_or_default(),
        }
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Stats `path` without following a final symlink.
pub fn symlink_metadata(path: &Path) -> Result<Metadata> {
    let buf = statat(CWD, path, AtFlags::SYMLINK_NOFOLLOW).map_err(|err| Error::Stat {
        path: display(path),
        err: err.into(),
    })?;
    Ok(buf.into())
}

/// Stats whatever standard input is connected to.
pub fn stdin_metadata() -> Result<Metadata> {
    let buf = fstat(io::stdin()).map_err(|err| Error::Stat {
        path: "-".to_string(),
        err: err.into(),
    })?;
    Ok(buf.into())
}

/// Reads the target of the symlink at `path`, as raw bytes.
pub fn read_link(path: &Path) -> Result<Vec<u8>> {
    let target = readlinkat(CWD, path, Vec::new()).map_err(|err| Error::ReadLink {
        path: display(path),
        err: err.into(),
    })?;
    Ok(target.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use std::{fs, os::unix::fs::PermissionsExt};

    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_kinds() {
        let td = tempfile::tempdir().unwrap();
        let file = td.path().join("file");
        fs::write(&file, b"hello").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o4751)).unwrap();
        let link = td.path().join("link");
        std::os::unix::fs::symlink("file", &link).unwrap();

        let md = symlink_metadata(&file).unwrap();
        assert_eq!(md.kind, FileKind::Regular);
        assert_eq!(md.size, 5);
        assert_eq!(md.mode, 0o4751);

        assert_eq!(symlink_metadata(td.path()).unwrap().kind, FileKind::Directory);
        assert!(symlink_metadata(td.path()).unwrap().is_dir());

        // not followed
        assert_eq!(symlink_metadata(&link).unwrap().kind, FileKind::Symlink);
        assert_eq!(read_link(&link).unwrap(), b"file");
    }

    #[test]
    fn test_null_device() {
        let md = symlink_metadata(Path::new("/dev/null")).unwrap();
        assert_eq!(md.kind, FileKind::CharDevice { major: 1, minor: 3 });
        assert!(md.kind.is_opaque());
    }

    #[test]
    fn test_missing() {
        let td = tempfile::tempdir().unwrap();
        let missing = td.path().join("missing");
        let err = symlink_metadata(&missing).unwrap_err();
        assert!(matches!(err, Error::Stat { ref err, .. } if err.kind() == io::ErrorKind::NotFound));
        assert!(matches!(read_link(&missing), Err(Error::ReadLink { .. })));
    }
}
