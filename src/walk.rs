//! Depth-first enumeration of a directory tree.
//!
//! Entries come out in pre-order with siblings sorted bytewise by name, so a directory is always
//! seen before anything inside it.  Symlinks are reported, never followed.  The walk keeps an
//! explicit stack instead of recursing, so deep trees cost heap rather than call stack.

use std::{
    ffi::OsStr,
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

use rustix::fs::{openat, statat, AtFlags, Dir, Mode, OFlags, CWD};

use crate::{
    error::{Error, Result},
    metadata::Metadata,
};

/// One entry below the walk root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Path relative to the walk root, never empty.
    pub relative: PathBuf,
    pub metadata: Metadata,
}

#[derive(Debug)]
pub struct Walk {
    root: PathBuf,
    pending: Vec<WalkEntry>,
    started: bool,
}

impl Walk {
    /// Walks everything below `root`.  `root` itself is not yielded.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Walk {
            root: root.into(),
            pending: vec![],
            started: false,
        }
    }

    fn read_children(&self, relative: &Path) -> Result<Vec<WalkEntry>> {
        let dir = self.root.join(relative);
        let read_dir_err = |err: rustix::io::Errno| Error::ReadDir {
            path: dir.clone(),
            err: err.into(),
        };

        let fd = openat(
            CWD,
            &dir,
            OFlags::RDONLY | OFlags::DIRECTORY | OFlags::NOFOLLOW | OFlags::CLOEXEC,
            Mode::empty(),
        )
        .map_err(read_dir_err)?;

        let mut children = vec![];
        for item in Dir::read_from(&fd).map_err(read_dir_err)? {
            let entry = item.map_err(read_dir_err)?;
            let name = OsStr::from_bytes(entry.file_name().to_bytes());

            if name == "." || name == ".." {
                continue;
            }

            let buf = statat(&fd, entry.file_name(), AtFlags::SYMLINK_NOFOLLOW).map_err(|err| {
                Error::Stat {
                    path: dir.join(name).to_string_lossy().into_owned(),
                    err: err.into(),
                }
            })?;
            children.push(WalkEntry {
                relative: relative.join(name),
                metadata: buf.into(),
            });
        }

        children.sort_by(|a, b| {
            a.relative
                .as_os_str()
                .as_bytes()
                .cmp(b.relative.as_os_str().as_bytes())
        });
        Ok(children)
    }

    /// Queues the children of `relative` so that the smallest name is popped first.
    fn descend(&mut self, relative: &Path) -> Result<()> {
        let children = self.read_children(relative)?;
        log::trace!("{}: {} entries", self.root.join(relative).display(), children.len());
        self.pending.extend(children.into_iter().rev());
        Ok(())
    }
}

impl Iterator for Walk {
    type Item = Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            if let Err(err) = self.descend(Path::new("")) {
                return Some(Err(err));
            }
        }

        let entry = self.pending.pop()?;
        if entry.metadata.is_dir() {
            if let Err(err) = self.descend(&entry.relative) {
                self.pending.clear();
                return Some(Err(err));
            }
        }
        Some(Ok(entry))
    }
}
