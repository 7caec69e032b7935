use std::{
    ffi::OsString,
    fs,
    io::Read,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use tempfile::TempDir;

use crate::{
    archive::TarWriter,
    builder::{Archiver, RunContext},
    identity::IdentityTable,
};

static TMPDIR: LazyLock<Option<OsString>> = LazyLock::new(|| {
    let path = std::env::var_os("MTAR_TEST_TMPDIR")?;
    eprintln!("temporary directory from $MTAR_TEST_TMPDIR: {path:?}");
    Some(path)
});

pub fn tempdir() -> TempDir {
    match TMPDIR.as_deref() {
        Some(dir) => TempDir::with_prefix_in("mtar-test-", dir).unwrap(),
        None => TempDir::with_prefix("mtar-test-").unwrap(),
    }
}

/// The process's own uid and gid map to alice and users, so files created by a test get
/// predictable ownership.
pub fn identities() -> IdentityTable {
    let (uid, gid) = (uzers::get_current_uid(), uzers::get_current_gid());
    IdentityTable::default()
        .with_user(uid, "alice", gid)
        .with_group(gid, "users")
}

pub type MemoryArchiver = Archiver<TarWriter<Vec<u8>>, IdentityTable>;

/// A scratch directory that sources are resolved against.
pub struct Fixture {
    td: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture { td: tempdir() }
    }

    pub fn root(&self) -> &Path {
        self.td.path()
    }

    fn path(&self, rel: &str) -> PathBuf {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        path
    }

    pub fn write(&self, rel: &str, content: &str) {
        self.write_bytes(rel, content.as_bytes());
    }

    pub fn write_bytes(&self, rel: &str, content: &[u8]) {
        fs::write(self.path(rel), content).unwrap();
    }

    pub fn mkdir(&self, rel: &str) {
        fs::create_dir_all(self.root().join(rel)).unwrap();
    }

    pub fn symlink(&self, target: &str, rel: &str) {
        std::os::unix::fs::symlink(target, self.path(rel)).unwrap();
    }

    pub fn archiver(&self) -> MemoryArchiver {
        self.archiver_with(identities())
    }

    pub fn archiver_with(&self, ids: IdentityTable) -> MemoryArchiver {
        Archiver::new(
            TarWriter::new(vec![]),
            ids,
            RunContext::with_directory(self.root()),
        )
    }
}

/// One entry as the `tar` crate sees it.
#[derive(Debug)]
pub struct ReadEntry {
    pub name: String,
    pub entry_type: tar::EntryType,
    pub size: u64,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    pub user_name: String,
    pub group_name: String,
    pub link: Option<String>,
    pub mtime: u64,
    pub gnu: bool,
    pub content: Vec<u8>,
}

pub fn read_archive(data: &[u8]) -> Vec<ReadEntry> {
    let mut archive = tar::Archive::new(data);
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let mut content = vec![];
            entry.read_to_end(&mut content).unwrap();
            let header = entry.header();
            ReadEntry {
                name: String::from_utf8(entry.path_bytes().into_owned()).unwrap(),
                entry_type: header.entry_type(),
                size: entry.size(),
                mode: header.mode().unwrap(),
                uid: header.uid().unwrap(),
                gid: header.gid().unwrap(),
                user_name: String::from_utf8_lossy(header.username_bytes().unwrap_or_default())
                    .into_owned(),
                group_name: String::from_utf8_lossy(header.groupname_bytes().unwrap_or_default())
                    .into_owned(),
                link: entry
                    .link_name_bytes()
                    .map(|link| String::from_utf8(link.into_owned()).unwrap()),
                mtime: header.mtime().unwrap(),
                gnu: header.as_gnu().is_some(),
                content,
            }
        })
        .collect()
}

pub fn archive_names(data: &[u8]) -> Vec<String> {
    read_archive(data).into_iter().map(|e| e.name).collect()
}

/// Builds a small GNU archive owned by alice:users.  Names ending in `/` become directories.
pub fn tar_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(vec![]);
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        let name_field = &mut header.as_old_mut().name;
        name_field[..name.len()].copy_from_slice(name.as_bytes());
        if name.ends_with('/') {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(0o755);
        } else {
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(0o644);
        }
        header.set_size(content.len() as u64);
        header.set_uid(1000);
        header.set_gid(100);
        header.set_username("alice").unwrap();
        header.set_groupname("users").unwrap();
        header.set_mtime(1_600_000_000);
        header.set_cksum();
        builder.append(&header, content.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap()
}
