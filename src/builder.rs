//! Turning entry specs into archive entries.
//!
//! [`Archiver`] owns the output writer and the [`RunContext`]: everything a run accumulates as
//! tokens are processed left to right (filters, the selected format, the set of names written so
//! far, and the directory `-C` points at).  [`Archiver::add`] stats a source, merges its metadata
//! with the entry's options into a [`HeaderEntry`], writes it, and walks directories.

use std::{
    collections::HashSet,
    ffi::OsStr,
    fs::File,
    io::{self, Read},
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rustix::fs::{stat, FileType};

use crate::{
    archive::ArchiveWriter,
    error::{Error, Result},
    header::{EntryKind, Format, HeaderEntry, Ownership},
    identity::IdentityLookup,
    mapping::{map_destination, EntrySpec, STDIN_SOURCE},
    matcher::FilterSet,
    metadata::{read_link, stdin_metadata, symlink_metadata, FileKind, Metadata},
    options::{EntryOptions, ForcedKind},
    util::{clean_path, is_proc_pipe, is_root_marker, join_path},
    walk::Walk,
};

/// State shared by every token of one run.
#[derive(Debug)]
pub struct RunContext {
    pub format: Format,
    /// Write each archive name at most once.
    pub skip_duplicates: bool,
    /// Leave ownership out of entries unless their options ask for it.
    pub skip_user_info: bool,
    pub source_filters: FilterSet,
    pub destination_filters: FilterSet,
    /// What `now` means in time options.
    pub started_at: DateTime<Utc>,
    written: HashSet<Vec<u8>>,
    start_dir: PathBuf,
    cwd: PathBuf,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    /// A fresh context whose relative sources resolve against the process working directory.
    pub fn new() -> Self {
        Self::with_directory("")
    }

    /// A fresh context whose relative sources (and `-C` arguments) resolve against `dir`.
    pub fn with_directory(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        RunContext {
            format: Format::default(),
            skip_duplicates: true,
            skip_user_info: false,
            source_filters: FilterSet::default(),
            destination_filters: FilterSet::default(),
            started_at: Utc::now(),
            written: HashSet::new(),
            start_dir: dir.clone(),
            cwd: dir,
        }
    }

    pub fn set_format(&mut self, format: Format) {
        if format != self.format && !self.written.is_empty() {
            warn!("switching from {} to {format} format after entries were written", self.format);
        }
        self.format = format;
    }

    /// Points relative sources at `dir`, itself taken relative to the starting directory.
    pub fn change_directory(&mut self, dir: &Path) -> Result<()> {
        let target = self.start_dir.join(dir);
        let not_a_dir = |err: io::Error| Error::ChangeDirectory {
            path: target.clone(),
            err,
        };
        let buf = stat(&target).map_err(|err| not_a_dir(err.into()))?;
        if FileType::from_raw_mode(buf.st_mode) != FileType::Directory {
            return Err(not_a_dir(rustix::io::Errno::NOTDIR.into()));
        }
        debug!("cd {}", target.display());
        self.cwd = target;
        Ok(())
    }

    /// Where a source named on the command line actually lives.
    pub fn resolve(&self, source: &Path) -> PathBuf {
        self.cwd.join(source)
    }

    pub(crate) fn is_duplicate(&self, name: &[u8]) -> bool {
        self.skip_duplicates && self.written.contains(name)
    }

    pub(crate) fn record(&mut self, name: Vec<u8>) {
        self.written.insert(name);
    }
}

/// Where an entry's content and metadata come from.
struct Source<'a> {
    /// The path as the user (or the walk) spelled it; filters and messages use this.
    literal: &'a [u8],
    /// The path to open, after `-C`.
    path: &'a Path,
    metadata: &'a Metadata,
}

impl Source<'_> {
    fn is_stdin(&self) -> bool {
        self.literal == STDIN_SOURCE
    }

    fn display(&self) -> String {
        String::from_utf8_lossy(self.literal).into_owned()
    }

    fn open(&self) -> Result<Box<dyn Read + '_>> {
        if self.is_stdin() {
            return Ok(Box::new(io::stdin().lock()));
        }
        let file = File::open(self.path).map_err(|err| Error::Open {
            path: self.display(),
            err,
        })?;
        Ok(Box::new(file))
    }

    fn read_all(&self) -> Result<Vec<u8>> {
        let mut content = vec![];
        self.open()?
            .read_to_end(&mut content)
            .map_err(|err| Error::Read {
                path: self.display(),
                err,
            })?;
        Ok(content)
    }
}

/// Builds one archive.
pub struct Archiver<W: ArchiveWriter, I: IdentityLookup> {
    pub(crate) writer: W,
    identities: I,
    pub(crate) ctx: RunContext,
}

impl<W: ArchiveWriter, I: IdentityLookup> Archiver<W, I> {
    pub fn new(writer: W, identities: I, ctx: RunContext) -> Self {
        Archiver {
            writer,
            identities,
            ctx,
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut RunContext {
        &mut self.ctx
    }

    /// Parses the options of `spec` and adds it, recursing into directories.
    pub fn add(&mut self, spec: &EntrySpec) -> Result<()> {
        let opts = match &spec.options {
            Some(opts) => EntryOptions::parse(
                opts,
                self.ctx.skip_user_info,
                self.ctx.started_at,
                &self.identities,
            )
            .map_err(|err| Error::Options {
                src: spec.source.to_string_lossy().into_owned(),
                err,
            })?,
            None => EntryOptions::new(self.ctx.skip_user_info),
        };
        self.add_with_options(spec.source_bytes(), &spec.destination, &opts)
    }

    /// Adds `source` under `destination` (empty for the default) with already parsed options.
    pub fn add_with_options(
        &mut self,
        source: &[u8],
        destination: &[u8],
        opts: &EntryOptions,
    ) -> Result<()> {
        if self.ctx.source_filters.rejects(source) {
            debug!("{}: excluded by source filter", String::from_utf8_lossy(source));
            return Ok(());
        }

        let path = self.ctx.resolve(Path::new(OsStr::from_bytes(source)));
        let metadata = if source == STDIN_SOURCE {
            stdin_metadata()?
        } else {
            symlink_metadata(&path)?
        };
        let name = map_destination(source, destination)?;

        let src = Source {
            literal: source,
            path: &path,
            metadata: &metadata,
        };
        self.emit(&src, name, opts, true)
    }

    /// Closes the archive and hands back the writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.close()?;
        Ok(self.writer)
    }

    /// Ownership from the options, falling back to looking up the file's own ids.  Automatic
    /// lookups that fail leave the entry without any ownership.
    fn ownership(&self, metadata: &Metadata, opts: &EntryOptions) -> Option<Ownership> {
        if opts.no_user {
            return None;
        }
        let user = match &opts.user {
            Some(user) => user.clone(),
            None => self.identities.user_by_id(metadata.uid)?,
        };
        let group = match &opts.group {
            Some(group) => group.clone(),
            None => self.identities.group_by_id(metadata.gid)?,
        };
        Some(Ownership {
            uid: user.uid.into(),
            gid: group.gid.into(),
            user_name: user.name,
            group_name: group.name,
        })
    }

    fn emit(
        &mut self,
        src: &Source<'_>,
        name: Vec<u8>,
        opts: &EntryOptions,
        allow_recursive: bool,
    ) -> Result<()> {
        let mut buffered = src.is_stdin();
        let kind = match src.metadata.kind {
            _ if src.is_stdin() => EntryKind::Regular,
            FileKind::Regular => EntryKind::Regular,
            FileKind::Directory => EntryKind::Directory,
            FileKind::Symlink => {
                let target = read_link(src.path)?;
                if is_proc_pipe(src.literal, &target) {
                    buffered = true;
                    EntryKind::Regular
                } else {
                    EntryKind::Symlink(target)
                }
            }
            kind if kind.is_opaque() => {
                buffered = true;
                EntryKind::Regular
            }
            _ if opts.kind.is_some() => EntryKind::Regular,
            _ => {
                warn!("skipping file: {}: cannot add file", src.display());
                return Ok(());
            }
        };

        let mut header = HeaderEntry::new(name, kind, self.ctx.format);
        header.mode = src.metadata.mode;
        header.mtime = src.metadata.mtime;
        if header.kind == EntryKind::Regular && !buffered {
            header.size = src.metadata.size;
        }
        header.owner = self.ownership(src.metadata, opts);

        if let Some(mode) = opts.mode {
            header.mode = mode;
        }
        match &opts.kind {
            Some(ForcedKind::Directory) => {
                header.kind = EntryKind::Directory;
                header.size = 0;
            }
            Some(ForcedKind::Symlink(target)) => {
                header.kind = EntryKind::Symlink(target.as_bytes().to_vec());
                header.size = 0;
            }
            Some(ForcedKind::Hardlink(target)) => {
                header.kind = EntryKind::Hardlink(target.as_bytes().to_vec());
                header.size = 0;
            }
            None => {}
        }
        if header.is_dir() && !header.name.ends_with(b"/") {
            header.name.push(b'/');
        }
        if let Some(mtime) = opts.mtime {
            header.mtime = mtime;
        }
        header.atime = opts.atime;
        header.ctime = opts.ctime;

        if self.ctx.destination_filters.rejects(&header.name) {
            debug!("{}: excluded by destination filter", header.display_name());
            return Ok(());
        }
        if self.ctx.is_duplicate(&header.name) {
            debug!("{}: already written", header.display_name());
            return Ok(());
        }

        if is_root_marker(&header.name) {
            if !header.is_dir() {
                return Ok(());
            }
        } else {
            self.write_entry(src, &mut header, buffered)?;
        }

        if src.metadata.is_dir()
            && header.is_dir()
            && !src.is_stdin()
            && allow_recursive
            && opts.allow_recursive()
        {
            let prefix = header.name.strip_suffix(b"/").unwrap_or(&header.name);
            self.add_tree(src, prefix)?;
        }
        Ok(())
    }

    fn write_entry(&mut self, src: &Source<'_>, header: &mut HeaderEntry, buffered: bool) -> Result<()> {
        let regular = header.kind == EntryKind::Regular;

        let content = if regular && buffered {
            let content = src.read_all()?;
            header.size = content.len() as u64;
            Some(content)
        } else {
            None
        };

        debug!("{}", header.display_name());
        self.writer.write_header(header)?;
        self.ctx.record(header.name.clone());

        if regular {
            let mut body: Box<dyn Read + '_> = match content {
                Some(content) => Box::new(io::Cursor::new(content)),
                None => src.open()?,
            };
            let copy_err = |err| Error::Read {
                path: src.display(),
                err,
            };
            let copied = io::copy(&mut body.by_ref().take(header.size), &mut self.writer)
                .map_err(copy_err)?;
            // anything left means the file grew since it was stat'd
            let extra = body.read(&mut [0u8; 1]).map_err(copy_err)? as u64;
            if copied + extra != header.size {
                return Err(Error::SizeMismatch {
                    name: src.display(),
                    written: copied + extra,
                    declared: header.size,
                });
            }
        }

        self.writer.finish_entry()
    }

    /// Adds everything below the directory `src`, with default options, under `prefix`.
    fn add_tree(&mut self, src: &Source<'_>, prefix: &[u8]) -> Result<()> {
        // children of `.` are spelled `a/x`, not `./a/x`
        let mut base = clean_path(src.literal);
        match &base[..] {
            b"." => base.clear(),
            b"/" => {}
            _ => base.push(b'/'),
        }
        let defaults = EntryOptions::new(self.ctx.skip_user_info);

        for entry in Walk::new(src.path) {
            let entry = entry?;
            let relative = entry.relative.as_os_str().as_bytes();

            let mut literal = base.clone();
            literal.extend_from_slice(relative);
            if entry.metadata.is_dir() {
                literal.push(b'/');
            }
            if self.ctx.source_filters.rejects(&literal) {
                debug!("{}: excluded by source filter", String::from_utf8_lossy(&literal));
                continue;
            }

            let path = src.path.join(&entry.relative);
            let child = Source {
                literal: &literal,
                path: &path,
                metadata: &entry.metadata,
            };
            self.emit(&child, join_path(prefix, relative), &defaults, false)?;
        }
        Ok(())
    }
}
