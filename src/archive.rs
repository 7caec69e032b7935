//! Tar stream writing and reading.
//!
//! [`ArchiveWriter`] is what the builder talks to: one [`HeaderEntry`] at a time, followed by
//! exactly `size` body bytes through [`std::io::Write`], then [`ArchiveWriter::finish_entry`].
//! [`TarWriter`] is the implementation on top of the `tar` crate's header codec.  It writes the
//! name and link fields itself because `tar::Header::set_path` refuses things like `..` in link
//! targets which are perfectly valid in an archive.
//!
//! [`TarReader`] is the reading side used to concatenate existing archives.  Zero blocks are
//! skipped, so a stream holding several archives back to back reads as one sequence of entries.

use std::io::{self, Read, Write};

use chrono::{DateTime, Utc};
use tar::{EntryType, Header};

use crate::{
    error::{Error, Result},
    header::{EntryKind, Format, HeaderEntry, Ownership},
};

const BLOCK_SIZE: u64 = 512;

const NAME_LEN: usize = 100;
const PREFIX_LEN: usize = 155;
const USER_NAME_LEN: usize = 32;

/// Largest value of an 8-byte octal field (uid, gid).
const MAX_ID: u64 = 0o7777777;
/// Largest value of a 12-byte octal field (size, mtime).
const MAX_SIZE: u64 = 0o77777777777;

const GNU_LONG_NAME: &[u8] = b"././@LongLink";

const PAX_PATH: &str = "path";
const PAX_LINKPATH: &str = "linkpath";
const PAX_SIZE: &str = "size";
const PAX_UID: &str = "uid";
const PAX_GID: &str = "gid";
const PAX_UNAME: &str = "uname";
const PAX_GNAME: &str = "gname";
const PAX_MTIME: &str = "mtime";
const PAX_ATIME: &str = "atime";
const PAX_CTIME: &str = "ctime";
const PAX_GNU_SPARSE: &str = "GNU.sparse.";

/// The sink for a sequence of archive entries.
pub trait ArchiveWriter: Write {
    /// Starts a new entry.  Any open entry is finished first.
    fn write_header(&mut self, entry: &HeaderEntry) -> Result<()>;

    /// Pads the current entry's body to the block boundary.  Fails if fewer body bytes were
    /// written than the header declared.
    fn finish_entry(&mut self) -> Result<()>;

    /// Finishes the archive.  Nothing may be written afterwards.
    fn close(&mut self) -> Result<()>;
}

/// Writes tar archives in any of the supported [`Format`]s.
#[derive(Debug)]
pub struct TarWriter<W: Write> {
    out: W,
    /// Name of the entry whose body is being written, if any.
    current: Option<String>,
    /// Body bytes still owed to the current entry.
    remaining: u64,
    /// Padding owed once the body is complete.
    padding: u64,
    closed: bool,
}

impl<W: Write> TarWriter<W> {
    pub fn new(out: W) -> Self {
        TarWriter {
            out,
            current: None,
            remaining: 0,
            padding: 0,
            closed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes).map_err(|err| Error::Write {
            name: name.to_string(),
            err,
        })
    }

    /// Writes a meta entry (PAX extended header or GNU long name) and its padded body.
    fn emit_meta(&mut self, name: &str, header: &mut Header, body: &[u8]) -> Result<()> {
        header.set_size(body.len() as u64);
        header.set_cksum();
        self.emit(name, header.as_bytes())?;
        self.emit(name, body)?;
        let padding = padding_for(body.len() as u64);
        self.emit(name, &vec![0; padding as usize])
    }
}

fn padding_for(size: u64) -> u64 {
    (BLOCK_SIZE - size % BLOCK_SIZE) % BLOCK_SIZE
}

fn unencodable(entry: &HeaderEntry, field: &'static str) -> Error {
    Error::Unencodable {
        name: entry.display_name().into_owned(),
        field,
        format: entry.format,
    }
}

/// Copies `src` into a fixed-width header field, truncating if it doesn't fit.
fn copy_field(dst: &mut [u8], src: &[u8]) {
    let len = src.len().min(dst.len());
    dst[..len].copy_from_slice(&src[..len]);
}

/// Splits a name into the ustar prefix and name fields, if it can be.
fn split_ustar_name(name: &[u8]) -> Option<(&[u8], &[u8])> {
    if name.len() <= NAME_LEN {
        return Some((&[], name));
    }
    // The prefix holds at most PREFIX_LEN bytes and is followed by an implied '/'.
    let limit = name.len().min(PREFIX_LEN + 1);
    let slash = name[..limit].iter().rposition(|&c| c == b'/')?;
    let (prefix, rest) = (&name[..slash], &name[slash + 1..]);
    if prefix.is_empty() || rest.is_empty() || rest.len() > NAME_LEN {
        return None;
    }
    Some((prefix, rest))
}

/// Formats a timestamp as PAX does: seconds, plus a fraction without trailing zeros.
fn format_pax_time(ts: &DateTime<Utc>) -> String {
    let mut secs = ts.timestamp();
    let mut nanos = ts.timestamp_subsec_nanos();
    let mut sign = "";
    if secs < 0 && nanos != 0 {
        sign = "-";
        secs = -(secs + 1);
        nanos = 1_000_000_000 - nanos;
    }
    if nanos == 0 {
        return format!("{sign}{secs}");
    }
    let fraction = format!("{nanos:09}");
    format!("{sign}{secs}.{}", fraction.trim_end_matches('0'))
}

fn parse_pax_time(value: &str) -> Option<DateTime<Utc>> {
    let (negative, value) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let (secs, fraction) = value.split_once('.').unwrap_or((value, ""));
    if secs.is_empty() || !fraction.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let secs: i64 = secs.parse().ok()?;
    let mut nanos: u32 = 0;
    for (i, digit) in fraction.bytes().take(9).enumerate() {
        nanos += u32::from(digit - b'0') * 10u32.pow(8 - i as u32);
    }
    if !negative {
        DateTime::from_timestamp(secs, nanos)
    } else if nanos == 0 {
        DateTime::from_timestamp(-secs, 0)
    } else {
        DateTime::from_timestamp(-secs - 1, 1_000_000_000 - nanos)
    }
}

/// Appends one `"<len> <key>=<value>\n"` record.  The length counts itself.
fn push_pax_record(records: &mut Vec<u8>, key: &str, value: &[u8]) {
    let base = key.len() + value.len() + 3;
    let mut len = base + 1;
    while base + len.to_string().len() != len {
        len = base + len.to_string().len();
    }
    records.extend_from_slice(format!("{len} {key}=").as_bytes());
    records.extend_from_slice(value);
    records.push(b'\n');
}

fn pax_header_name(name: &[u8]) -> Vec<u8> {
    let trimmed = name.strip_suffix(b"/").unwrap_or(name);
    let base = match trimmed.iter().rposition(|&c| c == b'/') {
        Some(slash) => &trimmed[slash + 1..],
        None => trimmed,
    };
    let mut header_name = b"PaxHeaders.0/".to_vec();
    header_name.extend_from_slice(base);
    header_name.truncate(NAME_LEN);
    header_name
}

impl<W: Write> TarWriter<W> {
    fn write_gnu_long(&mut self, entry: &HeaderEntry, kind: EntryType, value: &[u8]) -> Result<()> {
        let mut header = Header::new_gnu();
        copy_field(&mut header.as_old_mut().name, GNU_LONG_NAME);
        header.set_entry_type(kind);
        header.set_mode(0o644);
        header.set_mtime(0);
        let mut body = value.to_vec();
        body.push(0);
        let name = entry.display_name();
        self.emit_meta(&name, &mut header, &body)
    }

    fn write_pax(&mut self, entry: &HeaderEntry, records: &[u8]) -> Result<()> {
        let mut header = Header::new_ustar();
        copy_field(
            &mut header.as_old_mut().name,
            &pax_header_name(&entry.name),
        );
        header.set_entry_type(EntryType::XHeader);
        header.set_mode(0o644);
        header.set_mtime(0);
        let display = entry.display_name();
        self.emit_meta(&display, &mut header, records)
    }
}

impl<W: Write> ArchiveWriter for TarWriter<W> {
    fn write_header(&mut self, entry: &HeaderEntry) -> Result<()> {
        self.finish_entry()?;
        if entry.kind == EntryKind::GlobalHeader && entry.format != Format::Pax {
            return Err(unencodable(entry, "global header"));
        }

        let mut header = match entry.format {
            Format::Gnu => Header::new_gnu(),
            Format::Ustar | Format::Pax => Header::new_ustar(),
        };
        let mut records = vec![];
        let link = entry.kind.link_target().unwrap_or_default();

        // name
        match (entry.format, split_ustar_name(&entry.name)) {
            (Format::Gnu, _) if entry.name.len() > NAME_LEN => {
                self.write_gnu_long(entry, EntryType::GNULongName, &entry.name)?;
                copy_field(&mut header.as_old_mut().name, &entry.name);
            }
            (Format::Gnu, _) => copy_field(&mut header.as_old_mut().name, &entry.name),
            (Format::Pax, split) if split.is_none() || !entry.name.is_ascii() => {
                push_pax_record(&mut records, PAX_PATH, &entry.name);
                copy_field(&mut header.as_old_mut().name, &entry.name);
            }
            (_, Some((prefix, name))) => {
                copy_field(&mut header.as_old_mut().name, name);
                if let Some(ustar) = header.as_ustar_mut() {
                    copy_field(&mut ustar.prefix, prefix);
                }
            }
            (_, None) => return Err(unencodable(entry, "name")),
        }

        // link target
        if link.len() > NAME_LEN || (entry.format == Format::Pax && !link.is_ascii()) {
            match entry.format {
                Format::Ustar => return Err(unencodable(entry, "linkname")),
                Format::Gnu => self.write_gnu_long(entry, EntryType::GNULongLink, link)?,
                Format::Pax => push_pax_record(&mut records, PAX_LINKPATH, link),
            }
        }
        copy_field(&mut header.as_old_mut().linkname, link);

        header.set_entry_type(entry.kind.entry_type());
        header.set_mode(entry.mode);

        // size
        if entry.size > MAX_SIZE {
            match entry.format {
                Format::Ustar => return Err(unencodable(entry, "size")),
                Format::Pax => {
                    push_pax_record(&mut records, PAX_SIZE, entry.size.to_string().as_bytes());
                    header.set_size(0);
                }
                Format::Gnu => header.set_size(entry.size),
            }
        } else {
            header.set_size(entry.size);
        }

        // ownership
        let owner = entry.owner.clone().unwrap_or_default();
        for (key, id, set) in [
            (PAX_UID, owner.uid, Header::set_uid as fn(&mut Header, u64)),
            (PAX_GID, owner.gid, Header::set_gid),
        ] {
            if id > MAX_ID {
                match entry.format {
                    Format::Ustar => return Err(unencodable(entry, key)),
                    Format::Pax => {
                        push_pax_record(&mut records, key, id.to_string().as_bytes());
                        set(&mut header, 0);
                    }
                    Format::Gnu => set(&mut header, id),
                }
            } else {
                set(&mut header, id);
            }
        }
        for (key, name) in [(PAX_UNAME, &owner.user_name), (PAX_GNAME, &owner.group_name)] {
            if name.len() > USER_NAME_LEN || (entry.format == Format::Pax && !name.is_ascii()) {
                match entry.format {
                    Format::Pax => push_pax_record(&mut records, key, name.as_bytes()),
                    _ => return Err(unencodable(entry, key)),
                }
            }
            if let Some(ustar) = header.as_ustar_mut() {
                let field = match key {
                    PAX_UNAME => &mut ustar.uname,
                    _ => &mut ustar.gname,
                };
                copy_field(field, name.as_bytes());
            } else if let Some(gnu) = header.as_gnu_mut() {
                let field = match key {
                    PAX_UNAME => &mut gnu.uname,
                    _ => &mut gnu.gname,
                };
                copy_field(field, name.as_bytes());
            }
        }

        // times
        let mtime = entry.mtime.timestamp();
        if mtime < 0 || mtime as u64 > MAX_SIZE || entry.mtime.timestamp_subsec_nanos() != 0 {
            match entry.format {
                Format::Pax => {
                    push_pax_record(
                        &mut records,
                        PAX_MTIME,
                        format_pax_time(&entry.mtime).as_bytes(),
                    );
                }
                // sub-second precision is silently lost, as with any other tar
                _ if mtime >= 0 && mtime as u64 <= MAX_SIZE => {}
                _ => return Err(unencodable(entry, "mtime")),
            }
        }
        header.set_mtime(mtime.clamp(0, MAX_SIZE as i64) as u64);

        for (key, ts) in [(PAX_ATIME, &entry.atime), (PAX_CTIME, &entry.ctime)] {
            let Some(ts) = ts else {
                continue;
            };
            match entry.format {
                Format::Ustar => return Err(unencodable(entry, key)),
                Format::Pax => {
                    push_pax_record(&mut records, key, format_pax_time(ts).as_bytes());
                }
                Format::Gnu => {
                    let secs = u64::try_from(ts.timestamp()).map_err(|_| unencodable(entry, key))?;
                    if let Some(gnu) = header.as_gnu_mut() {
                        match key {
                            PAX_ATIME => gnu.set_atime(secs),
                            _ => gnu.set_ctime(secs),
                        }
                    }
                }
            }
        }

        if let Some((major, minor)) = entry.kind.device() {
            header
                .set_device_major(major)
                .and_then(|()| header.set_device_minor(minor))
                .map_err(|err| Error::Write {
                    name: entry.display_name().into_owned(),
                    err,
                })?;
        }

        if !entry.pax_records.is_empty() {
            if entry.format == Format::Pax {
                for (key, value) in &entry.pax_records {
                    push_pax_record(&mut records, key, value);
                }
            } else {
                log::warn!(
                    "{}: dropping {} extended header records not representable in {} format",
                    entry.display_name(),
                    entry.pax_records.len(),
                    entry.format
                );
            }
        }

        if !records.is_empty() {
            self.write_pax(entry, &records)?;
        }

        header.set_cksum();
        let name = entry.display_name().into_owned();
        self.emit(&name, header.as_bytes())?;

        self.remaining = entry.size;
        self.padding = padding_for(entry.size);
        self.current = Some(name);
        Ok(())
    }

    fn finish_entry(&mut self) -> Result<()> {
        let Some(name) = self.current.take() else {
            return Ok(());
        };
        if self.remaining > 0 {
            return Err(Error::ShortBody {
                name,
                missing: self.remaining,
            });
        }
        let padding = vec![0; self.padding as usize];
        self.padding = 0;
        self.emit(&name, &padding)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.finish_entry()?;
        self.closed = true;
        self.out
            .write_all(&[0; 2 * BLOCK_SIZE as usize])
            .and_then(|()| self.out.flush())
            .map_err(Error::Close)
    }
}

impl<W: Write> Write for TarWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() as u64 > self.remaining {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "write past the end of the declared entry size",
            ));
        }
        let n = self.out.write(buf)?;
        self.remaining -= n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Reads entries from one or more tar archives laid end to end.
pub struct TarReader<R: Read> {
    archive: tar::Archive<R>,
}

impl<R: Read> TarReader<R> {
    pub fn new(input: R) -> Self {
        let mut archive = tar::Archive::new(input);
        archive.set_ignore_zeros(true);
        TarReader { archive }
    }

    /// Iterates the entries.  The second half of each item reads that entry's body.
    pub fn entries(&mut self) -> Result<ReadEntries<'_, R>> {
        let inner = self.archive.entries().map_err(Error::ReadArchive)?;
        Ok(ReadEntries { inner })
    }
}

pub struct ReadEntries<'a, R: 'a + Read> {
    inner: tar::Entries<'a, R>,
}

impl<'a, R: 'a + Read> Iterator for ReadEntries<'a, R> {
    type Item = Result<(HeaderEntry, tar::Entry<'a, R>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut entry = match self.inner.next()? {
            Ok(entry) => entry,
            Err(err) => return Some(Err(Error::ReadArchive(err))),
        };
        Some(header_from_entry(&mut entry).map(|header| (header, entry)))
    }
}

/// Converts what the `tar` crate parsed (including any PAX and GNU long name records) back into
/// a [`HeaderEntry`].  The format is left at its default; callers pick the output format.
fn header_from_entry<R: Read>(entry: &mut tar::Entry<'_, R>) -> Result<HeaderEntry> {
    let name = entry.path_bytes().into_owned();
    let display = String::from_utf8_lossy(&name).into_owned();
    let bad_data = |what: String| {
        Error::ReadArchive(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{display}: {what}"),
        ))
    };

    let mut records = vec![];
    // a global header's records are its own body, which is copied through unread
    if entry.header().entry_type() != EntryType::XGlobalHeader {
        if let Some(extensions) = entry.pax_extensions().map_err(Error::ReadArchive)? {
            for extension in extensions {
                let extension = extension.map_err(Error::ReadArchive)?;
                let key = extension.key().map_err(|_| Error::NotUtf8 {
                    what: "extended header key",
                    value: String::from_utf8_lossy(extension.key_bytes()).into_owned(),
                })?;
                records.push((key.to_string(), extension.value_bytes().to_vec()));
            }
        }
    }

    let link = entry.link_name_bytes().map(|link| link.into_owned());
    let header = entry.header();
    let entry_type = header.entry_type();

    let kind = match entry_type {
        EntryType::Regular | EntryType::Continuous => EntryKind::Regular,
        EntryType::Directory => EntryKind::Directory,
        EntryType::Symlink => EntryKind::Symlink(link.unwrap_or_default()),
        EntryType::Link => EntryKind::Hardlink(link.unwrap_or_default()),
        EntryType::Char | EntryType::Block => {
            let major = header.device_major().map_err(Error::ReadArchive)?.unwrap_or(0);
            let minor = header.device_minor().map_err(Error::ReadArchive)?.unwrap_or(0);
            if entry_type == EntryType::Char {
                EntryKind::CharDevice { major, minor }
            } else {
                EntryKind::BlockDevice { major, minor }
            }
        }
        EntryType::Fifo => EntryKind::Fifo,
        EntryType::XGlobalHeader => EntryKind::GlobalHeader,
        other => {
            return Err(Error::UnsupportedEntry {
                name: display.clone(),
                kind: other.as_byte() as char,
            })
        }
    };

    let mut parsed = HeaderEntry::new(name, kind, Format::default());
    parsed.mode = header.mode().map_err(Error::ReadArchive)?;
    parsed.size = entry.size();
    let mtime = header.mtime().map_err(Error::ReadArchive)?;
    parsed.mtime = i64::try_from(mtime)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| bad_data(format!("mtime {mtime} out of range")))?;

    let mut owner = Ownership {
        uid: header.uid().map_err(Error::ReadArchive)?,
        gid: header.gid().map_err(Error::ReadArchive)?,
        user_name: String::from_utf8_lossy(header.username_bytes().unwrap_or_default())
            .into_owned(),
        group_name: String::from_utf8_lossy(header.groupname_bytes().unwrap_or_default())
            .into_owned(),
    };

    if let Some(gnu) = header.as_gnu() {
        let stamp = |secs: u64| DateTime::from_timestamp(secs as i64, 0).filter(|_| secs != 0);
        parsed.atime = gnu.atime().ok().and_then(stamp);
        parsed.ctime = gnu.ctime().ok().and_then(stamp);
    }

    for (key, value) in records {
        let text = || String::from_utf8_lossy(&value).into_owned();
        match key.as_str() {
            // applied by the tar crate already
            PAX_PATH | PAX_LINKPATH | PAX_SIZE => {}
            PAX_MTIME | PAX_ATIME | PAX_CTIME => {
                let ts = parse_pax_time(&text())
                    .ok_or_else(|| bad_data(format!("bad {key} record {:?}", text())))?;
                match key.as_str() {
                    PAX_MTIME => parsed.mtime = ts,
                    PAX_ATIME => parsed.atime = Some(ts),
                    _ => parsed.ctime = Some(ts),
                }
            }
            PAX_UID | PAX_GID => {
                let id = text()
                    .parse()
                    .map_err(|_| bad_data(format!("bad {key} record {:?}", text())))?;
                match key.as_str() {
                    PAX_UID => owner.uid = id,
                    _ => owner.gid = id,
                }
            }
            PAX_UNAME => owner.user_name = text(),
            PAX_GNAME => owner.group_name = text(),
            _ if key.starts_with(PAX_GNU_SPARSE) => {
                return Err(Error::UnsupportedEntry {
                    name: display.clone(),
                    kind: 'S',
                })
            }
            _ => parsed.pax_records.push((key, value)),
        }
    }

    parsed.owner = Some(owner);
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn entry(name: &str, kind: EntryKind, format: Format) -> HeaderEntry {
        let mut entry = HeaderEntry::new(name, kind, format);
        entry.mode = 0o644;
        entry.mtime = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        entry.owner = Some(Ownership {
            uid: 1000,
            gid: 100,
            user_name: "alice".into(),
            group_name: "users".into(),
        });
        entry
    }

    fn write_all(entries: &[(HeaderEntry, &[u8])]) -> Vec<u8> {
        let mut w = TarWriter::new(vec![]);
        for (entry, body) in entries {
            w.write_header(entry).unwrap();
            w.write_all(body).unwrap();
            w.finish_entry().unwrap();
        }
        w.close().unwrap();
        w.into_inner()
    }

    fn read_all(data: &[u8]) -> Vec<(HeaderEntry, Vec<u8>)> {
        let mut reader = TarReader::new(data);
        reader
            .entries()
            .unwrap()
            .map(|item| {
                let (header, mut body) = item.unwrap();
                let mut content = vec![];
                body.read_to_end(&mut content).unwrap();
                (header, content)
            })
            .collect()
    }

    #[test]
    fn test_pax_records() {
        let mut records = vec![];
        push_pax_record(&mut records, "path", b"a");
        // "9 path=a\n" is 9 bytes
        assert_eq!(records, b"9 path=a\n");

        let mut records = vec![];
        let value = vec![b'x'; 93];
        push_pax_record(&mut records, "path", &value);
        // 100 bytes besides the length field, whose own three digits make it 103
        assert_eq!(records.len(), 103);
        assert!(records.starts_with(b"103 path="));
    }

    #[test]
    fn test_pax_time() {
        let ts = |secs, nanos| DateTime::from_timestamp(secs, nanos).unwrap();
        assert_eq!(format_pax_time(&ts(1, 0)), "1");
        assert_eq!(format_pax_time(&ts(1, 500_000_000)), "1.5");
        assert_eq!(format_pax_time(&ts(-2, 500_000_000)), "-1.5");
        assert_eq!(format_pax_time(&ts(-5, 0)), "-5");
        for (secs, nanos) in [(1, 0), (1, 500_000_000), (-2, 500_000_000), (-5, 0), (7, 1)] {
            assert_eq!(
                parse_pax_time(&format_pax_time(&ts(secs, nanos))),
                Some(ts(secs, nanos))
            );
        }
        assert_eq!(parse_pax_time("1.x"), None);
        assert_eq!(parse_pax_time(""), None);
    }

    #[test]
    fn test_ustar_split() {
        let long = format!("{}/{}", "d".repeat(120), "f".repeat(90));
        assert_eq!(
            split_ustar_name(long.as_bytes()),
            Some((&long.as_bytes()[..120], &long.as_bytes()[121..]))
        );
        assert_eq!(split_ustar_name(&[b'x'; 101]), None);
        assert_eq!(split_ustar_name(b"short"), Some((&b""[..], &b"short"[..])));
    }

    #[test]
    fn test_roundtrip_formats() {
        // too long for the name field, but ustar can split it at the slash
        let long = format!("{}/{}", "dir".repeat(40), "name".repeat(20));
        for format in [Format::Ustar, Format::Pax, Format::Gnu] {
            let mut file = entry("dir/file", EntryKind::Regular, format);
            file.size = 5;
            let dir = entry("dir/", EntryKind::Directory, format);
            let link = entry("dir/link", EntryKind::Symlink(b"../file".to_vec()), format);
            let mut long_file = entry(&long, EntryKind::Regular, format);
            long_file.size = 1;
            let data = write_all(&[
                (dir.clone(), b""),
                (file.clone(), b"hello"),
                (link.clone(), b""),
                (long_file.clone(), b"x"),
            ]);
            assert_eq!(data.len() % 512, 0);

            let read = read_all(&data);
            let names: Vec<_> = read.iter().map(|(h, _)| h.display_name().into_owned()).collect();
            assert_eq!(names, ["dir/", "dir/file", "dir/link", long.as_str()], "{format}");
            assert_eq!(read[1].1, b"hello");
            assert_eq!(read[1].0.owner, file.owner);
            assert_eq!(read[1].0.mode, 0o644);
            assert_eq!(read[1].0.mtime, file.mtime);
            assert_eq!(read[2].0.kind, EntryKind::Symlink(b"../file".to_vec()));
            assert_eq!(read[3].1, b"x");
        }
    }

    #[test]
    fn test_pax_extended_fields() {
        let mut file = entry("f", EntryKind::Regular, Format::Pax);
        file.mtime = DateTime::from_timestamp(1_600_000_000, 250_000_000).unwrap();
        file.atime = DateTime::from_timestamp(1_500_000_000, 0);
        file.ctime = DateTime::from_timestamp(-10, 0);
        file.owner = Some(Ownership {
            uid: 1 << 30,
            gid: 7,
            user_name: "u".repeat(40),
            group_name: "g".into(),
        });
        file.pax_records = vec![("SCHILY.xattr.user.k".into(), b"v".to_vec())];
        let link = entry(
            "l",
            EntryKind::Hardlink("t".repeat(150).into_bytes()),
            Format::Pax,
        );

        let read = read_all(&write_all(&[(file.clone(), b""), (link.clone(), b"")]));
        assert_eq!(read[0].0, file);
        assert_eq!(read[1].0.kind, link.kind);
    }

    #[test]
    fn test_gnu_times_and_long_link() {
        let mut link = entry(
            "l",
            EntryKind::Symlink("t".repeat(300).into_bytes()),
            Format::Gnu,
        );
        link.atime = DateTime::from_timestamp(1_000, 0);
        link.ctime = DateTime::from_timestamp(2_000, 0);
        let read = read_all(&write_all(&[(link.clone(), b"")]));
        assert_eq!(read[0].0.kind, link.kind);
        assert_eq!(read[0].0.atime, link.atime);
        assert_eq!(read[0].0.ctime, link.ctime);
    }

    #[test]
    fn test_ustar_limits() {
        let mut w = TarWriter::new(vec![]);
        let mut timed = entry("f", EntryKind::Regular, Format::Ustar);
        timed.atime = Some(timed.mtime);
        assert!(matches!(
            w.write_header(&timed),
            Err(Error::Unencodable { field: "atime", format: Format::Ustar, .. })
        ));

        let long = entry(&"x".repeat(300), EntryKind::Regular, Format::Ustar);
        assert!(matches!(
            w.write_header(&long),
            Err(Error::Unencodable { field: "name", .. })
        ));

        let mut old = entry("f", EntryKind::Regular, Format::Ustar);
        old.mtime = DateTime::from_timestamp(-1, 0).unwrap();
        assert!(matches!(
            w.write_header(&old),
            Err(Error::Unencodable { field: "mtime", .. })
        ));
    }

    #[test]
    fn test_body_size_enforced() {
        let mut w = TarWriter::new(vec![]);
        let mut file = entry("f", EntryKind::Regular, Format::Pax);
        file.size = 3;
        w.write_header(&file).unwrap();
        assert!(w.write_all(b"toolong").is_err());

        let mut w = TarWriter::new(vec![]);
        w.write_header(&file).unwrap();
        w.write_all(b"ab").unwrap();
        assert!(matches!(
            w.finish_entry(),
            Err(Error::ShortBody { missing: 1, .. })
        ));
    }

    #[test]
    fn test_concatenated_archives() {
        let first = write_all(&[(entry("a", EntryKind::Regular, Format::Pax), b"")]);
        let second = write_all(&[(entry("b", EntryKind::Fifo, Format::Gnu), b"")]);
        let both = [first, second].concat();
        let read = read_all(&both);
        assert_eq!(read.len(), 2);
        assert_eq!(read[1].0.kind, EntryKind::Fifo);

        assert!(read_all(b"").is_empty());
    }

    #[test]
    fn test_devices() {
        let dev = entry(
            "dev/sda1",
            EntryKind::BlockDevice { major: 8, minor: 1 },
            Format::Ustar,
        );
        let read = read_all(&write_all(&[(dev.clone(), b"")]));
        assert_eq!(read[0].0.kind, dev.kind);
    }

    #[test]
    fn test_global_header() {
        let records = b"20 comment=abcdefgh\n";
        let mut global = entry("pax_global_header", EntryKind::GlobalHeader, Format::Pax);
        global.size = records.len() as u64;
        let read = read_all(&write_all(&[(global.clone(), records)]));
        assert_eq!(read[0].0.kind, EntryKind::GlobalHeader);
        assert_eq!(read[0].1, records);

        global.format = Format::Gnu;
        assert!(matches!(
            TarWriter::new(vec![]).write_header(&global),
            Err(Error::Unencodable { field: "global header", .. })
        ));
    }

    #[test]
    fn test_mtime_out_of_range() {
        let mut header = Header::new_gnu();
        copy_field(&mut header.as_old_mut().name, b"f");
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o644);
        header.set_uid(0);
        header.set_gid(0);
        header.set_size(0);
        header.set_mtime(u64::MAX);
        header.set_cksum();
        let mut data = header.as_bytes().to_vec();
        data.extend([0; 1024]);

        let mut reader = TarReader::new(&data[..]);
        let first = reader.entries().unwrap().next().unwrap();
        assert!(matches!(first, Err(Error::ReadArchive(_))));
    }
}
