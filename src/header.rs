//! The header value handed to an archive writer for every entry.

use std::{borrow::Cow, fmt, str::FromStr};

use chrono::{DateTime, Utc};

use crate::error::Error;

/// The tar header variant used for emitted entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Format {
    /// POSIX.1-1988 ustar.  No access/change times, no names longer than prefix + name fields.
    Ustar,
    /// POSIX.1-2001 pax: ustar plus extended header records where needed.
    #[default]
    Pax,
    /// GNU tar's own variant, using `././@LongLink` records for long names.
    Gnu,
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ustar" | "1988" | "posix.1-1988" => Ok(Format::Ustar),
            "pax" | "2001" | "posix.1-2001" => Ok(Format::Pax),
            "gnu" => Ok(Format::Gnu),
            _ => Err(Error::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Ustar => "ustar",
            Format::Pax => "pax",
            Format::Gnu => "gnu",
        })
    }
}

/// The typed kind of an archive entry, including any kind-specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    /// Contains the target of the link.
    Symlink(Vec<u8>),
    /// Contains the archive path of the entry this one links to.
    Hardlink(Vec<u8>),
    CharDevice {
        major: u32,
        minor: u32,
    },
    BlockDevice {
        major: u32,
        minor: u32,
    },
    Fifo,
    /// A pax global header (`g`).  Its body is a set of records applying to every later entry.
    GlobalHeader,
}

impl EntryKind {
    pub fn link_target(&self) -> Option<&[u8]> {
        match self {
            EntryKind::Symlink(target) | EntryKind::Hardlink(target) => Some(target),
            _ => None,
        }
    }

    pub fn device(&self) -> Option<(u32, u32)> {
        match *self {
            EntryKind::CharDevice { major, minor } | EntryKind::BlockDevice { major, minor } => {
                Some((major, minor))
            }
            _ => None,
        }
    }

    pub fn entry_type(&self) -> tar::EntryType {
        match self {
            EntryKind::Regular => tar::EntryType::Regular,
            EntryKind::Directory => tar::EntryType::Directory,
            EntryKind::Symlink(_) => tar::EntryType::Symlink,
            EntryKind::Hardlink(_) => tar::EntryType::Link,
            EntryKind::CharDevice { .. } => tar::EntryType::Char,
            EntryKind::BlockDevice { .. } => tar::EntryType::Block,
            EntryKind::Fifo => tar::EntryType::Fifo,
            EntryKind::GlobalHeader => tar::EntryType::XGlobalHeader,
        }
    }
}

/// Numeric and symbolic ownership of an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u64,
    pub gid: u64,
    pub user_name: String,
    pub group_name: String,
}

/// Everything the archive writer needs to emit one header.
///
/// `name` is slash-separated and relative to the archive root; directory names end in `/`.
/// `owner` of `None` is written as uid/gid 0 with empty user and group names.  `size` is the
/// exact number of body bytes that must follow the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    pub name: Vec<u8>,
    pub kind: EntryKind,
    pub mode: u32,
    pub owner: Option<Ownership>,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub atime: Option<DateTime<Utc>>,
    pub ctime: Option<DateTime<Utc>>,
    pub format: Format,
    /// Extended header records carried over from a concatenated archive (e.g.
    /// `SCHILY.xattr.*`).  Only the pax format can encode them.
    pub pax_records: Vec<(String, Vec<u8>)>,
}

impl HeaderEntry {
    pub fn new(name: impl Into<Vec<u8>>, kind: EntryKind, format: Format) -> Self {
        HeaderEntry {
            name: name.into(),
            kind,
            mode: 0,
            owner: None,
            size: 0,
            mtime: DateTime::default(),
            atime: None,
            ctime: None,
            format,
            pax_records: vec![],
        }
    }

    pub fn display_name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_format_aliases() {
        for (names, format) in [
            (["ustar", "1988", "posix.1-1988"], Format::Ustar),
            (["pax", "2001", "POSIX.1-2001"], Format::Pax),
            (["gnu", "GNU", "Gnu"], Format::Gnu),
        ] {
            for name in names {
                assert_eq!(name.parse::<Format>().unwrap(), format);
            }
        }
        assert!(matches!(
            "v7".parse::<Format>(),
            Err(Error::UnknownFormat(name)) if name == "v7"
        ));
    }

    #[test]
    fn test_kind_payloads() {
        assert_eq!(EntryKind::Symlink(b"t".to_vec()).link_target(), Some(&b"t"[..]));
        assert_eq!(EntryKind::Regular.link_target(), None);
        let dev = EntryKind::BlockDevice { major: 8, minor: 1 };
        assert_eq!(dev.device(), Some((8, 1)));
        assert_eq!(dev.entry_type(), tar::EntryType::Block);
    }
}
