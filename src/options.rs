//! Per-entry option strings, e.g. the `norec,mode=0644,owner=root` of `src:dest:norec,mode=...`.
//!
//! Fields are separated by commas and may be preceded by whitespace.  Whitespace around the `=` of
//! a valued field is significant, and a field cannot contain a comma.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{
    error::OptionError,
    identity::{Group, IdentityLookup, User},
};

/// The entry kind an option string forces, regardless of what is on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForcedKind {
    Directory,
    /// `link=TARGET`
    Symlink(String),
    /// `ref=TARGET`
    Hardlink(String),
}

/// Overrides applied on top of the on-disk metadata of one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryOptions {
    /// Don't descend into a directory source.
    pub no_recursive: bool,
    pub kind: Option<ForcedKind>,
    /// Write no ownership at all.
    pub no_user: bool,
    pub user: Option<User>,
    pub group: Option<Group>,
    /// Never `Some(0)`: zero can't be told apart from an unset mode.
    pub mode: Option<u32>,
    pub mtime: Option<DateTime<Utc>>,
    pub atime: Option<DateTime<Utc>>,
    pub ctime: Option<DateTime<Utc>>,
}

impl EntryOptions {
    /// The options an entry gets when its token carries none.  `no_user` mirrors the global
    /// "don't collect ownership" switch.
    pub fn new(no_user: bool) -> Self {
        EntryOptions {
            no_user,
            ..Default::default()
        }
    }

    /// Parses an option string.
    ///
    /// `now` is what `mtime=now` and friends resolve to; explicit identities are looked up in
    /// `ids` right away, so an unknown user or group fails here rather than when the entry is
    /// written.
    pub fn parse(
        opts: &str,
        no_user: bool,
        now: DateTime<Utc>,
        ids: &impl IdentityLookup,
    ) -> Result<Self, OptionError> {
        let mut parsed = Self::new(no_user);

        for field in opts.split(',').map(str::trim_start) {
            if field.is_empty() {
                continue;
            }
            let (key, value) = match field.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (field, None),
            };

            match (key, value) {
                ("norec", None) => parsed.no_recursive = true,
                ("dir", None) => {
                    if let Some(ForcedKind::Symlink(target) | ForcedKind::Hardlink(target)) =
                        &parsed.kind
                    {
                        return Err(OptionError::DirWithLink(target.clone()));
                    }
                    parsed.kind = Some(ForcedKind::Directory);
                    parsed.no_recursive = true;
                }
                ("link" | "ref", Some(target)) => {
                    match parsed.kind {
                        Some(ForcedKind::Directory) => return Err(OptionError::LinkWithDir),
                        Some(_) => return Err(OptionError::LinkAlreadySet),
                        None => {}
                    }
                    if target.is_empty() {
                        return Err(OptionError::EmptyLink);
                    }
                    parsed.kind = Some(match key {
                        "link" => ForcedKind::Symlink(target.to_string()),
                        _ => ForcedKind::Hardlink(target.to_string()),
                    });
                }
                ("nouser", None) => parsed.no_user = true,
                ("uid", Some(uid)) => {
                    parsed.no_user = false;
                    let user = uid.parse().ok().and_then(|uid| ids.user_by_id(uid));
                    parsed.user = Some(user.ok_or_else(|| OptionError::UserNotFound {
                        key: "id",
                        value: uid.to_string(),
                    })?);
                }
                ("owner", Some(name)) => {
                    parsed.no_user = false;
                    parsed.user = Some(ids.user_by_name(name).ok_or_else(|| {
                        OptionError::UserNotFound {
                            key: "name",
                            value: name.to_string(),
                        }
                    })?);
                }
                ("gid", Some(gid)) => {
                    parsed.no_user = false;
                    let group = gid.parse().ok().and_then(|gid| ids.group_by_id(gid));
                    parsed.group = Some(group.ok_or_else(|| OptionError::GroupNotFound {
                        key: "id",
                        value: gid.to_string(),
                    })?);
                }
                ("group", Some(name)) => {
                    parsed.no_user = false;
                    parsed.group = Some(ids.group_by_name(name).ok_or_else(|| {
                        OptionError::GroupNotFound {
                            key: "name",
                            value: name.to_string(),
                        }
                    })?);
                }
                ("mode", Some(mode)) => parsed.mode = Some(parse_mode(mode)?),
                ("mtime", Some(ts)) => parsed.mtime = Some(parse_time("mtime", ts, now)?),
                ("atime", Some(ts)) => parsed.atime = Some(parse_time("atime", ts, now)?),
                ("ctime", Some(ts)) => parsed.ctime = Some(parse_time("ctime", ts, now)?),
                _ => return Err(OptionError::UnknownOption(field.to_string())),
            }
        }

        if parsed.group.is_none() {
            if let Some(user) = &parsed.user {
                let group = ids.group_by_id(user.primary_gid).ok_or(
                    OptionError::PrimaryGroupNotFound {
                        uid: user.uid,
                        gid: user.primary_gid,
                    },
                )?;
                parsed.group = Some(group);
            }
        }

        Ok(parsed)
    }

    pub fn allow_recursive(&self) -> bool {
        !self.no_recursive
    }
}

/// Writes the canonical option string, which parses back to the same options.
impl fmt::Display for EntryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields = vec![];

        match &self.kind {
            Some(ForcedKind::Directory) => fields.push("dir".to_string()),
            Some(ForcedKind::Symlink(target)) => fields.push(format!("link={target}")),
            Some(ForcedKind::Hardlink(target)) => fields.push(format!("ref={target}")),
            None => {}
        }
        if self.no_recursive && self.kind != Some(ForcedKind::Directory) {
            fields.push("norec".to_string());
        }
        if let Some(user) = &self.user {
            fields.push(format!("uid={}", user.uid));
        }
        if let Some(group) = &self.group {
            fields.push(format!("gid={}", group.gid));
        }
        // after uid/gid, which would clear it again
        if self.no_user {
            fields.push("nouser".to_string());
        }
        if let Some(mode) = self.mode {
            fields.push(format!("mode=0{mode:o}"));
        }
        for (name, ts) in [("mtime", self.mtime), ("atime", self.atime), ("ctime", self.ctime)] {
            if let Some(ts) = ts {
                fields.push(format!(
                    "{name}={}",
                    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
                ));
            }
        }

        f.write_str(&fields.join(","))
    }
}

/// Parses a mode literal: `0x` hex, `0o` or leading-`0` octal, `0b` binary, decimal otherwise.
fn parse_mode(value: &str) -> Result<u32, OptionError> {
    let (digits, radix) = if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        (hex, 16)
    } else if let Some(oct) = value
        .strip_prefix("0o")
        .or_else(|| value.strip_prefix("0O"))
    {
        (oct, 8)
    } else if let Some(bin) = value
        .strip_prefix("0b")
        .or_else(|| value.strip_prefix("0B"))
    {
        (bin, 2)
    } else if value.len() > 1 && value.starts_with('0') {
        (&value[1..], 8)
    } else {
        (value, 10)
    };

    if !digits.bytes().all(|c| c.is_ascii_alphanumeric()) {
        return Err(OptionError::InvalidMode(value.to_string()));
    }
    match u32::from_str_radix(digits, radix) {
        Ok(0) => Err(OptionError::ZeroMode),
        Ok(mode) => Ok(mode),
        Err(_) => Err(OptionError::InvalidMode(value.to_string())),
    }
}

/// Parses a timestamp: `now`, RFC 3339 (with optional fractional seconds), or an integer count
/// since the Unix epoch whose digit count picks the unit: 15 or more digits are microseconds,
/// 12 or more milliseconds, anything shorter seconds.
fn parse_time(
    field: &'static str,
    value: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, OptionError> {
    if value == "now" {
        return Ok(now);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    let invalid = || OptionError::InvalidTime {
        field,
        value: value.to_string(),
    };
    let n: i64 = value.parse().map_err(|_| invalid())?;
    let per_second = match value.len() {
        15.. => 1_000_000,
        12.. => 1_000,
        _ => 1,
    };
    let nanos = n.rem_euclid(per_second) * (1_000_000_000 / per_second);
    DateTime::from_timestamp(n.div_euclid(per_second), nanos as u32).ok_or_else(invalid)
}
