//! Error types for building archives.
//!
//! Every variant is fatal to a run.  Conditions that only deserve a warning
//! (unsupported file kinds, ownership that cannot be looked up automatically)
//! never reach this type; they are logged and the affected entry is skipped or
//! written without ownership instead.
//!
//! # Error Categories
//!
//! - **Input grammar**: [`MissingSource`], [`Options`], [`MissingArgument`],
//!   [`UnknownFormat`], [`InvalidRegex`], [`DestinationEscapesRoot`], [`NotUtf8`]
//! - **Filesystem**: [`Stat`], [`ReadLink`], [`Open`], [`Read`], [`ReadDir`],
//!   [`ChangeDirectory`]
//! - **Archive output**: [`Write`], [`SizeMismatch`], [`ShortBody`],
//!   [`Unencodable`], [`Close`]
//! - **Concatenation**: [`ReadArchive`], [`UnsupportedEntry`], [`Concatenate`]
//!
//! [`MissingSource`]: Error::MissingSource
//! [`Options`]: Error::Options
//! [`MissingArgument`]: Error::MissingArgument
//! [`UnknownFormat`]: Error::UnknownFormat
//! [`InvalidRegex`]: Error::InvalidRegex
//! [`DestinationEscapesRoot`]: Error::DestinationEscapesRoot
//! [`NotUtf8`]: Error::NotUtf8
//! [`Stat`]: Error::Stat
//! [`ReadLink`]: Error::ReadLink
//! [`Open`]: Error::Open
//! [`Read`]: Error::Read
//! [`ReadDir`]: Error::ReadDir
//! [`ChangeDirectory`]: Error::ChangeDirectory
//! [`Write`]: Error::Write
//! [`SizeMismatch`]: Error::SizeMismatch
//! [`ShortBody`]: Error::ShortBody
//! [`Unencodable`]: Error::Unencodable
//! [`Close`]: Error::Close
//! [`ReadArchive`]: Error::ReadArchive
//! [`UnsupportedEntry`]: Error::UnsupportedEntry
//! [`Concatenate`]: Error::Concatenate

use std::{io, path::PathBuf};

use crate::header::Format;

/// Result type alias for operations that may return an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing the option string of a single entry.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OptionError {
    #[error("unexpected option: {0:?}")]
    UnknownOption(String),

    #[error("may not set dir with link={0}")]
    DirWithLink(String),

    #[error("may not set link with dir")]
    LinkWithDir,

    #[error("link already assigned to file")]
    LinkAlreadySet,

    #[error("may not set an empty link name")]
    EmptyLink,

    /// An explicit `uid=` or `owner=` did not resolve to a known user.
    #[error("unable to look up user by {key} {value:?}")]
    UserNotFound { key: &'static str, value: String },

    /// An explicit `gid=` or `group=` did not resolve to a known group.
    #[error("unable to look up group by {key} {value:?}")]
    GroupNotFound { key: &'static str, value: String },

    #[error("unable to look up primary group {gid} for uid {uid}")]
    PrimaryGroupNotFound { uid: u32, gid: u32 },

    #[error("invalid mode: {0:?}")]
    InvalidMode(String),

    #[error("invalid mode: may not be 0")]
    ZeroMode,

    #[error("invalid {field}: {value:?}")]
    InvalidTime { field: &'static str, value: String },
}

/// Error types for archive building operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A token started with `:`, so it names no source.
    #[error("no source: {0:?}")]
    MissingSource(String),

    #[error("cannot parse options for {src}")]
    Options {
        src: String,
        #[source]
        err: OptionError,
    },

    /// A flag that takes a value was the last token.
    #[error("{flag}: missing {what}")]
    MissingArgument { flag: String, what: &'static str },

    #[error("-F: unrecognized format {0:?}")]
    UnknownFormat(String),

    #[error("invalid regular expression {pattern:?}")]
    InvalidRegex {
        pattern: String,
        #[source]
        err: Box<regex_automata::meta::BuildError>,
    },

    #[error("destination may not contain .. ({0})")]
    DestinationEscapesRoot(String),

    #[error("{what} is not valid UTF-8: {value}")]
    NotUtf8 { what: &'static str, value: String },

    #[error("stat error: {path}")]
    Stat {
        path: String,
        #[source]
        err: io::Error,
    },

    #[error("cannot resolve symlink: {path}")]
    ReadLink {
        path: String,
        #[source]
        err: io::Error,
    },

    #[error("open error: {path}")]
    Open {
        path: String,
        #[source]
        err: io::Error,
    },

    #[error("read error: {path}")]
    Read {
        path: String,
        #[source]
        err: io::Error,
    },

    #[error("cannot read directory: {}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    #[error("cd: {}", path.display())]
    ChangeDirectory {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    #[error("write error: {name}")]
    Write {
        name: String,
        #[source]
        err: io::Error,
    },

    /// The content read for an entry disagrees with the size its header declared.
    #[error("copy error: size mismatch for {name}: wrote {written}, want {declared}")]
    SizeMismatch {
        name: String,
        written: u64,
        declared: u64,
    },

    #[error("missed writing {missing} bytes of {name}")]
    ShortBody { name: String, missing: u64 },

    #[error("{format} format cannot encode {field} of {name}")]
    Unencodable {
        name: String,
        field: &'static str,
        format: Format,
    },

    #[error("error writing output")]
    Close(#[source] io::Error),

    #[error("error reading tar header")]
    ReadArchive(#[source] io::Error),

    #[error("unsupported entry type {kind:?} for {name}")]
    UnsupportedEntry { name: String, kind: char },

    #[error("-A: error concatenating tar stream from {path}")]
    Concatenate {
        path: String,
        #[source]
        err: Box<Error>,
    },
}
