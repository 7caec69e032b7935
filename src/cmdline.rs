//! The command-line token stream.
//!
//! Arguments are processed strictly left to right.  Flags change the state of the run for every
//! token after them; anything that isn't a flag is an entry spec and is added right away.

use std::{
    ffi::{OsStr, OsString},
    os::unix::ffi::OsStrExt,
    path::Path,
};

use crate::{
    archive::ArchiveWriter,
    builder::Archiver,
    error::{Error, Result},
    header::Format,
    identity::IdentityLookup,
    mapping::EntrySpec,
    matcher::PathMatcher,
};

pub const USAGE: &str = "\
Usage: mtar [-h|--help] [FILE|OPTION]...

Writes a tar file to standard output.

FILE may be a filepath for a file, symlink, or directory. If FILE
contains a ':', the text after the colon is the path to write to the tar
file. For example, the following paths behave differently:

  SRC
      Add file SRC to the tar file as-is.
  SRC:
      Add file SRC to the tar file as-is.
  SRC:DEST
      Add file SRC as DEST to the tar file.

A literal ':' in SRC or DEST is written as '\\:'.

To read a file from standard input, you can set '-' as the SRC. If no
DEST is given for this, it will default to dev/stdin (relative). File
permissions and ownership are taken from standard input itself, so
overriding them may be necessary. If the link or dir option is set, -
can be used to synthesize an entry.

In the case of SRC: and SRC:DEST, you can also pass an additional :OPTS
with either (i.e., SRC::OPTS or SRC:DEST:OPTS), where OPTS is a
comma-separated list of options. The following options are available
(all option names are case-sensitive):

  norec
    For directory entries, do not recursively add files from the
    directory. Only the directory itself appears as an entry.
  dir
    Force file to become a dir entry. Implies norec.
  link=LINK
    Force file to become a symlink pointing to LINK.
  ref=LINK
    Force file to become a hard link pointing to LINK.
  nouser
    Strip user information from the file.
  uid=UID | owner=USERNAME
    Set the owner of the file entry by id or by name.
  gid=GID | group=GROUPNAME
    Set the group of the file entry by id or by name. Defaults to the
    owner's primary group when only an owner is given.
  mode=MODE
    Set the file mode to MODE (may be hex, octal, or an integer -- octal
    must begin with a 0, hex with 0x).
  mtime=TIME | atime=TIME | ctime=TIME
    Sets the mod time, access time, or changed time to TIME. May be
    'now', an RFC3339 timestamp, or an integer timestamp (since the Unix
    epoch) in seconds, milliseconds (>=12 digits), or microseconds (>=15
    digits).

Any whitespace preceding an option is trimmed. Whitespace is not trimmed
before or after the '=' symbol for options that take values. Commas are
not permitted inside options.

In addition, options may be passed in the middle of file arguments to
control archive creation:

  -h | --help
    When passed as the first argument, print this usage text.
  --version
    When passed as the first argument, print the version.
  -D
    Prevent duplicate entries with the same name. (default)
  -d
    Allow duplicate entries with the same name.
  -U
    Do not assign user information to files.
  -u
    Assign user information to files. (default)
  -Fformat | -F format
    Set the tar header format to use. May be one of the following
    formats:
      * 'pax', '2001', 'posix.1-2001' (default)
        Modern POSIX tar format.
      * 'ustar', '1988', 'posix.1-1988'
        The tar format written by most tar programs by default.
        Does not support files over 8GiB.
      * 'gnu'
        A format specific to GNU tar archives.
  -Cdir | -C dir
    Change to directory (relative to the starting directory at all
    times; -C. will reset the current directory) for subsequent file
    additions.
  -OREGEX | -O REGEX
    Add a filter to reject output paths, after mapping, that match the
    REGEX.
  -oREGEX | -o REGEX
    Select only output paths, after mapping, that match the REGEX.
  -IREGEX | -I REGEX
    Add a filter to reject input paths (as passed) that match the REGEX.
  -iREGEX | -i REGEX
    Add a filter to select only input paths that match the REGEX.
  -Ri, -Ro, -R
    Reset input, output, or all filters, respectively.
  -A [FILE] | -AFILE
    Read one or more tar streams from FILE (standard input if FILE is
    missing or '-') and concatenate them to the output.

Set RUST_LOG=debug to see each entry as it is written.
";

/// Whether the arguments ask for (or need) the usage text instead of an archive.
pub fn wants_usage(args: &[OsString]) -> bool {
    match args.first() {
        None => true,
        Some(first) => first == "-h" || first == "--help",
    }
}

fn utf8<'a>(flag: &str, value: &'a OsStr) -> Result<&'a str> {
    value.to_str().ok_or_else(|| Error::NotUtf8 {
        what: "argument",
        value: format!("{flag} {}", value.to_string_lossy()),
    })
}

/// Processes every token in `args`, writing entries through `archiver`.
pub fn process<W, I>(
    archiver: &mut Archiver<W, I>,
    args: impl IntoIterator<Item = OsString>,
) -> Result<()>
where
    W: ArchiveWriter,
    I: IdentityLookup,
{
    let mut args = args.into_iter().peekable();
    if args.peek().is_some_and(|first| first == "--") {
        args.next();
    }

    while let Some(arg) = args.next() {
        let bytes = arg.as_bytes();
        let (flag, packed) = match bytes {
            [b'-', c, rest @ ..] => ([b'-', *c], OsStr::from_bytes(rest)),
            _ => {
                archiver.add(&EntrySpec::parse(arg)?)?;
                continue;
            }
        };

        // the value of a flag that takes one, packed (-Fgnu) or as the next argument (-F gnu)
        let mut value = |what: &'static str| -> Result<OsString> {
            if !packed.is_empty() {
                return Ok(packed.to_os_string());
            }
            args.next().ok_or_else(|| Error::MissingArgument {
                flag: String::from_utf8_lossy(&flag).into_owned(),
                what,
            })
        };

        match &flag {
            b"-A" => {
                let path = if packed.is_empty() {
                    args.next()
                } else {
                    Some(packed.to_os_string())
                };
                archiver.concatenate(path.as_deref().map(Path::new))?;
            }
            b"-F" => {
                let name = value("format (ustar, pax, gnu)")?;
                let format: Format = utf8("-F", &name)?.parse()?;
                archiver.context_mut().set_format(format);
            }
            b"-R" => {
                let ctx = archiver.context_mut();
                match packed.as_bytes() {
                    b"" => {
                        ctx.source_filters.clear();
                        ctx.destination_filters.clear();
                    }
                    b"i" => ctx.source_filters.clear(),
                    b"o" => ctx.destination_filters.clear(),
                    _ => archiver.add(&EntrySpec::parse(arg.clone())?)?,
                }
            }
            b"-i" | b"-I" | b"-o" | b"-O" => {
                let flag_name = String::from_utf8_lossy(&flag).into_owned();
                let pattern = value("regexp")?;
                let pattern = utf8(&flag_name, &pattern)?;
                let matcher = match flag[1] {
                    b'i' | b'o' => PathMatcher::include(pattern)?,
                    _ => PathMatcher::exclude(pattern)?,
                };
                let ctx = archiver.context_mut();
                match flag[1] {
                    b'i' | b'I' => ctx.source_filters.push(matcher),
                    _ => ctx.destination_filters.push(matcher),
                }
            }
            b"-D" | b"-d" if packed.is_empty() => {
                archiver.context_mut().skip_duplicates = flag[1] == b'D';
            }
            b"-U" | b"-u" if packed.is_empty() => {
                archiver.context_mut().skip_user_info = flag[1] == b'U';
            }
            b"-C" => {
                let dir = value("directory")?;
                archiver.context_mut().change_directory(Path::new(&dir))?;
            }
            _ => archiver.add(&EntrySpec::parse(arg.clone())?)?,
        }
    }
    Ok(())
}
