//! Splitting one `SRC[:DEST[:OPTS]]` token and mapping it to an archive path.

use std::{
    ffi::OsString,
    os::unix::ffi::{OsStrExt, OsStringExt},
    path::PathBuf,
};

use crate::{
    error::{Error, Result},
    util::clean_path,
};

/// The source that stands for standard input.
pub const STDIN_SOURCE: &[u8] = b"-";

/// Where standard input lands in the archive unless told otherwise.
pub const STDIN_DESTINATION: &[u8] = b"dev/stdin";

/// One user-supplied mapping: what to read, where to put it, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySpec {
    pub source: PathBuf,
    /// Empty when the token gave no destination.
    pub destination: Vec<u8>,
    /// The raw option string, when the token had a second `:`.
    pub options: Option<String>,
}

impl EntrySpec {
    /// Splits a token on its first two unescaped colons.
    ///
    /// `\:` stands for a literal colon in the source or destination; everything after the second
    /// colon is taken verbatim as the option string.
    pub fn parse(token: impl Into<OsString>) -> Result<Self> {
        let token = token.into();
        let bytes = token.as_bytes();

        let mut fields: Vec<Vec<u8>> = vec![];
        let mut current = vec![];
        let mut rest = None;
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' if bytes.get(i + 1) == Some(&b':') => {
                    current.push(b':');
                    i += 1;
                }
                b':' if fields.len() == 1 => {
                    rest = Some(&bytes[i + 1..]);
                    break;
                }
                b':' => fields.push(std::mem::take(&mut current)),
                c => current.push(c),
            }
            i += 1;
        }
        fields.push(current);

        let mut fields = fields.into_iter();
        let source = fields.next().unwrap_or_default();
        if source.is_empty() {
            return Err(Error::MissingSource(token.to_string_lossy().into_owned()));
        }
        let destination = fields.next().unwrap_or_default();

        let options = match rest {
            Some(opts) => Some(
                std::str::from_utf8(opts)
                    .map_err(|_| Error::NotUtf8 {
                        what: "options",
                        value: token.to_string_lossy().into_owned(),
                    })?
                    .to_string(),
            ),
            None => None,
        };

        Ok(EntrySpec {
            source: PathBuf::from(OsString::from_vec(source)),
            destination,
            options,
        })
    }

    pub fn source_bytes(&self) -> &[u8] {
        self.source.as_os_str().as_bytes()
    }
}

/// Computes the archive path for `source` written to `destination`.
///
/// An empty destination defaults to the source itself (or `dev/stdin` for `-`), with an absolute
/// source rebased under `.`.  The result is always cleaned and may never climb above the archive
/// root.
pub fn map_destination(source: &[u8], destination: &[u8]) -> Result<Vec<u8>> {
    let mapped = match (destination, source) {
        (b"", STDIN_SOURCE) => clean_path(STDIN_DESTINATION),
        (b"", src) if src.starts_with(b"/") => {
            let mut rebased = b".".to_vec();
            rebased.extend_from_slice(src);
            clean_path(&rebased)
        }
        (b"", src) => clean_path(src),
        (dest, _) => clean_path(dest),
    };

    if mapped == b".." || mapped.starts_with(b"../") {
        return Err(Error::DestinationEscapesRoot(
            String::from_utf8_lossy(&mapped).into_owned(),
        ));
    }
    Ok(mapped)
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn split(token: &str) -> (String, String, Option<String>) {
        let spec = EntrySpec::parse(token).unwrap();
        (
            spec.source.to_string_lossy().into_owned(),
            String::from_utf8(spec.destination).unwrap(),
            spec.options,
        )
    }

    fn mapped(spec: &EntrySpec) -> Result<Vec<u8>> {
        map_destination(spec.source_bytes(), &spec.destination)
    }

    fn archive_path(token: &str) -> String {
        String::from_utf8(mapped(&EntrySpec::parse(token).unwrap()).unwrap()).unwrap()
    }

    #[test]
    fn test_split_forms() {
        assert_eq!(split("a/b"), ("a/b".into(), "".into(), None));
        assert_eq!(split("a/b:"), ("a/b".into(), "".into(), None));
        assert_eq!(split("a/b:c"), ("a/b".into(), "c".into(), None));
        assert_eq!(split("a/b:c:"), ("a/b".into(), "c".into(), Some("".into())));
        assert_eq!(
            split("a/b::norec"),
            ("a/b".into(), "".into(), Some("norec".into()))
        );
        assert_eq!(
            split("a:b:link=x:y"),
            ("a".into(), "b".into(), Some("link=x:y".into()))
        );
    }

    #[test]
    fn test_escaped_colons() {
        assert_eq!(
            split(r"c\:d:e\:f:mode=0644"),
            ("c:d".into(), "e:f".into(), Some("mode=0644".into()))
        );
        // other backslashes are left alone
        assert_eq!(split(r"a\b:c"), (r"a\b".into(), "c".into(), None));
    }

    #[test]
    fn test_empty_source() {
        for token in ["", ":dest", "::norec"] {
            assert!(
                matches!(EntrySpec::parse(token), Err(Error::MissingSource(t)) if t == token),
                "{token:?}"
            );
        }
    }

    #[test]
    fn test_default_destination() {
        for src in ["a//b/./c/", "./x/../y", "plain"] {
            let cleaned = String::from_utf8(clean_path(src.as_bytes())).unwrap();
            assert_eq!(archive_path(src), cleaned);
            assert_eq!(archive_path(&format!("{src}:")), cleaned);
            assert_eq!(archive_path(&format!("{src}::norec")), cleaned);
        }
        assert_eq!(archive_path("/etc/passwd"), "etc/passwd");
        assert_eq!(archive_path("/"), ".");
        assert_eq!(archive_path("-"), "dev/stdin");
        assert_eq!(archive_path("-:in.txt"), "in.txt");
    }

    #[test]
    fn test_explicit_destination() {
        assert_eq!(archive_path("src:out//dir/"), "out/dir");
        // an explicit absolute destination is kept rooted
        assert_eq!(archive_path("src:/abs"), "/abs");
        assert_eq!(archive_path("src:a/../b"), "b");
    }

    #[test]
    fn test_escaping_destination() {
        for token in ["x:..", "x:../y", "x:a/../../y", "../up", "../../up::norec"] {
            let spec = EntrySpec::parse(token).unwrap();
            assert!(
                matches!(mapped(&spec), Err(Error::DestinationEscapesRoot(_))),
                "{token}"
            );
        }
        // .. at the root of an absolute path stays at the root
        assert_eq!(archive_path("/../etc"), "etc");
    }

    #[test]
    fn test_non_utf8_source() {
        let token = OsString::from_vec(b"\xffname:dest".to_vec());
        let spec = EntrySpec::parse(token).unwrap();
        assert_eq!(spec.source_bytes(), b"\xffname");
        assert_eq!(spec.destination, b"dest");
    }
}
