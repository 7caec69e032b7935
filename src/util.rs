/// Lexically cleans a slash-separated path held as bytes.
///
/// This follows the usual rules: repeated separators collapse, `.` segments are dropped, `..`
/// removes the preceding segment where there is one (and is dropped entirely at the root), and
/// any trailing separator is removed.  The empty path cleans to `.`.
pub fn clean_path(path: &[u8]) -> Vec<u8> {
    let rooted = path.first() == Some(&b'/');
    let mut segments: Vec<&[u8]> = vec![];

    for segment in path.split(|c| *c == b'/') {
        match segment {
            b"" | b"." => {}
            b".." => match segments.last() {
                Some(last) if *last != b".." => {
                    segments.pop();
                }
                _ if rooted => {}
                _ => segments.push(segment),
            },
            _ => segments.push(segment),
        }
    }

    let mut cleaned = Vec::with_capacity(path.len());
    if rooted {
        cleaned.push(b'/');
    }
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            cleaned.push(b'/');
        }
        cleaned.extend_from_slice(segment);
    }
    if cleaned.is_empty() {
        cleaned.push(b'.');
    }
    cleaned
}

/// Joins `rel` onto `base` and cleans the result.  An empty `base` yields the cleaned `rel`.
pub fn join_path(base: &[u8], rel: &[u8]) -> Vec<u8> {
    if base.is_empty() {
        return clean_path(rel);
    }
    let mut joined = base.to_vec();
    joined.push(b'/');
    joined.extend_from_slice(rel);
    clean_path(&joined)
}

/// Returns true for names that denote the archive root itself (`.`, `./`, `..`, `/`).
pub fn is_root_marker(name: &[u8]) -> bool {
    matches!(&clean_path(name)[..], b"." | b".." | b"/")
}

/// Detects process-substitution sources such as `<(cmd)`, which show up as `/proc/self/fd/N`
/// symlinks pointing at `pipe:[INODE]`.  Their content has to be read like a pipe, not archived
/// as a link.
pub fn is_proc_pipe(source: &[u8], target: &[u8]) -> bool {
    source.starts_with(b"/proc/self/fd/") && target.starts_with(b"pipe:[") && target.ends_with(b"]")
}
