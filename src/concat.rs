//! Re-emitting the entries of existing tar archives (`-A`).

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use log::{debug, warn};

use crate::{
    archive::{ArchiveWriter, TarReader},
    builder::Archiver,
    error::{Error, Result},
    header::{EntryKind, Format},
    identity::IdentityLookup,
};

impl<W: ArchiveWriter, I: IdentityLookup> Archiver<W, I> {
    /// Copies every entry of the archives in `path` (standard input for `None` or `-`).
    pub fn concatenate(&mut self, path: Option<&Path>) -> Result<()> {
        let (display, result) = match path {
            None => ("-".to_string(), self.concatenate_stream(io::stdin().lock())),
            Some(path) if path == Path::new("-") => {
                ("-".to_string(), self.concatenate_stream(io::stdin().lock()))
            }
            Some(path) => {
                let display = path.to_string_lossy().into_owned();
                let result = File::open(self.ctx.resolve(path))
                    .map_err(|err| Error::Open {
                        path: display.clone(),
                        err,
                    })
                    .and_then(|file| self.concatenate_stream(BufReader::new(file)));
                (display, result)
            }
        };
        result.map_err(|err| Error::Concatenate {
            path: display,
            err: Box::new(err),
        })
    }

    /// Copies every entry read from `input`, which may hold several archives back to back.
    ///
    /// Each entry takes on the current format, loses its ownership under `-U`, and is subject to
    /// the source filters (matched against its original name) and duplicate suppression.  Pax
    /// global headers are passed through in pax output and dropped otherwise.  Empty input is fine.
    pub fn concatenate_stream<R: Read>(&mut self, input: R) -> Result<()> {
        let mut reader = TarReader::new(input);
        for item in reader.entries()? {
            let (mut header, mut body) = item?;

            // global headers aren't files: no filters, no duplicate tracking
            let global = header.kind == EntryKind::GlobalHeader;
            if global {
                if self.ctx.format != Format::Pax {
                    warn!(
                        "{}: dropping pax global header, not representable in {} format",
                        header.display_name(),
                        self.ctx.format
                    );
                    continue;
                }
            } else if self.ctx.source_filters.rejects(&header.name) {
                debug!("{}: excluded by source filter", header.display_name());
                continue;
            } else if self.ctx.is_duplicate(&header.name) {
                debug!("{}: already written", header.display_name());
                continue;
            }

            header.format = self.ctx.format;
            if self.ctx.skip_user_info {
                header.owner = None;
            }

            debug!("{}", header.display_name());
            self.writer.write_header(&header)?;
            if !global {
                self.ctx.record(header.name.clone());
            }

            let copied = io::copy(&mut body, &mut self.writer).map_err(Error::ReadArchive)?;
            if copied != header.size {
                return Err(Error::SizeMismatch {
                    name: header.display_name().into_owned(),
                    written: copied,
                    declared: header.size,
                });
            }
            self.writer.finish_entry()?;
        }
        Ok(())
    }
}
