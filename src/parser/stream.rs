/// Document <-> line sequence conversion
///
/// A document is handled as an ordered sequence of physical lines, each
/// keeping its own line ending so untouched lines round-trip byte for byte.
use std::io::{BufRead, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{ProcessError, Result};

/// Line ending used for lines the rewriter creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }

    /// Ending of the first terminated line, `Lf` when there is none
    #[must_use]
    pub fn detect<S: AsRef<str>>(lines: &[S]) -> Self {
        lines
            .iter()
            .map(AsRef::as_ref)
            .find(|line| line.ends_with('\n'))
            .map_or(LineEnding::Lf, |line| {
                if line.ends_with("\r\n") {
                    LineEnding::CrLf
                } else {
                    LineEnding::Lf
                }
            })
    }
}

/// Split text into lines, each keeping its terminator
#[must_use]
pub fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}

/// Split off a line's terminator: `("G1 X1", "\r\n")`
#[must_use]
pub fn strip_line_ending(line: &str) -> (&str, &str) {
    let body = line
        .strip_suffix('\n')
        .map_or(line, |l| l.strip_suffix('\r').unwrap_or(l));
    line.split_at(body.len())
}

/// Read a whole document, replacing invalid UTF-8 with U+FFFD
pub fn read_document<R: BufRead>(mut input: R) -> Result<String> {
    let mut buffer = Vec::new();
    input.read_to_end(&mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Write lines back out verbatim
pub fn write_lines<W: Write, S: AsRef<str>>(output: &mut W, lines: &[S]) -> Result<()> {
    for line in lines {
        output.write_all(line.as_ref().as_bytes())?;
    }
    output.flush()?;
    Ok(())
}

/// Replace the file at `path` with `contents` atomically.
///
/// The data goes to a temporary file in the same directory, which is then
/// renamed over the target, so an interrupted write never leaves a partial
/// document. The original file's permissions are kept.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let write_error = |source| ProcessError::Write {
        path: path.to_path_buf(),
        source,
    };
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    // Same directory, so the rename stays on one filesystem
    let mut temp = NamedTempFile::new_in(parent).map_err(write_error)?;
    temp.write_all(contents).map_err(write_error)?;
    temp.flush().map_err(write_error)?;
    if let Ok(metadata) = std::fs::metadata(path) {
        temp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(write_error)?;
    }

    temp.persist(path).map_err(|e| write_error(e.error))?;
    Ok(())
}
