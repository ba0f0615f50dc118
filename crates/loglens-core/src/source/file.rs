use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;

use flate2::read::GzDecoder;

use super::{LineEvent, LineSource, SourceError};

// Long URLs and user-agents are common; keep the read buffer generous.
const LINE_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Line source over a log file, with transparent gzip decompression for
/// `.gz` paths. Unrecognised suffixes are read as plain text.
pub struct LogFileSource {
    reader: BufReader<Box<dyn Read>>,
    compressed: bool,
    line: u64,
}

impl LogFileSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        let compressed = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
        let inner: Box<dyn Read> = if compressed {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(Self {
            reader: BufReader::with_capacity(LINE_BUFFER_CAPACITY, inner),
            compressed,
            line: 0,
        })
    }
}

impl LineSource for LogFileSource {
    fn next_line(&mut self) -> Result<Option<LineEvent>, SourceError> {
        let mut buf = Vec::new();
        let read = match self.reader.read_until(b'\n', &mut buf) {
            Ok(read) => read,
            Err(err) if self.compressed && is_corrupt_stream(&err) => {
                return Err(SourceError::Decompress(err.to_string()));
            }
            Err(err) => return Err(SourceError::Io(err)),
        };
        if read == 0 {
            return Ok(None);
        }
        self.line += 1;
        while buf.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
            buf.pop();
        }
        let text =
            String::from_utf8(buf).map_err(|_| SourceError::InvalidUtf8 { number: self.line })?;
        Ok(Some(LineEvent {
            number: self.line,
            text,
        }))
    }
}

fn is_corrupt_stream(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::InvalidInput | ErrorKind::InvalidData | ErrorKind::UnexpectedEof
    )
}
