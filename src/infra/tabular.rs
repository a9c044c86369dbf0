use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use blake3::Hasher;

/// Lazily reads lines of a comma-delimited file. Reopen the file to restart.
pub fn read_lines(path: &Path) -> io::Result<Lines<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(Lines::new(BufReader::new(file)))
}

/// Lines with their original terminator kept. Bytes that are not valid UTF-8
/// are replaced rather than failing the read, so only real I/O errors surface.
pub struct Lines<R> {
    reader: R,
    buf: Vec<u8>,
    line_number: usize,
}

impl<R: BufRead> Lines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_number: 0,
        }
    }
}

impl<R: BufRead> Iterator for Lines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                self.line_number += 1;
                let line = match String::from_utf8_lossy(&self.buf) {
                    Cow::Borrowed(line) => line.to_string(),
                    Cow::Owned(line) => {
                        tracing::warn!(line = self.line_number, "input line is not valid UTF-8; invalid bytes replaced");
                        line
                    }
                };
                Some(Ok(line))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// Strips a trailing `\n` or `\r\n`.
pub fn trim_terminator(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// Opens the named output file, or stdout when none is given.
pub fn open_output(path: Option<&Path>) -> io::Result<Box<dyn Write>> {
    match path {
        Some(path) => Ok(Box::new(BufWriter::new(File::create(path)?))),
        None => Ok(Box::new(io::stdout().lock())),
    }
}

/// Writes one row per line and keeps a digest of what was written, so two
/// runs can be compared without diffing the files.
pub struct RowWriter<W: Write> {
    inner: W,
    digest: Hasher,
}

impl<W: Write> RowWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            digest: Hasher::new(),
        }
    }

    /// Writes `line` followed by `\n` as a single write.
    pub fn write_row(&mut self, line: &str) -> io::Result<()> {
        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');
        self.write_verbatim(&record)
    }

    /// Writes `record` exactly as given, terminator included.
    pub fn write_verbatim(&mut self, record: &str) -> io::Result<()> {
        self.inner.write_all(record.as_bytes())?;
        self.digest.update(record.as_bytes());
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn digest(&self) -> String {
        self.digest.finalize().to_hex().to_string()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_rows_and_digests_them() {
        let mut first = RowWriter::new(Vec::new());
        first.write_row("a,b").unwrap();
        first.write_row("c,d,e").unwrap();

        let mut second = RowWriter::new(Vec::new());
        second.write_row("a,b").unwrap();
        second.write_row("c,d,e").unwrap();

        assert_eq!(first.digest(), second.digest());
        assert_eq!(first.into_inner(), b"a,b\nc,d,e\n".to_vec());
    }

    #[test]
    fn reads_lines_with_terminators() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.csv");
        std::fs::write(&path, "Open Issues\r\nlink,PROJA-1,summary,bucket\nlast").unwrap();

        let lines = read_lines(&path)
            .unwrap()
            .collect::<io::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(
            lines,
            vec!["Open Issues\r\n", "link,PROJA-1,summary,bucket\n", "last"]
        );
        assert_eq!(trim_terminator(&lines[0]), "Open Issues");
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let input: &[u8] = b"Open Issues\nlink,PROJZ-1,caf\xe9,bucket\nlink,PROJZ-2,ok,bucket\n";
        let lines = Lines::new(input)
            .collect::<io::Result<Vec<_>>>()
            .unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "link,PROJZ-1,caf\u{FFFD},bucket\n");
        assert_eq!(lines[2], "link,PROJZ-2,ok,bucket\n");
    }

    struct SecondWriteFails {
        calls: usize,
        written: Vec<u8>,
    }

    impl Write for SecondWriteFails {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.calls += 1;
            if self.calls == 2 {
                return Err(io::Error::other("disk full"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_row_leaves_no_partial_record() {
        let mut writer = RowWriter::new(SecondWriteFails {
            calls: 0,
            written: Vec::new(),
        });

        writer.write_row("header one").unwrap();
        assert!(writer.write_row("header two").is_err());
        writer.write_row("header three").unwrap();

        assert_eq!(
            String::from_utf8(writer.into_inner().written).unwrap(),
            "header one\nheader three\n"
        );
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_lines(&dir.path().join("absent.csv")).is_err());
    }
}
