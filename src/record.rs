//! Newline-delimited records.

use std::io;
use std::io::prelude::*;

/// Record delimiter.
pub const DELIMITER: u8 = b'\n';

/// One line of text without its trailing delimiter. Records are compared byte by byte.
pub type Record = Vec<u8>;

/// Reads newline-delimited records from a buffered stream.
///
/// A final line without a trailing delimiter is still yielded as a record.
pub struct RecordReader<R: BufRead> {
    reader: R,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        RecordReader { reader }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = Vec::new();
        match self.reader.read_until(DELIMITER, &mut record) {
            Ok(0) => None,
            Ok(_) => {
                if record.last() == Some(&DELIMITER) {
                    record.pop();
                }
                Some(Ok(record))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// Writes a record followed by the delimiter.
pub fn write_record<W: Write>(writer: &mut W, record: &[u8]) -> io::Result<()> {
    writer.write_all(record)?;
    writer.write_all(&[DELIMITER])
}

#[cfg(test)]
mod test {
    use std::io;

    use rstest::*;

    use super::{write_record, Record, RecordReader};

    #[rstest]
    #[case(b"", vec![])]
    #[case(b"a\nb\n", vec![b"a".to_vec(), b"b".to_vec()])]
    #[case(b"a\nb", vec![b"a".to_vec(), b"b".to_vec()])]
    #[case(b"\n\nx\n", vec![vec![], vec![], b"x".to_vec()])]
    #[case(b"crlf\r\n", vec![b"crlf\r".to_vec()])]
    fn test_record_reader(#[case] input: &[u8], #[case] expected: Vec<Record>) {
        let reader = RecordReader::new(io::Cursor::new(input));
        let actual: Vec<Record> = reader.collect::<io::Result<_>>().unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_write_record() {
        let mut out = Vec::new();
        write_record(&mut out, b"first").unwrap();
        write_record(&mut out, b"").unwrap();
        assert_eq!(out, b"first\n\n");
    }
}
