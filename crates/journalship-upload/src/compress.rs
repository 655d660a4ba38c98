use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::{Result, UploadError};

/// Join lines with `\n` and gzip the result
pub fn compress_lines<S: AsRef<str>>(lines: &[S]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            encoder.write_all(b"\n").map_err(UploadError::Compression)?;
        }
        encoder
            .write_all(line.as_ref().as_bytes())
            .map_err(UploadError::Compression)?;
    }
    encoder.finish().map_err(UploadError::Compression)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn decompress(data: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(data).read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_lines_are_newline_joined() {
        let data = compress_lines(&["first", "second", "third"]).unwrap();
        assert_eq!(decompress(&data), "first\nsecond\nthird");
    }

    #[test]
    fn test_no_trailing_separator() {
        let data = compress_lines(&["only"]).unwrap();
        assert_eq!(decompress(&data), "only");
    }

    #[test]
    fn test_empty_batch() {
        let data = compress_lines::<&str>(&[]).unwrap();
        assert_eq!(decompress(&data), "");
    }
}
