use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub(crate) const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Returns `true` if `bytes` begin with the gzip magic number.
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Decompress `source` into `destination`, returning the number of bytes
/// written.
///
/// Input without the gzip magic number is copied through unchanged, so a
/// mirror serving plain JSON lines works too. Concatenated gzip members are
/// all decoded.
#[tracing::instrument(level = "debug", skip_all, fields(source = %source.display(), destination = %destination.display()))]
pub async fn decompress_file(source: &Path, destination: &Path) -> Result<u64> {
    let source: PathBuf = source.to_path_buf();
    let destination: PathBuf = destination.to_path_buf();
    tokio::task::spawn_blocking(move || decompress_blocking(&source, &destination))
        .await
        .or_raise(|| ErrorKind::Io)?
}

fn decompress_blocking(source: &Path, destination: &Path) -> Result<u64> {
    let mut input = File::open(source).or_raise(|| ErrorKind::Io)?;
    let mut magic = [0u8; 2];
    let peeked = read_up_to(&mut input, &mut magic).or_raise(|| ErrorKind::Io)?;
    input.seek(SeekFrom::Start(0)).or_raise(|| ErrorKind::Io)?;

    let mut output = BufWriter::new(File::create(destination).or_raise(|| ErrorKind::Io)?);
    let written = if is_gzip(&magic[..peeked]) {
        let mut decoder = MultiGzDecoder::new(BufReader::new(input));
        io::copy(&mut decoder, &mut output).or_raise(|| ErrorKind::Decompress)?
    } else {
        tracing::debug!("Archive is not gzip compressed, copying as-is");
        io::copy(&mut input, &mut output).or_raise(|| ErrorKind::Io)?
    };
    output.flush().or_raise(|| ErrorKind::Io)?;
    tracing::debug!(bytes = written, "Decompressed archive");
    Ok(written)
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use rstest::rstest;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[rstest]
    #[case(&[0x1F, 0x8B, 0x08, 0x00], true)]
    #[case(&[0x1F], false)]
    #[case(b"{\"repo\":{}}", false)]
    #[case(&[], false)]
    fn test_is_gzip(#[case] bytes: &[u8], #[case] expected: bool) {
        assert_eq!(is_gzip(bytes), expected);
    }

    #[tokio::test]
    async fn test_decompress_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("2015-01-01-15.json.gz");
        let destination = dir.path().join("2015-01-01-15.json");
        std::fs::write(&source, gzip(b"line one\nline two\n")).unwrap();

        let written = decompress_file(&source, &destination).await.unwrap();
        assert_eq!(written, 18);
        assert_eq!(std::fs::read(&destination).unwrap(), b"line one\nline two\n");
    }

    #[tokio::test]
    async fn test_decompress_concatenated_members() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("multi.json.gz");
        let destination = dir.path().join("multi.json");
        let mut data = gzip(b"first\n");
        data.extend(gzip(b"second\n"));
        std::fs::write(&source, data).unwrap();

        decompress_file(&source, &destination).await.unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"first\nsecond\n");
    }

    #[tokio::test]
    async fn test_plain_input_is_copied() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("plain.json.gz");
        let destination = dir.path().join("plain.json");
        std::fs::write(&source, b"not compressed\n").unwrap();

        assert_eq!(decompress_file(&source, &destination).await.unwrap(), 15);
        assert_eq!(std::fs::read(&destination).unwrap(), b"not compressed\n");
    }

    #[tokio::test]
    async fn test_truncated_gzip_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.json.gz");
        let destination = dir.path().join("broken.json");
        let data = gzip(&b"some event data\n".repeat(100));
        std::fs::write(&source, &data[..data.len() / 2]).unwrap();

        let err = decompress_file(&source, &destination).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Decompress));
    }

    #[tokio::test]
    async fn test_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = decompress_file(&dir.path().join("missing.gz"), &dir.path().join("out")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Io));
    }
}
