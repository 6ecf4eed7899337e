//! A single-pass writer that tees bytes to disk while feeding an MD5 and
//! (optionally) a SHA-256 hasher, per spec §9 "Streaming hashing": "a single
//! pass over the tar entry's byte stream feeds disk + MD5 + SHA-256."

use std::io::{self, Write};

use sha2::{Digest, Sha256};

pub struct TeeHashWriter<W: Write> {
    inner: W,
    md5: md5::Context,
    sha256: Option<Sha256>,
    written: u64,
}

impl<W: Write> TeeHashWriter<W> {
    pub fn new(inner: W, hash_sha256: bool) -> Self {
        TeeHashWriter {
            inner,
            md5: md5::Context::new(),
            sha256: hash_sha256.then(Sha256::new),
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Consumes the writer, returning the lower-case hex MD5 and, if
    /// SHA-256 hashing was enabled, the lower-case hex SHA-256.
    pub fn finish(self) -> (String, Option<String>) {
        let md5_hex = hex::encode(self.md5.compute().0);
        let sha256_hex = self.sha256.map(|h| hex::encode(h.finalize()));
        (md5_hex, sha256_hex)
    }
}

impl<W: Write> Write for TeeHashWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.md5.consume(&buf[..n]);
        if let Some(sha256) = &mut self.sha256 {
            sha256.update(&buf[..n]);
        }
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_pass_matches_independent_rehash() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut sink = Vec::new();
        {
            let mut tee = TeeHashWriter::new(&mut sink, true);
            tee.write_all(data).unwrap();
            let (md5_hex, sha256_hex) = tee.finish();

            let expected_md5 = hex::encode(md5::compute(data).0);
            let mut hasher = Sha256::new();
            hasher.update(data);
            let expected_sha256 = hex::encode(hasher.finalize());

            assert_eq!(md5_hex, expected_md5);
            assert_eq!(sha256_hex, Some(expected_sha256));
        }
        assert_eq!(sink, data);
    }

    #[test]
    fn sha256_skipped_when_disabled() {
        let mut sink = Vec::new();
        let mut tee = TeeHashWriter::new(&mut sink, false);
        tee.write_all(b"partner mode").unwrap();
        let (_, sha256_hex) = tee.finish();
        assert!(sha256_hex.is_none());
    }
}
