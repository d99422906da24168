//! Content digests for stored objects.
//!
//! A [`Checksum`] consumes an async byte stream to the end and yields a
//! fixed-length hex string. The result depends only on the bytes, never on
//! how the stream happened to be chunked.

use sha2::{Digest, Sha256};
use std::{future::Future, io};
use tokio::io::{AsyncRead, AsyncReadExt};

const BUF_SIZE: usize = 64 * 1024;

/// Digest computation over an async reader.
///
/// Implementations hold no per-stream state, so one value can be cloned into
/// as many concurrent tasks as needed.
pub trait Checksum: Clone + Send + Sync + 'static {
    /// Read `reader` to EOF and return the hex-encoded digest.
    fn generate<R>(&self, reader: R) -> impl Future<Output = io::Result<String>> + Send
    where
        R: AsyncRead + Unpin + Send;

    /// Digest `reader` and compare it to `expected` (exact, case-sensitive).
    ///
    /// A mismatch is not an error: the boolean carries it, and the computed
    /// digest is returned either way so callers can report both values.
    fn verify<R>(
        &self,
        reader: R,
        expected: &str,
    ) -> impl Future<Output = io::Result<(bool, String)>> + Send
    where
        R: AsyncRead + Unpin + Send,
    {
        async move {
            let actual = self.generate(reader).await?;
            Ok((actual == expected, actual))
        }
    }
}

/// SHA-256, lowercase hex (64 characters).
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Checksum;

impl Sha256Checksum {
    pub fn new() -> Self {
        Self
    }
}

impl Checksum for Sha256Checksum {
    async fn generate<R>(&self, mut reader: R) -> io::Result<String>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; BUF_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        pin::Pin,
        task::{Context, Poll},
    };
    use tokio::io::ReadBuf;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const HELLO_WORLD_SHA256: &str =
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    /// Hands out at most `step` bytes per read.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl AsyncRead for Trickle {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let end = (self.pos + self.step)
                .min(self.data.len())
                .min(self.pos + buf.remaining());
            let start = self.pos;
            buf.put_slice(&self.data[start..end]);
            self.pos = end;
            Poll::Ready(Ok(()))
        }
    }

    struct Broken;

    impl AsyncRead for Broken {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "torn down")))
        }
    }

    #[tokio::test]
    async fn generate_known_vectors() {
        let checksum = Sha256Checksum::new();
        assert_eq!(checksum.generate(&b""[..]).await.unwrap(), EMPTY_SHA256);
        assert_eq!(
            checksum.generate(&b"hello world"[..]).await.unwrap(),
            HELLO_WORLD_SHA256
        );
    }

    #[tokio::test]
    async fn generate_ignores_chunking() {
        let checksum = Sha256Checksum::new();
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

        let whole = checksum.generate(&data[..]).await.unwrap();
        for step in [1, 7, 4096, 100_003] {
            let trickled = checksum
                .generate(Trickle {
                    data: data.clone(),
                    pos: 0,
                    step,
                })
                .await
                .unwrap();
            assert_eq!(whole, trickled, "step {step}");
        }
    }

    #[tokio::test]
    async fn generate_differs_for_different_content() {
        let checksum = Sha256Checksum::new();
        let a = checksum.generate(&b"payload-a"[..]).await.unwrap();
        let b = checksum.generate(&b"payload-b"[..]).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn generate_propagates_read_errors() {
        let err = Sha256Checksum::new().generate(Broken).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn verify_reports_actual_digest_on_match_and_mismatch() {
        let checksum = Sha256Checksum::new();

        let (ok, actual) = checksum
            .verify(&b"hello world"[..], HELLO_WORLD_SHA256)
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(actual, HELLO_WORLD_SHA256);

        let (ok, actual) = checksum
            .verify(&b"hello world"[..], "not-a-digest")
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(actual, HELLO_WORLD_SHA256);
    }

    #[tokio::test]
    async fn verify_is_case_sensitive() {
        let (ok, _) = Sha256Checksum::new()
            .verify(&b"hello world"[..], &HELLO_WORLD_SHA256.to_uppercase())
            .await
            .unwrap();
        assert!(!ok);
    }
}
