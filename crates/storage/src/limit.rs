//! Upload size limiting.

use crate::error::StorageError;
use crate::traits::ByteStream;
use futures::StreamExt;

/// Cap `stream` at `limit` bytes.
///
/// The returned stream yields [`StorageError::SizeLimitExceeded`] as soon as
/// the running total passes `limit` and stops consuming the source, so an
/// oversized body is never read to the end.
pub fn limit_stream(stream: ByteStream, limit: u64) -> ByteStream {
    Box::pin(async_stream::stream! {
        let mut stream = stream;
        let mut total: u64 = 0;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    total += chunk.len() as u64;
                    if total > limit {
                        yield Err(StorageError::SizeLimitExceeded { limit });
                        break;
                    }
                    yield Ok(chunk);
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;

    fn chunks(sizes: &[usize]) -> ByteStream {
        let items: Vec<_> = sizes
            .iter()
            .map(|n| Ok(Bytes::from(vec![b'x'; *n])))
            .collect();
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn passes_streams_within_limit() {
        let mut limited = limit_stream(chunks(&[4, 4, 2]), 10);
        let mut total = 0;
        while let Some(chunk) = limited.next().await {
            total += chunk.unwrap().len();
        }
        assert_eq!(total, 10);
    }

    #[tokio::test]
    async fn fails_once_limit_is_crossed() {
        let mut limited = limit_stream(chunks(&[4, 4, 4, 4]), 10);
        assert!(limited.next().await.unwrap().is_ok());
        assert!(limited.next().await.unwrap().is_ok());
        match limited.next().await {
            Some(Err(StorageError::SizeLimitExceeded { limit })) => assert_eq!(limit, 10),
            other => panic!("expected size limit error, got {other:?}"),
        }
        assert!(limited.next().await.is_none());
    }
}
