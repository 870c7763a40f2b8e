use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use gharvest_storage::Queue;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Result of [`split_into`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitReport {
    pub shards: Vec<String>,
    pub lines: usize,
}

/// Shard name for the `index`-th batch under `prefix`.
pub fn shard_name(prefix: &str, index: usize) -> String {
    format!("{prefix}__{index:05}")
}

/// Split line-delimited input into shards of at most `lines_per_batch` lines,
/// enqueueing each one as `{prefix}__NNNNN`.
///
/// Every shard holds complete lines, each terminated by `\n`. Lines are split
/// as raw bytes and never decoded here. Empty input produces no shards.
#[tracing::instrument(level = "debug", skip(queue, reader), fields(queue = queue.name()))]
pub async fn split_into<R>(queue: &Queue, mut reader: R, lines_per_batch: usize, prefix: &str) -> Result<SplitReport>
where
    R: AsyncBufRead + Unpin,
{
    if lines_per_batch == 0 {
        exn::bail!(ErrorKind::InvalidArgument("lines_per_batch must be positive"));
    }
    let mut report = SplitReport::default();
    let mut buffer = Vec::new();
    let mut buffered = 0;
    loop {
        let read = reader.read_until(b'\n', &mut buffer).await.or_raise(|| ErrorKind::Io)?;
        if read == 0 {
            break;
        }
        if buffer.last() != Some(&b'\n') {
            buffer.push(b'\n');
        }
        buffered += 1;
        report.lines += 1;
        if buffered == lines_per_batch {
            flush(queue, prefix, &mut buffer, &mut report).await?;
            buffered = 0;
        }
    }
    if buffered > 0 {
        flush(queue, prefix, &mut buffer, &mut report).await?;
    }
    tracing::debug!(shards = report.shards.len(), lines = report.lines, "Split archive into shards");
    Ok(report)
}

async fn flush(queue: &Queue, prefix: &str, buffer: &mut Vec<u8>, report: &mut SplitReport) -> Result<()> {
    let name = shard_name(prefix, report.shards.len());
    queue.enqueue_named(&name, buffer.as_slice()).await.or_raise(|| ErrorKind::Queue)?;
    buffer.clear();
    report.shards.push(name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gharvest_storage::backend::MockBackend;
    use rstest::rstest;
    use std::sync::Arc;

    fn queue() -> Queue {
        Queue::new(Arc::new(MockBackend::default().with_name("extracted")))
    }

    fn input(count: usize) -> String {
        (0..count).map(|i| format!("{{\"line\":{i}}}\n")).collect()
    }

    #[rstest]
    #[case::empty(0, 3, 0)]
    #[case::partial(2, 3, 1)]
    #[case::exact(6, 3, 2)]
    #[case::remainder(7, 3, 3)]
    #[case::single_line_batches(4, 1, 4)]
    #[tokio::test]
    async fn test_shard_counts(#[case] lines: usize, #[case] per_batch: usize, #[case] shards: usize) {
        let queue = queue();
        let text = input(lines);
        let report = split_into(&queue, text.as_bytes(), per_batch, "abc").await.unwrap();
        assert_eq!(report.lines, lines);
        assert_eq!(report.shards.len(), shards);
        assert_eq!(queue.depth().await.unwrap(), shards);
    }

    #[tokio::test]
    async fn test_shards_preserve_lines_in_order() {
        let queue = queue();
        let text = input(5);
        let report = split_into(&queue, text.as_bytes(), 2, "prefix").await.unwrap();
        assert_eq!(report.shards, vec!["prefix__00000", "prefix__00001", "prefix__00002"]);

        let mut rejoined = String::new();
        for name in &report.shards {
            rejoined.push_str(&String::from_utf8(queue.read(name).await.unwrap()).unwrap());
        }
        assert_eq!(rejoined, text);
        assert_eq!(queue.read("prefix__00002").await.unwrap(), b"{\"line\":4}\n");
    }

    #[tokio::test]
    async fn test_missing_trailing_newline_is_completed() {
        let queue = queue();
        split_into(&queue, &b"one\ntwo"[..], 10, "p").await.unwrap();
        assert_eq!(queue.read("p__00000").await.unwrap(), b"one\ntwo\n");
    }

    #[tokio::test]
    async fn test_undecodable_line_is_kept_as_bytes() {
        let queue = queue();
        let text = b"{\"line\":0}\n\xff\xfe broken\n{\"line\":2}\n";
        let report = split_into(&queue, &text[..], 1000, "p").await.unwrap();
        assert_eq!(report.lines, 3);
        assert_eq!(queue.depth().await.unwrap(), 1);
        assert_eq!(queue.read("p__00000").await.unwrap(), text.to_vec());
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let err = split_into(&queue(), &b"one\n"[..], 0, "p").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidArgument(_)));
    }

    #[test]
    fn test_shard_name() {
        assert_eq!(shard_name("5f0c", 12), "5f0c__00012");
    }
}
