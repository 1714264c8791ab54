//! Byte-progress reporting while a request body is received.

use bytes::Bytes;
use futures_core::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use super::{JobPhase, JobTable, ProgressScale};

const STEP: u8 = 5;

/// Stream adapter that reports upload progress into the [`JobTable`].
///
/// Progress is `received / declared_len` mapped into [`ProgressScale::UPLOAD`], quantized down to
/// multiples of five, and emitted only when it increased and at least `min_interval` elapsed
/// since the previous emission. Items, errors, and termination of the inner stream pass through
/// untouched. Only existing jobs are advanced; the wrapper never creates entries.
pub struct UploadProgress<S> {
    inner: S,
    table: Arc<JobTable>,
    job_id: String,
    declared_len: Option<u64>,
    received: u64,
    last_reported: u8,
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl<S> UploadProgress<S> {
    /// Wrap `inner`, reporting into `job_id`. A missing or zero `declared_len` disables reporting.
    pub fn new(
        inner: S,
        table: Arc<JobTable>,
        job_id: impl Into<String>,
        declared_len: Option<u64>,
        min_interval: Duration,
    ) -> Self {
        Self {
            inner,
            table,
            job_id: job_id.into(),
            declared_len: declared_len.filter(|len| *len > 0),
            received: 0,
            last_reported: 0,
            last_emit: None,
            min_interval,
        }
    }

    /// Bytes seen so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    fn record(&mut self, len: usize) {
        self.received = self.received.saturating_add(len as u64);
        let Some(total) = self.declared_len else {
            return;
        };

        let local = (self.received as f64 * 100.0 / total as f64).min(100.0);
        let quantized = ProgressScale::UPLOAD.scale(local) / STEP * STEP;
        if quantized <= self.last_reported {
            return;
        }
        if let Some(last) = self.last_emit
            && last.elapsed() < self.min_interval
        {
            return;
        }

        if self
            .table
            .advance(&self.job_id, JobPhase::Uploading, quantized)
        {
            self.last_reported = quantized;
            self.last_emit = Some(Instant::now());
        }
    }
}

impl<S, E> Stream for UploadProgress<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = Pin::new(&mut self.inner).poll_next(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            let len = chunk.len();
            self.record(len);
        }
        polled
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{StreamExt, stream};
    use std::convert::Infallible;

    fn chunks(sizes: &[usize]) -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin {
        let items: Vec<Result<Bytes, Infallible>> = sizes
            .iter()
            .map(|size| Ok(Bytes::from(vec![b'x'; *size])))
            .collect();
        stream::iter(items)
    }

    #[tokio::test]
    async fn reports_quantized_progress_up_to_forty() {
        let table = Arc::new(JobTable::new());
        table.create("job");
        let mut wrapped = UploadProgress::new(
            chunks(&[10; 10]),
            Arc::clone(&table),
            "job",
            Some(100),
            Duration::ZERO,
        );

        let mut seen = Vec::new();
        while let Some(item) = wrapped.next().await {
            assert_eq!(item.unwrap().len(), 10);
            seen.push(table.read("job").pct);
        }

        assert_eq!(wrapped.received(), 100);
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(seen.iter().all(|pct| pct % 5 == 0 && *pct <= 40));
        assert_eq!(*seen.last().unwrap(), 40);
        assert_eq!(table.read("job").phase, JobPhase::Uploading);
    }

    #[tokio::test]
    async fn throttles_rapid_updates() {
        let table = Arc::new(JobTable::new());
        table.create("job");
        let wrapped = UploadProgress::new(
            chunks(&[25, 25, 25, 25]),
            Arc::clone(&table),
            "job",
            Some(100),
            Duration::from_secs(3600),
        );

        let collected: Vec<_> = wrapped.collect().await;
        assert_eq!(collected.len(), 4);
        // first emission (25% of the body → 10) goes through, the rest fall inside the interval
        assert_eq!(table.read("job").pct, 10);
    }

    #[tokio::test]
    async fn unknown_length_or_job_reports_nothing() {
        let table = Arc::new(JobTable::new());
        table.create("job");
        let collected: Vec<_> = UploadProgress::new(
            chunks(&[50, 50]),
            Arc::clone(&table),
            "job",
            None,
            Duration::ZERO,
        )
        .collect()
        .await;
        assert_eq!(collected.len(), 2);
        assert_eq!(table.read("job").pct, 0);

        let _: Vec<_> = UploadProgress::new(
            chunks(&[50, 50]),
            Arc::clone(&table),
            "ghost",
            Some(100),
            Duration::ZERO,
        )
        .collect()
        .await;
        assert!(!table.contains("ghost"));
    }

    #[tokio::test]
    async fn errors_pass_through_unchanged() {
        let table = Arc::new(JobTable::new());
        table.create("job");
        let inner = stream::iter(vec![Ok(Bytes::from_static(b"abc")), Err("broken pipe")]);
        let collected: Vec<_> =
            UploadProgress::new(inner, Arc::clone(&table), "job", Some(6), Duration::ZERO)
                .collect()
                .await;
        assert_eq!(collected[0].as_ref().unwrap().as_ref(), b"abc");
        assert_eq!(collected[1], Err("broken pipe"));
        assert_eq!(table.read("job").pct, 20);
    }
}
