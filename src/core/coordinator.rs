//! Concurrent resolution of every record still missing coordinates.

use crate::core::dataset::pending_indices;
use crate::domain::model::PostalRecord;
use crate::domain::ports::{Geocoder, ProgressReporter};
use futures::stream::{self, StreamExt};
use tokio::sync::watch;

/// Observed by in-flight resolutions; once cancelled, remaining work
/// completes as unresolved.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        cancel_pair().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // sender gone without cancelling
                std::future::pending::<()>().await;
            }
        }
    }
}

pub struct BatchCoordinator<G: Geocoder> {
    geocoder: G,
    concurrency: usize,
}

impl<G: Geocoder> BatchCoordinator<G> {
    pub fn new(geocoder: G, concurrency: usize) -> Self {
        Self {
            geocoder,
            concurrency: concurrency.max(1),
        }
    }

    pub fn geocoder(&self) -> &G {
        &self.geocoder
    }

    /// Resolves the records lacking coordinates and returns the whole set in
    /// input order. Resolved records are never queried.
    pub async fn resolve_pending(
        &self,
        mut records: Vec<PostalRecord>,
        progress: &dyn ProgressReporter,
        cancel: &CancelSignal,
    ) -> Vec<PostalRecord> {
        let pending: Vec<(usize, String)> = pending_indices(&records)
            .into_iter()
            .map(|i| (i, records[i].code.clone()))
            .collect();
        let total = pending.len();
        if total == 0 {
            return records;
        }

        tracing::info!(
            "Resolving {} postal codes ({} at a time)",
            total,
            self.concurrency
        );
        progress.report(0, total);

        let geocoder = &self.geocoder;
        let mut results = stream::iter(pending)
            .map(|(index, code)| {
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return (index, None);
                    }
                    let result = tokio::select! {
                        result = geocoder.resolve(&code) => Some(result),
                        _ = cancel.cancelled() => {
                            tracing::debug!("Resolution of CEP {} cancelled", code);
                            None
                        }
                    };
                    (index, result)
                }
            })
            .buffer_unordered(self.concurrency);

        // single writer: results land on their original index
        let mut completed = 0;
        while let Some((index, result)) = results.next().await {
            // cancelled lookups leave the record untouched
            if let Some(result) = result {
                records[index].apply(result);
            }
            completed += 1;
            progress.report(completed, total);
        }

        records
    }
}
