//! ShipmentProvider trait definition.
//!
//! This module defines the [`ShipmentProvider`] trait, the core abstraction
//! for carrier backends (Canada Post, UPS, USPS, DHL), and the
//! [`TrackingBatch`] pull-iterator that carries its batch contract.
//!
//! Providers are responsible for:
//! - Issuing the carrier's lookup call through a [`Transport`](crate::Transport)
//! - Parsing the carrier's native payload
//! - Producing uniform [`Shipment`] values
//!
//! Lookup failures - carrier rejections, transport faults, unparseable
//! payloads - are encoded inside the returned `Shipment`, never raised. An
//! `Err` from a provider means the caller misconfigured it (missing auth
//! option) or the adapter itself is broken.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use parceltrack_core::Shipment;

use crate::auth::AuthOptions;
use crate::error::ProviderResult;

/// A boxed future for async trait methods.
///
/// Async functions in traits do not mix with dynamic dispatch; boxed futures
/// keep the trait object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One (tracking code, lookup result) pair produced by a batch.
pub type BatchItem = (String, ProviderResult<Shipment>);

/// The core abstraction for carrier tracking backends.
///
/// Each lookup is a point-in-time snapshot: one outbound call, no polling,
/// no shared state between calls.
pub trait ShipmentProvider: Send + Sync {
    /// Returns the name of this provider (e.g., "canada_post", "ups").
    fn name(&self) -> &str;

    /// Looks up a single tracking code.
    ///
    /// # Errors
    ///
    /// Returns an error only for missing auth configuration or an internal
    /// adapter fault. Everything the carrier or the network did wrong comes
    /// back as a `Shipment` with `lookup_succeeded` false.
    fn track<'a>(
        &'a self,
        tracking_code: &'a str,
        auth: &'a AuthOptions,
    ) -> BoxFuture<'a, ProviderResult<Shipment>>;

    /// Looks up many tracking codes as a lazy pull sequence.
    ///
    /// The default implementation degenerates to one [`track`] call per code,
    /// in input order; a request is only issued when the caller pulls the
    /// corresponding item, so partial consumption never pays for unneeded
    /// lookups. Carriers whose wire protocol supports a genuine multi-code
    /// inquiry override this with [`TrackingBatch::prefetched`] to keep the
    /// whole batch at one round trip.
    ///
    /// [`track`]: ShipmentProvider::track
    fn track_batch<'a>(
        &'a self,
        tracking_codes: Vec<String>,
        auth: &'a AuthOptions,
    ) -> TrackingBatch<'a>
    where
        Self: Sized,
    {
        TrackingBatch::per_code(self, tracking_codes, auth)
    }
}

/// A lazy, pull-based sequence of batch lookup results.
///
/// Nothing happens until [`next`](TrackingBatch::next) is called: per-code
/// batches issue one request per pull, and prefetched batches defer their
/// single wire call to the first pull and then drain without further I/O.
pub struct TrackingBatch<'a> {
    state: BatchState<'a>,
}

enum BatchState<'a> {
    /// One request per code, issued as the caller advances.
    PerCode {
        provider: &'a dyn ShipmentProvider,
        auth: &'a AuthOptions,
        remaining: VecDeque<String>,
    },
    /// One wire call for the whole batch, deferred until the first pull.
    Prefetched {
        fetch: Option<BoxFuture<'a, Vec<BatchItem>>>,
        ready: VecDeque<BatchItem>,
    },
}

impl<'a> TrackingBatch<'a> {
    /// A batch that resolves each code with its own single-code lookup.
    pub fn per_code(
        provider: &'a dyn ShipmentProvider,
        tracking_codes: impl IntoIterator<Item = String>,
        auth: &'a AuthOptions,
    ) -> Self {
        Self {
            state: BatchState::PerCode {
                provider,
                auth,
                remaining: tracking_codes.into_iter().collect(),
            },
        }
    }

    /// A batch backed by one deferred wire call covering every code.
    ///
    /// The future runs when the first item is pulled; its results are then
    /// handed out one at a time.
    pub fn prefetched(fetch: BoxFuture<'a, Vec<BatchItem>>) -> Self {
        Self {
            state: BatchState::Prefetched {
                fetch: Some(fetch),
                ready: VecDeque::new(),
            },
        }
    }

    /// Advances the sequence, producing the next (code, result) pair.
    pub async fn next(&mut self) -> Option<BatchItem> {
        match &mut self.state {
            BatchState::PerCode {
                provider,
                auth,
                remaining,
            } => {
                let code = remaining.pop_front()?;
                let result = provider.track(&code, *auth).await;
                Some((code, result))
            }
            BatchState::Prefetched { fetch, ready } => {
                if let Some(request) = fetch.take() {
                    *ready = request.await.into();
                }
                ready.pop_front()
            }
        }
    }

    /// Drains the rest of the sequence into a vector.
    pub async fn collect(mut self) -> Vec<BatchItem> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item);
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider double that records how many lookups were issued.
    struct CountingProvider {
        calls: AtomicUsize,
    }

    impl CountingProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ShipmentProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn track<'a>(
            &'a self,
            tracking_code: &'a str,
            _auth: &'a AuthOptions,
        ) -> BoxFuture<'a, ProviderResult<Shipment>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reason = format!("not found: {tracking_code}");
            Box::pin(async move { Ok(Shipment::lookup_failure(reason)) })
        }
    }

    #[tokio::test]
    async fn default_batch_is_lazy() {
        let provider = CountingProvider::new();
        let auth = AuthOptions::new();
        let codes = vec!["A".to_string(), "B".to_string(), "C".to_string()];

        let mut batch = provider.track_batch(codes, &auth);
        assert_eq!(provider.calls(), 0);

        let (code, result) = batch.next().await.unwrap();
        assert_eq!(code, "A");
        assert!(result.is_ok());
        assert_eq!(provider.calls(), 1);

        // Abandoning the batch never issues the remaining lookups.
        drop(batch);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn default_batch_preserves_input_order() {
        let provider = CountingProvider::new();
        let auth = AuthOptions::new();
        let codes = vec!["first".to_string(), "second".to_string()];

        let items = provider.track_batch(codes, &auth).collect().await;
        let codes: Vec<&str> = items.iter().map(|(code, _)| code.as_str()).collect();
        assert_eq!(codes, vec!["first", "second"]);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn empty_batch_yields_nothing() {
        let provider = CountingProvider::new();
        let auth = AuthOptions::new();

        let mut batch = provider.track_batch(Vec::new(), &auth);
        assert!(batch.next().await.is_none());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn prefetched_batch_defers_until_first_pull() {
        use std::sync::Arc;
        use std::sync::atomic::AtomicBool;

        let fetched = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fetched);

        let mut batch = TrackingBatch::prefetched(Box::pin(async move {
            flag.store(true, Ordering::SeqCst);
            vec![
                ("X".to_string(), Ok(Shipment::lookup_success(Vec::new(), None))),
                ("Y".to_string(), Ok(Shipment::lookup_failure("not found"))),
            ]
        }));

        assert!(!fetched.load(Ordering::SeqCst));

        let (code, _) = batch.next().await.unwrap();
        assert_eq!(code, "X");
        assert!(fetched.load(Ordering::SeqCst));

        let (code, result) = batch.next().await.unwrap();
        assert_eq!(code, "Y");
        assert!(!result.unwrap().lookup_succeeded);

        assert!(batch.next().await.is_none());
    }
}
