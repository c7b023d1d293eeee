//! Outbound dispatch: regular sends and temporal mixing.
//!
//! Temporal mixing sends the real prompt concurrently with N decoys over
//! independent driver instances in cryptographically shuffled order. The
//! caller gets the real response as soon as it is ready; decoys drain in the
//! background and are cancelled only at process shutdown — cancelling them
//! on client disconnect would leak timing.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use vg_providers::{ChunkStream, Completion, DriverCatalog, ProviderDriver};
use vg_types::errors::{GatewayError, GatewayResult};
use vg_utils::secure_shuffle;

/// Metadata surfaced when temporal mixing ran. Deliberately carries no
/// position or per-query timing: leaking the position undoes the shuffle.
#[derive(Debug, Clone, Copy)]
pub struct TemporalMixing {
    pub active: bool,
    pub total_queries: usize,
}

/// The provider's answer in whichever mode the caller asked for.
pub enum SendOutcome {
    Complete(Completion),
    Streaming(ChunkStream),
}

impl SendOutcome {
    pub fn is_streaming(&self) -> bool {
        matches!(self, SendOutcome::Streaming(_))
    }
}

/// Shuffled dispatch order for `total` queries. Index 0 is the real one.
fn mixing_order(total: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..total).collect();
    secure_shuffle(&mut indices);
    indices
}

pub struct Dispatcher {
    catalog: Arc<DriverCatalog>,
    decoys: TaskTracker,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(catalog: Arc<DriverCatalog>) -> Self {
        Self {
            catalog,
            decoys: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Send a prompt through the driver, mixing in decoys when any are
    /// given.
    pub async fn send(
        &self,
        driver: Arc<dyn ProviderDriver>,
        prompt: &str,
        streaming: bool,
        decoy_prompts: &[String],
    ) -> GatewayResult<(SendOutcome, Option<TemporalMixing>)> {
        if decoy_prompts.is_empty() {
            let outcome = Self::send_regular(driver, prompt, streaming).await?;
            Ok((outcome, None))
        } else {
            self.send_with_temporal_mixing(driver, prompt, decoy_prompts, streaming)
                .await
        }
    }

    async fn send_regular(
        driver: Arc<dyn ProviderDriver>,
        prompt: &str,
        streaming: bool,
    ) -> GatewayResult<SendOutcome> {
        if streaming {
            Ok(SendOutcome::Streaming(driver.stream_complete(prompt).await?))
        } else {
            Ok(SendOutcome::Complete(driver.complete(prompt).await?))
        }
    }

    /// One real prompt, N decoys, M = N+1 concurrent requests over
    /// independent driver instances in shuffled order. Awaits only the real
    /// one.
    async fn send_with_temporal_mixing(
        &self,
        driver: Arc<dyn ProviderDriver>,
        real_prompt: &str,
        decoy_prompts: &[String],
        streaming: bool,
    ) -> GatewayResult<(SendOutcome, Option<TemporalMixing>)> {
        let total_queries = decoy_prompts.len() + 1;
        tracing::info!(total_queries, "starting temporal mixing");

        let mut prompts = Vec::with_capacity(total_queries);
        prompts.push(real_prompt.to_string());
        prompts.extend(decoy_prompts.iter().cloned());

        let provider = driver.provider().to_string();
        let model = driver.model().to_string();
        let api_key = driver.api_key().to_string();

        // All M requests launch back to back with no stagger; the shuffle
        // alone provides the timing obfuscation.
        let mut real_handle = None;
        for original_index in mixing_order(total_queries) {
            // A fresh instance per request keeps the driver's HTTP client
            // from serializing the M requests.
            let instance = self.catalog.create(&provider, &model, &api_key)?;
            let prompt = prompts[original_index].clone();

            if original_index == 0 {
                real_handle = Some(tokio::spawn(async move {
                    Self::send_regular(instance, &prompt, streaming).await
                }));
            } else {
                let token = self.shutdown.clone();
                self.decoys.spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {
                            tracing::debug!("decoy cancelled at shutdown");
                        }
                        _ = Self::execute_decoy(instance, &prompt, streaming) => {}
                    }
                });
            }
        }

        let Some(real_handle) = real_handle else {
            return Err(GatewayError::Internal(
                "real query missing from dispatch order".to_string(),
            ));
        };
        let outcome = real_handle
            .await
            .map_err(|e| GatewayError::Internal(format!("real query task failed: {e}")))??;

        Ok((
            outcome,
            Some(TemporalMixing {
                active: true,
                total_queries,
            }),
        ))
    }

    /// Run one decoy with network behavior identical to the real query —
    /// same mode, same request cycle — and discard everything it returns.
    /// Decoy errors never surface.
    async fn execute_decoy(instance: Arc<dyn ProviderDriver>, prompt: &str, streaming: bool) {
        if streaming {
            match instance.stream_complete(prompt).await {
                Ok(mut stream) => {
                    while let Some(chunk) = stream.next().await {
                        drop(chunk);
                    }
                    tracing::debug!("decoy stream drained");
                }
                Err(e) => tracing::debug!("decoy stream error: {e}"),
            }
        } else {
            match instance.complete(prompt).await {
                Ok(_) => tracing::debug!("decoy completed, response discarded"),
                Err(e) => tracing::debug!("decoy error: {e}"),
            }
        }
    }

    /// Number of decoys still in flight.
    pub fn pending_decoys(&self) -> usize {
        self.decoys.len()
    }

    /// Let already-spawned decoys finish naturally, then return.
    pub async fn drain(&self) {
        self.decoys.close();
        self.decoys.wait().await;
    }

    /// Shutdown: cancel pending decoys and wait for them to wind down.
    pub async fn close(&self) {
        self.shutdown.cancel();
        self.decoys.close();
        self.decoys.wait().await;
        tracing::info!("dispatcher closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vg_types::TokenUsage;

    #[derive(Clone, Default)]
    struct CallCounters {
        stream_calls: Arc<AtomicUsize>,
        complete_calls: Arc<AtomicUsize>,
    }

    struct MockDriver {
        model: String,
        api_key: String,
        counters: CallCounters,
    }

    #[async_trait]
    impl ProviderDriver for MockDriver {
        fn provider(&self) -> &str {
            "mock"
        }

        fn model(&self) -> &str {
            &self.model
        }

        fn api_key(&self) -> &str {
            &self.api_key
        }

        async fn complete(&self, prompt: &str) -> GatewayResult<Completion> {
            self.counters.complete_calls.fetch_add(1, Ordering::SeqCst);
            if prompt.contains("boom") {
                return Err(GatewayError::Upstream("mock failure".into()));
            }
            Ok(Completion {
                content: format!("echo: {prompt}"),
                usage: TokenUsage::default(),
                raw: serde_json::Value::Null,
            })
        }

        async fn stream_complete(&self, prompt: &str) -> GatewayResult<ChunkStream> {
            self.counters.stream_calls.fetch_add(1, Ordering::SeqCst);
            if prompt.contains("boom") {
                return Err(GatewayError::Upstream("mock failure".into()));
            }
            let chunks = vec![
                Ok(vg_providers::StreamChunk {
                    content: Some("hi".into()),
                    finish_reason: None,
                }),
                Ok(vg_providers::StreamChunk {
                    content: None,
                    finish_reason: Some("stop".into()),
                }),
            ];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    fn mock_dispatcher() -> (Dispatcher, CallCounters) {
        let counters = CallCounters::default();
        let registered = counters.clone();
        let mut catalog = DriverCatalog::new();
        catalog.register("mock", move |model, api_key| {
            Ok(Arc::new(MockDriver {
                model: model.to_string(),
                api_key: api_key.to_string(),
                counters: registered.clone(),
            }))
        });
        (Dispatcher::new(Arc::new(catalog)), counters)
    }

    fn mock_driver(counters: &CallCounters) -> Arc<dyn ProviderDriver> {
        Arc::new(MockDriver {
            model: "test-model".into(),
            api_key: "sk-mock".into(),
            counters: counters.clone(),
        })
    }

    #[tokio::test]
    async fn test_regular_send_non_streaming() {
        let (dispatcher, counters) = mock_dispatcher();
        let (outcome, mixing) = dispatcher
            .send(mock_driver(&counters), "hello", false, &[])
            .await
            .unwrap();
        assert!(mixing.is_none());
        match outcome {
            SendOutcome::Complete(completion) => assert_eq!(completion.content, "echo: hello"),
            SendOutcome::Streaming(_) => panic!("expected a complete response"),
        }
    }

    #[tokio::test]
    async fn test_mixing_dispatches_one_real_plus_n_decoys() {
        let (dispatcher, counters) = mock_dispatcher();
        let decoys = vec!["decoy one".to_string(), "decoy two".to_string()];
        let (_, mixing) = dispatcher
            .send(mock_driver(&counters), "real question", false, &decoys)
            .await
            .unwrap();
        dispatcher.drain().await;

        let mixing = mixing.unwrap();
        assert!(mixing.active);
        assert_eq!(mixing.total_queries, 3);
        assert_eq!(counters.complete_calls.load(Ordering::SeqCst), 3);
        assert_eq!(counters.stream_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mixing_streaming_parity() {
        // Streaming real query means every decoy streams too; a mode split
        // would fingerprint the real request.
        let (dispatcher, counters) = mock_dispatcher();
        let decoys = vec!["decoy".to_string()];
        let (outcome, _) = dispatcher
            .send(mock_driver(&counters), "real", true, &decoys)
            .await
            .unwrap();
        dispatcher.drain().await;

        assert!(outcome.is_streaming());
        assert_eq!(counters.stream_calls.load(Ordering::SeqCst), 2);
        assert_eq!(counters.complete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_real_error_propagates() {
        let (dispatcher, counters) = mock_dispatcher();
        let decoys = vec!["decoy".to_string()];
        let result = dispatcher
            .send(mock_driver(&counters), "boom", false, &decoys)
            .await;
        dispatcher.drain().await;
        assert!(matches!(result, Err(GatewayError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_decoy_errors_are_swallowed() {
        let (dispatcher, counters) = mock_dispatcher();
        let decoys = vec!["boom decoy".to_string(), "boom again".to_string()];
        let (outcome, mixing) = dispatcher
            .send(mock_driver(&counters), "real", false, &decoys)
            .await
            .unwrap();
        dispatcher.drain().await;

        assert_eq!(mixing.unwrap().total_queries, 3);
        match outcome {
            SendOutcome::Complete(completion) => assert_eq!(completion.content, "echo: real"),
            SendOutcome::Streaming(_) => panic!("expected a complete response"),
        }
    }

    #[tokio::test]
    async fn test_decoys_tracked_and_removed_on_completion() {
        let (dispatcher, counters) = mock_dispatcher();
        let decoys = vec!["a".to_string(), "b".to_string()];
        dispatcher
            .send(mock_driver(&counters), "real", false, &decoys)
            .await
            .unwrap();
        dispatcher.drain().await;
        assert_eq!(dispatcher.pending_decoys(), 0);
    }

    #[test]
    fn test_mixing_order_is_a_permutation() {
        for total in 2..=5 {
            let mut order = mixing_order(total);
            order.sort_unstable();
            assert_eq!(order, (0..total).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_real_position_distribution_is_roughly_uniform() {
        // Over K trials the real query's shuffled position must not
        // concentrate anywhere.
        let trials = 300;
        let total = 3;
        let mut counts = vec![0usize; total];
        for _ in 0..trials {
            let order = mixing_order(total);
            let position = order.iter().position(|&i| i == 0).unwrap();
            counts[position] += 1;
        }
        let bound = std::cmp::max((trials * 8) / 10, 2 + trials / (total - 1));
        for count in counts {
            assert!(count > 0);
            assert!(count < bound, "position count {count} exceeds {bound}");
        }
    }
}
