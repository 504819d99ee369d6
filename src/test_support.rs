//! Test support utilities shared across unit and integration tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::instance::InstanceState;
use crate::provider::{CreateSpec, Provider, ProviderError, ProviderFuture};

/// Scripted provider that returns pre-seeded outcomes in FIFO order.
///
/// Used to drive deterministic orchestration flows without network access.
/// An empty create queue yields an API error, an empty describe queue a
/// not-found error, and an empty destroy queue a tolerant success, so most
/// tests only script the interesting call.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    create_results: Mutex<VecDeque<Result<InstanceState, ProviderError>>>,
    describe_results: Mutex<VecDeque<Result<InstanceState, ProviderError>>>,
    destroy_results: Mutex<VecDeque<Result<(), ProviderError>>>,
    create_calls: AtomicU32,
    describe_calls: AtomicU32,
    destroy_calls: AtomicU32,
    specs: Mutex<Vec<CreateSpec>>,
    destroyed: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    /// Creates a provider with no queued outcomes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome of the next create call.
    pub fn push_create(&self, result: Result<InstanceState, ProviderError>) {
        Self::lock(&self.create_results).push_back(result);
    }

    /// Queues the outcome of the next describe call.
    pub fn push_describe(&self, result: Result<InstanceState, ProviderError>) {
        Self::lock(&self.describe_results).push_back(result);
    }

    /// Queues the outcome of the next destroy call.
    pub fn push_destroy(&self, result: Result<(), ProviderError>) {
        Self::lock(&self.destroy_results).push_back(result);
    }

    /// Number of create invocations recorded so far.
    #[must_use]
    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of describe invocations recorded so far.
    #[must_use]
    pub fn describe_calls(&self) -> u32 {
        self.describe_calls.load(Ordering::SeqCst)
    }

    /// Number of destroy invocations recorded so far.
    #[must_use]
    pub fn destroy_calls(&self) -> u32 {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every create spec received.
    #[must_use]
    pub fn specs(&self) -> Vec<CreateSpec> {
        Self::lock(&self.specs).clone()
    }

    /// Snapshot of every instance id passed to destroy.
    #[must_use]
    pub fn destroyed(&self) -> Vec<String> {
        Self::lock(&self.destroyed).clone()
    }

    fn lock<T>(queue: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
        queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Provider for ScriptedProvider {
    fn create<'a>(&'a self, spec: &'a CreateSpec) -> ProviderFuture<'a, InstanceState> {
        Box::pin(async move {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            Self::lock(&self.specs).push(spec.clone());
            Self::lock(&self.create_results)
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::api("unscripted create call")))
        })
    }

    fn destroy<'a>(&'a self, instance_id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.destroy_calls.fetch_add(1, Ordering::SeqCst);
            Self::lock(&self.destroyed).push(instance_id.to_owned());
            Self::lock(&self.destroy_results).pop_front().unwrap_or(Ok(()))
        })
    }

    fn describe<'a>(&'a self, instance_id: &'a str) -> ProviderFuture<'a, InstanceState> {
        Box::pin(async move {
            self.describe_calls.fetch_add(1, Ordering::SeqCst);
            Self::lock(&self.describe_results)
                .pop_front()
                .unwrap_or_else(|| {
                    Err(ProviderError::NotFound {
                        instance_id: instance_id.to_owned(),
                    })
                })
        })
    }
}
