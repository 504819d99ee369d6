//! SSH credential reconciliation.
//!
//! Providers expose SSH keys as named account-level objects, and creating
//! one that already exists is rejected. Adapters therefore attempt the
//! create and, when the provider reports a conflict, fall back to a
//! list-and-match lookup. This is reconciliation, not a retry: the conflict
//! means another actor (or an earlier run) already converged on the desired
//! state.

use std::future::Future;

/// Outcome of an attempted credential creation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyCreate<K> {
    /// The provider created the credential and returned its handle.
    Created(K),
    /// The provider reported that an equivalent credential already exists.
    AlreadyExists,
}

/// Ensures a credential object exists, reconciling a conflict through
/// lookup.
///
/// `create` is invoked once; when it reports [`KeyCreate::AlreadyExists`]
/// the `lookup` future runs instead and its match (if any) is returned.
/// `Ok(None)` means the provider claimed a conflict but the lookup found no
/// matching credential; callers surface that as a provider error.
///
/// # Errors
///
/// Propagates any error from either future unchanged.
pub async fn ensure_credential<K, E, C, FutC, L, FutL>(
    create: C,
    lookup: L,
) -> Result<Option<K>, E>
where
    C: FnOnce() -> FutC,
    FutC: Future<Output = Result<KeyCreate<K>, E>>,
    L: FnOnce() -> FutL,
    FutL: Future<Output = Result<Option<K>, E>>,
{
    match create().await? {
        KeyCreate::Created(key) => Ok(Some(key)),
        KeyCreate::AlreadyExists => lookup().await,
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn created_key_skips_lookup() {
        let lookups = AtomicU32::new(0);
        let key = ensure_credential(
            || async { Ok::<_, Infallible>(KeyCreate::Created(7_u64)) },
            || {
                lookups.fetch_add(1, Ordering::SeqCst);
                async { Ok(Some(99_u64)) }
            },
        )
        .await;
        assert_eq!(key, Ok(Some(7)));
        assert_eq!(lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn conflict_falls_back_to_lookup() {
        let key = ensure_credential(
            || async { Ok::<_, Infallible>(KeyCreate::AlreadyExists) },
            || async { Ok(Some(42_u64)) },
        )
        .await;
        assert_eq!(key, Ok(Some(42)));
    }

    #[tokio::test]
    async fn conflict_without_match_yields_none() {
        let key: Result<Option<u64>, Infallible> = ensure_credential(
            || async { Ok(KeyCreate::AlreadyExists) },
            || async { Ok(None) },
        )
        .await;
        assert_eq!(key, Ok(None));
    }

    #[tokio::test]
    async fn create_error_propagates() {
        #[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
        #[error("quota exceeded")]
        struct Quota;

        let key: Result<Option<u64>, Quota> =
            ensure_credential(|| async { Err(Quota) }, || async { Ok(None) }).await;
        assert_eq!(key, Err(Quota));
    }
}
