//! Candidate selection over routing-table entries.
//!
//! Selection is a pure function of its inputs so routing decisions stay
//! reproducible in tests without network access. A caller preference always
//! wins when it can be satisfied; otherwise the registered candidate with
//! the lowest priority is chosen, ties preserving original list order.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::routing::CandidateMapping;

/// Errors raised during candidate selection.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SelectError {
    /// Raised when routing entries exist but none reference a registered
    /// provider.
    #[error("no registered provider can satisfy image type '{image_type}'")]
    NoAvailableProvider {
        /// Logical image type being resolved.
        image_type: String,
    },
}

/// Picks exactly one candidate whose provider is currently registered.
///
/// When `preferred` names a provider that appears among the candidates and
/// is registered, the first such candidate is returned regardless of
/// priority. Otherwise candidates are filtered to registered providers and
/// the lowest-priority entry wins; equal priorities keep their original
/// relative order. An unsatisfiable preference falls back to priority
/// selection and is logged rather than surfaced as an error.
///
/// # Errors
///
/// Returns [`SelectError::NoAvailableProvider`] when no candidate's
/// provider is registered.
pub fn select<'a>(
    image_type: &str,
    candidates: &'a [CandidateMapping],
    registered: &BTreeSet<String>,
    preferred: Option<&str>,
) -> Result<&'a CandidateMapping, SelectError> {
    if let Some(preference) = preferred {
        let preferred_candidate = candidates
            .iter()
            .find(|candidate| candidate.provider == preference);
        match preferred_candidate {
            Some(candidate) if registered.contains(preference) => return Ok(candidate),
            Some(_) => {
                tracing::warn!(
                    image_type,
                    preferred = preference,
                    "preferred provider is not registered; falling back to priority selection"
                );
            }
            None => {
                tracing::warn!(
                    image_type,
                    preferred = preference,
                    "preferred provider has no candidate for this image type; falling back to priority selection"
                );
            }
        }
    }

    let mut eligible: Vec<&CandidateMapping> = candidates
        .iter()
        .filter(|candidate| registered.contains(&candidate.provider))
        .collect();
    eligible.sort_by_key(|candidate| candidate.priority);
    eligible
        .into_iter()
        .next()
        .ok_or_else(|| SelectError::NoAvailableProvider {
            image_type: image_type.to_owned(),
        })
}
