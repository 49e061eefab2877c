//! Turns an advisor reply into concrete stored policies.

use anyhow::{Context, Result};
use tracing::info;
use ypol_adapters::{AdvisorReply, AdvisorRequest, PolicyAdvisor, Recommendation};
use ypol_storage::PolicyRepository;

/// Ask the advisor and resolve bare names against the store by exact match.
/// Structured replies are passed through as-is; names with no stored policy are dropped.
pub async fn recommend(
    repository: &PolicyRepository,
    advisor: &dyn PolicyAdvisor,
    request: &AdvisorRequest,
) -> Result<Vec<Recommendation>> {
    let reply = advisor
        .advise(request)
        .await
        .with_context(|| format!("asking advisor for {}", request.user_id))?;

    let names = match reply {
        AdvisorReply::Structured(items) => return Ok(items),
        AdvisorReply::Names(names) if names.is_empty() => return Ok(Vec::new()),
        AdvisorReply::Names(names) => names,
    };

    let found = repository
        .find_by_names(&names)
        .await
        .context("resolving recommended policy names")?;
    info!(requested = names.len(), resolved = found.len(), "resolved advisor names");
    Ok(found
        .into_iter()
        .map(|policy| Recommendation {
            id: policy.id,
            name: policy.name,
            reason: None,
            badges: Vec::new(),
        })
        .collect())
}
