//! Random picks from the full library.
//!
//! Shares the listing primitive with the change feed but never applies a
//! time window.

use std::sync::Arc;

use monolith_core::{ContentKind, Item, ProbeError, RemoteLister, ServiceId, SuggestionBatch};
use rand::seq::SliceRandom;
use tracing::{debug, warn};

pub struct SuggestionPicker {
    service_id: ServiceId,
    lister: Arc<dyn RemoteLister>,
}

impl SuggestionPicker {
    pub fn new(service_id: impl Into<ServiceId>, lister: Arc<dyn RemoteLister>) -> Self {
        Self {
            service_id: service_id.into(),
            lister,
        }
    }

    /// One uniformly random item of `kind`, or `None` for an empty library.
    pub async fn suggest(&self, address: &str, kind: ContentKind) -> Result<Option<Item>, ProbeError> {
        let items = self.lister.list_items(address, kind).await?;
        let pick = items.choose(&mut rand::thread_rng()).cloned();
        debug!(service = %self.service_id, %kind, library = items.len(), picked = pick.is_some(), "suggestion drawn");
        Ok(pick)
    }

    /// One pick per kind. Failing or empty kinds are left out.
    pub async fn suggest_each(
        &self,
        address: &str,
        kinds: &[ContentKind],
    ) -> Result<SuggestionBatch, ProbeError> {
        let mut picks = Vec::with_capacity(kinds.len());
        let mut last_error = None;

        for &kind in kinds {
            match self.suggest(address, kind).await {
                Ok(Some(item)) => picks.push((kind, item)),
                Ok(None) => {}
                Err(e) => {
                    warn!(service = %self.service_id, %kind, error = %e, "failed to pick suggestion");
                    last_error = Some(e);
                }
            }
        }

        if picks.is_empty()
            && let Some(e) = last_error
        {
            return Err(e);
        }

        Ok(SuggestionBatch {
            service_id: self.service_id.clone(),
            address: address.to_string(),
            picks,
        })
    }
}
