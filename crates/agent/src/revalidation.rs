use std::time::Duration;

use shopmate_core::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, Coordinate, ShopId,
};
use tracing::{info, warn};

use crate::capabilities::ShoppingCapabilities;
use crate::cart_memory::CartActionMemory;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateSource {
    Explicit,
    RecentCartAction,
    NonEmptyCarts,
}

impl CandidateSource {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::RecentCartAction => "recent_cart_action",
            Self::NonEmptyCarts => "non_empty_carts",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevalidationOutcome {
    Accepted { checked: Vec<ShopId>, skipped: Vec<ShopId> },
    Rejected { shop_id: ShopId },
}

impl RevalidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Checks a proposed delivery address against the shops the user is buying from.
///
/// Candidates, in priority order: an explicit shop, the shops of the most recent
/// cart action, every shop with a non-empty cart. Validation runs one shop at a
/// time and stops at the first shop that cannot deliver. A shop whose check
/// errors or times out is skipped rather than blocking the change.
#[derive(Clone, Copy, Debug)]
pub struct AddressRevalidator {
    timeout: Duration,
}

impl AddressRevalidator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn candidate_shops(
        &self,
        explicit: Option<&ShopId>,
        cart_memory: &CartActionMemory,
        capabilities: &dyn ShoppingCapabilities,
    ) -> (CandidateSource, Vec<ShopId>) {
        if let Some(shop_id) = explicit {
            return (CandidateSource::Explicit, vec![shop_id.clone()]);
        }
        if !cart_memory.shop_ids().is_empty() {
            return (CandidateSource::RecentCartAction, dedup(cart_memory.shop_ids().to_vec()));
        }

        let carts = match tokio::time::timeout(self.timeout, capabilities.get_all_carts()).await {
            Ok(Ok(carts)) => carts,
            Ok(Err(error)) => {
                warn!(
                    event_name = "agent.address.carts_unavailable",
                    error = %error,
                    "could not list carts for revalidation"
                );
                Vec::new()
            }
            Err(_) => {
                warn!(
                    event_name = "agent.address.carts_unavailable",
                    timeout_secs = self.timeout.as_secs(),
                    "listing carts for revalidation timed out"
                );
                Vec::new()
            }
        };
        let shops = carts.into_iter().filter(|cart| !cart.is_empty()).map(|cart| cart.shop_id);
        (CandidateSource::NonEmptyCarts, dedup(shops.collect()))
    }

    pub async fn revalidate(
        &self,
        coordinate: Coordinate,
        explicit: Option<&ShopId>,
        cart_memory: &CartActionMemory,
        capabilities: &dyn ShoppingCapabilities,
        audit_sink: &dyn AuditSink,
        audit: &AuditContext,
    ) -> RevalidationOutcome {
        let (source, candidates) = self.candidate_shops(explicit, cart_memory, capabilities).await;
        info!(
            event_name = "agent.address.revalidation_started",
            correlation_id = %audit.correlation_id,
            source = source.as_str(),
            candidates = candidates.len(),
            "revalidating delivery address"
        );

        let mut checked = Vec::new();
        let mut skipped = Vec::new();
        for shop_id in candidates {
            let check = tokio::time::timeout(
                self.timeout,
                capabilities.validate_delivery_address(&shop_id, coordinate),
            )
            .await;

            match check {
                Ok(Ok(zone)) if zone.is_within_delivery_zone => checked.push(shop_id),
                Ok(Ok(_)) => {
                    info!(
                        event_name = "agent.address.revalidation_rejected",
                        correlation_id = %audit.correlation_id,
                        shop_id = %shop_id,
                        "address is outside the delivery zone"
                    );
                    audit_sink.emit(
                        event(audit, "address.revalidation_rejected", AuditOutcome::Rejected)
                            .with_metadata("shop_id", shop_id.as_str())
                            .with_metadata("source", source.as_str()),
                    );
                    return RevalidationOutcome::Rejected { shop_id };
                }
                Ok(Err(error)) => {
                    warn!(
                        event_name = "agent.address.validation_skipped",
                        correlation_id = %audit.correlation_id,
                        shop_id = %shop_id,
                        error = %error,
                        "delivery zone check failed; shop skipped"
                    );
                    skipped.push(shop_id);
                }
                Err(_) => {
                    warn!(
                        event_name = "agent.address.validation_skipped",
                        correlation_id = %audit.correlation_id,
                        shop_id = %shop_id,
                        timeout_secs = self.timeout.as_secs(),
                        "delivery zone check timed out; shop skipped"
                    );
                    skipped.push(shop_id);
                }
            }
        }

        audit_sink.emit(
            event(audit, "address.revalidation_accepted", AuditOutcome::Success)
                .with_metadata("source", source.as_str())
                .with_metadata("checked", checked.len().to_string())
                .with_metadata("skipped", skipped.len().to_string()),
        );
        RevalidationOutcome::Accepted { checked, skipped }
    }
}

fn event(audit: &AuditContext, event_type: &str, outcome: AuditOutcome) -> AuditEvent {
    AuditEvent::new(
        audit.conversation_id.clone(),
        audit.correlation_id.clone(),
        event_type,
        AuditCategory::Address,
        audit.actor.clone(),
        outcome,
    )
}

fn dedup(shop_ids: Vec<ShopId>) -> Vec<ShopId> {
    let mut unique: Vec<ShopId> = Vec::with_capacity(shop_ids.len());
    for shop_id in shop_ids {
        if !unique.contains(&shop_id) {
            unique.push(shop_id);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use shopmate_core::audit::InMemoryAuditSink;
    use shopmate_core::{AuditContext, AuditOutcome, CartActionRecord, Coordinate, FunctionName};

    use super::{AddressRevalidator, CandidateSource, RevalidationOutcome};
    use crate::cart_memory::CartActionMemory;
    use crate::testing::{shop_id, FakeCapabilities, ZoneBehavior};

    const BERLIN: Coordinate = Coordinate { lat: 52.52, lon: 13.405 };

    fn audit() -> AuditContext {
        AuditContext::new(Some("conv-1".to_string()), "addr-1", "address-test")
    }

    fn memory_with(shops: &[&str]) -> CartActionMemory {
        let mut memory = CartActionMemory::default();
        memory.replace(CartActionRecord {
            function_name: FunctionName::AddItemsToCart,
            arguments: json!({}),
            shop_ids: shops.iter().map(|shop| shop_id(shop)).collect(),
        });
        memory
    }

    fn revalidator() -> AddressRevalidator {
        AddressRevalidator::new(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn explicit_shop_takes_priority() {
        let capabilities = FakeCapabilities::default().with_carts(&[("S9", 3)]);
        let memory = memory_with(&["S2"]);

        let (source, shops) =
            revalidator().candidate_shops(Some(&shop_id("S1")), &memory, &capabilities).await;

        assert_eq!(source, CandidateSource::Explicit);
        assert_eq!(shops, vec![shop_id("S1")]);
        assert!(capabilities.calls().is_empty());
    }

    #[tokio::test]
    async fn recent_cart_action_beats_cart_listing() {
        let capabilities = FakeCapabilities::default().with_carts(&[("S9", 3)]);
        let memory = memory_with(&["S2", "S3"]);

        let (source, shops) = revalidator().candidate_shops(None, &memory, &capabilities).await;

        assert_eq!(source, CandidateSource::RecentCartAction);
        assert_eq!(shops, vec![shop_id("S2"), shop_id("S3")]);
    }

    #[tokio::test]
    async fn falls_back_to_non_empty_carts() {
        let capabilities = FakeCapabilities::default().with_carts(&[("S1", 0), ("S2", 4), ("S3", 1)]);

        let (source, shops) =
            revalidator().candidate_shops(None, &CartActionMemory::default(), &capabilities).await;

        assert_eq!(source, CandidateSource::NonEmptyCarts);
        assert_eq!(shops, vec![shop_id("S2"), shop_id("S3")]);
    }

    #[tokio::test]
    async fn first_out_of_zone_shop_rejects_and_stops() {
        let capabilities = FakeCapabilities::default()
            .with_zone("S2", ZoneBehavior::Outside)
            .with_zone("S3", ZoneBehavior::Outside);
        let sink = InMemoryAuditSink::default();

        let outcome = revalidator()
            .revalidate(BERLIN, None, &memory_with(&["S1", "S2", "S3"]), &capabilities, &sink, &audit())
            .await;

        assert_eq!(outcome, RevalidationOutcome::Rejected { shop_id: shop_id("S2") });
        assert_eq!(capabilities.validated(), vec![shop_id("S1"), shop_id("S2")]);
        assert_eq!(sink.events()[0].outcome, AuditOutcome::Rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_and_hanging_checks_are_skipped() {
        let capabilities = FakeCapabilities::default()
            .with_zone("S1", ZoneBehavior::Fails)
            .with_zone("S2", ZoneBehavior::Hangs);
        let sink = InMemoryAuditSink::default();

        let outcome = revalidator()
            .revalidate(BERLIN, None, &memory_with(&["S1", "S2", "S3"]), &capabilities, &sink, &audit())
            .await;

        assert_eq!(
            outcome,
            RevalidationOutcome::Accepted {
                checked: vec![shop_id("S3")],
                skipped: vec![shop_id("S1"), shop_id("S2")],
            }
        );
        assert!(outcome.is_accepted());
    }

    #[tokio::test]
    async fn no_candidates_accepts() {
        let capabilities = FakeCapabilities::default().failing("getAllCarts");
        let sink = InMemoryAuditSink::default();

        let outcome = revalidator()
            .revalidate(BERLIN, None, &CartActionMemory::default(), &capabilities, &sink, &audit())
            .await;

        assert_eq!(outcome, RevalidationOutcome::Accepted { checked: vec![], skipped: vec![] });
        assert!(capabilities.validated().is_empty());
    }
}
