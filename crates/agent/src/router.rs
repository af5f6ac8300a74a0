use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use shopmate_core::domain::function::PlaceOrderArgs;
use shopmate_core::{
    CartActionRecord, DeliveryAddress, FunctionCall, FunctionName, FunctionRequest,
    FunctionResult, FunctionSchemaError,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::capabilities::ShoppingCapabilities;
use crate::cart_memory::CartActionMemory;

/// Capabilities plus the ambient facts one sequence routes calls with.
#[derive(Clone)]
pub struct ExecutionContext {
    pub capabilities: Arc<dyn ShoppingCapabilities>,
    pub delivery_address: Option<DeliveryAddress>,
    pub capability_timeout: Duration,
}

#[derive(Debug, Error)]
enum RouteError {
    #[error(transparent)]
    Schema(#[from] FunctionSchemaError),
    #[error("{name} failed: {error}")]
    Capability { name: FunctionName, error: anyhow::Error },
    #[error("{name} timed out after {timeout_secs}s")]
    Timeout { name: FunctionName, timeout_secs: u64 },
}

/// Dispatches model-issued calls to the capability bindings.
///
/// Every failure mode ends up as [`FunctionResult::Failure`] so the model can see
/// and react to it. Nothing is retried here.
#[derive(Clone, Copy, Debug, Default)]
pub struct FunctionRouter;

impl FunctionRouter {
    pub async fn route(
        &self,
        call: &FunctionCall,
        context: &ExecutionContext,
        cart_memory: &mut CartActionMemory,
    ) -> FunctionResult {
        match self.try_route(call, context).await {
            Ok((request, payload)) => {
                remember_cart_action(&request, call, cart_memory);
                debug!(
                    event_name = "agent.router.call_succeeded",
                    function_name = %request.name(),
                    "function call routed"
                );
                FunctionResult::success(payload)
            }
            Err(error) => {
                warn!(
                    event_name = "agent.router.call_failed",
                    function_name = %call.name,
                    error = %error,
                    "function call failed"
                );
                FunctionResult::failure(error.to_string())
            }
        }
    }

    async fn try_route(
        &self,
        call: &FunctionCall,
        context: &ExecutionContext,
    ) -> Result<(FunctionRequest, Value), RouteError> {
        let request = FunctionRequest::parse(call)?;
        let name = request.name();
        let payload = tokio::time::timeout(context.capability_timeout, invoke(&request, context))
            .await
            .map_err(|_| RouteError::Timeout {
                name,
                timeout_secs: context.capability_timeout.as_secs(),
            })?
            .map_err(|error| RouteError::Capability { name, error })?;
        Ok((request, payload))
    }
}

async fn invoke(request: &FunctionRequest, context: &ExecutionContext) -> anyhow::Result<Value> {
    let capabilities = context.capabilities.as_ref();
    let near = context.delivery_address.as_ref().map(|address| address.coordinate);

    match request {
        FunctionRequest::AddItemToCart(args) => {
            capabilities.add_item_to_cart(&args.shop_id, &args.item_id, args.quantity).await
        }
        FunctionRequest::AddItemsToCart(args) => {
            capabilities.add_items_to_cart(&args.items).await
        }
        FunctionRequest::RemoveItemFromCart(args) => {
            capabilities.remove_item_from_cart(&args.shop_id, &args.item_id).await
        }
        FunctionRequest::UpdateItemQuantity(args) => {
            capabilities.update_item_quantity(&args.shop_id, &args.item_id, args.quantity).await
        }
        FunctionRequest::GetCart(args) => capabilities.get_cart(args.shop_id.as_ref()).await,
        FunctionRequest::GetAllCarts(_) => {
            let carts = capabilities.get_all_carts().await?;
            Ok(json!({ "carts": carts }))
        }
        FunctionRequest::DeleteCart(args) => capabilities.delete_cart(&args.shop_id).await,
        FunctionRequest::GetCurrentLocation(_) => {
            Ok(serde_json::to_value(capabilities.get_current_location().await?)?)
        }
        FunctionRequest::GetDefaultAddressId(_) => {
            let address_id = capabilities.get_default_address_id().await?;
            Ok(json!({ "addressId": address_id.map(|id| id.0) }))
        }
        FunctionRequest::GetShopDetails(args) => {
            capabilities.get_shop_details(&args.shop_id, near).await
        }
        FunctionRequest::GetItemDetails(args) => {
            capabilities.get_item_details(&args.shop_id, &args.item_id).await
        }
        FunctionRequest::ValidateDeliveryAddress(args) => {
            let coordinate = shopmate_core::Coordinate { lat: args.lat, lon: args.lon };
            let check = capabilities.validate_delivery_address(&args.shop_id, coordinate).await?;
            Ok(serde_json::to_value(check)?)
        }
        FunctionRequest::SearchItems(args) => {
            capabilities.search_items(&args.query, args.page.unwrap_or(1), near).await
        }
        FunctionRequest::PlaceOrder(args) => {
            let order = resolve_order_address(args, context).await?;
            capabilities.place_order(&order).await
        }
    }
}

/// Explicit address, then the session's delivery address, then the account default.
async fn resolve_order_address(
    args: &PlaceOrderArgs,
    context: &ExecutionContext,
) -> anyhow::Result<PlaceOrderArgs> {
    let mut order = args.clone();
    if order.address_id.is_none() {
        order.address_id = match &context.delivery_address {
            Some(address) => Some(address.id.clone()),
            None => context.capabilities.get_default_address_id().await?,
        };
    }
    if order.address_id.is_none() {
        anyhow::bail!("no delivery address is available for this order");
    }
    Ok(order)
}

fn remember_cart_action(
    request: &FunctionRequest,
    call: &FunctionCall,
    cart_memory: &mut CartActionMemory,
) {
    let function_name = request.name();
    if !function_name.is_cart_mutating() {
        return;
    }
    let shop_ids = request.affected_shop_ids();
    if shop_ids.is_empty() {
        return;
    }
    cart_memory.replace(CartActionRecord {
        function_name,
        arguments: call.decoded_arguments(),
        shop_ids,
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use shopmate_core::{
        AddressId, Coordinate, DeliveryAddress, FunctionCall, FunctionName, FunctionResult,
    };

    use super::{ExecutionContext, FunctionRouter};
    use crate::cart_memory::CartActionMemory;
    use crate::testing::{shop_id, FakeCapabilities};

    fn context(capabilities: FakeCapabilities) -> (ExecutionContext, Arc<FakeCapabilities>) {
        let capabilities = Arc::new(capabilities);
        let context = ExecutionContext {
            capabilities: capabilities.clone(),
            delivery_address: None,
            capability_timeout: Duration::from_secs(5),
        };
        (context, capabilities)
    }

    #[tokio::test]
    async fn unknown_function_becomes_failure_without_side_effects() {
        let (context, capabilities) = context(FakeCapabilities::default());
        let mut memory = CartActionMemory::default();

        let result = FunctionRouter
            .route(&FunctionCall::new("launchRocket", json!({})), &context, &mut memory)
            .await;

        assert_eq!(result, FunctionResult::failure("unknown function: launchRocket"));
        assert!(capabilities.calls().is_empty());
        assert!(memory.current().is_none());
    }

    #[tokio::test]
    async fn batch_add_records_all_touched_shops() {
        let (context, _) = context(FakeCapabilities::default());
        let mut memory = CartActionMemory::default();

        let call = FunctionCall::from_raw(
            "addItemsToCart",
            r#"{"items":[{"shopId":"S1","itemId":"a"},{"shopId":"S2","itemId":"b"},{"shopId":"S1","itemId":"c"}]}"#,
        );
        let result = FunctionRouter.route(&call, &context, &mut memory).await;

        assert!(result.is_success());
        let record = memory.current().expect("cart action recorded");
        assert_eq!(record.function_name, FunctionName::AddItemsToCart);
        assert_eq!(record.shop_ids, vec![shop_id("S1"), shop_id("S2")]);
    }

    #[tokio::test]
    async fn failed_cart_mutation_keeps_previous_record() {
        let (context, _) = context(FakeCapabilities::default().failing("removeItemFromCart"));
        let mut memory = CartActionMemory::default();

        FunctionRouter
            .route(
                &FunctionCall::new("addItemToCart", json!({ "shopId": "S1", "itemId": "a" })),
                &context,
                &mut memory,
            )
            .await;
        let result = FunctionRouter
            .route(
                &FunctionCall::new("removeItemFromCart", json!({ "shopId": "S9", "itemId": "a" })),
                &context,
                &mut memory,
            )
            .await;

        assert!(!result.is_success());
        assert_eq!(memory.shop_ids(), &[shop_id("S1")]);
    }

    #[tokio::test]
    async fn non_mutating_calls_leave_memory_untouched() {
        let (context, _) = context(FakeCapabilities::default());
        let mut memory = CartActionMemory::default();

        let result = FunctionRouter
            .route(&FunctionCall::new("getShopDetails", json!({ "shopId": "S4" })), &context, &mut memory)
            .await;

        assert!(result.is_success());
        assert!(memory.current().is_none());
    }

    #[tokio::test]
    async fn invalid_arguments_name_the_function() {
        let (context, capabilities) = context(FakeCapabilities::default());
        let mut memory = CartActionMemory::default();

        let result = FunctionRouter
            .route(&FunctionCall::new("deleteCart", json!({ "shop": 1 })), &context, &mut memory)
            .await;

        let reason = match result {
            FunctionResult::Failure { reason } => reason,
            FunctionResult::Success { .. } => String::new(),
        };
        assert!(reason.starts_with("invalid arguments for deleteCart"));
        assert!(capabilities.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_capability_times_out() {
        let (context, _) = context(FakeCapabilities::default().slow("getAllCarts"));
        let mut memory = CartActionMemory::default();

        let result = FunctionRouter
            .route(&FunctionCall::new("getAllCarts", json!({})), &context, &mut memory)
            .await;

        assert_eq!(result, FunctionResult::failure("getAllCarts timed out after 5s"));
    }

    #[tokio::test]
    async fn place_order_uses_session_address_when_none_given() {
        let (mut context, _) = context(FakeCapabilities::default());
        context.delivery_address = Some(DeliveryAddress {
            id: AddressId("A-7".to_string()),
            label: None,
            coordinate: Coordinate { lat: 1.0, lon: 2.0 },
        });
        let mut memory = CartActionMemory::default();

        let result = FunctionRouter
            .route(&FunctionCall::new("placeOrder", json!({ "shopId": "S1" })), &context, &mut memory)
            .await;

        let payload = match result {
            FunctionResult::Success { payload } => payload,
            FunctionResult::Failure { reason } => json!({ "error": reason }),
        };
        assert_eq!(payload["addressId"], json!("A-7"));
    }

    #[tokio::test]
    async fn place_order_without_any_address_fails() {
        let (context, capabilities) = context(FakeCapabilities::default());
        let mut memory = CartActionMemory::default();

        let result = FunctionRouter
            .route(&FunctionCall::new("placeOrder", json!({ "shopId": "S1" })), &context, &mut memory)
            .await;

        assert!(!result.is_success());
        assert_eq!(capabilities.calls(), vec!["getDefaultAddressId".to_string()]);
    }
}
