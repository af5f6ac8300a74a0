use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use shopmate_core::domain::function::{CartLineArgs, PlaceOrderArgs};
use shopmate_core::{AddressId, CartSummary, Coordinate, DeliveryZoneCheck, ItemId, ShopId};

/// Backend operations the assistant may invoke on the model's behalf.
///
/// Implementations own persistence, pricing, and geofencing. Payloads returned as
/// [`Value`] are passed to the model untouched; typed returns are the ones the
/// orchestrator itself reasons about.
#[async_trait]
pub trait ShoppingCapabilities: Send + Sync {
    async fn add_item_to_cart(
        &self,
        shop_id: &ShopId,
        item_id: &ItemId,
        quantity: u32,
    ) -> Result<Value>;

    async fn add_items_to_cart(&self, items: &[CartLineArgs]) -> Result<Value>;

    async fn remove_item_from_cart(&self, shop_id: &ShopId, item_id: &ItemId) -> Result<Value>;

    async fn update_item_quantity(
        &self,
        shop_id: &ShopId,
        item_id: &ItemId,
        quantity: u32,
    ) -> Result<Value>;

    async fn get_cart(&self, shop_id: Option<&ShopId>) -> Result<Value>;

    async fn get_all_carts(&self) -> Result<Vec<CartSummary>>;

    async fn delete_cart(&self, shop_id: &ShopId) -> Result<Value>;

    async fn get_current_location(&self) -> Result<Coordinate>;

    async fn get_default_address_id(&self) -> Result<Option<AddressId>>;

    async fn get_shop_details(&self, shop_id: &ShopId, near: Option<Coordinate>) -> Result<Value>;

    async fn get_item_details(&self, shop_id: &ShopId, item_id: &ItemId) -> Result<Value>;

    async fn validate_delivery_address(
        &self,
        shop_id: &ShopId,
        coordinate: Coordinate,
    ) -> Result<DeliveryZoneCheck>;

    /// One page of an incremental search. Payload shape:
    /// `{ "shops": [ { "shopId": .., "items": [ { "itemId": .. } ] } ] }`.
    async fn search_items(&self, query: &str, page: u32, near: Option<Coordinate>)
        -> Result<Value>;

    /// `order.address_id` is always resolved before this is called.
    async fn place_order(&self, order: &PlaceOrderArgs) -> Result<Value>;
}
