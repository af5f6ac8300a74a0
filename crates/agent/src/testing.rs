//! In-memory fakes shared by the unit tests of this crate.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use shopmate_core::domain::function::{CartLineArgs, PlaceOrderArgs};
use shopmate_core::{
    AddressId, CartSummary, Coordinate, DeliveryZoneCheck, ItemId, ShopId, TurnEntry,
};

use crate::capabilities::ShoppingCapabilities;
use crate::events::EventSink;
use crate::llm::{ModelContext, ModelReply, ModelService};

#[derive(Clone, Copy, Debug)]
pub enum ZoneBehavior {
    Inside,
    Outside,
    Fails,
    Hangs,
}

#[derive(Default)]
pub struct FakeCapabilities {
    pub calls: Mutex<Vec<String>>,
    pub validated: Mutex<Vec<ShopId>>,
    pub carts: Vec<CartSummary>,
    pub zones: HashMap<ShopId, ZoneBehavior>,
    pub failing: Vec<&'static str>,
    pub slow: Vec<&'static str>,
    pub search_pages: HashMap<u32, Value>,
    pub default_address: Option<AddressId>,
}

impl FakeCapabilities {
    pub fn with_carts(mut self, carts: &[(&str, u32)]) -> Self {
        self.carts = carts
            .iter()
            .map(|(shop, count)| CartSummary { shop_id: shop_id(shop), item_count: *count })
            .collect();
        self
    }

    pub fn with_zone(mut self, shop: &str, behavior: ZoneBehavior) -> Self {
        self.zones.insert(shop_id(shop), behavior);
        self
    }

    pub fn failing(mut self, name: &'static str) -> Self {
        self.failing.push(name);
        self
    }

    pub fn slow(mut self, name: &'static str) -> Self {
        self.slow.push(name);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn validated(&self) -> Vec<ShopId> {
        self.validated.lock().map(|shops| shops.clone()).unwrap_or_default()
    }

    async fn record(&self, name: &'static str) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(name.to_string());
        }
        if self.slow.contains(&name) {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
        }
        if self.failing.contains(&name) {
            return Err(anyhow!("{name} is unavailable"));
        }
        Ok(())
    }
}

pub fn shop_id(value: &str) -> ShopId {
    ShopId(value.to_string())
}

#[async_trait]
impl ShoppingCapabilities for FakeCapabilities {
    async fn add_item_to_cart(
        &self,
        shop_id: &ShopId,
        item_id: &ItemId,
        quantity: u32,
    ) -> Result<Value> {
        self.record("addItemToCart").await?;
        Ok(json!({ "shopId": shop_id.as_str(), "itemId": item_id.as_str(), "quantity": quantity }))
    }

    async fn add_items_to_cart(&self, items: &[CartLineArgs]) -> Result<Value> {
        self.record("addItemsToCart").await?;
        Ok(json!({ "added": items.len() }))
    }

    async fn remove_item_from_cart(&self, shop_id: &ShopId, item_id: &ItemId) -> Result<Value> {
        self.record("removeItemFromCart").await?;
        Ok(json!({ "shopId": shop_id.as_str(), "removed": item_id.as_str() }))
    }

    async fn update_item_quantity(
        &self,
        shop_id: &ShopId,
        item_id: &ItemId,
        quantity: u32,
    ) -> Result<Value> {
        self.record("updateItemQuantity").await?;
        Ok(json!({ "shopId": shop_id.as_str(), "itemId": item_id.as_str(), "quantity": quantity }))
    }

    async fn get_cart(&self, shop_id: Option<&ShopId>) -> Result<Value> {
        self.record("getCart").await?;
        Ok(json!({ "shopId": shop_id.map(ShopId::as_str), "items": [] }))
    }

    async fn get_all_carts(&self) -> Result<Vec<CartSummary>> {
        self.record("getAllCarts").await?;
        Ok(self.carts.clone())
    }

    async fn delete_cart(&self, shop_id: &ShopId) -> Result<Value> {
        self.record("deleteCart").await?;
        Ok(json!({ "deleted": shop_id.as_str() }))
    }

    async fn get_current_location(&self) -> Result<Coordinate> {
        self.record("getCurrentLocation").await?;
        Ok(Coordinate { lat: 52.52, lon: 13.405 })
    }

    async fn get_default_address_id(&self) -> Result<Option<AddressId>> {
        self.record("getDefaultAddressId").await?;
        Ok(self.default_address.clone())
    }

    async fn get_shop_details(&self, shop_id: &ShopId, near: Option<Coordinate>) -> Result<Value> {
        self.record("getShopDetails").await?;
        Ok(json!({ "shopId": shop_id.as_str(), "near": near }))
    }

    async fn get_item_details(&self, shop_id: &ShopId, item_id: &ItemId) -> Result<Value> {
        self.record("getItemDetails").await?;
        Ok(json!({ "shopId": shop_id.as_str(), "itemId": item_id.as_str() }))
    }

    async fn validate_delivery_address(
        &self,
        shop_id: &ShopId,
        _coordinate: Coordinate,
    ) -> Result<DeliveryZoneCheck> {
        if let Ok(mut validated) = self.validated.lock() {
            validated.push(shop_id.clone());
        }
        match self.zones.get(shop_id).copied().unwrap_or(ZoneBehavior::Inside) {
            ZoneBehavior::Inside => Ok(DeliveryZoneCheck { is_within_delivery_zone: true }),
            ZoneBehavior::Outside => Ok(DeliveryZoneCheck { is_within_delivery_zone: false }),
            ZoneBehavior::Fails => Err(anyhow!("geofence service unavailable")),
            ZoneBehavior::Hangs => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok(DeliveryZoneCheck { is_within_delivery_zone: true })
            }
        }
    }

    async fn search_items(
        &self,
        query: &str,
        page: u32,
        _near: Option<Coordinate>,
    ) -> Result<Value> {
        self.record("searchItems").await?;
        Ok(self
            .search_pages
            .get(&page)
            .cloned()
            .unwrap_or_else(|| json!({ "query": query, "page": page, "shops": [] })))
    }

    async fn place_order(&self, order: &PlaceOrderArgs) -> Result<Value> {
        self.record("placeOrder").await?;
        Ok(json!({
            "orderId": "O-1",
            "shopId": order.shop_id.as_str(),
            "addressId": order.address_id.as_ref().map(|id| id.0.clone()),
        }))
    }
}

/// Model that replays a fixed script and records the history lengths it saw.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ModelReply>>>,
    pub partial_chunks: Vec<&'static str>,
    pub seen_history: Mutex<Vec<usize>>,
    pub seen_context: Mutex<Vec<ModelContext>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<ModelReply>>) -> Arc<Self> {
        Arc::new(Self::scripted(replies))
    }

    pub fn scripted(replies: Vec<Result<ModelReply>>) -> Self {
        Self { replies: Mutex::new(replies.into()), ..Self::default() }
    }

    pub fn requests(&self) -> usize {
        self.seen_history.lock().map(|seen| seen.len()).unwrap_or_default()
    }

    fn next_reply(&self, history_len: usize) -> Result<ModelReply> {
        if let Ok(mut seen) = self.seen_history.lock() {
            seen.push(history_len);
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or_else(|| Ok(ModelReply::text("(script exhausted)")))
    }
}

#[async_trait]
impl ModelService for ScriptedModel {
    async fn send(
        &self,
        history: &[TurnEntry],
        _user_text: &str,
        context: &ModelContext,
        stream: &EventSink,
    ) -> Result<ModelReply> {
        if let Ok(mut seen) = self.seen_context.lock() {
            seen.push(context.clone());
        }
        for chunk in &self.partial_chunks {
            stream.partial_text(*chunk).await;
        }
        self.next_reply(history.len())
    }

    async fn continue_with(
        &self,
        history: &[TurnEntry],
        _stream: &EventSink,
    ) -> Result<ModelReply> {
        self.next_reply(history.len())
    }
}
