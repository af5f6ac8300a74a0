use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::address::AddressId;
use crate::domain::cart::{ItemId, ShopId};

/// A model-issued request to invoke a named capability.
///
/// `arguments` holds the payload exactly as the model produced it. Some providers
/// emit arguments as a JSON-encoded string; [`FunctionCall::decoded_arguments`]
/// undoes that before any schema validation or comparison.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Value,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self { name: name.into(), arguments }
    }

    pub fn from_raw(name: impl Into<String>, raw_arguments: &str) -> Self {
        let arguments = serde_json::from_str(raw_arguments)
            .unwrap_or_else(|_| Value::String(raw_arguments.to_string()));
        Self::new(name, arguments)
    }

    pub fn decoded_arguments(&self) -> Value {
        match &self.arguments {
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(decoded @ (Value::Object(_) | Value::Array(_))) => decoded,
                _ => self.arguments.clone(),
            },
            other => other.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FunctionName {
    AddItemToCart,
    AddItemsToCart,
    RemoveItemFromCart,
    UpdateItemQuantity,
    GetCart,
    GetAllCarts,
    DeleteCart,
    GetCurrentLocation,
    GetDefaultAddressId,
    GetShopDetails,
    GetItemDetails,
    ValidateDeliveryAddress,
    SearchItems,
    PlaceOrder,
}

impl FunctionName {
    pub const ALL: [FunctionName; 14] = [
        Self::AddItemToCart,
        Self::AddItemsToCart,
        Self::RemoveItemFromCart,
        Self::UpdateItemQuantity,
        Self::GetCart,
        Self::GetAllCarts,
        Self::DeleteCart,
        Self::GetCurrentLocation,
        Self::GetDefaultAddressId,
        Self::GetShopDetails,
        Self::GetItemDetails,
        Self::ValidateDeliveryAddress,
        Self::SearchItems,
        Self::PlaceOrder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddItemToCart => "addItemToCart",
            Self::AddItemsToCart => "addItemsToCart",
            Self::RemoveItemFromCart => "removeItemFromCart",
            Self::UpdateItemQuantity => "updateItemQuantity",
            Self::GetCart => "getCart",
            Self::GetAllCarts => "getAllCarts",
            Self::DeleteCart => "deleteCart",
            Self::GetCurrentLocation => "getCurrentLocation",
            Self::GetDefaultAddressId => "getDefaultAddressId",
            Self::GetShopDetails => "getShopDetails",
            Self::GetItemDetails => "getItemDetails",
            Self::ValidateDeliveryAddress => "validateDeliveryAddress",
            Self::SearchItems => "searchItems",
            Self::PlaceOrder => "placeOrder",
        }
    }

    /// Calls whose target shops are remembered for later address revalidation.
    pub fn is_cart_mutating(&self) -> bool {
        matches!(
            self,
            Self::AddItemsToCart
                | Self::AddItemToCart
                | Self::RemoveItemFromCart
                | Self::UpdateItemQuantity
                | Self::GetCart
        )
    }

    /// Calls that stream results in pages and are grouped for display.
    pub fn is_incremental_search(&self) -> bool {
        matches!(self, Self::SearchItems)
    }
}

impl std::fmt::Display for FunctionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FunctionName {
    type Err = FunctionSchemaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == value.trim())
            .ok_or_else(|| FunctionSchemaError::UnknownFunction(value.to_string()))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FunctionSchemaError {
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("invalid arguments for {name}: {message}")]
    InvalidArguments { name: FunctionName, message: String },
}

fn default_quantity() -> u32 {
    1
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineArgs {
    pub shop_id: ShopId,
    pub item_id: ItemId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemsToCartArgs {
    pub items: Vec<CartLineArgs>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemArgs {
    pub shop_id: ShopId,
    pub item_id: ItemId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopArgs {
    pub shop_id: ShopId,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionalShopArgs {
    #[serde(default)]
    pub shop_id: Option<ShopId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoArgs {}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateDeliveryAddressArgs {
    pub shop_id: ShopId,
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lon: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchItemsArgs {
    pub query: String,
    #[serde(default)]
    pub page: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderArgs {
    pub shop_id: ShopId,
    #[serde(default)]
    pub address_id: Option<AddressId>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Closed set of callable functions, each with its own argument schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "camelCase")]
pub enum FunctionRequest {
    AddItemToCart(CartLineArgs),
    AddItemsToCart(AddItemsToCartArgs),
    RemoveItemFromCart(CartItemArgs),
    UpdateItemQuantity(CartLineArgs),
    GetCart(OptionalShopArgs),
    GetAllCarts(NoArgs),
    DeleteCart(ShopArgs),
    GetCurrentLocation(NoArgs),
    GetDefaultAddressId(NoArgs),
    GetShopDetails(ShopArgs),
    GetItemDetails(CartItemArgs),
    ValidateDeliveryAddress(ValidateDeliveryAddressArgs),
    SearchItems(SearchItemsArgs),
    PlaceOrder(PlaceOrderArgs),
}

impl FunctionRequest {
    pub fn parse(call: &FunctionCall) -> Result<Self, FunctionSchemaError> {
        let name: FunctionName = call.name.parse()?;
        let arguments = match call.decoded_arguments() {
            Value::Null => json!({}),
            other => other,
        };

        serde_json::from_value(json!({ "name": name.as_str(), "arguments": arguments })).map_err(
            |error| FunctionSchemaError::InvalidArguments { name, message: error.to_string() },
        )
    }

    pub fn name(&self) -> FunctionName {
        match self {
            Self::AddItemToCart(_) => FunctionName::AddItemToCart,
            Self::AddItemsToCart(_) => FunctionName::AddItemsToCart,
            Self::RemoveItemFromCart(_) => FunctionName::RemoveItemFromCart,
            Self::UpdateItemQuantity(_) => FunctionName::UpdateItemQuantity,
            Self::GetCart(_) => FunctionName::GetCart,
            Self::GetAllCarts(_) => FunctionName::GetAllCarts,
            Self::DeleteCart(_) => FunctionName::DeleteCart,
            Self::GetCurrentLocation(_) => FunctionName::GetCurrentLocation,
            Self::GetDefaultAddressId(_) => FunctionName::GetDefaultAddressId,
            Self::GetShopDetails(_) => FunctionName::GetShopDetails,
            Self::GetItemDetails(_) => FunctionName::GetItemDetails,
            Self::ValidateDeliveryAddress(_) => FunctionName::ValidateDeliveryAddress,
            Self::SearchItems(_) => FunctionName::SearchItems,
            Self::PlaceOrder(_) => FunctionName::PlaceOrder,
        }
    }

    /// Shops affected by a cart-mutating call, in first-seen order without duplicates.
    /// Non cart-mutating calls affect no shops.
    pub fn affected_shop_ids(&self) -> Vec<ShopId> {
        match self {
            Self::AddItemsToCart(args) => {
                let mut shop_ids: Vec<ShopId> = Vec::new();
                for line in &args.items {
                    if !shop_ids.contains(&line.shop_id) {
                        shop_ids.push(line.shop_id.clone());
                    }
                }
                shop_ids
            }
            Self::AddItemToCart(CartLineArgs { shop_id, .. })
            | Self::UpdateItemQuantity(CartLineArgs { shop_id, .. })
            | Self::RemoveItemFromCart(CartItemArgs { shop_id, .. }) => vec![shop_id.clone()],
            Self::GetCart(args) => args.shop_id.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

/// Normalized outcome of routing one function call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FunctionResult {
    Success { payload: Value },
    Failure { reason: String },
}

impl FunctionResult {
    pub fn success(payload: Value) -> Self {
        Self::Success { payload }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure { reason: reason.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn into_outcome(self, function_name: impl Into<String>) -> FunctionOutcome {
        let function_name = function_name.into();
        match self {
            Self::Success { payload } => FunctionOutcome { function_name, success: true, payload },
            Self::Failure { reason } => FunctionOutcome {
                function_name,
                success: false,
                payload: json!({ "error": reason }),
            },
        }
    }
}

/// A function result as stored in the turn log: always a complete payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionOutcome {
    pub function_name: String,
    pub success: bool,
    pub payload: Value,
}
