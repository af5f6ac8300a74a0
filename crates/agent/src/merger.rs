//! Derived display view of a turn log.
//!
//! Paged search calls for the same query are folded into one [`SearchSession`]
//! whose combined result unions shops by `shopId` and their items by `itemId`.
//! The stored log is never modified.

use serde::Serialize;
use serde_json::{Map, Value};
use shopmate_core::{FunctionName, Role, TurnEntry};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayEntry {
    Turn { entry: TurnEntry },
    Search(SearchSession),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSession {
    pub query: String,
    pub call_entry: TurnEntry,
    pub result_entry: Option<TurnEntry>,
    pub pages: u32,
    pub combined_result: Option<Value>,
}

impl SearchSession {
    fn open(query: String, call_entry: TurnEntry) -> Self {
        Self { query, call_entry, result_entry: None, pages: 0, combined_result: None }
    }

    fn absorb_result(&mut self, entry: &TurnEntry) {
        if let Some(outcome) = &entry.function_result {
            if outcome.success {
                self.combined_result = Some(match self.combined_result.take() {
                    Some(existing) => merge_search_payloads(existing, &outcome.payload),
                    None => outcome.payload.clone(),
                });
                self.pages += 1;
            }
        }
        self.result_entry = Some(entry.clone());
    }
}

pub fn derive_view(log: &[TurnEntry]) -> Vec<DisplayEntry> {
    let mut view = Vec::with_capacity(log.len());
    let mut open: Option<SearchSession> = None;

    for entry in log {
        if entry.role == Role::System {
            continue;
        }

        if let Some(query) = search_query(entry) {
            let same_query = open.as_ref().is_some_and(|session| session.query == query);
            if !same_query {
                if let Some(session) = open.take() {
                    view.push(DisplayEntry::Search(session));
                }
                open = Some(SearchSession::open(query, entry.clone()));
            }
            continue;
        }

        if is_search_result(entry) {
            if let Some(session) = open.as_mut() {
                session.absorb_result(entry);
                continue;
            }
        }

        if let Some(session) = open.take() {
            view.push(DisplayEntry::Search(session));
        }
        view.push(DisplayEntry::Turn { entry: entry.clone() });
    }

    if let Some(session) = open {
        view.push(DisplayEntry::Search(session));
    }
    view
}

fn search_query(entry: &TurnEntry) -> Option<String> {
    let call = entry.function_call.as_ref()?;
    let name = call.name.parse::<FunctionName>().ok()?;
    if !name.is_incremental_search() {
        return None;
    }
    let arguments = call.decoded_arguments();
    let query = arguments.get("query").and_then(Value::as_str).unwrap_or_default();
    Some(query.trim().to_lowercase())
}

fn is_search_result(entry: &TurnEntry) -> bool {
    entry
        .function_result
        .as_ref()
        .and_then(|outcome| outcome.function_name.parse::<FunctionName>().ok())
        .is_some_and(|name| name.is_incremental_search())
}

/// Unions `incoming` into `existing`. The first-seen copy of a shop or item wins;
/// other top-level fields take the latest page's value.
pub fn merge_search_payloads(existing: Value, incoming: &Value) -> Value {
    let (Value::Object(mut merged), Value::Object(next)) = (existing, incoming) else {
        return incoming.clone();
    };

    for (key, value) in next {
        if key == "shops" {
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }

    let mut shops = match merged.remove("shops") {
        Some(Value::Array(shops)) => shops,
        _ => Vec::new(),
    };
    if let Some(Value::Array(incoming_shops)) = next.get("shops") {
        for shop in incoming_shops {
            merge_shop(&mut shops, shop);
        }
    }
    merged.insert("shops".to_string(), Value::Array(shops));
    Value::Object(merged)
}

fn merge_shop(shops: &mut Vec<Value>, incoming: &Value) {
    let Some(shop_id) = identity(incoming, "shopId") else {
        shops.push(incoming.clone());
        return;
    };
    let Some(position) = shops.iter().position(|shop| identity(shop, "shopId") == Some(shop_id))
    else {
        shops.push(incoming.clone());
        return;
    };
    let Some(existing) = shops[position].as_object_mut() else {
        return;
    };

    let mut items = match existing.remove("items") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    if let Some(Value::Array(incoming_items)) = incoming.get("items") {
        for item in incoming_items {
            let known = identity(item, "itemId")
                .is_some_and(|item_id| items.iter().any(|seen| identity(seen, "itemId") == Some(item_id)));
            if !known {
                items.push(item.clone());
            }
        }
    }
    existing.insert("items".to_string(), Value::Array(items));
}

fn identity<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    let object: &Map<String, Value> = value.as_object()?;
    object.get(key).or_else(|| object.get("id")).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use shopmate_core::{FunctionCall, FunctionResult, TurnEntry};

    use super::{derive_view, merge_search_payloads, DisplayEntry};

    fn search_call(query: &str, page: u32) -> TurnEntry {
        TurnEntry::assistant_call(FunctionCall::new(
            "searchItems",
            json!({ "query": query, "page": page }),
        ))
    }

    fn search_result(payload: serde_json::Value) -> TurnEntry {
        TurnEntry::function_result(FunctionResult::success(payload).into_outcome("searchItems"))
    }

    #[test]
    fn pages_of_one_query_collapse_into_a_single_session() {
        let log = vec![
            TurnEntry::user("find milk"),
            search_call("milk", 1),
            search_result(json!({ "shops": [
                { "shopId": "S1", "name": "Corner", "items": [{ "itemId": "m1" }] }
            ]})),
            search_call("milk", 2),
            search_result(json!({ "shops": [
                { "shopId": "S1", "name": "Renamed", "items": [{ "itemId": "m1" }, { "itemId": "m2" }] },
                { "shopId": "S2", "items": [{ "itemId": "m9" }] }
            ]})),
            TurnEntry::assistant_text("Here is what I found."),
        ];

        let view = derive_view(&log);
        assert_eq!(view.len(), 3);

        let session = match &view[1] {
            DisplayEntry::Search(session) => session.clone(),
            other => panic!("expected search session, got {other:?}"),
        };
        assert_eq!(session.pages, 2);
        assert_eq!(session.call_entry, log[1]);
        assert_eq!(session.result_entry.as_ref(), Some(&log[4]));
        assert_eq!(
            session.combined_result,
            Some(json!({ "shops": [
                { "shopId": "S1", "name": "Corner", "items": [{ "itemId": "m1" }, { "itemId": "m2" }] },
                { "shopId": "S2", "items": [{ "itemId": "m9" }] }
            ]}))
        );
    }

    #[test]
    fn system_entries_do_not_split_a_session() {
        let log = vec![
            search_call("bread", 1),
            search_result(json!({ "shops": [] })),
            TurnEntry::system("context refreshed"),
            search_call("bread", 2),
            search_result(json!({ "shops": [{ "shopId": "S1", "items": [] }] })),
        ];

        let view = derive_view(&log);
        assert_eq!(view.len(), 1);
        assert!(matches!(&view[0], DisplayEntry::Search(session) if session.pages == 2));
    }

    #[test]
    fn a_different_query_starts_a_new_session() {
        let log = vec![
            search_call("milk", 1),
            search_result(json!({ "shops": [] })),
            search_call("eggs", 1),
            search_result(json!({ "shops": [] })),
        ];

        let queries: Vec<String> = derive_view(&log)
            .into_iter()
            .filter_map(|entry| match entry {
                DisplayEntry::Search(session) => Some(session.query),
                DisplayEntry::Turn { .. } => None,
            })
            .collect();
        assert_eq!(queries, vec!["milk".to_string(), "eggs".to_string()]);
    }

    #[test]
    fn failed_page_is_not_merged() {
        let log = vec![
            search_call("tea", 1),
            search_result(json!({ "shops": [{ "shopId": "S1", "items": [] }] })),
            search_call("tea", 2),
            TurnEntry::function_result(
                FunctionResult::failure("search backend down").into_outcome("searchItems"),
            ),
        ];

        let view = derive_view(&log);
        let DisplayEntry::Search(session) = &view[0] else {
            panic!("expected search session");
        };
        assert_eq!(session.pages, 1);
        assert_eq!(session.result_entry.as_ref(), Some(&log[3]));
        assert_eq!(session.combined_result, Some(json!({ "shops": [{ "shopId": "S1", "items": [] }] })));
    }

    #[test]
    fn log_without_searches_passes_through_in_order() {
        let log = vec![TurnEntry::user("hi"), TurnEntry::assistant_text("hello")];
        let view = derive_view(&log);
        assert_eq!(
            view,
            vec![
                DisplayEntry::Turn { entry: log[0].clone() },
                DisplayEntry::Turn { entry: log[1].clone() },
            ]
        );
    }

    #[test]
    fn non_object_payload_is_replaced() {
        assert_eq!(merge_search_payloads(json!([1]), &json!({ "shops": [] })), json!({ "shops": [] }));
    }
}
