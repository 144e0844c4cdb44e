//! The marketplace `GetItemDetails` query.

use serde_json::{json, Value};

/// Space id of the marketplace the query runs against.
pub const MARKET_SPACE_ID: &str = "0d2ae42d-4c27-4cb7-af6c-2099062302bb";

const ITEM_DETAILS_QUERY: &str = include_str!("item_details.graphql");

/// Request body for one item's market details.
pub fn item_details_request(item_id: &str) -> Value {
    json!({
        "operationName": "GetItemDetails",
        "variables": {
            "spaceId": MARKET_SPACE_ID,
            "itemId": item_id,
            "tradeId": "",
            "fetchTrade": false
        },
        "query": ITEM_DETAILS_QUERY
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_details_request() {
        let body = item_details_request("aee4bdf2-0b54-4c6d-af93-9fe4848e1f76");
        assert_eq!(body["operationName"], "GetItemDetails");
        assert_eq!(body["variables"]["itemId"], "aee4bdf2-0b54-4c6d-af93-9fe4848e1f76");
        assert_eq!(body["variables"]["fetchTrade"], false);

        let query = body["query"].as_str().expect("query text");
        assert!(query.starts_with("query GetItemDetails("));
        assert!(query.contains("fragment MarketDataFragment on MarketableItemMarketData"));
    }
}
