use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One side of an item's order book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceStats {
    pub lowest_price: Option<i64>,
    pub highest_price: Option<i64>,
    pub active_count: Option<i64>,
}

/// Marketplace state of a single item. Every field is independently optional;
/// a response missing one path still yields the others.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub name: Option<String>,
    pub item_type: Option<String>,
    pub tags: Option<Vec<String>>,
    pub buyers: PriceStats,
    pub sellers: PriceStats,
    pub last_sold: Option<i64>,
    pub asset_url: Option<String>,
}

impl MarketSnapshot {
    /// Decode the `GetItemDetails` response body.
    pub fn from_response(body: &Value) -> Self {
        let response = ItemDetailsResponse::deserialize(body).unwrap_or_default();
        let marketable = response
            .data
            .and_then(|d| d.game)
            .and_then(|g| g.marketable_item)
            .unwrap_or_default();
        let item = marketable.item.unwrap_or_default();
        let market = marketable.market_data.unwrap_or_default();

        Self {
            name: item.name,
            item_type: item.item_type,
            tags: item.tags,
            buyers: first_stats(market.buy_stats),
            sellers: first_stats(market.sell_stats),
            last_sold: market
                .last_sold_at
                .and_then(|sales| sales.into_iter().next())
                .and_then(|sale| sale.price),
            asset_url: item.asset_url,
        }
    }

    /// Names of the fields the response did not provide.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let checks = [
            ("name", self.name.is_none()),
            ("type", self.item_type.is_none()),
            ("tags", self.tags.is_none()),
            ("buyers.lowest_price", self.buyers.lowest_price.is_none()),
            ("buyers.highest_price", self.buyers.highest_price.is_none()),
            ("buyers.active_count", self.buyers.active_count.is_none()),
            ("sellers.lowest_price", self.sellers.lowest_price.is_none()),
            ("sellers.highest_price", self.sellers.highest_price.is_none()),
            ("sellers.active_count", self.sellers.active_count.is_none()),
            ("last_sold", self.last_sold.is_none()),
            ("asset_url", self.asset_url.is_none()),
        ];
        checks
            .into_iter()
            .filter_map(|(name, missing)| missing.then_some(name))
            .collect()
    }
}

fn first_stats(stats: Option<Vec<StatsApi>>) -> PriceStats {
    let stats = stats
        .and_then(|s| s.into_iter().next())
        .unwrap_or_default();
    PriceStats {
        lowest_price: stats.lowest_price,
        highest_price: stats.highest_price,
        active_count: stats.active_count,
    }
}

/// Deserialize a field, turning a wrong shape into `None` instead of an error.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

// Internal API response types for parsing

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ItemDetailsResponse {
    #[serde(deserialize_with = "lenient")]
    data: Option<DataApi>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DataApi {
    #[serde(deserialize_with = "lenient")]
    game: Option<GameApi>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GameApi {
    #[serde(rename = "marketableItem", deserialize_with = "lenient")]
    marketable_item: Option<MarketableItemApi>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MarketableItemApi {
    #[serde(deserialize_with = "lenient")]
    item: Option<ItemApi>,
    #[serde(rename = "marketData", deserialize_with = "lenient")]
    market_data: Option<MarketDataApi>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ItemApi {
    #[serde(deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    tags: Option<Vec<String>>,
    #[serde(rename = "type", deserialize_with = "lenient")]
    item_type: Option<String>,
    #[serde(rename = "assetUrl", deserialize_with = "lenient")]
    asset_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MarketDataApi {
    #[serde(rename = "buyStats", deserialize_with = "lenient")]
    buy_stats: Option<Vec<StatsApi>>,
    #[serde(rename = "sellStats", deserialize_with = "lenient")]
    sell_stats: Option<Vec<StatsApi>>,
    #[serde(rename = "lastSoldAt", deserialize_with = "lenient")]
    last_sold_at: Option<Vec<SaleApi>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatsApi {
    #[serde(rename = "lowestPrice", deserialize_with = "lenient")]
    lowest_price: Option<i64>,
    #[serde(rename = "highestPrice", deserialize_with = "lenient")]
    highest_price: Option<i64>,
    #[serde(rename = "activeCount", deserialize_with = "lenient")]
    active_count: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SaleApi {
    #[serde(deserialize_with = "lenient")]
    price: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_response() -> Value {
        json!({
            "data": {
                "game": {
                    "id": "game",
                    "marketableItem": {
                        "id": "item",
                        "item": {
                            "name": "Black Ice R4-C",
                            "tags": ["Character.Ash", "Type.WeaponSkin"],
                            "type": "WeaponSkin",
                            "assetUrl": "https://cdn.example.com/black-ice.png"
                        },
                        "marketData": {
                            "buyStats": [{"lowestPrice": 10, "highestPrice": 4500, "activeCount": 87}],
                            "sellStats": [{"lowestPrice": 5000, "highestPrice": 150000, "activeCount": 12}],
                            "lastSoldAt": [{"price": 4900, "performedAt": "2024-03-05T10:20:30.000Z"}]
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_full_snapshot() {
        let snapshot = MarketSnapshot::from_response(&full_response());
        assert_eq!(snapshot.name.as_deref(), Some("Black Ice R4-C"));
        assert_eq!(snapshot.item_type.as_deref(), Some("WeaponSkin"));
        assert_eq!(snapshot.tags.as_ref().map(Vec::len), Some(2));
        assert_eq!(snapshot.buyers.highest_price, Some(4500));
        assert_eq!(snapshot.buyers.active_count, Some(87));
        assert_eq!(snapshot.sellers.lowest_price, Some(5000));
        assert_eq!(snapshot.last_sold, Some(4900));
        assert!(snapshot.missing_fields().is_empty());
    }

    #[test]
    fn test_missing_market_data_keeps_item_fields() {
        let mut body = full_response();
        body["data"]["game"]["marketableItem"]["marketData"] = Value::Null;

        let snapshot = MarketSnapshot::from_response(&body);
        assert_eq!(snapshot.name.as_deref(), Some("Black Ice R4-C"));
        assert_eq!(snapshot.buyers, PriceStats::default());
        assert_eq!(snapshot.last_sold, None);
        assert!(snapshot.missing_fields().contains(&"last_sold"));
        assert!(!snapshot.missing_fields().contains(&"name"));
    }

    #[test]
    fn test_wrong_shape_only_drops_that_field() {
        let mut body = full_response();
        body["data"]["game"]["marketableItem"]["item"]["tags"] = json!("not-a-list");
        body["data"]["game"]["marketableItem"]["marketData"]["sellStats"][0]["lowestPrice"] =
            json!("cheap");
        body["data"]["game"]["marketableItem"]["marketData"]["lastSoldAt"] = json!([]);

        let snapshot = MarketSnapshot::from_response(&body);
        assert_eq!(snapshot.tags, None);
        assert_eq!(snapshot.sellers.lowest_price, None);
        assert_eq!(snapshot.sellers.highest_price, Some(150000));
        assert_eq!(snapshot.last_sold, None);
        assert_eq!(snapshot.asset_url.as_deref(), Some("https://cdn.example.com/black-ice.png"));
    }

    #[test]
    fn test_unrelated_body_is_empty_snapshot() {
        assert_eq!(MarketSnapshot::from_response(&json!([1, 2, 3])), MarketSnapshot::default());
        assert_eq!(
            MarketSnapshot::from_response(&json!({"data": null})),
            MarketSnapshot::default()
        );
        assert_eq!(MarketSnapshot::default().missing_fields().len(), 11);
    }
}
