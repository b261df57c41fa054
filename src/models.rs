use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Domain Models
// ============================================================================
//
// The order aggregate as it travels the wire (JSON) and the cache. Field
// names are fixed by the message format: producers and the durable schema
// both use them verbatim, so renames here are breaking changes.
//
// An order is immutable once ingested. There are no setters and no partial
// representations; every path in the service carries the full aggregate.
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Order {
    pub order_uid: String,
    pub customer_id: String,
    pub track_number: String,
    pub entry: String,
    pub created_at: DateTime<Utc>,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
}

/// Recipient details, 1:1 with the order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

/// Payment details, 1:1 with the order. Monetary amounts are integral
/// minor units; `payment_dt` is a unix timestamp as emitted by the
/// payment provider.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub name: String,
    pub sale: i32,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_deserializes_from_wire_format() {
        let raw = r#"{
            "order_uid": "b563feb7b2b84b6test",
            "customer_id": "test",
            "track_number": "WBILMTESTTRACK",
            "entry": "WBIL",
            "created_at": "2021-11-26T06:22:19Z",
            "delivery": {
                "name": "Test Testov",
                "phone": "+9720000000",
                "zip": "2639809",
                "city": "Kiryat Mozkin",
                "address": "Ploshad Mira 15",
                "region": "Kraiot",
                "email": "test@gmail.com"
            },
            "payment": {
                "transaction": "b563feb7b2b84b6test",
                "request_id": "",
                "currency": "USD",
                "provider": "wbpay",
                "amount": 1817,
                "payment_dt": 1637907727,
                "bank": "alpha",
                "delivery_cost": 1500,
                "goods_total": 317,
                "custom_fee": 0
            },
            "items": [
                {
                    "chrt_id": 9934930,
                    "track_number": "WBILMTESTTRACK",
                    "price": 453,
                    "name": "Mascaras",
                    "sale": 30,
                    "size": "0",
                    "total_price": 317,
                    "nm_id": 2389212,
                    "brand": "Vivienne Sabo",
                    "status": 202
                }
            ]
        }"#;

        let order: Order = serde_json::from_str(raw).unwrap();
        assert_eq!(order.order_uid, "b563feb7b2b84b6test");
        assert_eq!(order.delivery.city, "Kiryat Mozkin");
        assert_eq!(order.payment.amount, 1817);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].chrt_id, 9934930);
    }

    #[test]
    fn order_rejects_missing_required_fields() {
        let raw = r#"{"order_uid": "abc", "customer_id": "test"}"#;
        assert!(serde_json::from_str::<Order>(raw).is_err());
    }
}
