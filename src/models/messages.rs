use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::models::errors::EngineError;
use crate::models::order::{OrderId, OrderType, Price, Quantity, Side, TimeInForce, UserId};

/// `place` action popped from the order input queue.
///
/// Prices arrive as decimals with up to two fractional digits; they are
/// parsed exactly (serde_json arbitrary precision) and converted to integer
/// cents by [`to_price_cents`] — no float multiply is involved.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceRequest {
    pub user_id: UserId,
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    #[serde(default)]
    pub price: Decimal,
    pub quantity: Quantity,
}

/// `cancel` action popped from the order input queue.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub order_id: OrderId,
}

#[derive(Debug, Clone)]
pub enum QueueMessage {
    Place(PlaceRequest),
    Cancel(CancelRequest),
}

impl QueueMessage {
    /// Parse one raw queue message. The `action` field is dispatched by hand
    /// so the decimal `price` field never passes through an internally
    /// tagged enum buffer.
    pub fn from_json(raw: &str) -> Result<Self, String> {
        let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let action = value.get("action").and_then(|a| a.as_str()).map(str::to_owned);
        match action.as_deref() {
            Some("place") => {
                let req: PlaceRequest =
                    serde_json::from_value(value).map_err(|e| e.to_string())?;
                Ok(QueueMessage::Place(req))
            }
            Some("cancel") => {
                let req: CancelRequest =
                    serde_json::from_value(value).map_err(|e| e.to_string())?;
                Ok(QueueMessage::Cancel(req))
            }
            Some(other) => Err(format!("Unknown action: {}", other)),
            None => Err("Missing action field".to_string()),
        }
    }
}

/// Convert a client decimal price to integer cents.
///
/// Rejects negative values and anything with more than two fractional
/// digits; there is no rounding path that could silently change the price.
pub fn to_price_cents(price: Decimal) -> Result<Price, EngineError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(EngineError::InvalidPrice { detail: format!("negative price {}", price) });
    }
    if price.normalize().scale() > 2 {
        return Err(EngineError::InvalidPrice {
            detail: format!("price {} exceeds 2 decimal places", price),
        });
    }
    let cents = price * Decimal::ONE_HUNDRED;
    cents
        .to_i64()
        .ok_or_else(|| EngineError::InvalidPrice { detail: format!("price {} overflows", price) })
}

/// Render an integer-cent price for outbound JSON. Exact for every value
/// representable with two decimals.
pub fn price_to_f64(price: Price) -> f64 {
    price as f64 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_to_price_cents_exact() {
        assert_eq!(to_price_cents(Decimal::from_str("150.00").unwrap()).unwrap(), 15000);
        assert_eq!(to_price_cents(Decimal::from_str("150.29").unwrap()).unwrap(), 15029);
        assert_eq!(to_price_cents(Decimal::from_str("0.01").unwrap()).unwrap(), 1);
        assert_eq!(to_price_cents(Decimal::ZERO).unwrap(), 0);
        assert_eq!(to_price_cents(Decimal::from_str("151").unwrap()).unwrap(), 15100);
    }

    #[test]
    fn test_to_price_cents_rejects_excess_precision() {
        assert!(to_price_cents(Decimal::from_str("150.291").unwrap()).is_err());
        assert!(to_price_cents(Decimal::from_str("-1.00").unwrap()).is_err());
    }

    #[test]
    fn test_price_round_trip() {
        // doubleToPrice(priceToDouble(p)) == p for every p with <= 2 decimals
        for p in [0i64, 1, 99, 100, 15000, 15029, 987654321] {
            let as_f64 = price_to_f64(p);
            let back = to_price_cents(Decimal::from_str(&format!("{:.2}", as_f64)).unwrap());
            assert_eq!(back.unwrap(), p);
        }
    }

    #[test]
    fn test_parse_place_message() {
        let raw = r#"{"action":"place","userId":1,"symbol":"AAPL","side":"BUY",
                      "type":"LIMIT","timeInForce":"IOC","price":150.29,"quantity":10}"#;
        match QueueMessage::from_json(raw).unwrap() {
            QueueMessage::Place(req) => {
                assert_eq!(req.user_id, 1);
                assert_eq!(req.symbol, "AAPL");
                assert_eq!(req.side, Side::Buy);
                assert_eq!(req.order_type, OrderType::Limit);
                assert_eq!(req.time_in_force, TimeInForce::Ioc);
                assert_eq!(to_price_cents(req.price).unwrap(), 15029);
                assert_eq!(req.quantity, 10);
            }
            other => panic!("Expected place, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_defaults_and_cancel() {
        let raw = r#"{"action":"place","userId":2,"symbol":"AAPL","side":"SELL",
                      "type":"MARKET","quantity":5}"#;
        match QueueMessage::from_json(raw).unwrap() {
            QueueMessage::Place(req) => {
                assert_eq!(req.time_in_force, TimeInForce::Gfd);
                assert!(req.price.is_zero());
            }
            other => panic!("Expected place, got {:?}", other),
        }

        let raw = r#"{"action":"cancel","orderId":42}"#;
        match QueueMessage::from_json(raw).unwrap() {
            QueueMessage::Cancel(req) => assert_eq!(req.order_id, 42),
            other => panic!("Expected cancel, got {:?}", other),
        }

        assert!(QueueMessage::from_json(r#"{"action":"noop"}"#).is_err());
        assert!(QueueMessage::from_json("not json").is_err());
    }
}
