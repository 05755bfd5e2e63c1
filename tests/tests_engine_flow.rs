#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use mockex::configure::AppConfig;
    use mockex::engine::TradingEngine;
    use mockex::memory_store::MemoryStore;
    use mockex::models::OrderStatus;
    use mockex::snapshot_service::DB_WRITE_QUEUE;
    use mockex::store::EngineStore;

    fn setup() -> (Arc<MemoryStore>, Arc<TradingEngine>) {
        let store = Arc::new(MemoryStore::new());
        let engine = TradingEngine::new(AppConfig::default(), store.clone());
        (store, engine)
    }

    fn place_json(user: u64, side: &str, price: &str, quantity: u64) -> String {
        format!(
            r#"{{"action":"place","userId":{},"symbol":"AAPL","side":"{}","type":"LIMIT","timeInForce":"GFD","price":{},"quantity":{}}}"#,
            user, side, price, quantity
        )
    }

    fn parse_all(messages: Vec<String>) -> Vec<serde_json::Value> {
        messages.iter().map(|m| serde_json::from_str(m).unwrap()).collect()
    }

    #[test]
    fn test_simple_match_end_to_end() {
        let (store, engine) = setup();
        engine.initialize_user_balance(1, 1_000_000);
        engine.initialize_user_balance(2, 1_000_000);

        engine.handle_message(&place_json(1, "BUY", "150.00", 10));
        engine.handle_message(&place_json(2, "SELL", "150.00", 10));

        let trades = parse_all(store.published_on("trades"));
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0]["type"], "trade");
        assert_eq!(trades[0]["tradeId"], 1);
        assert_eq!(trades[0]["buyUserId"], 1);
        assert_eq!(trades[0]["sellUserId"], 2);
        assert_eq!(trades[0]["price"].as_f64().unwrap(), 150.0);
        assert_eq!(trades[0]["quantity"], 10);

        let ticks = parse_all(store.published_on("market_data"));
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0]["type"], "tick");
        assert_eq!(ticks[0]["lastTradePrice"].as_f64().unwrap(), 150.0);
        assert_eq!(ticks[0]["totalVolume"], 10);

        let updates = parse_all(store.published_on("order_updates"));
        assert!(!updates.is_empty());
        let last = updates.last().unwrap();
        assert_eq!(last["status"], "FILLED");

        // Persisted state and the audit queue.
        let order_json = store.get("order:1").unwrap().unwrap();
        let order: serde_json::Value = serde_json::from_str(&order_json).unwrap();
        assert_eq!(order["status"], "FILLED");
        assert!(store.get("trade:1").unwrap().is_some());
        assert_eq!(store.drain_queue(DB_WRITE_QUEUE).len(), 1);

        let buyer = engine.get_user_balance(1);
        assert_eq!(buyer.available, 850_000);
        assert_eq!(buyer.locked, 0);
        let seller = engine.get_user_balance(2);
        assert_eq!(seller.available, 1_150_000);
    }

    #[test]
    fn test_initialize_balance_is_persisted() {
        let (store, engine) = setup();
        engine.initialize_user_balance(7, 123_456);

        let json = store.get("balance:7").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["userId"], 7);
        assert_eq!(value["availableBalance"], 123_456);
        assert_eq!(value["lockedBalance"], 0);
    }

    #[test]
    fn test_insufficient_balance_publishes_error_and_rejects() {
        let (store, engine) = setup();
        engine.initialize_user_balance(1, 100);

        engine.handle_message(&place_json(1, "BUY", "150.00", 10));

        let errors = parse_all(store.published_on("errors"));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["type"], "error");
        assert_eq!(errors[0]["code"], 4);

        // The rejected order is still recorded for status queries.
        let order = engine.get_order_status(1).unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
        assert!(store.published_on("trades").is_empty());
        assert_eq!(engine.get_user_balance(1).available, 100);
    }

    #[test]
    fn test_unfunded_market_buy_publishes_system_error() {
        let (store, engine) = setup();
        engine.initialize_user_balance(1, 0);
        engine.initialize_user_balance(2, 0);

        engine.handle_message(&place_json(2, "SELL", "150.00", 10));
        // Nothing is locked for a market buy, so the shortfall only shows up
        // at settlement: a missed fund-lock invariant (code 7), not the
        // fund-lock-time rejection (code 4).
        engine.handle_message(
            r#"{"action":"place","userId":1,"symbol":"AAPL","side":"BUY","type":"MARKET","quantity":10}"#,
        );

        let errors = parse_all(store.published_on("errors"));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["code"], 7);
        assert!(store.published_on("trades").is_empty());

        // The resting sell is undisturbed.
        let snapshot = engine.get_market_snapshot("AAPL");
        assert_eq!(snapshot.ask_price, 15_000);
        assert_eq!(snapshot.ask_quantity, 10);
    }

    #[test]
    fn test_validation_errors_map_to_stable_codes() {
        let (store, engine) = setup();
        engine.initialize_user_balance(1, 1_000_000);

        let bad_symbol = r#"{"action":"place","userId":1,"symbol":"","side":"BUY","type":"LIMIT","price":150.00,"quantity":10}"#;
        let bad_quantity = place_json(1, "BUY", "150.00", 0);
        let bad_price = place_json(1, "BUY", "0", 10);
        let three_decimals = place_json(1, "BUY", "150.291", 10);
        engine.handle_message(bad_symbol);
        engine.handle_message(&bad_quantity);
        engine.handle_message(&bad_price);
        engine.handle_message(&three_decimals);

        let codes: Vec<u64> = parse_all(store.published_on("errors"))
            .iter()
            .map(|e| e["code"].as_u64().unwrap())
            .collect();
        assert_eq!(codes, vec![1, 2, 3, 3]);
        assert!(store.published_on("trades").is_empty());
    }

    #[test]
    fn test_malformed_json_is_dropped_silently() {
        let (store, engine) = setup();
        engine.handle_message("{not json");
        engine.handle_message(r#"{"action":"teleport"}"#);
        assert!(store.published().is_empty());
    }

    #[test]
    fn test_cancel_flow_unlocks_and_publishes() {
        let (store, engine) = setup();
        engine.initialize_user_balance(1, 1_000_000);

        engine.handle_message(&place_json(1, "BUY", "150.00", 10));
        assert_eq!(engine.get_user_balance(1).locked, 150_000);

        engine.handle_message(r#"{"action":"cancel","orderId":1}"#);

        let order = engine.get_order_status(1).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        let balance = engine.get_user_balance(1);
        assert_eq!(balance.locked, 0);
        assert_eq!(balance.available, 1_000_000);

        let snapshot = engine.get_market_snapshot("AAPL");
        assert_eq!(snapshot.bid_price, 0);

        let updates = parse_all(store.published_on("order_updates"));
        assert_eq!(updates.last().unwrap()["status"], "CANCELLED");
    }

    #[test]
    fn test_cancel_of_unknown_and_terminal_orders() {
        let (store, engine) = setup();
        engine.initialize_user_balance(1, 1_000_000);
        engine.initialize_user_balance(2, 1_000_000);

        engine.handle_message(r#"{"action":"cancel","orderId":99}"#);

        engine.handle_message(&place_json(1, "BUY", "150.00", 10));
        engine.handle_message(&place_json(2, "SELL", "150.00", 10));
        // Order 1 is FILLED by now; cancelling it is client misuse.
        engine.handle_message(r#"{"action":"cancel","orderId":1}"#);

        let codes: Vec<u64> = parse_all(store.published_on("errors"))
            .iter()
            .map(|e| e["code"].as_u64().unwrap())
            .collect();
        assert_eq!(codes, vec![5, 7]);
    }

    #[test]
    fn test_depth_endpoint_shape() {
        let (_, engine) = setup();
        engine.initialize_user_balance(1, 10_000_000);
        engine.handle_message(&place_json(1, "BUY", "150.00", 10));
        engine.handle_message(&place_json(1, "BUY", "149.50", 20));

        let depth = engine.get_order_book_depth("AAPL", 10);
        assert_eq!(depth["type"], "orderbook");
        assert_eq!(depth["symbol"], "AAPL");
        let bids = depth["bids"].as_array().unwrap();
        assert_eq!(bids.len(), 2);
        assert_eq!(bids[0]["price"].as_f64().unwrap(), 150.0);
        assert_eq!(bids[0]["quantity"], 10);
        assert!(depth["asks"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_workers_drain_the_input_queue() {
        let (store, engine) = setup();
        engine.initialize_user_balance(1, 1_000_000);
        engine.initialize_user_balance(2, 1_000_000);

        engine.start().unwrap();
        assert!(engine.is_running());

        store.rpush("order_input_queue", &place_json(1, "BUY", "150.00", 10)).unwrap();
        store.rpush("order_input_queue", &place_json(2, "SELL", "150.00", 10)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(order) = engine.get_order_status(1) {
                if order.status == OrderStatus::Filled {
                    break;
                }
            }
            assert!(Instant::now() < deadline, "orders were not processed in time");
            std::thread::sleep(Duration::from_millis(20));
        }

        engine.stop();
        assert!(!engine.is_running());
        assert_eq!(store.published_on("trades").len(), 1);
    }

    #[test]
    fn test_periodic_snapshot_writes_marker() {
        let store = Arc::new(MemoryStore::new());
        let mut config = AppConfig::default();
        config.engine.snapshot_interval_secs = 1;
        let engine = TradingEngine::new(config, store.clone());
        engine.initialize_user_balance(1, 1_000_000);
        engine.handle_message(&place_json(1, "BUY", "150.00", 10));

        engine.start().unwrap();
        std::thread::sleep(Duration::from_millis(2_500));
        engine.stop();

        let markers = store.keys_with_prefix("snapshot:snapshot_");
        assert!(!markers.is_empty(), "expected at least one snapshot record");

        let record: serde_json::Value =
            serde_json::from_str(&store.get(&markers[0]).unwrap().unwrap()).unwrap();
        assert!(record["timestamp"].as_u64().unwrap() > 0);
        let books = record["books"].as_array().unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0]["symbol"], "AAPL");
        let bids = books[0]["bids"].as_array().unwrap();
        assert_eq!(bids[0]["price"], 15_000);
        assert_eq!(bids[0]["total_quantity"], 10);
        assert_eq!(record["balances"].as_array().unwrap().len(), 1);

        // The per-symbol top-of-book key is refreshed alongside the record.
        let top: serde_json::Value =
            serde_json::from_str(&store.get("orderbook:AAPL").unwrap().unwrap()).unwrap();
        assert_eq!(top["type"], "snapshot");
        assert_eq!(top["bidPrice"].as_f64().unwrap(), 150.0);
        assert_eq!(top["bidQuantity"], 10);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let (_, engine) = setup();
        engine.start().unwrap();
        assert!(engine.start().is_err());
        engine.stop();
    }
}
