#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mockex::balance_ledger::BalanceLedger;
    use mockex::models::{EngineError, Order, OrderStatus, OrderType, Side, TimeInForce};
    use mockex::order_registry::OrderRegistry;

    fn setup() -> (Arc<BalanceLedger>, OrderRegistry) {
        let ledger = Arc::new(BalanceLedger::new());
        let registry = OrderRegistry::new(ledger.clone());
        (ledger, registry)
    }

    fn new_order(registry: &OrderRegistry, side: Side, price: i64, quantity: u64) -> Order {
        Order {
            id: registry.next_order_id(),
            user_id: 1,
            symbol: "AAPL".to_string(),
            side,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Gfd,
            price,
            quantity,
            filled_quantity: 0,
            status: OrderStatus::Pending,
            created_at: 0,
        }
    }

    #[test]
    fn test_order_ids_start_at_one() {
        let (_, registry) = setup();
        assert_eq!(registry.next_order_id(), 1);
        assert_eq!(registry.next_order_id(), 2);
    }

    #[test]
    fn test_create_and_get_rejects_duplicates() {
        let (_, registry) = setup();
        let order = new_order(&registry, Side::Buy, 15_000, 10);
        registry.create(order.clone()).unwrap();

        let fetched = registry.get(order.id).unwrap();
        assert_eq!(fetched.id, order.id);
        assert_eq!(fetched.status, OrderStatus::Pending);

        let err = registry.create(order).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateOrder { .. }));
        assert!(registry.get(999).is_none());
    }

    #[test]
    fn test_filled_quantity_recomputes_status() {
        let (_, registry) = setup();
        let order = new_order(&registry, Side::Buy, 15_000, 10);
        let id = order.id;
        registry.create(order).unwrap();

        registry.update_filled_quantity(id, 4);
        let order = registry.get(id).unwrap();
        assert_eq!(order.filled_quantity, 4);
        assert_eq!(order.status, OrderStatus::PartiallyFilled);

        registry.update_filled_quantity(id, 6);
        let order = registry.get(id).unwrap();
        assert_eq!(order.filled_quantity, 10);
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn test_user_and_active_order_queries() {
        let (_, registry) = setup();
        let resting = new_order(&registry, Side::Buy, 15_000, 10);
        let other_symbol = Order {
            symbol: "MSFT".to_string(),
            ..new_order(&registry, Side::Sell, 20_000, 5)
        };
        registry.create(resting.clone()).unwrap();
        registry.create(other_symbol).unwrap();

        assert_eq!(registry.user_orders(1).len(), 2);
        assert!(registry.user_orders(2).is_empty());

        let active = registry.active_orders("AAPL");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, resting.id);

        registry.update_status(resting.id, OrderStatus::Filled);
        assert!(registry.active_orders("AAPL").is_empty());
    }

    #[test]
    fn test_cancel_unlocks_buy_remainder() {
        let (ledger, registry) = setup();
        ledger.initialize(1, 1_000_000);
        let order = new_order(&registry, Side::Buy, 15_000, 10);
        let id = order.id;
        ledger.lock(1, 150_000).unwrap();
        registry.create(order).unwrap();

        // Simulate a partial fill: 4 shares spent from the reservation.
        registry.update_filled_quantity(id, 4);
        ledger.complete_trade(1, 15_000 * 4, 15_000 * 4).unwrap();
        ledger.transfer(1, 2, 15_000 * 4).unwrap();

        let cancelled = registry.cancel(id).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let balance = ledger.get(1);
        assert_eq!(balance.locked, 0);
        assert_eq!(balance.available, 1_000_000 - 60_000);
    }

    #[test]
    fn test_cancel_missing_and_terminal_orders() {
        let (_, registry) = setup();
        let err = registry.cancel(77).unwrap_err();
        assert!(matches!(err, EngineError::OrderNotFound { order_id: 77 }));

        let order = new_order(&registry, Side::Sell, 15_000, 10);
        let id = order.id;
        registry.create(order).unwrap();
        registry.update_status(id, OrderStatus::Filled);

        let err = registry.cancel(id).unwrap_err();
        assert!(matches!(err, EngineError::System { .. }));
    }

    #[test]
    fn test_sell_cancel_touches_no_funds() {
        let (ledger, registry) = setup();
        ledger.initialize(1, 500);
        let order = new_order(&registry, Side::Sell, 15_000, 10);
        let id = order.id;
        registry.create(order).unwrap();

        registry.cancel(id).unwrap();
        let balance = ledger.get(1);
        assert_eq!(balance.available, 500);
        assert_eq!(balance.locked, 0);
    }
}
