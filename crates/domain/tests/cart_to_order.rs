//! A cart becomes an order snapshot that no longer follows the cart.

use chrono::{NaiveDate, Utc};
use common::{CustomerId, MenuId, Money, OrderId, PaymentId, StoreId};
use domain::{
    AddCartItem, Cart, CartError, Fulfillment, NewOrder, Order, OrderLine, OrderNumber,
    OrderStatus, PaymentOutcome, Transition,
};

fn item(menu_id: MenuId, store_id: StoreId, quantity: i64, price: i64) -> AddCartItem {
    AddCartItem {
        menu_id,
        menu_name: format!("Menu {price}"),
        quantity,
        unit_price: Money::new(price),
        store_id,
    }
}

fn order_from(cart: &Cart, points: i64) -> Order {
    let lines = cart
        .items()
        .iter()
        .map(|i| OrderLine::new(i.menu_id, i.menu_name.clone(), i.quantity, i.unit_price))
        .collect();
    Order::create_pending(
        OrderId::new(),
        OrderNumber::generate(NaiveDate::from_ymd_opt(2024, 12, 15).unwrap()),
        NewOrder {
            customer_id: cart.customer_id(),
            store_id: cart.store_id().unwrap(),
            fulfillment: Fulfillment::Pickup { requests: None },
            use_points: points > 0,
            points_to_use: Money::new(points),
        },
        lines,
        Utc::now(),
    )
    .unwrap()
}

#[test]
fn test_reference_cart_prices_and_settles() {
    let store = StoreId::new();
    let menu_a = MenuId::new();
    let mut cart = Cart::new(CustomerId::new());
    cart.add_item(item(menu_a, store, 1, 8)).unwrap();
    cart.add_item(item(menu_a, store, 1, 8)).unwrap();
    cart.add_item(item(MenuId::new(), store, 1, 7)).unwrap();
    assert_eq!(cart.items().len(), 2);

    let mut order = order_from(&cart, 5);
    assert_eq!(order.total_price(), Money::new(23));
    assert_eq!(order.final_payment_amount(), Money::new(18));

    // Later cart edits do not reach the order
    cart.update_quantity(menu_a, 10).unwrap();
    assert_eq!(order.lines()[0].quantity, 2);

    let pid = PaymentId::new();
    assert_eq!(
        order.complete_payment(pid, Utc::now()),
        Ok(PaymentOutcome::Settled)
    );
    assert_eq!(
        order.complete_payment(PaymentId::new(), Utc::now()),
        Ok(PaymentOutcome::AlreadyPaid)
    );
    assert_eq!(order.payment_id(), Some(pid));
    assert!(matches!(
        order.fail_payment(Utc::now()),
        Transition::Rejected { .. }
    ));
    assert_eq!(order.status(), OrderStatus::Paid);
}

#[test]
fn test_cross_store_line_leaves_cart_unchanged() {
    let mut cart = Cart::new(CustomerId::new());
    cart.add_item(item(MenuId::new(), StoreId::new(), 2, 8)).unwrap();
    let before = cart.clone();

    let result = cart.add_item(item(MenuId::new(), StoreId::new(), 1, 7));
    assert!(matches!(result, Err(CartError::StoreMismatch { .. })));
    assert_eq!(cart, before);
}
