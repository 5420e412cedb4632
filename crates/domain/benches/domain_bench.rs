use chrono::{NaiveDate, Utc};
use common::{CustomerId, MenuId, Money, OrderId, StoreId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{AddCartItem, Cart, Fulfillment, NewOrder, Order, OrderLine, OrderNumber};

fn add_request(menu_id: MenuId, store_id: StoreId) -> AddCartItem {
    AddCartItem {
        menu_id,
        menu_name: "Benchmark Bibimbap".to_string(),
        quantity: 1,
        unit_price: Money::new(9000),
        store_id,
    }
}

fn bench_cart_add_item(c: &mut Criterion) {
    let store_id = StoreId::new();
    let menus: Vec<MenuId> = (0..20).map(|_| MenuId::new()).collect();

    c.bench_function("domain/cart_add_20_lines", |b| {
        b.iter(|| {
            let mut cart = Cart::new(CustomerId::new());
            for menu in &menus {
                cart.add_item(add_request(*menu, store_id)).unwrap();
            }
            cart
        });
    });
}

fn bench_cart_increment_existing(c: &mut Criterion) {
    let store_id = StoreId::new();
    let menu = MenuId::new();
    let mut cart = Cart::new(CustomerId::new());
    cart.add_item(add_request(menu, store_id)).unwrap();

    c.bench_function("domain/cart_increment_existing", |b| {
        b.iter(|| {
            cart.add_item(add_request(menu, store_id)).unwrap();
        });
    });
}

fn bench_create_pending_order(c: &mut Criterion) {
    let date = NaiveDate::from_ymd_opt(2024, 12, 15).unwrap();
    let lines: Vec<OrderLine> = (0..10)
        .map(|i| OrderLine::new(MenuId::new(), format!("Menu {i}"), 2, Money::new(8000)))
        .collect();

    c.bench_function("domain/create_pending_order", |b| {
        b.iter(|| {
            let request = NewOrder {
                customer_id: CustomerId::new(),
                store_id: StoreId::new(),
                fulfillment: Fulfillment::Pickup { requests: None },
                use_points: true,
                points_to_use: Money::new(1500),
            };
            Order::create_pending(
                OrderId::new(),
                OrderNumber::generate(date),
                request,
                lines.clone(),
                Utc::now(),
            )
            .unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_cart_add_item,
    bench_cart_increment_existing,
    bench_create_pending_order
);
criterion_main!(benches);
