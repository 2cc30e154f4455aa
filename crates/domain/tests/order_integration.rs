//! Integration tests for building orders from catalog products.
//!
//! These tests walk a cart through identifier parsing, catalog snapshotting
//! and total calculation the way the checkout orchestrator does.

use domain::currency::{self, Currency};
use domain::{BuyerInfo, Money, NewOrder, OrderError, OrderStatus, Product, ProductId, ProductRef};

fn catalog() -> Vec<Product> {
    vec![
        Product {
            id: ProductId::new("clx0radiance0serum000001"),
            slug: "radiance-serum".to_string(),
            name: "Radiance Serum".to_string(),
            price: Money::from_dollars(68),
            sizes: vec!["30ml".to_string(), "50ml".to_string()],
        },
        Product {
            id: ProductId::new("clx0gentle0cleanser00002"),
            slug: "gentle-cleanser".to_string(),
            name: "Gentle Cleanser".to_string(),
            price: Money::from_dollars(24),
            sizes: vec![],
        },
    ]
}

fn lookup(raw: &str) -> Option<Product> {
    match ProductRef::parse(raw)? {
        ProductRef::Id(id) => catalog().into_iter().find(|p| p.id == id),
        ProductRef::Slug(slug) => catalog().into_iter().find(|p| p.slug == slug),
    }
}

fn buyer() -> BuyerInfo {
    BuyerInfo {
        customer_name: "Achieng Otieno".to_string(),
        customer_email: "achieng@example.com".to_string(),
        customer_phone: "0712345678".to_string(),
        shipping_address: "Ngong Road, Nairobi".to_string(),
    }
}

#[test]
fn slug_and_id_lines_resolve_to_canonical_ids() {
    let serum = lookup("radiance-serum").unwrap();
    let cleanser = lookup("clx0gentle0cleanser00002").unwrap();

    let items = vec![
        serum.order_item(1, Some("30ml".to_string())).unwrap(),
        cleanser.order_item(2, None).unwrap(),
    ];
    let order = NewOrder::new(buyer(), None, items).unwrap().into_order();

    assert_eq!(order.items[0].product_id.as_str(), "clx0radiance0serum000001");
    assert_eq!(order.items[1].product_id.as_str(), "clx0gentle0cleanser00002");
    assert_eq!(order.subtotal, Money::from_dollars(116));
    assert_eq!(order.shipping, Money::zero());
    assert_eq!(order.total, Money::from_dollars(116));
    assert_eq!(order.status, OrderStatus::Pending);
}

#[test]
fn unknown_slug_does_not_resolve() {
    assert!(lookup("vanishing-cream").is_none());
    assert!(lookup("clx0does0not0exist000000").is_none());
}

#[test]
fn single_serum_order_matches_gateway_amount() {
    let serum = lookup("radiance-serum").unwrap();
    let order = NewOrder::new(buyer(), None, vec![serum.order_item(1, None).unwrap()])
        .unwrap()
        .into_order();

    assert_eq!(order.total, Money::from_dollars(68));
    assert_eq!(order.amount_kes(), 10_200);
    assert_eq!(currency::format_display(order.total, Currency::Kes), "KSh 10,200");
    assert_eq!(currency::format_display(order.total, Currency::Usd), "$68.00");
}

#[test]
fn small_cart_pays_flat_shipping() {
    let cleanser = lookup("gentle-cleanser").unwrap();
    let order = NewOrder::new(buyer(), None, vec![cleanser.order_item(1, None).unwrap()])
        .unwrap()
        .into_order();

    assert_eq!(order.subtotal, Money::from_dollars(24));
    assert_eq!(order.shipping, Money::from_dollars(5));
    assert_eq!(order.total, Money::from_dollars(29));
    assert_eq!(order.amount_kes(), 4_350);
}

#[test]
fn total_is_always_subtotal_plus_shipping() {
    let cleanser = lookup("gentle-cleanser").unwrap();
    for quantity in 1..=5 {
        let order = NewOrder::new(buyer(), None, vec![cleanser.order_item(quantity, None).unwrap()])
            .unwrap()
            .into_order();
        assert_eq!(order.total, order.subtotal + currency::shipping_cost(order.subtotal));
    }
}

#[test]
fn empty_cart_is_rejected() {
    assert!(matches!(
        NewOrder::new(buyer(), None, vec![]),
        Err(OrderError::EmptyCart)
    ));
}
