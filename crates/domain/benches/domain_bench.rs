use criterion::{Criterion, criterion_group, criterion_main};
use domain::currency::{self, Currency};
use domain::{BuyerInfo, Money, NewOrder, OrderItem, OrderTotals, ProductRef};

fn sample_items() -> Vec<OrderItem> {
    (0..10)
        .map(|i| {
            OrderItem::new(
                format!("clx0bench0product0000{i:03}"),
                format!("Product {i}"),
                Money::from_cents(1999 + i * 100),
                (i % 3 + 1) as u32,
            )
        })
        .collect()
}

fn bench_format_display(c: &mut Criterion) {
    let amount = Money::from_cents(1_234_567);

    c.bench_function("currency/format_kes", |b| {
        b.iter(|| currency::format_display(amount, Currency::Kes));
    });

    c.bench_function("currency/format_usd", |b| {
        b.iter(|| currency::format_display(amount, Currency::Usd));
    });
}

fn bench_totals(c: &mut Criterion) {
    let items = sample_items();

    c.bench_function("order/totals_10_items", |b| {
        b.iter(|| OrderTotals::for_items(&items));
    });
}

fn bench_new_order(c: &mut Criterion) {
    let buyer = BuyerInfo {
        customer_name: "Bench Buyer".to_string(),
        customer_email: "bench@example.com".to_string(),
        customer_phone: "0712345678".to_string(),
        shipping_address: "Kenyatta Avenue, Nairobi".to_string(),
    };
    let items = sample_items();

    c.bench_function("order/new_order_10_items", |b| {
        b.iter(|| NewOrder::new(buyer.clone(), None, items.clone()).unwrap());
    });
}

fn bench_product_ref(c: &mut Criterion) {
    c.bench_function("product/parse_ref", |b| {
        b.iter(|| {
            ProductRef::parse("clx0radiance0serum000001");
            ProductRef::parse("radiance-serum");
        });
    });
}

criterion_group!(
    benches,
    bench_format_display,
    bench_totals,
    bench_new_order,
    bench_product_ref
);
criterion_main!(benches);
