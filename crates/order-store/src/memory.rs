use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::OrderId;
use domain::{NewOrder, Order, Product, ProductId};
use tokio::sync::RwLock;

use crate::{
    OrderPage, OrderQuery, Result, StoreError,
    catalog::ProductCatalog,
    store::{OrderStore, StatusUpdate, TransitionOutcome, validate_new_order},
};

/// In-memory order store implementation for testing.
///
/// Transitions hold the write lock across the status check and the update,
/// which gives the same compare-and-set guarantee as the PostgreSQL store.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    fail_transitions: Arc<AtomicBool>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent transition fail with a database error.
    pub fn set_fail_transitions(&self, fail: bool) {
        self.fail_transitions.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        validate_new_order(&order)?;
        let order = order.into_order();
        self.orders.write().await.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_provider_reference(&self, reference: &str) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|o| o.provider_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage> {
        let orders = self.orders.read().await;
        let mut matching: Vec<_> = orders.values().filter(|o| query.matches(o)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok(OrderPage::new(page, total, &query))
    }

    async fn transition(&self, id: OrderId, update: StatusUpdate) -> Result<TransitionOutcome> {
        if self.fail_transitions.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(StoreError::OrderNotFound(id))?;

        if !update.allows(order.status) {
            return Ok(TransitionOutcome::Rejected {
                current: order.clone(),
            });
        }

        update.apply_to(order, Utc::now());
        Ok(TransitionOutcome::Applied(order.clone()))
    }
}

/// In-memory product catalog for testing.
#[derive(Clone, Default)]
pub struct InMemoryProductCatalog {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
}

impl InMemoryProductCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog holding `products`.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let products = products
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect::<HashMap<_, _>>();
        Self {
            products: Arc::new(RwLock::new(products)),
        }
    }

    /// Adds or replaces a product.
    pub async fn insert(&self, product: Product) {
        self.products.write().await.insert(product.id.clone(), product);
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        let products = self.products.read().await;
        Ok(products.values().find(|p| p.slug == slug).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::OrderStoreExt;
    use domain::{BuyerInfo, Money, OrderItem, OrderStatus, PaymentMethod, ProductRef};

    fn buyer() -> BuyerInfo {
        BuyerInfo {
            customer_name: "Njeri".to_string(),
            customer_email: "njeri@example.com".to_string(),
            customer_phone: "0712345678".to_string(),
            shipping_address: "Kenyatta Avenue, Nairobi".to_string(),
        }
    }

    fn new_order(user_id: Option<&str>) -> NewOrder {
        let items = vec![OrderItem::new(
            "clx0radiance0serum000001",
            "Radiance Serum",
            Money::from_dollars(68),
            1,
        )];
        NewOrder::new(buyer(), user_id.map(String::from), items).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryOrderStore::new();
        let created = store.create_order(new_order(None)).await.unwrap();

        let loaded = store.get_order(created.id).await.unwrap().unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.status, OrderStatus::Pending);
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_get_missing_order() {
        let store = InMemoryOrderStore::new();
        assert!(store.get_order(OrderId::new()).await.unwrap().is_none());
        assert!(matches!(
            store.require_order(OrderId::new()).await,
            Err(StoreError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_transition_applies_from_allowed_status() {
        let store = InMemoryOrderStore::new();
        let order = store.create_order(new_order(None)).await.unwrap();

        let outcome = store
            .transition(
                order.id,
                StatusUpdate::new(OrderStatus::Processing)
                    .payment_method(PaymentMethod::Mpesa)
                    .provider_reference("PH-1"),
            )
            .await
            .unwrap();

        assert!(outcome.is_applied());
        let stored = outcome.into_order();
        assert_eq!(stored.status, OrderStatus::Processing);
        assert_eq!(stored.provider_reference.as_deref(), Some("PH-1"));
        assert_eq!(stored.payment_method, Some(PaymentMethod::Mpesa));
    }

    #[tokio::test]
    async fn test_transition_rejected_leaves_order_untouched() {
        let store = InMemoryOrderStore::new();
        let order = store.create_order(new_order(None)).await.unwrap();
        store
            .transition(order.id, StatusUpdate::new(OrderStatus::Cancelled))
            .await
            .unwrap();

        let outcome = store
            .transition(
                order.id,
                StatusUpdate::new(OrderStatus::Paid).payment_ref("RCP-1"),
            )
            .await
            .unwrap();

        assert!(!outcome.is_applied());
        assert_eq!(outcome.order().status, OrderStatus::Cancelled);
        assert!(outcome.order().payment_ref.is_none());
    }

    #[tokio::test]
    async fn test_transition_unknown_order() {
        let store = InMemoryOrderStore::new();
        let result = store
            .transition(OrderId::new(), StatusUpdate::new(OrderStatus::Paid))
            .await;
        assert!(matches!(result, Err(StoreError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_confirmations_apply_once() {
        let store = InMemoryOrderStore::new();
        let order = store.create_order(new_order(None)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .transition(
                        order.id,
                        StatusUpdate::new(OrderStatus::Paid).payment_ref(format!("RCP-{i}")),
                    )
                    .await
                    .unwrap()
                    .is_applied()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn test_failing_transitions() {
        let store = InMemoryOrderStore::new();
        let order = store.create_order(new_order(None)).await.unwrap();
        store.set_fail_transitions(true);

        let result = store
            .transition(order.id, StatusUpdate::new(OrderStatus::Processing))
            .await;
        assert!(matches!(result, Err(StoreError::Database(_))));

        store.set_fail_transitions(false);
        let loaded = store.require_order(order.id).await.unwrap();
        assert_eq!(loaded.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_find_by_provider_reference() {
        let store = InMemoryOrderStore::new();
        let order = store.create_order(new_order(None)).await.unwrap();
        store
            .transition(
                order.id,
                StatusUpdate::new(OrderStatus::Processing).provider_reference("PH-42"),
            )
            .await
            .unwrap();

        let found = store.find_by_provider_reference("PH-42").await.unwrap();
        assert_eq!(found.map(|o| o.id), Some(order.id));
        assert!(store.find_by_provider_reference("PH-0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_orders_filters_and_pages() {
        let store = InMemoryOrderStore::new();
        for _ in 0..3 {
            store.create_order(new_order(Some("user-1"))).await.unwrap();
        }
        store.create_order(new_order(Some("user-2"))).await.unwrap();

        let page = store
            .list_orders(OrderQuery::for_user("user-1").limit(2))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.pages, 2);
        assert_eq!(page.orders.len(), 2);

        let all = store.orders_for_user("user-1").await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let pending = store
            .list_orders(OrderQuery::new().status(OrderStatus::Paid))
            .await
            .unwrap();
        assert_eq!(pending.total, 0);
    }

    #[tokio::test]
    async fn test_catalog_resolves_ids_and_slugs() {
        let catalog = InMemoryProductCatalog::with_products([Product {
            id: ProductId::new("clx0radiance0serum000001"),
            slug: "radiance-serum".to_string(),
            name: "Radiance Serum".to_string(),
            price: Money::from_dollars(68),
            sizes: vec![],
        }]);

        let by_slug = catalog
            .resolve(&ProductRef::parse("radiance-serum").unwrap())
            .await
            .unwrap();
        let by_id = catalog
            .resolve(&ProductRef::parse("clx0radiance0serum000001").unwrap())
            .await
            .unwrap();
        assert_eq!(by_slug, by_id);
        assert!(by_slug.is_some());

        let missing = catalog
            .resolve(&ProductRef::parse("unknown-balm").unwrap())
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
