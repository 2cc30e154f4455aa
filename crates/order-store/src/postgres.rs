use std::collections::HashMap;

use async_trait::async_trait;
use common::OrderId;
use domain::{
    BuyerInfo, Money, NewOrder, Order, OrderItem, OrderStatus, PaymentMethod, Product, ProductId,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderPage, OrderQuery, Result, StoreError,
    catalog::ProductCatalog,
    store::{OrderStore, StatusUpdate, TransitionOutcome, validate_new_order},
};

const ORDER_COLUMNS: &str = "id, status, subtotal_cents, shipping_cents, total_cents, \
     customer_name, customer_email, customer_phone, shipping_address, user_id, \
     payment_method, provider_reference, payment_ref, google_pay_token, created_at, updated_at";

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;

        let payment_method = row
            .try_get::<Option<String>, _>("payment_method")?
            .map(|method| {
                PaymentMethod::parse(&method)
                    .ok_or_else(|| StoreError::InvalidRecord(format!("payment method {method}")))
            })
            .transpose()?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            status,
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            shipping: Money::from_cents(row.try_get("shipping_cents")?),
            total: Money::from_cents(row.try_get("total_cents")?),
            buyer: BuyerInfo {
                customer_name: row.try_get("customer_name")?,
                customer_email: row.try_get("customer_email")?,
                customer_phone: row.try_get("customer_phone")?,
                shipping_address: row.try_get("shipping_address")?,
            },
            user_id: row.try_get("user_id")?,
            payment_method,
            provider_reference: row.try_get("provider_reference")?,
            payment_ref: row.try_get("payment_ref")?,
            google_pay_token: row.try_get("google_pay_token")?,
            items,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        let quantity: i32 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity)
            .map_err(|_| StoreError::InvalidRecord(format!("quantity {quantity}")))?;

        Ok(OrderItem {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            quantity,
            size: row.try_get("size")?,
        })
    }

    /// Loads the items of several orders, keyed by order id, in line order.
    async fn load_items(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, name, price_cents, quantity, size
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position ASC
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let order_id: Uuid = row.try_get("order_id")?;
            items.entry(order_id).or_default().push(Self::row_to_item(row)?);
        }
        Ok(items)
    }

    async fn orders_from_rows(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut items = self.load_items(&ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| Self::row_to_order(row, items.remove(&id).unwrap_or_default()))
            .collect()
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        validate_new_order(&order)?;
        let order = order.into_order();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, status, subtotal_cents, shipping_cents, total_cents,
                customer_name, customer_email, customer_phone, shipping_address, user_id,
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.subtotal.cents())
        .bind(order.shipping.cents())
        .bind(order.total.cents())
        .bind(&order.buyer.customer_name)
        .bind(&order.buyer.customer_email)
        .bind(&order.buyer.customer_phone)
        .bind(&order.buyer.shipping_address)
        .bind(order.user_id.as_deref())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            let quantity = i32::try_from(item.quantity)
                .map_err(|_| StoreError::InvalidRecord(format!("quantity {}", item.quantity)))?;

            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, position, product_id, name, price_cents, quantity, size)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order.id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_str())
            .bind(&item.name)
            .bind(item.price.cents())
            .bind(quantity)
            .bind(item.size.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.orders_from_rows(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_by_provider_reference(&self, reference: &str) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE provider_reference = $1 \
             ORDER BY updated_at DESC LIMIT 1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.orders_from_rows(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage> {
        let mut filter = String::from(" WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic filter
        if query.status.is_some() {
            param_count += 1;
            filter.push_str(&format!(" AND status = ${param_count}"));
        }
        if query.user_id.is_some() {
            param_count += 1;
            filter.push_str(&format!(" AND user_id = ${param_count}"));
        }

        let count_sql = format!("SELECT COUNT(*) FROM orders{filter}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(status) = query.status {
            count_query = count_query.bind(status.as_str());
        }
        if let Some(ref user_id) = query.user_id {
            count_query = count_query.bind(user_id.as_str());
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let select_sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders{filter} ORDER BY created_at DESC, id LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        );
        let mut select_query = sqlx::query(&select_sql);
        if let Some(status) = query.status {
            select_query = select_query.bind(status.as_str());
        }
        if let Some(ref user_id) = query.user_id {
            select_query = select_query.bind(user_id.as_str());
        }
        let rows = select_query
            .bind(i64::from(query.limit))
            .bind(query.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let orders = self.orders_from_rows(rows).await?;
        Ok(OrderPage::new(orders, total.max(0) as u64, &query))
    }

    async fn transition(&self, id: OrderId, update: StatusUpdate) -> Result<TransitionOutcome> {
        let allowed: Vec<&str> = update.allowed_from.iter().map(|s| s.as_str()).collect();

        // Check and write in one statement so concurrent writers serialize on the row
        let row = sqlx::query(&format!(
            r#"
            UPDATE orders SET
                status = $2,
                payment_method = COALESCE($3, payment_method),
                provider_reference = COALESCE($4, provider_reference),
                payment_ref = COALESCE($5, payment_ref),
                google_pay_token = COALESCE($6, google_pay_token),
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($7)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(update.to.as_str())
        .bind(update.payment_method.map(|m| m.as_str()))
        .bind(update.provider_reference.as_deref())
        .bind(update.payment_ref.as_deref())
        .bind(update.google_pay_token.as_ref())
        .bind(allowed)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            let order = self
                .orders_from_rows(vec![row])
                .await?
                .pop()
                .ok_or(StoreError::OrderNotFound(id))?;
            return Ok(TransitionOutcome::Applied(order));
        }

        match self.get_order(id).await? {
            Some(current) => {
                tracing::debug!(
                    order_id = %id,
                    current = %current.status,
                    requested = %update.to,
                    "conditional transition rejected"
                );
                Ok(TransitionOutcome::Rejected { current })
            }
            None => Err(StoreError::OrderNotFound(id)),
        }
    }
}

/// PostgreSQL-backed product catalog.
#[derive(Clone)]
pub struct PostgresProductCatalog {
    pool: PgPool,
}

impl PostgresProductCatalog {
    /// Creates a new catalog on the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or updates a product, keyed by id.
    pub async fn upsert(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, slug, name, price_cents, sizes)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET slug = EXCLUDED.slug, name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents, sizes = EXCLUDED.sizes
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.slug)
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(&product.sizes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get::<String, _>("id")?),
            slug: row.try_get("slug")?,
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            sizes: row.try_get("sizes")?,
        })
    }
}

#[async_trait]
impl ProductCatalog for PostgresProductCatalog {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT id, slug, name, price_cents, sizes FROM products WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_product).transpose()
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        let row =
            sqlx::query("SELECT id, slug, name, price_cents, sizes FROM products WHERE slug = $1")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Self::row_to_product).transpose()
    }
}
