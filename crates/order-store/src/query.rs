use domain::{Order, OrderStatus};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Builder for order listing queries.
///
/// Results are ordered newest first. Pages are 1-based; out-of-range values
/// are clamped rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    /// Filter by status.
    pub status: Option<OrderStatus>,

    /// Filter by the account that placed the order.
    pub user_id: Option<String>,

    /// 1-based page number.
    pub page: u32,

    /// Orders per page.
    pub limit: u32,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            status: None,
            user_id: None,
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl OrderQuery {
    /// Creates a query for the first page of all orders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for the orders of one account.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self::new().user_id(user_id)
    }

    /// Filters by status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filters by account.
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Selects a page. Page 0 is treated as page 1.
    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Sets the page size, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Number of orders skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.limit)
    }

    /// Returns true if `order` passes the filters of this query.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if let Some(ref user_id) = self.user_id
            && order.user_id.as_deref() != Some(user_id.as_str())
        {
            return false;
        }
        true
    }
}

/// One page of orders with the totals needed for pagination.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    /// Number of orders matching the filters across all pages.
    pub total: u64,
    pub page: u32,
    pub pages: u32,
}

impl OrderPage {
    /// Assembles a page, computing the page count from the total.
    pub fn new(orders: Vec<Order>, total: u64, query: &OrderQuery) -> Self {
        let limit = u64::from(query.limit.max(1));
        let pages = total.div_ceil(limit);
        Self {
            orders,
            total,
            page: query.page,
            pages: u32::try_from(pages).unwrap_or(u32::MAX),
        }
    }
}
