//! Catalog products and cart identifier parsing.

use serde::{Deserialize, Serialize};

use crate::order::{Money, OrderError, OrderItem, ProductId};

/// Largest quantity accepted on one cart line.
pub const MAX_LINE_QUANTITY: u32 = 999;

/// Minimum number of characters after the leading `c` of a canonical id.
const CANONICAL_ID_MIN_BODY: usize = 20;

/// A catalog product, as returned by the product repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    /// Current price in the canonical currency.
    pub price: Money,
    /// Sizes offered; empty when the product comes in one size.
    #[serde(default)]
    pub sizes: Vec<String>,
}

impl Product {
    /// Snapshots this product into an order line.
    ///
    /// Name and price come from the catalog; only quantity and size come from
    /// the cart.
    pub fn order_item(&self, quantity: u32, size: Option<String>) -> Result<OrderItem, OrderError> {
        if quantity == 0 || quantity > MAX_LINE_QUANTITY {
            return Err(OrderError::InvalidQuantity {
                product: self.slug.clone(),
                quantity,
            });
        }

        let size = size.filter(|s| !s.trim().is_empty());
        if let Some(ref size) = size
            && !self.sizes.is_empty()
            && !self.sizes.iter().any(|offered| offered == size)
        {
            return Err(OrderError::InvalidSize {
                product: self.slug.clone(),
                size: size.clone(),
            });
        }

        Ok(OrderItem {
            product_id: self.id.clone(),
            name: self.name.clone(),
            price: self.price,
            quantity,
            size,
        })
    }
}

/// How a cart line names its product.
///
/// Carts may hold either canonical ids or human-readable slugs; the two are
/// told apart by shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductRef {
    Id(ProductId),
    Slug(String),
}

impl ProductRef {
    /// Classifies a raw cart identifier. Returns `None` for a blank value.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if is_canonical_id(raw) {
            Some(ProductRef::Id(ProductId::new(raw)))
        } else {
            Some(ProductRef::Slug(raw.to_string()))
        }
    }

    /// The identifier as the client sent it.
    pub fn as_str(&self) -> &str {
        match self {
            ProductRef::Id(id) => id.as_str(),
            ProductRef::Slug(slug) => slug,
        }
    }
}

impl std::fmt::Display for ProductRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical ids are collision-resistant ids: a `c` followed by at least
/// twenty ASCII letters or digits.
fn is_canonical_id(raw: &str) -> bool {
    let mut chars = raw.chars();
    matches!(chars.next(), Some('c' | 'C'))
        && raw.len() > CANONICAL_ID_MIN_BODY
        && chars.all(|c| c.is_ascii_alphanumeric())
}
