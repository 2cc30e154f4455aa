use async_trait::async_trait;
use domain::{Product, ProductId, ProductRef};

use crate::Result;

/// Read access to the product catalog.
///
/// Prices used for orders always come from here, never from the client.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Looks a product up by canonical id.
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>>;

    /// Looks a product up by slug.
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Product>>;

    /// Resolves a cart identifier of either shape.
    ///
    /// Ids that happen to look like slugs (and the reverse) are tried both
    /// ways before giving up.
    async fn resolve(&self, reference: &ProductRef) -> Result<Option<Product>> {
        match reference {
            ProductRef::Id(id) => match self.find_by_id(id).await? {
                Some(product) => Ok(Some(product)),
                None => self.find_by_slug(id.as_str()).await,
            },
            ProductRef::Slug(slug) => match self.find_by_slug(slug).await? {
                Some(product) => Ok(Some(product)),
                None => self.find_by_id(&ProductId::new(slug.as_str())).await,
            },
        }
    }
}
