//! Template lookup.
//!
//! The dispatcher only ever reads templates. A missing template is not an
//! error (`Ok(None)`); errors are reserved for the store being unreachable
//! or misconfigured.

mod cache;
mod error;
mod memory;
mod postgres;

use async_trait::async_trait;
use courier_common::model::Template;

pub use cache::CachedTemplateStore;
pub use error::{Result, StoreError};
pub use memory::MemoryTemplateStore;
pub use postgres::{DatabaseOptions, PgTemplateStore};

#[async_trait]
pub trait TemplateStore: Send + Sync + std::fmt::Debug {
    /// Look up a template by id
    ///
    /// # Errors
    /// If the store cannot be queried
    async fn lookup(&self, template_id: &str) -> Result<Option<Template>>;
}

#[async_trait]
impl<T: TemplateStore + ?Sized> TemplateStore for std::sync::Arc<T> {
    async fn lookup(&self, template_id: &str) -> Result<Option<Template>> {
        (**self).lookup(template_id).await
    }
}
