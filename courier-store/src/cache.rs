use std::time::Duration;

use async_trait::async_trait;
use courier_common::model::Template;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::{Result, TemplateStore};

/// TTL cache in front of another store
///
/// Only templates that were found are cached; misses and errors always go
/// to the inner store. A zero TTL disables caching entirely.
#[derive(Debug)]
pub struct CachedTemplateStore<S> {
    inner: S,
    ttl: Duration,
    entries: DashMap<String, (Instant, Template)>,
}

impl<S: TemplateStore> CachedTemplateStore<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn cached(&self, template_id: &str) -> Option<Template> {
        let entry = self.entries.get(template_id)?;
        let (stored_at, template) = entry.value();
        if stored_at.elapsed() < self.ttl {
            return Some(template.clone());
        }
        drop(entry);

        self.entries.remove(template_id);
        None
    }
}

#[async_trait]
impl<S: TemplateStore> TemplateStore for CachedTemplateStore<S> {
    async fn lookup(&self, template_id: &str) -> Result<Option<Template>> {
        if self.ttl.is_zero() {
            return self.inner.lookup(template_id).await;
        }

        if let Some(template) = self.cached(template_id) {
            tracing::trace!(template_id, "Template served from cache");
            return Ok(Some(template));
        }

        let template = self.inner.lookup(template_id).await?;
        if let Some(template) = &template {
            self.entries
                .insert(template_id.to_string(), (Instant::now(), template.clone()));
        }

        Ok(template)
    }
}
