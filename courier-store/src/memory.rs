use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use courier_common::model::Template;

use crate::{Result, StoreError, TemplateStore};

/// In-memory template store
///
/// Used by tests and the local harness. Counts lookups and can be switched
/// into an unavailable state to simulate a database outage.
#[derive(Debug, Clone, Default)]
pub struct MemoryTemplateStore {
    templates: Arc<RwLock<HashMap<String, Template>>>,
    lookups: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryTemplateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_templates(templates: impl IntoIterator<Item = Template>) -> Self {
        let store = Self::new();
        for template in templates {
            store.insert(template);
        }
        store
    }

    /// Insert or replace a template
    pub fn insert(&self, template: Template) {
        self.templates
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(template.id.clone(), template);
    }

    pub fn remove(&self, template_id: &str) -> Option<Template> {
        self.templates
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(template_id)
    }

    /// Number of lookups served, including failed ones
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Make every subsequent lookup fail until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn lookup(&self, template_id: &str) -> Result<Option<Template>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store marked unavailable".to_string(),
            ));
        }

        Ok(self.templates.read()?.get(template_id).cloned())
    }
}
