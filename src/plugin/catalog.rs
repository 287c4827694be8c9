//! Catalog of discovered filters, grouped by category.

use super::descriptor::PluginDescriptor;
use crate::discovery::EnableContext;
use std::collections::BTreeMap;
use std::path::Path;

/// Discovered filters indexed by category and title.
///
/// The catalog provides a central place to:
/// - Group filters for menus
/// - Look a filter up by category and title
/// - List the filters enabled for a document
#[derive(Debug, Default, Clone)]
pub struct PluginCatalog {
    categories: BTreeMap<String, Vec<PluginDescriptor>>,
}

impl PluginCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter.
    ///
    /// A filter with the same category and title replaces the earlier one.
    pub fn insert(&mut self, descriptor: PluginDescriptor) {
        let entries = self
            .categories
            .entry(descriptor.category().to_string())
            .or_default();
        match entries.iter_mut().find(|d| d.title() == descriptor.title()) {
            Some(existing) => {
                tracing::debug!(
                    "{} replaces {} for {}/{}",
                    descriptor.path().display(),
                    existing.path().display(),
                    descriptor.category(),
                    descriptor.title()
                );
                *existing = descriptor;
            }
            None => {
                entries.push(descriptor);
                entries.sort_by(|a, b| a.title().cmp(b.title()));
            }
        }
    }

    /// Remove every filter of the module at `path`.
    ///
    /// Returns the number of filters removed.
    pub fn remove_module(&mut self, path: &Path) -> usize {
        let mut removed = 0;
        self.categories.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|d| d.path() != path);
            removed += before - entries.len();
            !entries.is_empty()
        });
        removed
    }

    /// Category names in order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Filters of `category`, ordered by title.
    pub fn in_category(&self, category: &str) -> &[PluginDescriptor] {
        self.categories
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Look a filter up.
    pub fn find(&self, category: &str, title: &str) -> Option<&PluginDescriptor> {
        self.in_category(category).iter().find(|d| d.title() == title)
    }

    /// Filters offered for a document in state `ctx`.
    pub fn enabled_for<'a>(
        &'a self,
        ctx: &'a EnableContext,
    ) -> impl Iterator<Item = &'a PluginDescriptor> + 'a {
        self.iter().filter(move |d| d.is_enabled_for(ctx))
    }

    /// All filters, by category then title.
    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.categories.values().flatten()
    }

    /// Number of filters.
    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl FromIterator<PluginDescriptor> for PluginCatalog {
    fn from_iter<I: IntoIterator<Item = PluginDescriptor>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for descriptor in iter {
            catalog.insert(descriptor);
        }
        catalog
    }
}
