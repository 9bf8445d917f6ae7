//! Template catalog and the single-owner default register.

use std::collections::BTreeMap;

use certify_store::{AssetKind, AssetRef, Template, TemplateFields, TemplateId};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{CertifyError, Result};

/// A template as stored in the catalog, without the default flag.
///
/// Whether a template is the default is answered by the catalog's register,
/// never by the record itself.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TemplateRecord {
    fields: TemplateFields,
    background: Option<AssetRef>,
    signature: Option<AssetRef>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Outcome of removing a template from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedTemplate {
    /// The template as it was before removal.
    pub template: Template,
    /// Whether it held the default register.
    pub was_default: bool,
}

/// The set of certificate templates plus the global default register.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: BTreeMap<TemplateId, TemplateRecord>,
    default_template: Option<TemplateId>,
    next_id: u64,
}

impl TemplateCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a catalog from templates listed by a store.
    ///
    /// If several templates claim the default flag, the lowest id keeps it and
    /// a data-integrity warning is logged.
    #[must_use]
    pub fn from_templates(templates: impl IntoIterator<Item = Template>) -> Self {
        let mut catalog = Self::new();
        let mut claimants = Vec::new();
        for template in templates {
            if template.is_default {
                claimants.push(template.id);
            }
            catalog.insert_existing(template);
        }
        claimants.sort_unstable();
        if claimants.len() > 1 {
            warn!(
                claimants = ?claimants,
                kept = %claimants[0],
                "Data integrity: several templates flagged as default"
            );
        }
        catalog.default_template = claimants.first().copied();
        catalog
    }

    /// Number of templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns `true` if the catalog holds no templates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Returns `true` if the template exists.
    #[must_use]
    pub fn contains(&self, id: TemplateId) -> bool {
        self.templates.contains_key(&id)
    }

    /// Identifier the next created template will receive.
    #[must_use]
    pub const fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Identifier of the default template, if any.
    #[must_use]
    pub const fn default_id(&self) -> Option<TemplateId> {
        self.default_template
    }

    /// Looks up a template.
    #[must_use]
    pub fn get(&self, id: TemplateId) -> Option<Template> {
        self.templates.get(&id).map(|record| self.view(id, record))
    }

    /// Looks up a template, failing with `TemplateNotFound`.
    pub fn require(&self, id: TemplateId) -> Result<Template> {
        self.get(id)
            .ok_or_else(|| CertifyError::template_not_found(id))
    }

    /// The default template, if any.
    #[must_use]
    pub fn default_template(&self) -> Option<Template> {
        self.default_template.and_then(|id| self.get(id))
    }

    /// All templates ordered by id.
    #[must_use]
    pub fn all(&self) -> Vec<Template> {
        self.templates
            .iter()
            .map(|(id, record)| self.view(*id, record))
            .collect()
    }

    /// Template identifiers ordered ascending.
    pub fn ids(&self) -> impl Iterator<Item = TemplateId> + '_ {
        self.templates.keys().copied()
    }

    fn view(&self, id: TemplateId, record: &TemplateRecord) -> Template {
        Template {
            id,
            fields: record.fields.clone(),
            is_default: self.default_template == Some(id),
            background: record.background.clone(),
            signature: record.signature.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    /// Adds a new template with a fresh id.
    ///
    /// The first template of an empty catalog takes the default register.
    pub fn insert(&mut self, fields: TemplateFields) -> Template {
        let id = TemplateId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        let now = Utc::now();
        self.templates.insert(
            id,
            TemplateRecord {
                fields,
                background: None,
                signature: None,
                created_at: now,
                updated_at: now,
            },
        );
        if self.templates.len() == 1 {
            debug!(template_id = %id, "First template becomes the default");
            self.default_template = Some(id);
        }
        self.view(id, &self.templates[&id])
    }

    /// Inserts or replaces a template that already has an id, such as one
    /// returned by a store. Takes the default register if the template is
    /// flagged default.
    pub fn insert_existing(&mut self, template: Template) {
        let id = template.id;
        self.next_id = self.next_id.max(id.0 + 1);
        if template.is_default {
            self.default_template = Some(id);
        } else if self.default_template == Some(id) {
            self.default_template = None;
        }
        self.templates.insert(
            id,
            TemplateRecord {
                fields: template.fields,
                background: template.background,
                signature: template.signature,
                created_at: template.created_at,
                updated_at: template.updated_at,
            },
        );
    }

    /// Replaces the visual fields of a template.
    pub fn update_fields(&mut self, id: TemplateId, fields: TemplateFields) -> Result<Template> {
        let record = self
            .templates
            .get_mut(&id)
            .ok_or_else(|| CertifyError::template_not_found(id))?;
        record.fields = fields;
        record.updated_at = Utc::now();
        self.require(id)
    }

    /// Attaches an uploaded image to a template.
    pub fn set_asset(&mut self, id: TemplateId, asset: AssetRef) -> Result<Template> {
        let record = self
            .templates
            .get_mut(&id)
            .ok_or_else(|| CertifyError::template_not_found(id))?;
        match asset.kind {
            AssetKind::Background => record.background = Some(asset),
            AssetKind::Signature => record.signature = Some(asset),
        }
        record.updated_at = Utc::now();
        self.require(id)
    }

    /// Moves the default register to `id`, returning the previous owner.
    pub fn set_default(&mut self, id: TemplateId) -> Result<Option<TemplateId>> {
        if !self.contains(id) {
            return Err(CertifyError::template_not_found(id));
        }
        Ok(self.default_template.replace(id))
    }

    /// Removes a template, clearing the default register if it held it.
    pub fn remove(&mut self, id: TemplateId) -> Result<RemovedTemplate> {
        let template = self.require(id)?;
        self.templates.remove(&id);
        let was_default = self.default_template == Some(id);
        if was_default {
            self.default_template = None;
        }
        Ok(RemovedTemplate {
            template,
            was_default,
        })
    }

    /// Gives the default register to the lowest remaining template if it is
    /// empty. Returns the promoted id.
    pub fn promote_lowest(&mut self) -> Option<TemplateId> {
        if self.default_template.is_some() {
            return None;
        }
        let promoted = self.templates.keys().next().copied();
        self.default_template = promoted;
        promoted
    }

    /// Restores the id counter, for catalogs loaded from a snapshot.
    pub(crate) fn reserve_ids(&mut self, next_id: u64) {
        self.next_id = self.next_id.max(next_id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fields(name: &str) -> TemplateFields {
        TemplateFields::named(name)
    }

    #[test]
    fn first_template_becomes_default() {
        let mut catalog = TemplateCatalog::new();
        let first = catalog.insert(fields("Classic"));
        let second = catalog.insert(fields("Modern"));

        assert!(first.is_default);
        assert!(!second.is_default);
        assert_eq!(catalog.default_id(), Some(first.id));
        assert_eq!(first.id, TemplateId(1));
        assert_eq!(second.id, TemplateId(2));
    }

    #[test]
    fn set_default_swaps_single_owner() {
        let mut catalog = TemplateCatalog::new();
        let a = catalog.insert(fields("A"));
        let b = catalog.insert(fields("B"));

        let previous = catalog.set_default(b.id).unwrap();

        assert_eq!(previous, Some(a.id));
        assert!(!catalog.get(a.id).unwrap().is_default);
        assert!(catalog.get(b.id).unwrap().is_default);
        assert_eq!(catalog.all().iter().filter(|t| t.is_default).count(), 1);
    }

    #[test]
    fn set_default_unknown_template_fails() {
        let mut catalog = TemplateCatalog::new();
        catalog.insert(fields("A"));
        let err = catalog.set_default(TemplateId(99)).unwrap_err();
        assert!(matches!(err, CertifyError::TemplateNotFound { id } if id == TemplateId(99)));
    }

    #[test]
    fn removing_default_clears_register() {
        let mut catalog = TemplateCatalog::new();
        let a = catalog.insert(fields("A"));
        catalog.insert(fields("B"));

        let removed = catalog.remove(a.id).unwrap();

        assert!(removed.was_default);
        assert_eq!(catalog.default_id(), None);
        assert!(catalog.default_template().is_none());
    }

    #[test]
    fn promote_lowest_fills_empty_register_only() {
        let mut catalog = TemplateCatalog::new();
        let a = catalog.insert(fields("A"));
        let b = catalog.insert(fields("B"));
        let c = catalog.insert(fields("C"));

        assert_eq!(catalog.promote_lowest(), None);

        catalog.remove(a.id).unwrap();
        assert_eq!(catalog.promote_lowest(), Some(b.id));
        assert_eq!(catalog.default_id(), Some(b.id));
        assert_ne!(catalog.default_id(), Some(c.id));
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let mut catalog = TemplateCatalog::new();
        catalog.insert(fields("A"));
        let b = catalog.insert(fields("B"));
        catalog.remove(b.id).unwrap();

        let c = catalog.insert(fields("C"));
        assert_eq!(c.id, TemplateId(3));
    }

    #[test]
    fn from_templates_keeps_lowest_default_claimant() {
        let mut source = TemplateCatalog::new();
        let a = source.insert(fields("A"));
        let b = source.insert(fields("B"));
        let mut listed = source.all();
        // Both claim the flag, as a store with a broken invariant would report.
        for template in &mut listed {
            template.is_default = true;
        }

        let catalog = TemplateCatalog::from_templates(listed);

        assert_eq!(catalog.default_id(), Some(a.id));
        assert!(!catalog.get(b.id).unwrap().is_default);
        assert_eq!(catalog.next_id(), 3);
    }

    #[test]
    fn update_fields_bumps_timestamp() {
        let mut catalog = TemplateCatalog::new();
        let a = catalog.insert(fields("A"));
        std::thread::sleep(std::time::Duration::from_millis(5));

        let updated = catalog
            .update_fields(a.id, fields("A2").with_body("Well done"))
            .unwrap();

        assert_eq!(updated.name(), "A2");
        assert!(updated.updated_at > a.updated_at);
        assert_eq!(updated.created_at, a.created_at);
        assert!(updated.is_default);
    }

    #[test]
    fn set_asset_by_kind() {
        let mut catalog = TemplateCatalog::new();
        let a = catalog.insert(fields("A"));
        let asset = AssetRef {
            kind: AssetKind::Signature,
            file_name: "sig.png".to_string(),
            content_type: "image/png".to_string(),
            size_bytes: 12,
            url: "http://localhost/sig.png".to_string(),
        };

        let updated = catalog.set_asset(a.id, asset.clone()).unwrap();

        assert_eq!(updated.signature, Some(asset));
        assert!(updated.background.is_none());
    }
}
