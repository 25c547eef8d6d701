//! Exporter-scoped template storage.

use std::{fmt, net::SocketAddr, sync::Arc};

use dashmap::DashMap;
use serde::Serialize;

use super::{OptionsTemplateRecord, TemplateRecord};
use crate::config::LookupPrecedence;

/// Identity of the device and observation domain that chose a set of template IDs.
///
/// NetFlow v9 packets use their Source ID as the observation domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExporterKey {
    pub address: SocketAddr,
    pub observation_domain_id: u32,
}

impl ExporterKey {
    pub const fn new(address: SocketAddr, observation_domain_id: u32) -> Self {
        Self {
            address,
            observation_domain_id,
        }
    }
}

impl fmt::Display for ExporterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.observation_domain_id)
    }
}

/// A cached template a Data FlowSet was bound to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoundTemplate {
    Template(Arc<TemplateRecord>),
    Options(Arc<OptionsTemplateRecord>),
}

impl BoundTemplate {
    pub fn template_id(&self) -> u16 {
        match self {
            Self::Template(template) => template.template_id,
            Self::Options(template) => template.template_id,
        }
    }
}

/// Result of storing a template.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Replaced,
    /// The cache is at `max_templates` and the key was not already present.
    Rejected { limit: usize },
}

type Key = (ExporterKey, u16);

#[derive(Debug, Default)]
struct Inner {
    templates: DashMap<Key, Arc<TemplateRecord>>,
    options: DashMap<Key, Arc<OptionsTemplateRecord>>,
    max_templates: Option<usize>,
}

/// Shared handle to the templates learned from every exporter.
///
/// Entries are held behind `Arc` and replaced whole, so a lookup racing a
/// redefinition observes either the previous or the new template. Entries are
/// only removed by withdrawal or [`TemplateCache::remove_exporter`].
///
/// Templates of one exporter must be stored and looked up in packet arrival
/// order; processing an exporter's packets on a single task guarantees this.
#[derive(Clone, Debug, Default)]
pub struct TemplateCache {
    inner: Arc<Inner>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bound is checked before insertion, so concurrent writers may overshoot it slightly.
    pub fn with_max_templates(limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_templates: Some(limit),
                ..Default::default()
            }),
        }
    }

    fn admits(&self, present: bool) -> Result<(), usize> {
        match self.inner.max_templates {
            Some(limit) if !present && self.len() >= limit => Err(limit),
            _ => Ok(()),
        }
    }

    pub fn put_template(&self, exporter: ExporterKey, template: TemplateRecord) -> PutOutcome {
        let key = (exporter, template.template_id);
        if let Err(limit) = self.admits(self.inner.templates.contains_key(&key)) {
            return PutOutcome::Rejected { limit };
        }
        match self.inner.templates.insert(key, Arc::new(template)) {
            Some(_) => PutOutcome::Replaced,
            None => PutOutcome::Inserted,
        }
    }

    pub fn put_options_template(
        &self,
        exporter: ExporterKey,
        template: OptionsTemplateRecord,
    ) -> PutOutcome {
        let key = (exporter, template.template_id);
        if let Err(limit) = self.admits(self.inner.options.contains_key(&key)) {
            return PutOutcome::Rejected { limit };
        }
        match self.inner.options.insert(key, Arc::new(template)) {
            Some(_) => PutOutcome::Replaced,
            None => PutOutcome::Inserted,
        }
    }

    pub fn get_template(
        &self,
        exporter: &ExporterKey,
        template_id: u16,
    ) -> Option<Arc<TemplateRecord>> {
        self.inner
            .templates
            .get(&(*exporter, template_id))
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn get_options_template(
        &self,
        exporter: &ExporterKey,
        template_id: u16,
    ) -> Option<Arc<OptionsTemplateRecord>> {
        self.inner
            .options
            .get(&(*exporter, template_id))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Binds a Data FlowSet ID to a cached template, consulting the two
    /// namespaces in `precedence` order.
    pub fn resolve(
        &self,
        exporter: &ExporterKey,
        template_id: u16,
        precedence: LookupPrecedence,
    ) -> Option<BoundTemplate> {
        let template = || {
            self.get_template(exporter, template_id)
                .map(BoundTemplate::Template)
        };
        let options = || {
            self.get_options_template(exporter, template_id)
                .map(BoundTemplate::Options)
        };
        match precedence {
            LookupPrecedence::OptionsFirst => options().or_else(template),
            LookupPrecedence::TemplatesFirst => template().or_else(options),
        }
    }

    pub fn withdraw_template(&self, exporter: &ExporterKey, template_id: u16) -> bool {
        self.inner
            .templates
            .remove(&(*exporter, template_id))
            .is_some()
    }

    pub fn withdraw_options_template(&self, exporter: &ExporterKey, template_id: u16) -> bool {
        self.inner
            .options
            .remove(&(*exporter, template_id))
            .is_some()
    }

    /// Removes every template of `exporter`, returning how many were dropped.
    pub fn withdraw_all_templates(&self, exporter: &ExporterKey) -> usize {
        retain_others(&self.inner.templates, exporter)
    }

    pub fn withdraw_all_options_templates(&self, exporter: &ExporterKey) -> usize {
        retain_others(&self.inner.options, exporter)
    }

    /// Forgets everything learned from `exporter` in both namespaces.
    pub fn remove_exporter(&self, exporter: &ExporterKey) -> usize {
        self.withdraw_all_templates(exporter) + self.withdraw_all_options_templates(exporter)
    }

    /// Number of cached templates across both namespaces.
    pub fn len(&self) -> usize {
        self.inner.templates.len() + self.inner.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn retain_others<V>(map: &DashMap<Key, V>, exporter: &ExporterKey) -> usize {
    let before = map.len();
    map.retain(|(owner, _), _| owner != exporter);
    before.saturating_sub(map.len())
}

#[cfg(test)]
mod tests {
    use std::thread;

    use similar_asserts::assert_eq;

    use super::*;
    use crate::{netflow::FieldSpecifier, test_util::exporter};

    fn template(id: u16, field_types: &[u16]) -> TemplateRecord {
        TemplateRecord::new(
            id,
            field_types
                .iter()
                .map(|field_type| FieldSpecifier::new(*field_type, 4))
                .collect(),
        )
    }

    #[test]
    fn put_and_get() {
        let cache = TemplateCache::new();
        let a = exporter(1, 0);

        assert_eq!(cache.get_template(&a, 256), None);
        assert_eq!(cache.put_template(a, template(256, &[8, 12])), PutOutcome::Inserted);
        assert_eq!(
            cache.get_template(&a, 256).as_deref(),
            Some(&template(256, &[8, 12]))
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn templates_are_scoped_by_exporter_and_domain() {
        let cache = TemplateCache::new();
        let a = exporter(1, 0);
        let b = exporter(2, 0);
        let a_other_domain = exporter(1, 7);

        cache.put_template(a, template(256, &[8]));
        cache.put_template(b, template(256, &[12, 7]));

        assert_eq!(cache.get_template(&a, 256).unwrap().field_count(), 1);
        assert_eq!(cache.get_template(&b, 256).unwrap().field_count(), 2);
        assert_eq!(cache.get_template(&a_other_domain, 256), None);
    }

    #[test]
    fn redefinition_replaces() {
        let cache = TemplateCache::new();
        let a = exporter(1, 0);

        let before = {
            cache.put_template(a, template(256, &[8]));
            cache.get_template(&a, 256).unwrap()
        };
        assert_eq!(cache.put_template(a, template(256, &[8, 12])), PutOutcome::Replaced);

        // Holders of the previous definition keep it intact.
        assert_eq!(before.field_count(), 1);
        assert_eq!(cache.get_template(&a, 256).unwrap().field_count(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn namespaces_are_distinct() {
        let cache = TemplateCache::new();
        let a = exporter(1, 0);
        let options = OptionsTemplateRecord::new(
            256,
            vec![FieldSpecifier::new(1, 4)],
            vec![FieldSpecifier::new(34, 4)],
        );

        cache.put_template(a, template(256, &[8]));
        cache.put_options_template(a, options.clone());
        assert_eq!(cache.len(), 2);

        assert_eq!(
            cache.resolve(&a, 256, LookupPrecedence::OptionsFirst),
            Some(BoundTemplate::Options(Arc::new(options)))
        );
        assert_eq!(
            cache.resolve(&a, 256, LookupPrecedence::TemplatesFirst),
            Some(BoundTemplate::Template(Arc::new(template(256, &[8]))))
        );
        assert_eq!(cache.resolve(&a, 257, LookupPrecedence::OptionsFirst), None);
        assert_eq!(
            cache
                .resolve(&a, 256, LookupPrecedence::TemplatesFirst)
                .map(|bound| bound.template_id()),
            Some(256)
        );
    }

    #[test]
    fn withdrawals_and_teardown() {
        let cache = TemplateCache::new();
        let a = exporter(1, 0);
        let b = exporter(2, 0);

        for id in 256..260 {
            cache.put_template(a, template(id, &[8]));
        }
        cache.put_template(b, template(256, &[8]));
        cache.put_options_template(
            a,
            OptionsTemplateRecord::new(300, vec![FieldSpecifier::new(1, 4)], vec![]),
        );

        assert!(cache.withdraw_template(&a, 256));
        assert!(!cache.withdraw_template(&a, 256));
        assert_eq!(cache.withdraw_all_templates(&a), 3);
        assert_eq!(cache.get_template(&b, 256).map(|t| t.template_id), Some(256));
        assert_eq!(cache.remove_exporter(&a), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn limit_refuses_new_keys_only() {
        let cache = TemplateCache::with_max_templates(2);
        let a = exporter(1, 0);

        assert_eq!(cache.put_template(a, template(256, &[8])), PutOutcome::Inserted);
        assert_eq!(cache.put_template(a, template(257, &[8])), PutOutcome::Inserted);
        assert_eq!(
            cache.put_template(a, template(258, &[8])),
            PutOutcome::Rejected { limit: 2 }
        );
        assert_eq!(
            cache.put_template(a, template(257, &[8, 12])),
            PutOutcome::Replaced
        );
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_readers_never_observe_partial_templates() {
        let cache = TemplateCache::new();
        let a = exporter(1, 0);
        cache.put_template(a, template(256, &[8]));

        let writer = {
            let cache = cache.clone();
            thread::spawn(move || {
                for round in 0..500u16 {
                    let width = 1 + (round % 8) as usize;
                    cache.put_template(a, template(256, &vec![8; width]));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let current = cache.get_template(&a, 256).unwrap();
                        assert!((1..=8).contains(&current.field_count()));
                        assert!(current.fields.iter().all(|f| f.field_type() == 8));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
