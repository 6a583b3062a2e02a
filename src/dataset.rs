//! Read-only dataset snapshot and company entity index
//!
//! A snapshot is built once per dataset load and never mutated afterwards.
//! Reloading data means building a new snapshot; share it between worker
//! threads behind an `Arc`.

use crate::matcher::CompanyEntity;
use crate::normalizer;
use crate::record::ExclusionRecord;
use crate::sanctions::{SanctionsEntry, SanctionsList, SanctionsRegister};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

/// Immutable set of exclusion records with a precomputed entity index
#[derive(Debug, Clone)]
pub struct DatasetSnapshot {
    records: Vec<ExclusionRecord>,
    entities: Vec<CompanyEntity>,
    /// normalized entity name -> (entity position, record positions)
    index: HashMap<String, (usize, Vec<usize>)>,
    unattributed: Vec<usize>,
    sanctions: SanctionsRegister,
    fingerprint: String,
}

impl DatasetSnapshot {
    /// Build a snapshot without extra alias folding
    pub fn build(records: Vec<ExclusionRecord>) -> Self {
        DatasetSnapshotBuilder::new().records(records).build()
    }

    pub fn builder() -> DatasetSnapshotBuilder {
        DatasetSnapshotBuilder::new()
    }

    /// Entities sorted by normalized name
    pub fn entities(&self) -> &[CompanyEntity] {
        &self.entities
    }

    pub fn records(&self) -> &[ExclusionRecord] {
        &self.records
    }

    /// Look up an entity by its normalized name
    pub fn entity(&self, normalized_name: &str) -> Option<&CompanyEntity> {
        self.index
            .get(normalized_name)
            .map(|(pos, _)| &self.entities[*pos])
    }

    /// Records attributed to an entity at load time
    pub fn records_for(&self, entity: &CompanyEntity) -> Vec<&ExclusionRecord> {
        self.index
            .get(&entity.normalized_name)
            .map(|(_, rows)| rows.iter().map(|&i| &self.records[i]).collect())
            .unwrap_or_default()
    }

    /// Records whose company name normalizes to nothing
    pub fn unattributed(&self) -> Vec<&ExclusionRecord> {
        self.unattributed.iter().map(|&i| &self.records[i]).collect()
    }

    /// Sanctions names loaded alongside the exclusion records
    pub fn sanctions(&self) -> &SanctionsRegister {
        &self.sanctions
    }

    /// SHA-256 over record and sanctions content, hex encoded
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Builder for [`DatasetSnapshot`]
#[derive(Debug, Default)]
pub struct DatasetSnapshotBuilder {
    records: Vec<ExclusionRecord>,
    /// normalized alias -> normalized target
    aliases: HashMap<String, String>,
    sanctions: Vec<SanctionsEntry>,
}

impl DatasetSnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(mut self, records: Vec<ExclusionRecord>) -> Self {
        self.records.extend(records);
        self
    }

    pub fn record(mut self, record: ExclusionRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Add one name from a sanctions list
    pub fn sanctioned(mut self, list: SanctionsList, name: &str) -> Self {
        self.sanctions.push(SanctionsEntry::new(list, name));
        self
    }

    pub fn sanctions<S: AsRef<str>>(mut self, list: SanctionsList, names: &[S]) -> Self {
        self.sanctions.extend(
            names
                .iter()
                .map(|name| SanctionsEntry::new(list.clone(), name.as_ref())),
        );
        self
    }

    /// Fold every record reported under `alias` into the entity named
    /// `canonical`. Blank names and self-aliases are ignored.
    pub fn alias(mut self, alias: &str, canonical: &str) -> Self {
        let from = normalizer::normalize(alias);
        let to = normalizer::normalize(canonical);
        if !from.is_empty() && !to.is_empty() && from != to {
            self.aliases.insert(from, to);
        }
        self
    }

    pub fn build(self) -> DatasetSnapshot {
        let DatasetSnapshotBuilder {
            records,
            aliases,
            sanctions,
        } = self;

        // normalized key -> (raw name counts, record positions)
        let mut groups: BTreeMap<String, (BTreeMap<String, usize>, Vec<usize>)> = BTreeMap::new();
        let mut unattributed = Vec::new();

        for (i, record) in records.iter().enumerate() {
            let normalized = normalizer::normalize(&record.company_name);
            if normalized.is_empty() {
                unattributed.push(i);
                continue;
            }
            let key = resolve_alias(&aliases, normalized);
            let group = groups.entry(key).or_default();
            *group.0.entry(record.company_name.clone()).or_insert(0) += 1;
            group.1.push(i);
        }

        let mut entities = Vec::with_capacity(groups.len());
        let mut index = HashMap::with_capacity(groups.len());
        for (key, (names, rows)) in groups {
            let canonical = canonical_name(&key, &names);
            let mut entity = CompanyEntity {
                canonical_name: canonical,
                normalized_name: key.clone(),
                aliases: Default::default(),
                normalized_aliases: Default::default(),
            };
            for name in names.keys() {
                entity.add_alias(name);
            }
            index.insert(key, (entities.len(), rows));
            entities.push(entity);
        }

        if !unattributed.is_empty() {
            warn!(
                count = unattributed.len(),
                "exclusion records without a usable company name kept as unattributed"
            );
        }

        let sanctions = SanctionsRegister::build(sanctions);
        let fingerprint = fingerprint(&records, sanctions.entries());
        info!(
            records = records.len(),
            entities = entities.len(),
            sanctioned = sanctions.len(),
            fingerprint = %fingerprint,
            "built dataset snapshot"
        );

        DatasetSnapshot {
            records,
            entities,
            index,
            unattributed,
            sanctions,
            fingerprint,
        }
    }
}

/// Follow alias links to their final target, stopping on cycles
fn resolve_alias(aliases: &HashMap<String, String>, mut key: String) -> String {
    let mut hops = 0;
    while let Some(next) = aliases.get(&key) {
        key = next.clone();
        hops += 1;
        if hops > aliases.len() {
            break;
        }
    }
    key
}

/// Most frequent raw name, preferring names that normalize to the entity key
/// over folded aliases. Ties go to the lexicographically smallest.
fn canonical_name(key: &str, names: &BTreeMap<String, usize>) -> String {
    names
        .iter()
        .map(|(name, count)| (normalizer::normalize(name) == key, *count, name))
        .max_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| b.2.cmp(a.2))
        })
        .map(|(_, _, name)| name.clone())
        .unwrap_or_default()
}

fn fingerprint(records: &[ExclusionRecord], sanctions: &[SanctionsEntry]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        let date = record
            .decision_date
            .map(|d| d.to_string())
            .unwrap_or_default();
        let scope = record.scope.to_string();
        for field in [
            record.company_name.as_str(),
            record.investor_name.as_str(),
            record.investor_country.as_str(),
            record.category.label(),
            record.motivation_text.as_str(),
            scope.as_str(),
            date.as_str(),
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0x1f]);
        }
        for category in &record.additional_categories {
            hasher.update(category.label().as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update([0x1e]);
    }
    for entry in sanctions {
        hasher.update([0x1d]);
        hasher.update(entry.list.name().as_bytes());
        hasher.update([0x1f]);
        hasher.update(entry.name.as_bytes());
    }
    hex::encode(hasher.finalize())
}
