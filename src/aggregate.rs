//! Onset offset computation and the two frequency aggregation passes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    dataset::Dataset,
    symptoms::{DeathClassifier, KeywordFilter},
    ArcStr, Report, Result,
};

/// Product code sentinel meaning "do not filter by product".
pub const ALL_PRODUCTS: &str = "ALL";

/// Signed whole days between vaccination and event onset.
///
/// `None` when either date is missing; such reports carry no weight in any bin.
/// Negative offsets (onset reported before vaccination) are preserved, not clamped:
/// they are a diagnostically interesting population in their own right.
pub fn onset_offset(report: &Report) -> Option<i64> {
    let vax = report.vax_date?;
    let onset = report.onset_date?;
    Some((onset - vax).num_days())
}

/// Event counts per signed day-offset for one vaccine product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetBin(BTreeMap<i64, u64>);

impl OffsetBin {
    pub fn add(&mut self, offset: i64) {
        *self.0.entry(offset).or_insert(0) += 1;
    }

    pub fn get(&self, offset: i64) -> u64 {
        self.0.get(&offset).copied().unwrap_or(0)
    }

    /// Number of records in this bin. Equals the number of records classified into
    /// the owning product category.
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn min_offset(&self) -> Option<i64> {
        self.0.keys().next().copied()
    }

    pub fn max_offset(&self) -> Option<i64> {
        self.0.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, u64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-product onset distributions. The run artifact of the onset mode; cacheable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyTable(BTreeMap<ArcStr, OffsetBin>);

impl FrequencyTable {
    pub fn add(&mut self, product: ArcStr, offset: i64) {
        self.0.entry(product).or_default().add(offset);
    }

    pub fn get(&self, product: &str) -> Option<&OffsetBin> {
        self.0.get(product)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArcStr, &OffsetBin)> + '_ {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn products(&self) -> impl Iterator<Item = &ArcStr> + '_ {
        self.0.keys()
    }

    /// Products ordered by descending report count.
    pub fn products_by_total(&self) -> Vec<(&ArcStr, u64)> {
        let mut out: Vec<_> = self
            .0
            .iter()
            .map(|(product, bin)| (product, bin.total()))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1));
        out
    }

    /// Smallest and largest offset over all products.
    pub fn offset_extent(&self) -> Option<(i64, i64)> {
        let min = self.0.values().filter_map(OffsetBin::min_offset).min()?;
        let max = self.0.values().filter_map(OffsetBin::max_offset).max()?;
        Some((min, max))
    }
}

/// Occurrence counts per symptom term, plus the reserved total-reports counter.
///
/// Insertion order is recorded so that ranked output is deterministic: ties keep the
/// order terms were first seen this run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomFrequencyTable {
    counts: BTreeMap<ArcStr, u64>,
    order: Vec<ArcStr>,
    reports: u64,
}

impl SymptomFrequencyTable {
    /// Count one qualifying record: the total-reports counter is incremented once,
    /// each distinct term once.
    pub fn add_report(&mut self, terms: impl IntoIterator<Item = ArcStr>) {
        self.reports += 1;
        for term in terms {
            if !self.counts.contains_key(&term) {
                self.order.push(term.clone());
            }
            *self.counts.entry(term).or_insert(0) += 1;
        }
    }

    /// Total qualifying records, regardless of how many symptoms each carried.
    pub fn reports(&self) -> u64 {
        self.reports
    }

    pub fn get(&self, term: &str) -> u64 {
        self.counts.get(term).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty() && self.reports == 0
    }

    /// Terms by descending count; ties keep first-seen order.
    pub fn ranked(&self) -> Vec<(&ArcStr, u64)> {
        let mut out: Vec<_> = self
            .order
            .iter()
            .map(|term| (term, self.counts[term]))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1));
        out
    }
}

/// Which aggregation pipeline a run performs, with its configuration.
#[derive(Debug, Clone)]
pub enum AggregateMode {
    /// Per-product onset distribution, optionally restricted to death reports.
    Onset { death_only: bool },
    /// Per-symptom report frequency over the selected products.
    VaxFreq {
        products: Vec<ArcStr>,
        keywords: Option<KeywordFilter>,
    },
}

impl AggregateMode {
    /// The Result Cache key. Derived from the mode alone, not from the input files:
    /// operators must clear the cache when inputs change.
    pub fn cache_key(&self) -> &'static str {
        match self {
            AggregateMode::Onset { .. } => "onset",
            AggregateMode::VaxFreq { .. } => "vaxfreq",
        }
    }
}

/// Run-local tallies from an onset pass, reported to the operator and never cached.
#[derive(Debug, Default)]
pub struct OnsetAudit {
    pub deaths: DeathClassifier,
    /// Death reports with onset before vaccination (negative offset).
    pub prevax_reports: u64,
}

/// Onset distribution pass: join reports to vaccinations on VAERS_ID, bin signed
/// day-offsets per product. Reports missing either date are silently skipped.
pub fn aggregate_onset(
    table: &mut FrequencyTable,
    audit: &mut OnsetAudit,
    dataset: &Dataset,
    death_only: bool,
) {
    static EMPTY: BTreeSet<ArcStr> = BTreeSet::new();
    for report in dataset.reports.iter() {
        let Some(offset) = onset_offset(report) else {
            continue;
        };
        if death_only {
            let symptoms = dataset.symptoms.get(report.id).unwrap_or(&EMPTY);
            if !audit.deaths.is_death(symptoms) {
                continue;
            }
            if offset < 0 {
                audit.prevax_reports += 1;
            }
        }
        let Some(vax) = dataset.vaccinations.find_by_id(report.id) else {
            continue;
        };
        table.add(vax.vax_type.clone(), offset);
    }
}

/// Symptom frequency pass over records matching the product filter.
///
/// `products` containing [`ALL_PRODUCTS`] disables the filter. A record with no
/// symptom rows still counts toward the reports total when no keyword filter is
/// active.
pub fn aggregate_vaxfreq(
    table: &mut SymptomFrequencyTable,
    dataset: &Dataset,
    products: &[ArcStr],
    keywords: Option<&KeywordFilter>,
) {
    let all = products.iter().any(|p| &**p == ALL_PRODUCTS);
    let mut ids = BTreeSet::new();
    for vax in dataset.vaccinations.iter() {
        if all || products.contains(&vax.vax_type) {
            ids.insert(vax.id);
        }
    }
    for id in ids {
        let symptoms = dataset.symptoms.get(id).cloned().unwrap_or_default();
        let counted = match keywords {
            Some(filter) => match filter.apply(&symptoms) {
                Some(counted) => counted,
                None => continue,
            },
            None => symptoms,
        };
        table.add_report(counted);
    }
}

/// Check a requested product subset against the products present in the data.
///
/// An unknown product is operator error; report the valid set and abort rather than
/// silently rendering an empty chart.
pub fn check_known_products<'a>(
    requested: impl IntoIterator<Item = &'a ArcStr>,
    known: impl IntoIterator<Item = &'a ArcStr>,
) -> Result {
    let known: BTreeSet<&ArcStr> = known.into_iter().collect();
    let unknown: Vec<&ArcStr> = requested
        .into_iter()
        .filter(|p| &***p != ALL_PRODUCTS && !known.contains(p))
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    let mut valid: Vec<&str> = known.iter().map(|p| &***p).collect();
    valid.sort_unstable();
    anyhow::bail!(
        "unknown vaccine product(s) {:?}; valid products are: {}",
        unknown.iter().map(|p| &***p).collect::<Vec<_>>(),
        valid.join(", ")
    )
}
