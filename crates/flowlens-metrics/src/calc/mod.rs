//! Metric calculators and the per-request calculation session.
//!
//! # Overview
//!
//! A [`CalculationSession`] owns one request: the provider, an immutable
//! [`FlowQuery`], and the resolved [`FlowConfig`]. Calculators borrow the
//! session, pull populations through it, and return serializable reports.
//!
//! Populations are memoized per [`PopulationKey`] for the life of the
//! session, so a request that asks for several aggregates over the same
//! period reads the store once.

pub mod age;
pub mod cfd;
pub mod flow_efficiency;
pub mod lead_time;
pub mod throughput;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use flowlens_core::config::FlowConfig;
use flowlens_core::db::{SnapshotProvider, WorkItemProvider, WorkItemQuery};
use flowlens_core::error::FlowError;
use flowlens_core::model::{Period, WorkItem};
use flowlens_core::timeline::{TimelineReconstructor, Timelines};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::filters::FlowQuery;

/// Weekly buckets behind every multi-period trend: enough for two
/// four-week windows.
pub const TREND_WEEKS: usize = 8;

/// Local calendar dates a windowed report covers: the query's range, or
/// the trend window ending on `as_of` when there is none.
pub(crate) fn report_window(query: &FlowQuery) -> (NaiveDate, NaiveDate) {
    let local = |ts: DateTime<Utc>| ts.with_timezone(&query.timezone).date_naive();
    match query.date_range {
        Some(range) => (local(range.start()), local(range.end())),
        None => {
            let end = local(query.as_of);
            let days = i64::try_from(TREND_WEEKS * 7).unwrap_or(56);
            (end - Duration::days(days - 1), end)
        }
    }
}

/// Everything a calculator reads from.
pub trait FlowProvider: SnapshotProvider + WorkItemProvider {}

impl<T: SnapshotProvider + WorkItemProvider + ?Sized> FlowProvider for T {}

/// Identity of a cached work item population.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PopulationKey {
    pub org_id: String,
    /// `None` for every item regardless of state category.
    pub period: Option<Period>,
    pub filter_by_date: bool,
}

/// A map filled on first access and dropped with its owner.
#[derive(Debug)]
pub struct MemoCache<K, V> {
    entries: HashMap<K, V>,
}

impl<K, V> Default for MemoCache<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> MemoCache<K, V> {
    /// Return the cached value for `key`, computing it with `load` on a miss.
    ///
    /// # Errors
    ///
    /// Returns `load`'s error; nothing is cached in that case.
    pub fn get_or_try_insert_with(
        &mut self,
        key: K,
        load: impl FnOnce() -> Result<V>,
    ) -> Result<&V> {
        match self.entries.entry(key) {
            std::collections::hash_map::Entry::Occupied(entry) => Ok(entry.into_mut()),
            std::collections::hash_map::Entry::Vacant(entry) => Ok(entry.insert(load()?)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Aggregates [`CalculationSession::aggregate`] can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKey {
    LeadTime,
    WipAge,
    InventoryAge,
    FlowEfficiency,
    Throughput,
    Cfd,
}

impl AggregateKey {
    pub const ALL: [Self; 6] = [
        Self::LeadTime,
        Self::WipAge,
        Self::InventoryAge,
        Self::FlowEfficiency,
        Self::Throughput,
        Self::Cfd,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LeadTime => "leadTime",
            Self::WipAge => "wipAge",
            Self::InventoryAge => "inventoryAge",
            Self::FlowEfficiency => "flowEfficiency",
            Self::Throughput => "throughput",
            Self::Cfd => "cfd",
        }
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateKey {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| FlowError::UnhandledAggregateKey(s.to_string()))
    }
}

/// State for one metrics request.
pub struct CalculationSession<'a, P: FlowProvider + ?Sized> {
    provider: &'a P,
    query: FlowQuery,
    config: FlowConfig,
    populations: MemoCache<PopulationKey, Arc<[WorkItem]>>,
}

impl<'a, P: FlowProvider + ?Sized> CalculationSession<'a, P> {
    #[must_use]
    pub fn new(provider: &'a P, query: FlowQuery, config: FlowConfig) -> Self {
        Self {
            provider,
            query,
            config,
            populations: MemoCache::default(),
        }
    }

    #[must_use]
    pub const fn query(&self) -> &FlowQuery {
        &self.query
    }

    #[must_use]
    pub const fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Number of populations loaded so far.
    #[must_use]
    pub fn cached_populations(&self) -> usize {
        self.populations.len()
    }

    /// Work items for `period`, loaded once per session.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails.
    pub fn population(
        &mut self,
        period: Period,
        filter_by_date: bool,
    ) -> Result<Arc<[WorkItem]>> {
        let query = self.query.work_item_query(period, filter_by_date);
        self.load(Some(period), filter_by_date, &query)
    }

    /// Every work item in the org whatever its current state category,
    /// loaded once per session.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails.
    pub fn all_items(&mut self) -> Result<Arc<[WorkItem]>> {
        let query = self.query.all_items_query();
        self.load(None, false, &query)
    }

    fn load(
        &mut self,
        period: Option<Period>,
        filter_by_date: bool,
        query: &WorkItemQuery,
    ) -> Result<Arc<[WorkItem]>> {
        let key = PopulationKey {
            org_id: self.query.org_id.clone(),
            period,
            filter_by_date,
        };
        let label = period.map_or("all", Period::as_str);
        let provider = self.provider;
        let items = self.populations.get_or_try_insert_with(key, || {
            let items = provider
                .get_work_items(query)
                .with_context(|| format!("load {label} population"))?;
            debug!(period = label, filter_by_date, items = items.len(), "loaded population");
            Ok(Arc::from(items))
        })?;
        Ok(Arc::clone(items))
    }

    /// Reconstructed timelines for the given items.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails.
    pub fn timelines(&self, items: &[WorkItem]) -> Result<Timelines> {
        if items.is_empty() {
            return Ok(Timelines::new());
        }
        let ids = items.iter().map(|item| item.work_item_id.clone()).collect();
        TimelineReconstructor::new(self.provider, self.config.timeline.clone())
            .reconstruct(&self.query.snapshot_query(ids))
    }

    /// Compute one aggregate by key and serialize it.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::UnhandledAggregateKey`] for keys outside
    /// [`AggregateKey::ALL`], or any provider error. Never returns partial
    /// data.
    #[instrument(skip(self), fields(org = %self.query.org_id))]
    pub fn aggregate(&mut self, key: &str) -> Result<serde_json::Value> {
        let key: AggregateKey = key.parse()?;
        let value = match key {
            AggregateKey::LeadTime => serde_json::to_value(lead_time::calculate(self)?),
            AggregateKey::WipAge => serde_json::to_value(age::calculate(self, Period::Present)?),
            AggregateKey::InventoryAge => {
                serde_json::to_value(age::calculate(self, Period::Future)?)
            }
            AggregateKey::FlowEfficiency => {
                serde_json::to_value(flow_efficiency::calculate(self)?)
            }
            AggregateKey::Throughput => serde_json::to_value(throughput::calculate(self)?),
            AggregateKey::Cfd => serde_json::to_value(cfd::calculate(self)?),
        };
        value.with_context(|| format!("serialize {key} aggregate"))
    }
}
