use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use clap::Args;
use flowlens_core::config::{parse_timezone, resolve_config};
use flowlens_core::db::{DateRange, SnapshotStore};
use flowlens_core::error::FlowError;
use flowlens_metrics::calc::{AggregateKey, CalculationSession};
use flowlens_metrics::filters::{FilterCache, FlowQuery};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

#[derive(Args, Debug)]
pub struct AggregateArgs {
    /// Aggregate to compute: leadTime, wipAge, inventoryAge, flowEfficiency,
    /// throughput or cfd.
    pub key: String,

    /// Path to the snapshot store.
    #[arg(long)]
    pub db: PathBuf,

    /// Organisation whose work items are measured.
    #[arg(long)]
    pub org: String,

    /// IANA timezone for calendar days. Defaults to the configured timezone.
    #[arg(long)]
    pub tz: Option<String>,

    /// Start of the reporting range (RFC 3339 or YYYY-MM-DD).
    #[arg(long)]
    pub from: Option<String>,

    /// End of the reporting range, inclusive. Defaults to `--as-of`.
    #[arg(long)]
    pub to: Option<String>,

    /// Only include these work item type ids.
    #[arg(long = "type", value_name = "TYPE_ID")]
    pub types: Vec<String>,

    /// Narrow the query with a saved filter.
    #[arg(long)]
    pub filter_tag: Option<String>,

    /// Instant ages are measured to. Defaults to now.
    #[arg(long)]
    pub as_of: Option<String>,

    /// Directory holding `.flowlens/config.toml`. Defaults to the working
    /// directory.
    #[arg(long)]
    pub project: Option<PathBuf>,
}

/// Compute one aggregate for the requested org and query.
///
/// # Errors
///
/// Returns an error for an unknown key, an invalid timezone or date, a
/// missing store or saved filter, or any store failure.
#[instrument(skip_all, fields(key = %args.key, org = %args.org))]
pub fn run_aggregate(args: &AggregateArgs, project_root: &Path) -> Result<serde_json::Value> {
    let key: AggregateKey = args.key.parse()?;
    let config = resolve_config(args.project.as_deref().unwrap_or(project_root))?;
    let timezone = match args.tz.as_deref() {
        Some(name) => parse_timezone(name)?,
        None => config.timeline.timezone()?,
    };

    let query = build_query(args, timezone)?;

    if !args.db.exists() {
        return Err(FlowError::StoreNotFound(args.db.display().to_string()).into());
    }
    let store = SnapshotStore::open(&args.db)?;

    let query = match args.filter_tag.as_deref() {
        Some(tag) => {
            let filter = FilterCache::new()
                .get(&store, &args.org, tag)?
                .ok_or_else(|| anyhow!("no saved filter '{tag}' for org '{}'", args.org))?;
            query.with_saved_filter(&filter)
        }
        None => query,
    };
    debug!(?query, "resolved query");

    CalculationSession::new(&store, query, config).aggregate(key.as_str())
}

fn build_query(args: &AggregateArgs, timezone: Tz) -> Result<FlowQuery> {
    let as_of = match args.as_of.as_deref() {
        Some(value) => parse_instant(value, timezone, Edge::End).context("--as-of")?,
        None => Utc::now(),
    };

    let mut query = FlowQuery::new(args.org.clone(), as_of);
    query.timezone = timezone;
    query.date_range = match (args.from.as_deref(), args.to.as_deref()) {
        (None, None) => None,
        (None, Some(_)) => bail!("--to requires --from"),
        (Some(from), to) => {
            let start = parse_instant(from, timezone, Edge::Start).context("--from")?;
            let end = match to {
                Some(to) => parse_instant(to, timezone, Edge::End).context("--to")?,
                None => as_of,
            };
            Some(DateRange::new(start, end)?)
        }
    };
    if !args.types.is_empty() {
        query.work_item_type_ids = Some(args.types.clone());
    }
    Ok(query)
}

/// Which end of a calendar day a plain date stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Start,
    End,
}

/// Parse an RFC 3339 instant, or a `YYYY-MM-DD` day in `tz`. A day maps to
/// its first instant for [`Edge::Start`] and its last for [`Edge::End`].
fn parse_instant(value: &str, tz: Tz, edge: Edge) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{value}': expected RFC 3339 or YYYY-MM-DD"))?;

    match edge {
        Edge::Start => Ok(local_midnight(date, tz)),
        Edge::End => {
            let next = date
                .succ_opt()
                .with_context(|| format!("date '{value}' is out of range"))?;
            Ok(local_midnight(next, tz) - Duration::microseconds(1))
        }
    }
}

/// First instant of `date` in `tz`. Midnight can fall in a DST gap, in
/// which case the day starts an hour later.
fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map_or_else(|| naive.and_utc(), |ts| ts.with_timezone(&Utc))
}
