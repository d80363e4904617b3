//! SQLite read schema for the snapshot store.
//!
//! Only the read contract the engine needs:
//! - `work_items` holds the current state of each item, including the
//!   arrival/commitment/departure anchors the metrics are computed from
//! - `snapshots` holds one row per observed day; duplicates are allowed
//!   because the reconstructor deduplicates them
//! - `saved_filters` holds organisation-scoped filter definitions
//! - `store_meta` tracks the schema version
//!
//! All timestamps are UTC microseconds since the Unix epoch.

/// Migration v1: work items, snapshots, saved filters, and store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS work_items (
    org_id TEXT NOT NULL,
    work_item_id TEXT NOT NULL,
    work_item_type_id TEXT NOT NULL,
    work_item_type TEXT NOT NULL,
    level TEXT,
    normalised_display_name TEXT,
    title TEXT NOT NULL DEFAULT '',
    state TEXT NOT NULL,
    state_category TEXT NOT NULL CHECK (
        state_category IN ('preceding', 'proposed', 'inprogress', 'completed', 'removed')
    ),
    arrival_date_us INTEGER,
    commitment_date_us INTEGER,
    departure_date_us INTEGER,
    PRIMARY KEY (org_id, work_item_id)
);

CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id INTEGER PRIMARY KEY AUTOINCREMENT,
    org_id TEXT NOT NULL,
    work_item_id TEXT NOT NULL,
    snapshot_date_us INTEGER NOT NULL,
    state TEXT NOT NULL,
    state_category TEXT NOT NULL CHECK (
        state_category IN ('preceding', 'proposed', 'inprogress', 'completed', 'removed')
    ),
    state_type TEXT NOT NULL CHECK (state_type IN ('queue', 'active')),
    step_category TEXT NOT NULL DEFAULT '',
    title TEXT,
    assignee TEXT,
    work_item_type TEXT
);

CREATE TABLE IF NOT EXISTS saved_filters (
    org_id TEXT NOT NULL,
    tag TEXT NOT NULL,
    name TEXT NOT NULL,
    work_item_type_ids TEXT NOT NULL DEFAULT '[]',
    normalised_display_names TEXT NOT NULL DEFAULT '[]',
    PRIMARY KEY (org_id, tag)
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 0);

CREATE INDEX IF NOT EXISTS idx_snapshots_org_item_date
    ON snapshots(org_id, work_item_id, snapshot_date_us);

CREATE INDEX IF NOT EXISTS idx_work_items_org_category
    ON work_items(org_id, state_category);

CREATE INDEX IF NOT EXISTS idx_work_items_org_departure
    ON work_items(org_id, departure_date_us);
";

/// Indexes every migrated store must have.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_snapshots_org_item_date",
    "idx_work_items_org_category",
    "idx_work_items_org_departure",
];
