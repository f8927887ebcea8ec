//! SQLite-backed implementation of the `TimelineStore` port.
//!
//! Queries operate directly on the shared connection owned by
//! [`DbManager`]. Every mutating call commits one transaction and
//! publishes the union of the date ranges it touched on the change bus.
//! Merge commits re-verify the topology preconditions inside the
//! transaction and abort with a topology error when the links have moved
//! underneath the plan.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use locus_core::{verify_merge_topology, MergeCommit, TimelineStore};
use locus_domain::{
    ActivityType, Coordinate, DateInterval, ItemKind, LocomotionSample, LocusError,
    RecordingState, Result, TimelineItem, TimelineItemBase, TripFields, VisitFields,
};
use rusqlite::{params, Connection, Row, ToSql, Transaction};
use tracing::warn;

use super::manager::DbManager;
use crate::changes::TimelineChangeBus;
use crate::errors::map_sql_error;

/// SQLite-backed repository for timeline items and samples.
pub struct SqliteTimelineStore {
    db: Arc<DbManager>,
    changes: Arc<TimelineChangeBus>,
}

impl SqliteTimelineStore {
    pub fn new(db: Arc<DbManager>, changes: Arc<TimelineChangeBus>) -> Self {
        Self { db, changes }
    }
}

#[async_trait]
impl TimelineStore for SqliteTimelineStore {
    async fn hydrated_item(&self, item_id: &str) -> Result<Option<TimelineItem>> {
        let item = self.db.read(|conn| query_item(conn, item_id))?;
        let Some(mut item) = item else {
            return Ok(None);
        };

        let samples = self.db.read(|conn| query_samples(conn, item_id))?;
        item.samples = Some(samples);

        // lazy refresh of derived state, flagged by whoever last moved
        // samples around
        if item.base.samples_changed {
            item.update_from_samples()?;
            item.base.samples_changed = false;
            let range = item.date_range();
            self.db.write(|tx| persist_item(tx, &item))?;
            self.changes.publish(range);
        }

        Ok(Some(item))
    }

    async fn items_overlapping(&self, range: &DateInterval) -> Result<Vec<TimelineItem>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(ITEMS_OVERLAPPING_QUERY).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![to_ts(range.start), to_ts(range.end)], map_item_row)
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<TimelineItem>>>().map_err(map_sql_error)
        })
    }

    async fn samples_for_item(&self, item_id: &str) -> Result<Vec<LocomotionSample>> {
        self.db.read(|conn| query_samples(conn, item_id))
    }

    async fn save_item(&self, item: &TimelineItem) -> Result<()> {
        self.db.write(|tx| persist_item(tx, item))?;
        self.changes.publish(item.date_range());
        Ok(())
    }

    async fn save_samples(&self, samples: &[LocomotionSample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        self.db.write(|tx| {
            for sample in samples {
                persist_sample(tx, sample)?;
            }
            Ok(())
        })?;

        let mut dates = samples.iter().map(|s| s.date);
        let first = dates.next().unwrap_or_else(Utc::now);
        let range = dates.fold(DateInterval::new(first, first), |range, date| {
            DateInterval::new(range.start.min(date), range.end.max(date))
        });
        self.changes.publish(range);
        Ok(())
    }

    async fn commit_merge(&self, commit: &MergeCommit) -> Result<()> {
        let affected = self.db.write(|tx| {
            let keeper = query_base(tx, &commit.keeper.id)?
                .ok_or_else(|| LocusError::NotFound(commit.keeper.id.clone()))?;
            let deadman = query_base(tx, &commit.deadman.id)?
                .ok_or_else(|| LocusError::NotFound(commit.deadman.id.clone()))?;
            let betweener = match &commit.betweener {
                Some(base) => Some(
                    query_base(tx, &base.id)?
                        .ok_or_else(|| LocusError::NotFound(base.id.clone()))?,
                ),
                None => None,
            };

            // the plan was made outside the transaction; make sure the
            // topology is still one of the canonical orientations
            verify_merge_topology(&keeper, betweener.as_ref(), &deadman)?;

            persist_base(tx, &commit.keeper)?;
            if let Some(base) = &commit.betweener {
                persist_base(tx, base)?;
            }
            persist_base(tx, &commit.deadman)?;

            // heal the neighbours' back-links around the keeper
            if let Some(next_id) = &commit.keeper.next_item_id {
                tx.execute(
                    "UPDATE timeline_item_base SET previous_item_id = ?1 WHERE id = ?2",
                    params![commit.keeper.id, next_id],
                )
                .map_err(map_sql_error)?;
            }
            if let Some(previous_id) = &commit.keeper.previous_item_id {
                tx.execute(
                    "UPDATE timeline_item_base SET next_item_id = ?1 WHERE id = ?2",
                    params![commit.keeper.id, previous_id],
                )
                .map_err(map_sql_error)?;
            }

            for sample_id in &commit.moved_sample_ids {
                tx.execute(
                    "UPDATE samples SET timeline_item_id = ?1 WHERE id = ?2",
                    params![commit.keeper.id, sample_id],
                )
                .map_err(map_sql_error)?;
            }

            let mut affected = base_range(&keeper).union(&base_range(&deadman));
            if let Some(betweener) = &betweener {
                affected = affected.union(&base_range(betweener));
            }
            Ok(affected)
        })?;

        self.changes.publish(affected);
        Ok(())
    }

    async fn move_sample(
        &self,
        sample_id: &str,
        from_item_id: &str,
        to_item_id: &str,
    ) -> Result<()> {
        let affected = self.db.write(|tx| {
            let updated = tx
                .execute(
                    "UPDATE samples SET timeline_item_id = ?1
                     WHERE id = ?2 AND timeline_item_id = ?3",
                    params![to_item_id, sample_id, from_item_id],
                )
                .map_err(map_sql_error)?;
            if updated == 0 {
                return Err(LocusError::NotFound(format!(
                    "sample {sample_id} not found on item {from_item_id}"
                )));
            }

            tx.execute(
                "UPDATE timeline_item_base SET samples_changed = 1 WHERE id IN (?1, ?2)",
                params![from_item_id, to_item_id],
            )
            .map_err(map_sql_error)?;

            let from = query_base(tx, from_item_id)?
                .ok_or_else(|| LocusError::NotFound(from_item_id.to_string()))?;
            let to = query_base(tx, to_item_id)?
                .ok_or_else(|| LocusError::NotFound(to_item_id.to_string()))?;
            Ok(base_range(&from).union(&base_range(&to)))
        })?;

        self.changes.publish(affected);
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */
/* Timestamp codec */
/* -------------------------------------------------------------------------- */

fn to_ts(date: DateTime<Utc>) -> f64 {
    date.timestamp_micros() as f64 / 1_000_000.0
}

fn from_ts(ts: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros((ts * 1_000_000.0).round() as i64)
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn base_range(base: &TimelineItemBase) -> DateInterval {
    base.date_range()
}

/* -------------------------------------------------------------------------- */
/* Queries and row mappers */
/* -------------------------------------------------------------------------- */

const ITEM_BY_ID_QUERY: &str = "SELECT b.id, b.is_visit, b.start_date, b.end_date, b.source,
        b.previous_item_id, b.next_item_id, b.disabled, b.deleted, b.samples_changed,
        v.latitude, v.longitude, v.radius,
        t.distance, t.speed, t.classified_activity_type, t.confirmed_activity_type
    FROM timeline_item_base b
    LEFT JOIN timeline_item_visit v ON v.item_id = b.id
    LEFT JOIN timeline_item_trip t ON t.item_id = b.id
    WHERE b.id = ?1 AND b.deleted = 0";

const ITEMS_OVERLAPPING_QUERY: &str = "SELECT b.id, b.is_visit, b.start_date, b.end_date, b.source,
        b.previous_item_id, b.next_item_id, b.disabled, b.deleted, b.samples_changed,
        v.latitude, v.longitude, v.radius,
        t.distance, t.speed, t.classified_activity_type, t.confirmed_activity_type
    FROM timeline_item_base b
    LEFT JOIN timeline_item_visit v ON v.item_id = b.id
    LEFT JOIN timeline_item_trip t ON t.item_id = b.id
    WHERE b.deleted = 0 AND b.start_date <= ?2 AND b.end_date >= ?1
    ORDER BY b.end_date DESC";

const BASE_BY_ID_QUERY: &str = "SELECT id, is_visit, start_date, end_date, source,
        previous_item_id, next_item_id, disabled, deleted, samples_changed
    FROM timeline_item_base
    WHERE id = ?1";

const SAMPLES_BY_ITEM_QUERY: &str = "SELECT id, date, latitude, longitude, horizontal_accuracy,
        speed, course, altitude, recording_state, classified_activity_type,
        confirmed_activity_type, timeline_item_id, disabled
    FROM samples
    WHERE timeline_item_id = ?1
    ORDER BY date";

const BASE_UPSERT_SQL: &str = "INSERT INTO timeline_item_base (
        id, is_visit, start_date, end_date, source, previous_item_id, next_item_id,
        disabled, deleted, samples_changed
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
    ON CONFLICT (id) DO UPDATE SET
        is_visit = excluded.is_visit,
        start_date = excluded.start_date,
        end_date = excluded.end_date,
        source = excluded.source,
        previous_item_id = excluded.previous_item_id,
        next_item_id = excluded.next_item_id,
        disabled = excluded.disabled,
        deleted = excluded.deleted,
        samples_changed = excluded.samples_changed";

const VISIT_UPSERT_SQL: &str = "INSERT INTO timeline_item_visit (item_id, latitude, longitude, radius)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT (item_id) DO UPDATE SET
        latitude = excluded.latitude,
        longitude = excluded.longitude,
        radius = excluded.radius";

const TRIP_UPSERT_SQL: &str = "INSERT INTO timeline_item_trip (
        item_id, distance, speed, classified_activity_type, confirmed_activity_type
    ) VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT (item_id) DO UPDATE SET
        distance = excluded.distance,
        speed = excluded.speed,
        classified_activity_type = excluded.classified_activity_type,
        confirmed_activity_type = excluded.confirmed_activity_type";

const SAMPLE_UPSERT_SQL: &str = "INSERT INTO samples (
        id, date, latitude, longitude, horizontal_accuracy, speed, course, altitude,
        recording_state, classified_activity_type, confirmed_activity_type,
        timeline_item_id, disabled
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
    ON CONFLICT (id) DO UPDATE SET
        date = excluded.date,
        latitude = excluded.latitude,
        longitude = excluded.longitude,
        horizontal_accuracy = excluded.horizontal_accuracy,
        speed = excluded.speed,
        course = excluded.course,
        altitude = excluded.altitude,
        recording_state = excluded.recording_state,
        classified_activity_type = excluded.classified_activity_type,
        confirmed_activity_type = excluded.confirmed_activity_type,
        timeline_item_id = excluded.timeline_item_id,
        disabled = excluded.disabled";

fn query_item(conn: &Connection, item_id: &str) -> Result<Option<TimelineItem>> {
    let mut stmt = conn.prepare(ITEM_BY_ID_QUERY).map_err(map_sql_error)?;
    let mut rows = stmt.query_map(params![item_id], map_item_row).map_err(map_sql_error)?;
    match rows.next() {
        Some(row) => Ok(Some(row.map_err(map_sql_error)?)),
        None => Ok(None),
    }
}

fn query_base(tx: &Transaction<'_>, item_id: &str) -> Result<Option<TimelineItemBase>> {
    let mut stmt = tx.prepare(BASE_BY_ID_QUERY).map_err(map_sql_error)?;
    let mut rows = stmt.query_map(params![item_id], map_base_row).map_err(map_sql_error)?;
    match rows.next() {
        Some(row) => Ok(Some(row.map_err(map_sql_error)?)),
        None => Ok(None),
    }
}

fn query_samples(conn: &Connection, item_id: &str) -> Result<Vec<LocomotionSample>> {
    let mut stmt = conn.prepare(SAMPLES_BY_ITEM_QUERY).map_err(map_sql_error)?;
    let rows = stmt.query_map(params![item_id], map_sample_row).map_err(map_sql_error)?;
    rows.collect::<rusqlite::Result<Vec<LocomotionSample>>>().map_err(map_sql_error)
}

fn map_base_row(row: &Row<'_>) -> rusqlite::Result<TimelineItemBase> {
    Ok(TimelineItemBase {
        id: row.get(0)?,
        start_date: from_ts(row.get(2)?),
        end_date: from_ts(row.get(3)?),
        source: row.get(4)?,
        previous_item_id: row.get(5)?,
        next_item_id: row.get(6)?,
        disabled: row.get(7)?,
        deleted: row.get(8)?,
        samples_changed: row.get(9)?,
    })
}

fn map_item_row(row: &Row<'_>) -> rusqlite::Result<TimelineItem> {
    let base = map_base_row(row)?;
    let is_visit: bool = row.get(1)?;

    let kind = if is_visit {
        let latitude: Option<f64> = row.get(10)?;
        let longitude: Option<f64> = row.get(11)?;
        let radius: Option<f64> = row.get(12)?;
        if latitude.is_none() {
            warn!(item_id = %base.id, "visit row missing geofence payload");
        }
        ItemKind::Visit(VisitFields {
            latitude: latitude.unwrap_or(0.0),
            longitude: longitude.unwrap_or(0.0),
            radius: radius.unwrap_or(0.0),
        })
    } else {
        ItemKind::Trip(TripFields {
            distance: row.get(13)?,
            speed: row.get(14)?,
            classified_activity_type: parse_activity(&base.id, row.get(15)?),
            confirmed_activity_type: parse_activity(&base.id, row.get(16)?),
        })
    };

    Ok(TimelineItem { base, kind, samples: None })
}

fn map_sample_row(row: &Row<'_>) -> rusqlite::Result<LocomotionSample> {
    let id: String = row.get(0)?;
    let latitude: Option<f64> = row.get(2)?;
    let longitude: Option<f64> = row.get(3)?;
    let coordinate = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(Coordinate::new(latitude, longitude)),
        _ => None,
    };

    let state_raw: String = row.get(8)?;
    let recording_state = RecordingState::from_str(&state_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            Box::new(LocusError::InvalidInput(format!("unknown recording state '{state_raw}'"))),
        )
    })?;

    Ok(LocomotionSample {
        date: from_ts(row.get(1)?),
        coordinate,
        horizontal_accuracy: row.get(4)?,
        speed: row.get(5)?,
        course: row.get(6)?,
        altitude: row.get(7)?,
        recording_state,
        classified_activity_type: parse_activity(&id, row.get(9)?),
        confirmed_activity_type: parse_activity(&id, row.get(10)?),
        timeline_item_id: row.get(11)?,
        disabled: row.get(12)?,
        id,
    })
}

/// Unknown classifier labels are dropped rather than failing the read;
/// the classifier vocabulary can grow ahead of this library.
fn parse_activity(owner_id: &str, value: Option<String>) -> Option<ActivityType> {
    let value = value?;
    let parsed = ActivityType::from_str(&value);
    if parsed.is_none() {
        warn!(owner = %owner_id, label = %value, "unknown activity type label");
    }
    parsed
}

/* -------------------------------------------------------------------------- */
/* Writers */
/* -------------------------------------------------------------------------- */

fn persist_base(tx: &Transaction<'_>, base: &TimelineItemBase) -> Result<()> {
    let is_visit_placeholder = false;
    let params: [&dyn ToSql; 10] = [
        &base.id,
        &is_visit_placeholder,
        &to_ts(base.start_date),
        &to_ts(base.end_date),
        &base.source,
        &base.previous_item_id,
        &base.next_item_id,
        &base.disabled,
        &base.deleted,
        &base.samples_changed,
    ];
    // preserve the stored is_visit tag; merges never change an item's kind
    tx.execute(BASE_UPDATE_KEEP_KIND_SQL, params.as_slice()).map_err(map_sql_error)?;
    Ok(())
}

const BASE_UPDATE_KEEP_KIND_SQL: &str = "INSERT INTO timeline_item_base (
        id, is_visit, start_date, end_date, source, previous_item_id, next_item_id,
        disabled, deleted, samples_changed
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
    ON CONFLICT (id) DO UPDATE SET
        start_date = excluded.start_date,
        end_date = excluded.end_date,
        source = excluded.source,
        previous_item_id = excluded.previous_item_id,
        next_item_id = excluded.next_item_id,
        disabled = excluded.disabled,
        deleted = excluded.deleted,
        samples_changed = excluded.samples_changed";

fn persist_item(tx: &Transaction<'_>, item: &TimelineItem) -> Result<()> {
    let base = &item.base;
    let is_visit = item.is_visit();
    let params: [&dyn ToSql; 10] = [
        &base.id,
        &is_visit,
        &to_ts(base.start_date),
        &to_ts(base.end_date),
        &base.source,
        &base.previous_item_id,
        &base.next_item_id,
        &base.disabled,
        &base.deleted,
        &base.samples_changed,
    ];
    tx.execute(BASE_UPSERT_SQL, params.as_slice()).map_err(map_sql_error)?;

    match &item.kind {
        ItemKind::Visit(visit) => {
            tx.execute(
                VISIT_UPSERT_SQL,
                params![base.id, visit.latitude, visit.longitude, visit.radius],
            )
            .map_err(map_sql_error)?;
        }
        ItemKind::Trip(trip) => {
            tx.execute(
                TRIP_UPSERT_SQL,
                params![
                    base.id,
                    trip.distance,
                    trip.speed,
                    trip.classified_activity_type.map(|a| a.as_str()),
                    trip.confirmed_activity_type.map(|a| a.as_str()),
                ],
            )
            .map_err(map_sql_error)?;
        }
    }
    Ok(())
}

fn persist_sample(tx: &Transaction<'_>, sample: &LocomotionSample) -> Result<()> {
    let (latitude, longitude) = match sample.coordinate {
        Some(coordinate) => (Some(coordinate.latitude), Some(coordinate.longitude)),
        None => (None, None),
    };
    tx.execute(
        SAMPLE_UPSERT_SQL,
        params![
            sample.id,
            to_ts(sample.date),
            latitude,
            longitude,
            sample.horizontal_accuracy,
            sample.speed,
            sample.course,
            sample.altitude,
            sample.recording_state.as_str(),
            sample.classified_activity_type.map(|a| a.as_str()),
            sample.confirmed_activity_type.map(|a| a.as_str()),
            sample.timeline_item_id,
            sample.disabled,
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}
