//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use airguard_types::{AirQuality, OperationDuration, SummaryKind};

use crate::error::{Error, Result};
use crate::models::{
    DeletedDevice, DevicePatch, NewDevice, NewReading, NewSummary, StoredDevice, StoredReading,
    StoredSummary,
};
use crate::queries::{ReadingQuery, SummaryQuery};
use crate::schema;

const DEVICE_COLUMNS: &str = "id, name, owner, relay_state, operation_duration, location, \
                              is_connected, created_at, updated_at";

/// Mean values over a set of readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingAverages {
    /// Number of readings averaged.
    pub count: u64,
    pub temperature: f64,
    pub humidity: f64,
    pub tvoc: f64,
}

/// SQLite-based store for devices, readings and summaries.
///
/// Operations that touch the connected flag of a device run inside an
/// `IMMEDIATE` transaction, so the one-connected-device-per-owner rule holds
/// even with several connections on the same file. The schema backs this up
/// with a partial unique index.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    fn begin(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

// Device operations
impl Store {
    /// Register a device as the owner's connected device.
    ///
    /// Every other device of the owner is marked disconnected in the same
    /// transaction. Fails with [`Error::NameTaken`] if the name is in use.
    pub fn register_device(&mut self, new: &NewDevice) -> Result<StoredDevice> {
        let now = OffsetDateTime::now_utc();
        let id = Uuid::new_v4().to_string();

        let tx = self.begin()?;
        if name_in_use(&tx, &new.name, None)? {
            return Err(Error::NameTaken(new.name.clone()));
        }

        let demoted = demote_others(&tx, &new.owner, None, now)?;
        tx.execute(
            "INSERT INTO devices (id, name, owner, relay_state, operation_duration, location,
             is_connected, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
            params![
                id,
                new.name,
                new.owner,
                new.relay_state,
                new.operation_duration.as_str(),
                new.location,
                to_millis(now),
            ],
        )?;
        let device = load_device(&tx, &id)?.ok_or_else(|| Error::DeviceNotFound(id.clone()))?;
        tx.commit()?;

        info!(
            "Registered device {} ({}) for {}, {} demoted",
            device.name, device.id, device.owner, demoted
        );
        Ok(device)
    }

    /// Get a device by ID.
    pub fn get_device(&self, device_id: &str) -> Result<Option<StoredDevice>> {
        load_device(&self.conn, device_id)
    }

    /// List devices, optionally restricted to one owner, oldest first.
    pub fn list_devices(&self, owner: Option<&str>) -> Result<Vec<StoredDevice>> {
        let devices = match owner {
            Some(owner) => {
                let sql = format!(
                    "SELECT {} FROM devices WHERE owner = ? ORDER BY created_at, id",
                    DEVICE_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                stmt.query_map([owner], device_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!("SELECT {} FROM devices ORDER BY created_at, id", DEVICE_COLUMNS);
                let mut stmt = self.conn.prepare(&sql)?;
                stmt.query_map([], device_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        Ok(devices)
    }

    /// The owner's connected device, if any.
    pub fn connected_device(&self, owner: &str) -> Result<Option<StoredDevice>> {
        let sql = format!(
            "SELECT {} FROM devices WHERE owner = ? AND is_connected = 1",
            DEVICE_COLUMNS
        );
        let device = self
            .conn
            .query_row(&sql, [owner], device_from_row)
            .optional()?;
        Ok(device)
    }

    /// Apply a patch to a device owned by `owner`.
    ///
    /// Connecting the device demotes the owner's other devices first.
    pub fn update_device(
        &mut self,
        owner: &str,
        device_id: &str,
        patch: &DevicePatch,
    ) -> Result<StoredDevice> {
        let now = OffsetDateTime::now_utc();
        let tx = self.begin()?;

        let mut device = load_device(&tx, device_id)?
            .filter(|d| d.owner == owner)
            .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))?;

        if let Some(ref name) = patch.name
            && name != &device.name
            && name_in_use(&tx, name, Some(device_id))?
        {
            return Err(Error::NameTaken(name.clone()));
        }

        if patch.is_connected == Some(true) {
            demote_others(&tx, owner, Some(device_id), now)?;
        }

        patch.apply(&mut device);
        device.updated_at = now;
        write_device(&tx, &device)?;
        tx.commit()?;

        debug!("Updated device {}", device_id);
        Ok(device)
    }

    /// Set the connected flag of any device, ignoring ownership.
    ///
    /// Connecting demotes the other devices of the same owner.
    pub fn set_connected(&mut self, device_id: &str, is_connected: bool) -> Result<StoredDevice> {
        let now = OffsetDateTime::now_utc();
        let tx = self.begin()?;

        let mut device = load_device(&tx, device_id)?
            .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))?;

        if is_connected {
            demote_others(&tx, &device.owner, Some(device_id), now)?;
        }

        device.is_connected = is_connected;
        device.updated_at = now;
        write_device(&tx, &device)?;
        tx.commit()?;

        debug!("Set device {} connected={}", device_id, is_connected);
        Ok(device)
    }

    /// Delete a device owned by `owner`, with its readings and summaries.
    ///
    /// If it was the connected device, another device of the owner (the most
    /// recently updated one) is promoted.
    pub fn delete_device(&mut self, owner: &str, device_id: &str) -> Result<DeletedDevice> {
        let now = OffsetDateTime::now_utc();
        let tx = self.begin()?;

        let device = load_device(&tx, device_id)?
            .filter(|d| d.owner == owner)
            .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))?;

        tx.execute("DELETE FROM devices WHERE id = ?", [device_id])?;

        let mut promoted = None;
        if device.is_connected {
            let candidate: Option<String> = tx
                .query_row(
                    "SELECT id FROM devices WHERE owner = ?
                     ORDER BY updated_at DESC, id LIMIT 1",
                    [owner],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(candidate) = candidate {
                tx.execute(
                    "UPDATE devices SET is_connected = 1, updated_at = ?2 WHERE id = ?1",
                    params![candidate, to_millis(now)],
                )?;
                promoted = load_device(&tx, &candidate)?;
            }
        }
        tx.commit()?;

        match promoted {
            Some(ref p) => info!("Deleted device {}, promoted {}", device_id, p.id),
            None => info!("Deleted device {}", device_id),
        }

        Ok(DeletedDevice { device, promoted })
    }
}

// Reading operations
impl Store {
    /// Insert a reading for an existing device.
    pub fn insert_reading(&self, device_id: &str, reading: &NewReading) -> Result<StoredReading> {
        let created_at = reading.recorded_at.unwrap_or_else(OffsetDateTime::now_utc);

        let inserted = self.conn.execute(
            "INSERT INTO readings (device_id, created_at, temperature, humidity, tvoc, air_quality)
             SELECT id, ?2, ?3, ?4, ?5, ?6 FROM devices WHERE id = ?1",
            params![
                device_id,
                to_millis(created_at),
                reading.temperature,
                reading.humidity,
                reading.tvoc,
                reading.air_quality.as_str(),
            ],
        )?;
        if inserted == 0 {
            return Err(Error::DeviceNotFound(device_id.to_string()));
        }

        Ok(StoredReading {
            id: self.conn.last_insert_rowid(),
            device_id: device_id.to_string(),
            temperature: reading.temperature,
            humidity: reading.humidity,
            tvoc: reading.tvoc,
            air_quality: reading.air_quality,
            created_at: truncate_millis(created_at),
        })
    }

    /// Query readings with filters.
    pub fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<StoredReading>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let readings = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(StoredReading {
                    id: row.get(0)?,
                    device_id: row.get(1)?,
                    created_at: from_millis(row.get(2)?, 2)?,
                    temperature: row.get(3)?,
                    humidity: row.get(4)?,
                    tvoc: row.get(5)?,
                    air_quality: parse_column::<AirQuality>(row, 6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(readings)
    }

    /// Get the latest reading for a device.
    pub fn get_latest_reading(&self, device_id: &str) -> Result<Option<StoredReading>> {
        let query = ReadingQuery::new().device(device_id).limit(1);
        let mut readings = self.query_readings(&query)?;
        Ok(readings.pop())
    }

    /// Count readings, optionally for one device.
    pub fn count_readings(&self, device_id: Option<&str>) -> Result<u64> {
        let count: i64 = match device_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM readings WHERE device_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }

    /// Means over the readings of a device created in `[since, until]`.
    ///
    /// Returns `None` when the window holds no readings.
    pub fn reading_averages(
        &self,
        device_id: &str,
        since: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Option<ReadingAverages>> {
        let averages = self.conn.query_row(
            "SELECT COUNT(*), AVG(temperature), AVG(humidity), AVG(tvoc) FROM readings
             WHERE device_id = ?1 AND created_at >= ?2 AND created_at <= ?3",
            params![device_id, to_millis(since), to_millis(until)],
            |row| {
                let count: i64 = row.get(0)?;
                if count == 0 {
                    return Ok(None);
                }
                Ok(Some(ReadingAverages {
                    count: count as u64,
                    temperature: row.get(1)?,
                    humidity: row.get(2)?,
                    tvoc: row.get(3)?,
                }))
            },
        )?;

        Ok(averages)
    }

    /// IDs of devices with at least one reading at or after `since`.
    pub fn devices_with_readings_since(&self, since: OffsetDateTime) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT device_id FROM readings WHERE created_at >= ? ORDER BY device_id",
        )?;
        let ids = stmt
            .query_map([to_millis(since)], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

// Summary operations
impl Store {
    /// Insert a summary for an existing device.
    pub fn insert_summary(&self, device_id: &str, summary: &NewSummary) -> Result<StoredSummary> {
        let created_at = OffsetDateTime::now_utc();

        let inserted = self.conn.execute(
            "INSERT INTO summaries (device_id, kind, created_at, avg_temperature, avg_humidity,
             avg_tvoc, air_quality)
             SELECT id, ?2, ?3, ?4, ?5, ?6, ?7 FROM devices WHERE id = ?1",
            params![
                device_id,
                summary.kind.as_str(),
                to_millis(created_at),
                summary.avg_temperature,
                summary.avg_humidity,
                summary.avg_tvoc,
                summary.air_quality.as_str(),
            ],
        )?;
        if inserted == 0 {
            return Err(Error::DeviceNotFound(device_id.to_string()));
        }

        Ok(StoredSummary {
            id: self.conn.last_insert_rowid(),
            device_id: device_id.to_string(),
            kind: summary.kind,
            avg_temperature: summary.avg_temperature,
            avg_humidity: summary.avg_humidity,
            avg_tvoc: summary.avg_tvoc,
            air_quality: summary.air_quality,
            created_at: truncate_millis(created_at),
        })
    }

    /// Query summaries with filters.
    pub fn query_summaries(&self, query: &SummaryQuery) -> Result<Vec<StoredSummary>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let summaries = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(StoredSummary {
                    id: row.get(0)?,
                    device_id: row.get(1)?,
                    kind: parse_column::<SummaryKind>(row, 2)?,
                    created_at: from_millis(row.get(3)?, 3)?,
                    avg_temperature: row.get(4)?,
                    avg_humidity: row.get(5)?,
                    avg_tvoc: row.get(6)?,
                    air_quality: parse_column::<AirQuality>(row, 7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(summaries)
    }

    /// Count summaries, optionally for one device.
    pub fn count_summaries(&self, device_id: Option<&str>) -> Result<u64> {
        let count: i64 = match device_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM summaries WHERE device_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM summaries", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }
}

fn load_device(conn: &Connection, device_id: &str) -> Result<Option<StoredDevice>> {
    let sql = format!("SELECT {} FROM devices WHERE id = ?", DEVICE_COLUMNS);
    let device = conn
        .query_row(&sql, [device_id], device_from_row)
        .optional()?;
    Ok(device)
}

fn write_device(conn: &Connection, device: &StoredDevice) -> Result<()> {
    conn.execute(
        "UPDATE devices SET name = ?2, relay_state = ?3, operation_duration = ?4,
         location = ?5, is_connected = ?6, updated_at = ?7
         WHERE id = ?1",
        params![
            device.id,
            device.name,
            device.relay_state,
            device.operation_duration.as_str(),
            device.location,
            device.is_connected,
            to_millis(device.updated_at),
        ],
    )?;
    Ok(())
}

/// Mark the owner's connected devices as disconnected, except `keep`.
fn demote_others(
    conn: &Connection,
    owner: &str,
    keep: Option<&str>,
    now: OffsetDateTime,
) -> Result<usize> {
    let demoted = conn.execute(
        "UPDATE devices SET is_connected = 0, updated_at = ?3
         WHERE owner = ?1 AND is_connected = 1 AND (?2 IS NULL OR id != ?2)",
        params![owner, keep, to_millis(now)],
    )?;
    Ok(demoted)
}

fn name_in_use(conn: &Connection, name: &str, except: Option<&str>) -> Result<bool> {
    let taken: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM devices WHERE name = ?1 AND (?2 IS NULL OR id != ?2)",
        params![name, except],
        |row| row.get(0),
    )?;
    Ok(taken)
}

fn device_from_row(row: &Row<'_>) -> rusqlite::Result<StoredDevice> {
    Ok(StoredDevice {
        id: row.get(0)?,
        name: row.get(1)?,
        owner: row.get(2)?,
        relay_state: row.get(3)?,
        operation_duration: parse_column::<OperationDuration>(row, 4)?,
        location: row.get(5)?,
        is_connected: row.get(6)?,
        created_at: from_millis(row.get(7)?, 7)?,
        updated_at: from_millis(row.get(8)?, 8)?,
    })
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = airguard_types::ParseError>,
{
    let text: String = row.get(idx)?;
    text.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Timestamps are stored as unix milliseconds.
pub(crate) fn to_millis(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(ms: i64, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, Box::new(e))
    })
}

fn truncate_millis(t: OffsetDateTime) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(to_millis(t)) * 1_000_000).unwrap_or(t)
}
