//! Attendee roster lookup
//!
//! The roster is the merged set of registration exports for the event. Each
//! row describes one attendee; the contact email column is the lookup key,
//! so several attendees registered by the same person share an email.

use std::{
    collections::HashMap,
    io::{Read, Seek},
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::roster::{EMAIL_COLUMN, NICKNAME_COLUMN, SERIAL_COLUMN};

/// The registration serial of an attendee
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct AttendeeUid(String);

impl AttendeeUid {
    /// Creates an attendee uid from a registration serial
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into())
    }

    /// The serial as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One raw row of a registration export, column name to value
pub type Row = HashMap<String, String>;

/// An attendee as found in the roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeRecord {
    /// Registration serial
    pub uid: AttendeeUid,
    /// Nickname shown on the ID card
    pub name: String,
    /// Normalized contact email
    pub email: String,
    /// The untouched export row
    pub row: Row,
}

impl AttendeeRecord {
    /// Builds a record from an export row
    ///
    /// Returns `None` when one of the serial, nickname or email columns is
    /// missing or the serial is blank.
    pub fn from_row(row: Row) -> Option<Self> {
        let uid = row.get(SERIAL_COLUMN)?.trim();
        if uid.is_empty() {
            return None;
        }
        Some(Self {
            uid: AttendeeUid::new(uid),
            name: row.get(NICKNAME_COLUMN)?.trim().to_owned(),
            email: normalize_email(row.get(EMAIL_COLUMN)?),
            row,
        })
    }

    /// Label identifying the attendee in a picker, e.g. `#123, Alice`
    pub fn label(&self) -> String {
        format!("#{}, {}", self.uid, self.name)
    }
}

/// Normalizes an email for lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Errors reading a roster archive
#[derive(Error, Debug)]
pub enum RosterError {
    /// The archive is not a readable zip file
    #[error("cannot read roster archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    /// An export sheet inside the archive is not valid CSV
    #[error("cannot read roster export: {0}")]
    Csv(#[from] csv::Error),
}

/// Whether an archive member is an export sheet
fn is_export(name: &str) -> bool {
    !name.starts_with("__MACOSX/")
        && std::path::Path::new(name)
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("csv"))
}

/// Reads one CSV export with a header line into rows
fn read_export(reader: impl Read) -> Result<Vec<Row>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = reader
        .headers()?
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}').trim().to_owned())
        .collect_vec();

    reader
        .records()
        .map_ok(|record| {
            headers
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_owned))
                .collect::<Row>()
        })
        .collect()
}

/// Trait for looking up attendees
///
/// Implementations must have loaded and indexed the whole roster before
/// the first call; lookups never fail.
pub trait Roster {
    /// All attendees registered under the email, in roster order
    fn find(&self, email: &str) -> Vec<AttendeeRecord>;

    /// The attendee with the given registration serial
    fn find_by_uid(&self, uid: &AttendeeUid) -> Option<AttendeeRecord>;
}

/// A roster held fully in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryRoster {
    records: Vec<AttendeeRecord>,
    by_email: HashMap<String, Vec<usize>>,
    by_uid: HashMap<AttendeeUid, usize>,
}

impl MemoryRoster {
    /// Merges one or more registration exports into a single index
    ///
    /// Rows lacking a required column are skipped with a warning. When a
    /// serial appears twice, the later row wins the uid index while both
    /// stay reachable by email.
    pub fn from_exports<E, I>(exports: E) -> Self
    where
        E: IntoIterator<Item = I>,
        I: IntoIterator<Item = Row>,
    {
        let records = exports
            .into_iter()
            .flatten()
            .filter_map(|row| {
                let record = AttendeeRecord::from_row(row);
                if record.is_none() {
                    tracing::warn!("skipping roster row without serial, nickname or email");
                }
                record
            })
            .collect_vec();

        let by_email = records
            .iter()
            .enumerate()
            .map(|(index, record)| (record.email.clone(), index))
            .into_group_map();

        let by_uid = records
            .iter()
            .enumerate()
            .map(|(index, record)| (record.uid.clone(), index))
            .collect();

        Self {
            records,
            by_email,
            by_uid,
        }
    }

    /// Loads exports serialized as a JSON array of arrays of rows
    ///
    /// # Errors
    ///
    /// Returns a `serde_json::Error` if the text is not in that shape.
    pub fn from_json_exports(json: &str) -> Result<Self, serde_json::Error> {
        let exports: Vec<Vec<Row>> = serde_json::from_str(json)?;
        Ok(Self::from_exports(exports))
    }

    /// Loads every CSV export bundled in a zip archive
    ///
    /// Members that are not `.csv` files are ignored. Each export carries
    /// its own header line, so exports with different column orders merge
    /// correctly.
    ///
    /// # Errors
    ///
    /// Returns a [`RosterError`] if the archive or one of its exports
    /// cannot be read.
    pub fn from_archive<R: Read + Seek>(reader: R) -> Result<Self, RosterError> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut exports = Vec::new();

        for index in 0..archive.len() {
            let file = archive.by_index(index)?;
            if file.is_dir() || !is_export(file.name()) {
                tracing::debug!(name = file.name(), "skipping roster archive member");
                continue;
            }
            tracing::debug!(name = file.name(), "reading roster export");
            exports.push(read_export(file)?);
        }

        Ok(Self::from_exports(exports))
    }

    /// Number of indexed attendees
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the roster holds no attendee
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Roster for MemoryRoster {
    fn find(&self, email: &str) -> Vec<AttendeeRecord> {
        self.by_email
            .get(&normalize_email(email))
            .map(|indices| indices.iter().map(|&i| self.records[i].clone()).collect_vec())
            .unwrap_or_default()
    }

    fn find_by_uid(&self, uid: &AttendeeUid) -> Option<AttendeeRecord> {
        self.by_uid.get(uid).map(|&i| self.records[i].clone())
    }
}
