//! A typed query builder for the state-history store.
//!
//! Queries are assembled from explicit parameters (schema version, table,
//! columns, time filter) rather than by concatenating text. Time bounds are
//! always emitted as bound parameters. The only value spliced into the query
//! text is the schema version, which is validated on construction.

use std::fmt::{self, Display};

use super::error::QueryError;
use crate::time::{Instant, TimeRange};

/// A schema version tag, as resolved from the store for a given instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaVersion(String);

impl SchemaVersion {
    /// Wrap a version tag.
    ///
    /// # Errors
    ///
    /// Will throw [`QueryError::InvalidSchemaVersion`] if the tag is empty or
    /// contains anything other than ASCII letters and digits.
    pub fn new(tag: impl Into<String>) -> Result<Self, QueryError> {
        let tag = tag.into();
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(QueryError::InvalidSchemaVersion { tag });
        }
        Ok(Self(tag))
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The stateframe tables read by this crate, distinguished by how many rows
/// are written per timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// One row per antenna per timestamp: front-end attenuators and levels.
    Antenna,
    /// One row per timestamp: system-wide switches.
    System,
    /// One row per DCM slot per timestamp: slot offsets and the frequency
    /// sequence.
    Slot,
}

impl Table {
    const fn suffix(self) -> &'static str {
        match self {
            Self::Antenna => "vD15",
            Self::System => "vD1",
            Self::Slot => "vD50",
        }
    }

    /// Rows written per timestamp.
    pub const fn rows_per_timestamp(self) -> usize {
        match self {
            Self::Antenna => crate::constants::NUM_ANTS,
            Self::System => 1,
            Self::Slot => crate::constants::NUM_DCM_SLOTS,
        }
    }

    /// The versioned table name.
    pub fn name(self, version: &SchemaVersion) -> String {
        format!("fV{}_{}", version, self.suffix())
    }
}

/// Columns this crate reads from the stateframe.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    Timestamp,
    FemClockMs,
    HPolAtteFirst,
    HPolAtteSecond,
    VPolAtteFirst,
    VPolAtteSecond,
    HPolLevel,
    VPolLevel,
    DppOffsetAttnOn,
    DcmOffsetAttn,
    FSeqList,
}

impl Column {
    /// The column's name in the store.
    pub const fn sql_name(self) -> &'static str {
        match self {
            Self::Timestamp => "Timestamp",
            Self::FemClockMs => "Ante_Fron_FEM_Clockms",
            Self::HPolAtteFirst => "Ante_Fron_FEM_HPol_Atte_First",
            Self::HPolAtteSecond => "Ante_Fron_FEM_HPol_Atte_Second",
            Self::VPolAtteFirst => "Ante_Fron_FEM_VPol_Atte_First",
            Self::VPolAtteSecond => "Ante_Fron_FEM_VPol_Atte_Second",
            Self::HPolLevel => "Ante_Fron_FEM_HPol_Regi_Level",
            Self::VPolLevel => "Ante_Fron_FEM_VPol_Regi_Level",
            Self::DppOffsetAttnOn => "DPPoffsetattn_on",
            Self::DcmOffsetAttn => "DCMoffset_attn",
            Self::FSeqList => "FSeqList",
        }
    }
}

/// Which records a query selects, by timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFilter {
    /// Records with `start <= Timestamp <= end`.
    Between(TimeRange),
    /// Records with `Timestamp >= start`.
    AtOrAfter(Instant),
    /// Records with `Timestamp <= end`.
    AtOrBefore(Instant),
}

impl TimeFilter {
    /// Whether a record at `t` passes the filter.
    pub fn matches(&self, t: Instant) -> bool {
        match *self {
            Self::Between(range) => range.contains(t),
            Self::AtOrAfter(start) => t >= start,
            Self::AtOrBefore(end) => t <= end,
        }
    }
}

/// Ordering of the result by timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Oldest first
    #[default]
    Ascending,
    /// Newest first
    Descending,
}

/// A query against one stateframe table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Schema version the table belongs to
    pub version: SchemaVersion,
    /// The table to read
    pub table: Table,
    /// The columns to return. [`Column::Timestamp`] is always first.
    pub columns: Vec<Column>,
    /// Which records to select
    pub filter: TimeFilter,
    /// Ordering by timestamp
    pub order: Order,
    /// Maximum number of rows to return
    pub limit: Option<usize>,
}

/// Query text with its bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    /// The text, with `?` placeholders
    pub text: String,
    /// Tick values for the placeholders, in order
    pub params: Vec<i64>,
}

impl Query {
    /// A query for `columns` of `table`, ascending, unlimited.
    pub fn new(version: &SchemaVersion, table: Table, columns: &[Column], filter: TimeFilter) -> Self {
        let mut all_columns = vec![Column::Timestamp];
        all_columns.extend(columns.iter().filter(|&&c| c != Column::Timestamp));
        Self {
            version: version.clone(),
            table,
            columns: all_columns,
            filter,
            order: Order::Ascending,
            limit: None,
        }
    }

    /// Limit the number of rows returned.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Return the newest rows first.
    #[must_use]
    pub fn descending(mut self) -> Self {
        self.order = Order::Descending;
        self
    }

    /// Render the query for a SQL backend.
    pub fn to_sql(&self) -> SqlStatement {
        let top = self
            .limit
            .map(|n| format!("top {n} "))
            .unwrap_or_default();
        let columns = self
            .columns
            .iter()
            .map(|c| c.sql_name())
            .collect::<Vec<_>>()
            .join(",");
        let (clause, params) = match self.filter {
            TimeFilter::Between(range) => (
                "Timestamp >= ? and Timestamp <= ?",
                vec![range.start.ticks(), range.end.ticks()],
            ),
            TimeFilter::AtOrAfter(start) => ("Timestamp >= ?", vec![start.ticks()]),
            TimeFilter::AtOrBefore(end) => ("Timestamp <= ?", vec![end.ticks()]),
        };
        let order = match self.order {
            Order::Ascending => "",
            Order::Descending => " desc",
        };
        SqlStatement {
            text: format!(
                "select {top}{columns} from {} where {clause} order by Timestamp{order}",
                self.table.name(&self.version)
            ),
            params,
        }
    }
}
