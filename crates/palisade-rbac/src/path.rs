//! Privilege paths: `database`, `database.table`, `database.table.col1;col2`.
//!
//! A path names the resource a privilege applies to. `*` is a reserved
//! segment meaning "every child at this level" and may only appear as the
//! last level of a path (`*`, `db.*`, `db.table.*`, or among the columns).

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AccessError, Result};

/// The reserved wildcard segment.
pub const WILDCARD: &str = "*";

const SEGMENT_SEPARATOR: char = '.';
const COLUMN_SEPARATOR: char = ';';

/// A normalized `database[.table[.columns]]` descriptor.
///
/// Segments are trimmed of surrounding whitespace. Construction fails with
/// [`AccessError::MalformedPath`] on empty segments, on a wildcard followed
/// by a deeper level, or on a segment count outside `1..=3`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrivilegePath {
    database: String,
    table: Option<String>,
    columns: Vec<String>,
}

/// One thing a path grants at its target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PathItem<'a> {
    /// The target node's wildcard flag.
    Wildcard,
    /// A column leaf under the target node.
    Column(&'a str),
}

impl PrivilegePath {
    /// A database-level path (`db` or `*`).
    pub fn database(database: &str) -> Result<Self> {
        let database = segment(database, database)?;
        Ok(Self {
            database,
            table: None,
            columns: Vec::new(),
        })
    }

    /// A table-level path (`db.table` or `db.*`).
    pub fn table(database: &str, table: &str) -> Result<Self> {
        let display = format!("{database}.{table}");
        let database = segment(database, &display)?;
        let table = segment(table, &display)?;
        if database == WILDCARD {
            return Err(AccessError::malformed(
                display,
                "wildcard database cannot be followed by a table",
            ));
        }
        Ok(Self {
            database,
            table: Some(table),
            columns: Vec::new(),
        })
    }

    /// A column-level path (`db.table.c1;c2` or `db.table.*`).
    pub fn columns<S: AsRef<str>>(database: &str, table: &str, columns: &[S]) -> Result<Self> {
        let display = format!(
            "{database}.{table}.{}",
            columns
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join(";")
        );
        let mut path = Self::table(database, table).map_err(|_| {
            AccessError::malformed(&display, "invalid database or table segment")
        })?;
        if path.table.as_deref() == Some(WILDCARD) {
            return Err(AccessError::malformed(
                display,
                "wildcard table cannot be followed by columns",
            ));
        }
        if columns.is_empty() {
            return Err(AccessError::malformed(display, "empty column list"));
        }
        path.columns = columns
            .iter()
            .map(|c| segment(c.as_ref(), &display))
            .collect::<Result<_>>()?;
        Ok(path)
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Number of levels this path addresses (1 = database, 3 = columns).
    pub fn depth(&self) -> usize {
        match (&self.table, self.columns.is_empty()) {
            (None, _) => 1,
            (Some(_), true) => 2,
            (Some(_), false) => 3,
        }
    }

    /// Splits the path into the node chain below the root and the items
    /// granted at the end of that chain.
    ///
    /// `*` → wildcard on the root, `db` and `db.*` → wildcard on `db`,
    /// `db.t` → wildcard on `t`, `db.t.c1;*` → leaf `c1` and wildcard on `t`.
    pub(crate) fn target(&self) -> (Vec<&str>, Vec<PathItem<'_>>) {
        let wildcard = vec![PathItem::Wildcard];
        let db = self.database.as_str();

        if db == WILDCARD {
            return (Vec::new(), wildcard);
        }

        match self.table.as_deref() {
            None | Some(WILDCARD) => (vec![db], wildcard),
            Some(table) if self.columns.is_empty() => (vec![db, table], wildcard),
            Some(table) => {
                let items = self
                    .columns
                    .iter()
                    .map(|c| {
                        if c == WILDCARD {
                            PathItem::Wildcard
                        } else {
                            PathItem::Column(c.as_str())
                        }
                    })
                    .collect();
                (vec![db, table], items)
            }
        }
    }
}

fn segment(raw: &str, display: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AccessError::malformed(display, "empty segment"));
    }
    if trimmed.contains(SEGMENT_SEPARATOR) || trimmed.contains(COLUMN_SEPARATOR) {
        return Err(AccessError::malformed(
            display,
            format!("segment '{trimmed}' contains a separator"),
        ));
    }
    Ok(trimmed.to_string())
}

impl FromStr for PrivilegePath {
    type Err = AccessError;

    /// Parses the combined form. Splitting on `.` must yield 1, 2 or 3
    /// segments; the third is a `;`-separated column list.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(SEGMENT_SEPARATOR).collect();
        match parts.as_slice() {
            [db] => Self::database(db),
            [db, table] => Self::table(db, table),
            [db, table, columns] => {
                let columns: Vec<&str> = columns.split(COLUMN_SEPARATOR).collect();
                Self::columns(db, table, &columns)
            }
            _ => Err(AccessError::malformed(
                s,
                format!("expected 1 to 3 segments, found {}", parts.len()),
            )),
        }
    }
}

impl Display for PrivilegePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.database)?;
        if let Some(table) = &self.table {
            write!(f, ".{table}")?;
        }
        if !self.columns.is_empty() {
            write!(f, ".{}", self.columns.join(";"))?;
        }
        Ok(())
    }
}
