//! BPSV tables: `versions`, `cdns` and `.build.info`
//!
//! ```text
//! Region!STRING:0|BuildConfig!HEX:16|CDNConfig!HEX:16
//! ## seqn = 2241282
//! us|be2bb98dc28aee05bbee519393696cdb|fac77b9ca52c84ac28ad83a7dbe1c829
//! ```

use std::collections::HashMap;

use super::error::ConfigError;

/// Column declared in a BPSV header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name, compared case-sensitively
    pub name: String,
    /// Declared type, such as `STRING` or `HEX`
    pub kind: String,
    /// Declared length
    pub length: u32,
}

impl Column {
    fn parse(spec: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidHeader(spec.to_string());
        let (name, ty) = spec.split_once('!').ok_or_else(invalid)?;
        let (kind, length) = ty.split_once(':').ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            name: name.to_string(),
            kind: kind.to_ascii_uppercase(),
            length: length.trim().parse().map_err(|_| invalid())?,
        })
    }
}

/// Parsed BPSV table
#[derive(Debug, Clone)]
pub struct VersionTable {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
    seqn: Option<u64>,
}

/// One row of a [`VersionTable`]
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a VersionTable,
    values: &'a [String],
}

impl<'a> Row<'a> {
    /// Value of a column by name
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let at = *self.table.index.get(column)?;
        self.values.get(at).map(String::as_str)
    }

    /// Value of a column, with empty cells treated as absent
    pub fn get_non_empty(&self, column: &str) -> Option<&'a str> {
        self.get(column).filter(|v| !v.is_empty())
    }
}

impl VersionTable {
    /// Parse BPSV text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut lines = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty());

        let header = lines
            .by_ref()
            .find(|line| !line.starts_with('#'))
            .ok_or(ConfigError::EmptyDocument)?;
        let columns = header
            .split('|')
            .map(Column::parse)
            .collect::<Result<Vec<_>, _>>()?;
        let index = columns
            .iter()
            .enumerate()
            .map(|(at, column)| (column.name.clone(), at))
            .collect();

        let mut seqn = None;
        let mut rows = Vec::new();
        for line in lines {
            if let Some(rest) = line.strip_prefix("## seqn") {
                seqn = rest.trim_start_matches([' ', '=']).trim().parse().ok();
                continue;
            }
            if line.starts_with('#') {
                continue;
            }
            let values: Vec<String> = line.split('|').map(String::from).collect();
            if values.len() != columns.len() {
                return Err(ConfigError::ColumnCount {
                    row: rows.len(),
                    expected: columns.len(),
                    actual: values.len(),
                });
            }
            rows.push(values);
        }

        Ok(Self {
            columns,
            index,
            rows,
            seqn,
        })
    }

    /// Header columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Sequence number from the `## seqn` comment
    pub fn seqn(&self) -> Option<u64> {
        self.seqn
    }

    /// Rows in file order
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|values| Row {
            table: self,
            values,
        })
    }

    /// First row whose `column` equals `value`
    pub fn find(&self, column: &str, value: &str) -> Option<Row<'_>> {
        self.rows().find(|row| row.get(column) == Some(value))
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
