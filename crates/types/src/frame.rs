//! In-memory table produced by the payload decode pipeline.
//!
//! A [`Frame`] is a row-major grid of [`Cell`]s with a label per row (the
//! index) and a label per column. Parameter and record tables are
//! realization-major: one row per realization, one column per variable or
//! time step.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Row or column label.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Label {
    Int(i64),
    Text(String),
}

impl Label {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    /// Integer reading of the label, parsing text labels such as `"3"`.
    pub fn to_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for Label {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A single table value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Numeric literal kept exactly as transmitted.
    Decimal(String),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Decimal(literal) => literal.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Decimal(text) | Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Raised when index, column and row dimensions disagree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameShapeError {
    #[error("frame has {index} index labels but {rows} rows")]
    IndexLength { index: usize, rows: usize },
    #[error("frame row {row} has {width} cells but there are {columns} columns")]
    RowWidth { row: usize, width: usize, columns: usize },
    #[error("frame column {column} has {length} cells but the index has {index} labels")]
    ColumnLength { column: usize, length: usize, index: usize },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Frame {
    index: Vec<Label>,
    columns: Vec<Label>,
    rows: Vec<Vec<Cell>>,
}

impl Frame {
    /// The table every failed table fetch degrades to.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(index: Vec<Label>, columns: Vec<Label>, rows: Vec<Vec<Cell>>) -> Result<Self, FrameShapeError> {
        if index.len() != rows.len() {
            return Err(FrameShapeError::IndexLength {
                index: index.len(),
                rows: rows.len(),
            });
        }
        if let Some((row, cells)) = rows.iter().enumerate().find(|(_, cells)| cells.len() != columns.len()) {
            return Err(FrameShapeError::RowWidth {
                row,
                width: cells.len(),
                columns: columns.len(),
            });
        }
        Ok(Self { index, columns, rows })
    }

    /// Build a frame from column vectors, each as long as `index`.
    pub fn from_columns(index: Vec<Label>, columns: Vec<(Label, Vec<Cell>)>) -> Result<Self, FrameShapeError> {
        let mut labels = Vec::with_capacity(columns.len());
        let mut rows: Vec<Vec<Cell>> = (0..index.len()).map(|_| Vec::with_capacity(columns.len())).collect();
        for (column, (label, cells)) in columns.into_iter().enumerate() {
            if cells.len() != index.len() {
                return Err(FrameShapeError::ColumnLength {
                    column,
                    length: cells.len(),
                    index: index.len(),
                });
            }
            labels.push(label);
            for (row, cell) in rows.iter_mut().zip(cells) {
                row.push(cell);
            }
        }
        Self::new(index, labels, rows)
    }

    /// True when the frame has no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty() || self.columns.is_empty()
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.index.len(), self.columns.len())
    }

    pub fn index(&self) -> &[Label] {
        &self.index
    }

    pub fn columns(&self) -> &[Label] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn get(&self, row: usize, column: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|cells| cells.get(column))
    }

    pub fn row(&self, label: &Label) -> Option<&[Cell]> {
        let position = self.index.iter().position(|candidate| candidate == label)?;
        Some(&self.rows[position])
    }

    pub fn column(&self, label: &Label) -> Option<Vec<&Cell>> {
        let position = self.columns.iter().position(|candidate| candidate == label)?;
        Some(self.rows.iter().map(|cells| &cells[position]).collect())
    }

    /// Swap rows and columns: column labels become the index and vice versa.
    pub fn transpose(self) -> Self {
        let Self { index, columns, rows } = self;
        let mut transposed: Vec<Vec<Cell>> = (0..columns.len()).map(|_| Vec::with_capacity(index.len())).collect();
        for cells in rows {
            for (target, cell) in transposed.iter_mut().zip(cells) {
                target.push(cell);
            }
        }
        Self {
            index: columns,
            columns: index,
            rows: transposed,
        }
    }

    /// Convert every index label to an integer label.
    ///
    /// All-or-nothing: when any label does not parse, the index is left
    /// untouched and `false` is returned.
    pub fn coerce_index_to_int(&mut self) -> bool {
        let Some(coerced) = self.index.iter().map(Label::to_int).collect::<Option<Vec<i64>>>() else {
            return false;
        };
        self.index = coerced.into_iter().map(Label::Int).collect();
        true
    }

    /// Stable sort of the rows by their index label.
    pub fn sort_by_index(&mut self) {
        let mut paired: Vec<(Label, Vec<Cell>)> = self.index.drain(..).zip(self.rows.drain(..)).collect();
        paired.sort_by(|left, right| left.0.cmp(&right.0));
        for (label, cells) in paired {
            self.index.push(label);
            self.rows.push(cells);
        }
    }
}
