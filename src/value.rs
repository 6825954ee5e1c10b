use crate::token::TokenKind;
use derive_more::Display;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Scalar {
    #[display(fmt = "{}", _0)]
    Integer(i64),
    #[display(fmt = "{}", _0)]
    Text(String),
}

/// Faults raised by scalar operators. They carry no location; the interpreter
/// attaches the location of the offending expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("Unsupported operand kinds for '{op}': {left} and {right}")]
    Unsupported {
        op: TokenKind,
        left: &'static str,
        right: &'static str,
    },

    #[error("Cannot compare {left} with {right} using '{op}'")]
    InvalidComparison {
        op: TokenKind,
        left: &'static str,
        right: &'static str,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Integer overflow in '{0}'")]
    Overflow(TokenKind),
}

impl Scalar {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Scalar::Integer(_) => "integer",
            Scalar::Text(_) => "text",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            Scalar::Integer(_) => None,
        }
    }

    pub fn evaluate_binary_operation(
        &self,
        op: TokenKind,
        rhs: &Self,
    ) -> Result<Scalar, OperationError> {
        use Scalar::*;

        let overflow = || OperationError::Overflow(op);
        let unsupported = || OperationError::Unsupported {
            op,
            left: self.kind_name(),
            right: rhs.kind_name(),
        };

        match (op, self, rhs) {
            (TokenKind::Plus, Integer(a), Integer(b)) => {
                a.checked_add(*b).map(Integer).ok_or_else(overflow)
            }
            (TokenKind::Plus, Text(a), Text(b)) => Ok(Text(format!("{a}{b}"))),
            (TokenKind::Minus, Integer(a), Integer(b)) => {
                a.checked_sub(*b).map(Integer).ok_or_else(overflow)
            }
            (TokenKind::Star, Integer(a), Integer(b)) => {
                a.checked_mul(*b).map(Integer).ok_or_else(overflow)
            }
            (TokenKind::Star, Text(s), Integer(n)) | (TokenKind::Star, Integer(n), Text(s)) => {
                repeat(s, *n).map(Text).ok_or_else(overflow)
            }
            (TokenKind::Slash, Integer(a), Integer(b)) => floor_div(*a, *b).map(Integer),
            _ => Err(unsupported()),
        }
    }

    pub fn evaluate_comparison(&self, op: TokenKind, rhs: &Self) -> Result<bool, OperationError> {
        use Scalar::*;

        let ordering = match (self, rhs) {
            (Integer(a), Integer(b)) => Some(a.cmp(b)),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            _ => None,
        };

        match (op, ordering) {
            (TokenKind::EqualEqual, _) => Ok(self == rhs),
            (TokenKind::BangEqual, _) => Ok(self != rhs),
            (TokenKind::Greater, Some(o)) => Ok(o.is_gt()),
            (TokenKind::GreaterEqual, Some(o)) => Ok(o.is_ge()),
            (TokenKind::Less, Some(o)) => Ok(o.is_lt()),
            (TokenKind::LessEqual, Some(o)) => Ok(o.is_le()),
            _ => Err(OperationError::InvalidComparison {
                op,
                left: self.kind_name(),
                right: rhs.kind_name(),
            }),
        }
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Integer(n)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

/// Division rounding toward negative infinity.
fn floor_div(a: i64, b: i64) -> Result<i64, OperationError> {
    if b == 0 {
        return Err(OperationError::DivisionByZero);
    }
    let q = a
        .checked_div(b)
        .ok_or(OperationError::Overflow(TokenKind::Slash))?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

// a negative count yields empty text
fn repeat(s: &str, count: i64) -> Option<String> {
    let count = usize::try_from(count.max(0)).ok()?;
    s.len().checked_mul(count)?;
    Some(s.repeat(count))
}

/// Reads a CSV field: an integer when the whole text is a decimal integer
/// literal (optionally signed), text otherwise.
pub fn coerce(text: &str) -> Scalar {
    match text.parse::<i64>() {
        Ok(n) => Scalar::Integer(n),
        Err(_) => Scalar::Text(text.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Scalar>>,
}

impl Table {
    /// Creates an empty table. Callers check column uniqueness first.
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Scalar>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// The first column name that appears more than once, if any.
    pub fn duplicate_column(columns: &[String]) -> Option<&str> {
        columns
            .iter()
            .enumerate()
            .find(|(i, c)| columns[..*i].contains(*c))
            .map(|(_, c)| c.as_str())
    }

    /// Index of the first row whose key field (field 0) equals `key`.
    pub fn find_row(&self, key: Option<&Scalar>) -> Option<usize> {
        self.rows.iter().position(|row| row.first() == key)
    }

    /// Replaces the row with the same key in place, or appends it.
    /// The row must have one field per column.
    pub fn upsert_row(&mut self, row: Vec<Scalar>) {
        debug_assert_eq!(row.len(), self.columns.len());
        match self.find_row(row.first()) {
            Some(index) => self.rows[index] = row,
            None => self.rows.push(row),
        }
    }

    /// Appends a row without key matching. The row must have one field per column.
    pub fn push_row(&mut self, row: Vec<Scalar>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn set_cell(&mut self, row: usize, column: usize, value: Scalar) {
        self.rows[row][column] = value;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Scalar(Scalar),
    Table(Table),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Scalar(s) => s.kind_name(),
            Value::Table(_) => "table",
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        Value::Scalar(scalar)
    }
}

impl From<Table> for Value {
    fn from(table: Table) -> Self {
        Value::Table(table)
    }
}
