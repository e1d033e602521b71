use strata_common::Result;

/// A value bound to, or read back from, a SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Bool(bool),
    Text(String),
}

impl SqlValue {
    /// Interpret the value as an integer. SQLite stores booleans as 0/1, so
    /// `Bool` converts as well.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            SqlValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

/// One result row, columns in select order.
pub type Row = Vec<SqlValue>;

/// The database connection the migrator drives.
///
/// Calls are strictly sequential: the migrator never has more than one
/// statement or transaction in flight. Implementations map driver failures to
/// `Error::Database`.
pub trait DatabaseHandle {
    /// Execute one or more statements that take no parameters.
    fn execute_batch(&mut self, sql: &str) -> Result<()>;

    /// Execute a single statement with positional parameters. Returns the
    /// number of affected rows.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize>;

    /// Run a query and collect every row.
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;
}
