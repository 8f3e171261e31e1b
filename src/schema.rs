//! Column type inference and value coercion for materialized tables.
//!
//! Inference is a pure pass over a [`ResultTable`]: each column's type is
//! decided from its first `sample_rows` non-null values.
//!
//! | Sampled values | Column type |
//! |----------------|-------------|
//! | all whole numbers | `Integer` |
//! | all numbers, some fractional | `Float` |
//! | anything else, or no values at all | `Text` |
//!
//! An `Integer` column is widened to `Float` when a fractional number shows
//! up anywhere in the table, sampled or not.
//!
//! The `id` column is always first and always a `BigInt` auto-increment
//! primary key, whether or not the incoming table carries one. SQLite
//! column names are case-insensitive, so names differing only in case
//! collapse into one column (the last one wins).

use crate::error::CoerceError;
use crate::models::{ResultTable, Scalar};

pub const ID_COLUMN: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Integer,
    Float,
    Text,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::BigInt => "bigint",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
        }
    }

    /// SQLite storage type used in `CREATE TABLE`.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::BigInt | ColumnType::Integer => "INTEGER",
            ColumnType::Float => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    /// Map a declared SQLite column type back to a [`ColumnType`].
    pub fn from_declared(declared: &str, primary_key: bool) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            if primary_key {
                ColumnType::BigInt
            } else {
                ColumnType::Integer
            }
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            ColumnType::Float
        } else {
            ColumnType::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Look a column up the way SQLite does, ignoring ASCII case.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn create_sql(&self, table: &str) -> String {
        let defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                if c.name == ID_COLUMN {
                    format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote_ident(&c.name))
                } else {
                    format!("{} {}", quote_ident(&c.name), c.ty.sql_type())
                }
            })
            .collect();
        format!("CREATE TABLE IF NOT EXISTS {} ({})", quote_ident(table), defs.join(", "))
    }
}

/// Double-quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn infer_schema(table: &ResultTable, sample_rows: usize) -> TableSchema {
    let mut columns = vec![ColumnDef {
        name: ID_COLUMN.to_string(),
        ty: ColumnType::BigInt,
    }];

    for (idx, name) in table.columns().iter().enumerate() {
        if name.eq_ignore_ascii_case(ID_COLUMN) {
            continue;
        }
        columns.retain(|c| c.name == ID_COLUMN || !c.name.eq_ignore_ascii_case(name));

        let values = || table.rows().iter().map(move |row| &row[idx]).filter(|v| !v.is_null());
        let mut ty = infer_column(values().take(sample_rows));
        if ty == ColumnType::Integer && values().any(is_fractional) {
            ty = ColumnType::Float;
        }
        columns.push(ColumnDef {
            name: name.clone(),
            ty,
        });
    }

    TableSchema { columns }
}

fn is_fractional(value: &Scalar) -> bool {
    matches!(value, Scalar::Float(v) if v.is_finite() && v.fract() != 0.0)
}

fn infer_column<'a>(values: impl Iterator<Item = &'a Scalar>) -> ColumnType {
    let mut seen = false;
    let mut fractional = false;
    for value in values {
        seen = true;
        match value {
            Scalar::Int(_) => {}
            Scalar::Float(v) if v.is_finite() => {
                if v.fract() != 0.0 {
                    fractional = true;
                }
            }
            _ => return ColumnType::Text,
        }
    }
    match (seen, fractional) {
        (false, _) => ColumnType::Text,
        (true, false) => ColumnType::Integer,
        (true, true) => ColumnType::Float,
    }
}

/// Convert `value` to the representation stored in a `ty` column.
///
/// Fractional numbers bound for an integer column are kept as floats;
/// SQLite stores them as REAL rather than truncating.
pub fn coerce(column: &str, value: &Scalar, ty: ColumnType) -> Result<Scalar, CoerceError> {
    let fail = || CoerceError {
        column: column.to_string(),
        value: value.render(),
        target: ty.as_str(),
    };

    match (ty, value) {
        (_, Scalar::Null) => Ok(Scalar::Null),
        (ColumnType::Text, other) => Ok(Scalar::Text(other.render())),
        (ColumnType::BigInt | ColumnType::Integer, Scalar::Int(v)) => Ok(Scalar::Int(*v)),
        (ColumnType::BigInt, Scalar::Float(v)) => whole_to_int(*v).map(Scalar::Int).ok_or_else(fail),
        (ColumnType::Integer, Scalar::Float(v)) => int_or_float(*v).ok_or_else(fail),
        (ColumnType::BigInt | ColumnType::Integer, Scalar::Text(s)) => {
            let s = s.trim();
            if let Ok(v) = s.parse::<i64>() {
                return Ok(Scalar::Int(v));
            }
            let parsed = s.parse::<f64>().ok();
            let value = match ty {
                ColumnType::Integer => parsed.and_then(int_or_float),
                _ => parsed.and_then(whole_to_int).map(Scalar::Int),
            };
            value.ok_or_else(fail)
        }
        (ColumnType::Float, Scalar::Int(v)) => Ok(Scalar::Float(*v as f64)),
        (ColumnType::Float, Scalar::Float(v)) => Ok(Scalar::Float(*v)),
        (ColumnType::Float, Scalar::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Scalar::Float)
            .map_err(|_| fail()),
    }
}

fn int_or_float(v: f64) -> Option<Scalar> {
    if !v.is_finite() {
        return None;
    }
    Some(whole_to_int(v).map(Scalar::Int).unwrap_or(Scalar::Float(v)))
}

fn whole_to_int(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ResultTable {
        let mut t = ResultTable::new(vec![
            "sku".into(),
            "price".into(),
            "name".into(),
            "empty".into(),
            "id".into(),
        ]);
        t.push_row(vec![
            Scalar::Int(1),
            Scalar::Float(10.0),
            "a".into(),
            Scalar::Null,
            Scalar::Int(5),
        ]);
        t.push_row(vec![
            Scalar::Int(2),
            Scalar::Float(10.5),
            Scalar::Int(3),
            Scalar::Null,
            Scalar::Int(6),
        ]);
        t
    }

    #[test]
    fn infers_types_with_id_first() {
        let schema = infer_schema(&table(), 1000);
        let pairs: Vec<(&str, ColumnType)> =
            schema.columns.iter().map(|c| (c.name.as_str(), c.ty)).collect();
        assert_eq!(
            pairs,
            vec![
                ("id", ColumnType::BigInt),
                ("sku", ColumnType::Integer),
                ("price", ColumnType::Float),
                ("name", ColumnType::Text),
                ("empty", ColumnType::Text),
            ]
        );
    }

    #[test]
    fn sample_limit_bounds_inspection() {
        let mut t = ResultTable::new(vec!["sales".into()]);
        t.push_row(vec![Scalar::Int(4)]);
        t.push_row(vec!["n/a".into()]);
        assert_eq!(infer_schema(&t, 1).column("sales").unwrap().ty, ColumnType::Integer);
        assert_eq!(infer_schema(&t, 2).column("sales").unwrap().ty, ColumnType::Text);
    }

    #[test]
    fn fractional_value_past_the_sample_widens_to_float() {
        // Only the first row is sampled; 10.0 is whole but 10.5 follows
        let schema = infer_schema(&table(), 1);
        assert_eq!(schema.column("price").unwrap().ty, ColumnType::Float);
        assert_eq!(schema.column("sku").unwrap().ty, ColumnType::Integer);
        assert_eq!(schema.column("name").unwrap().ty, ColumnType::Text);
    }

    #[test]
    fn names_differing_in_case_collapse_to_the_last() {
        let mut t = ResultTable::new(vec!["name".into(), "sales".into(), "Name".into(), "ID".into()]);
        t.push_row(vec!["a".into(), Scalar::Int(1), Scalar::Int(2), Scalar::Int(9)]);
        let schema = infer_schema(&t, 10);
        let pairs: Vec<(&str, ColumnType)> =
            schema.columns.iter().map(|c| (c.name.as_str(), c.ty)).collect();
        assert_eq!(
            pairs,
            vec![
                ("id", ColumnType::BigInt),
                ("sales", ColumnType::Integer),
                ("Name", ColumnType::Integer),
            ]
        );
    }

    #[test]
    fn id_is_added_when_missing() {
        let t = ResultTable::new(vec!["sku".into()]);
        let schema = infer_schema(&t, 10);
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["id", "sku"]);
        assert!(schema
            .create_sql("brand_ACME")
            .starts_with("CREATE TABLE IF NOT EXISTS \"brand_ACME\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
    }

    #[test]
    fn coercion_rules() {
        assert_eq!(coerce("c", &Scalar::Float(3.0), ColumnType::Integer).unwrap(), Scalar::Int(3));
        assert_eq!(coerce("c", &" 42 ".into(), ColumnType::BigInt).unwrap(), Scalar::Int(42));
        assert_eq!(coerce("c", &Scalar::Int(2), ColumnType::Float).unwrap(), Scalar::Float(2.0));
        assert_eq!(coerce("c", &Scalar::Float(1.5), ColumnType::Text).unwrap(), Scalar::Text("1.5".into()));
        assert_eq!(coerce("c", &Scalar::Null, ColumnType::Integer).unwrap(), Scalar::Null);

        let err = coerce("sales", &"lots".into(), ColumnType::Integer).unwrap_err();
        assert_eq!(err.column, "sales");
        assert_eq!(err.target, "integer");
        assert_eq!(coerce("c", &Scalar::Float(1.5), ColumnType::Integer).unwrap(), Scalar::Float(1.5));
        assert_eq!(coerce("c", &"2.5".into(), ColumnType::Integer).unwrap(), Scalar::Float(2.5));
        assert!(coerce("id", &Scalar::Float(1.5), ColumnType::BigInt).is_err());
        assert!(coerce("c", &Scalar::Float(f64::NAN), ColumnType::Integer).is_err());
    }

    #[test]
    fn declared_types_map_back() {
        assert_eq!(ColumnType::from_declared("INTEGER", true), ColumnType::BigInt);
        assert_eq!(ColumnType::from_declared("integer", false), ColumnType::Integer);
        assert_eq!(ColumnType::from_declared("REAL", false), ColumnType::Float);
        assert_eq!(ColumnType::from_declared("", false), ColumnType::Text);
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("brand_Big \"B\""), "\"brand_Big \"\"B\"\"\"");
    }
}
