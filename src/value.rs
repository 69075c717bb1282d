use indexmap::IndexMap;

/// Delimiter used to pack a string array into a single string value.
///
/// The settings dialect cannot distinguish a one-element array from a plain
/// string, so arrays are carried as one string with elements joined by this
/// sequence (see [`Value::List`]).
pub const LIST_DELIMITER: &str = ";;;;";

/// An insertion-ordered table of string keys to values.
///
/// Order is significant: re-encoding a table writes its entries back in the
/// order they were read, so a rewritten settings file keeps the layout the
/// reader application gave it.
pub type Table = IndexMap<String, Value>;

/// A value decoded from a settings table literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
    Table(Table),
    /// A string array, stored in the file as a single string with elements
    /// joined by [`LIST_DELIMITER`]. Arrays of non-string values are not
    /// representable.
    List(Vec<String>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// The numeric value, when it is integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Num(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Num(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Nested lookup and insertion on dotted paths like `summary.status`.
pub trait TableExt {
    fn get_path(&self, path: &[&str]) -> Option<&Value>;

    /// Sets `value` at `path`, creating intermediate tables as needed. An
    /// intermediate that exists but is not a table is replaced.
    fn set_path(&mut self, path: &[&str], value: Value);
}

impl TableExt for Table {
    fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let found = self.get(*first)?;
        if rest.is_empty() {
            Some(found)
        } else {
            found.as_table()?.get_path(rest)
        }
    }

    fn set_path(&mut self, path: &[&str], value: Value) {
        let Some((first, rest)) = path.split_first() else {
            return;
        };
        if rest.is_empty() {
            self.insert(first.to_string(), value);
            return;
        }
        let entry = self
            .entry(first.to_string())
            .or_insert_with(|| Value::Table(Table::new()));
        if !matches!(entry, Value::Table(_)) {
            *entry = Value::Table(Table::new());
        }
        if let Value::Table(inner) = entry {
            inner.set_path(rest, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_i64_integral_only() {
        assert_eq!(Value::Num(42.0).as_i64(), Some(42));
        assert_eq!(Value::Num(-7.0).as_i64(), Some(-7));
        assert_eq!(Value::Num(0.5).as_i64(), None);
        assert_eq!(Value::Str("42".to_string()).as_i64(), None);
    }

    #[test]
    fn test_get_path_nested() {
        let mut tree = Table::new();
        tree.set_path(&["summary", "status"], Value::from("complete"));

        assert_eq!(
            tree.get_path(&["summary", "status"]).and_then(Value::as_str),
            Some("complete")
        );
        assert_eq!(tree.get_path(&["summary", "missing"]), None);
        assert_eq!(tree.get_path(&["missing", "status"]), None);
    }

    #[test]
    fn test_set_path_replaces_non_table_intermediate() {
        let mut tree = Table::new();
        tree.insert("summary".to_string(), Value::from("scalar"));
        tree.set_path(&["summary", "status"], Value::from("reading"));

        assert_eq!(
            tree.get_path(&["summary", "status"]).and_then(Value::as_str),
            Some("reading")
        );
    }

    #[test]
    fn test_set_path_keeps_sibling_keys() {
        let mut tree = Table::new();
        tree.set_path(&["doc_props", "title"], Value::from("A Title"));
        tree.set_path(&["doc_props", "language"], Value::from("en"));

        let doc_props = tree.get("doc_props").and_then(Value::as_table).unwrap();
        assert_eq!(doc_props.len(), 2);
        assert_eq!(doc_props.get("title").and_then(Value::as_str), Some("A Title"));
    }
}
