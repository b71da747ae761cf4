use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

//==============================================================================
// Cell values and records
//==============================================================================

/// A single parsed field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    /// A field that parsed fully as a number
    Number(f64),
    /// Any other (trimmed) field text
    Text(String),
    /// A position the row never reached
    Null,
}

impl Cell {
    /// Build a cell from trimmed field text, coercing numeric-looking text
    pub fn from_field(text: &str) -> Self {
        if is_numeric_text(text) {
            if let Ok(n) = text.trim().parse::<f64>() {
                return Cell::Number(n);
            }
        }
        Cell::Text(text.to_string())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) if is_numeric_text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Blank means null, empty text, or the literal text `null`
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Text(s) => {
                let t = s.trim();
                t.is_empty() || t.eq_ignore_ascii_case("null")
            }
            Cell::Number(_) => false,
        }
    }

    /// Raw display text, as it would be concatenated into a report column
    pub fn to_display(&self) -> String {
        match self {
            Cell::Number(n) => format_number(*n),
            Cell::Text(s) => s.clone(),
            Cell::Null => "null".to_string(),
        }
    }
}

/// An ordered mapping from header name to value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: IndexMap<String, Cell>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field. A repeated header overwrites the earlier value in place.
    pub fn insert(&mut self, header: impl Into<String>, value: Cell) {
        self.fields.insert(header.into(), value);
    }

    pub fn get(&self, header: &str) -> Option<&Cell> {
        self.fields.get(header)
    }

    pub fn headers(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Cell)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Cell)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Cell)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// A named, ordered sequence of records sharing one header set
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub name: String,
    pub headers: Vec<String>,
    pub records: Vec<Record>,
}

impl SourceTable {
    pub fn new(name: impl Into<String>, headers: Vec<String>, records: Vec<Record>) -> Self {
        // Duplicate headers collapse the same way record keys do
        let mut unique: Vec<String> = Vec::with_capacity(headers.len());
        for header in headers {
            if !unique.contains(&header) {
                unique.push(header);
            }
        }
        Self {
            name: name.into(),
            headers: unique,
            records,
        }
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All values of one column, in row order
    pub fn column(&self, header: &str) -> Vec<&Cell> {
        self.records
            .iter()
            .map(|r| r.get(header).unwrap_or(&Cell::Null))
            .collect()
    }
}

//==============================================================================
// Presentation
//==============================================================================

/// One extra column carried into the result payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationColumn {
    /// Field specification, usually `source.column`
    pub field: String,
    /// Display heading
    #[serde(default)]
    pub heading: String,
}

impl PresentationColumn {
    pub fn new(field: impl Into<String>, heading: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            heading: heading.into(),
        }
    }
}

/// Presentation configuration supplied alongside a formula
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresentationConfig {
    #[serde(default)]
    pub columns: Vec<PresentationColumn>,
}

//==============================================================================
// Helpers
//==============================================================================

/// True when the whole (trimmed) text is a plain decimal number
pub fn is_numeric_text(text: &str) -> bool {
    let t = text.trim();
    !t.is_empty()
        && t.chars().any(|c| c.is_ascii_digit())
        && t
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
        && t.parse::<f64>().is_ok()
}

/// Format a number the way it is written back into formula text
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_from_field_numeric() {
        assert_eq!(Cell::from_field("42"), Cell::Number(42.0));
        assert_eq!(Cell::from_field("-3.5"), Cell::Number(-3.5));
        assert_eq!(Cell::from_field("1e3"), Cell::Number(1000.0));
    }

    #[test]
    fn test_cell_from_field_text() {
        assert_eq!(Cell::from_field("3W"), Cell::Text("3W".to_string()));
        assert_eq!(Cell::from_field("inf"), Cell::Text("inf".to_string()));
        assert_eq!(Cell::from_field(""), Cell::Text(String::new()));
    }

    #[test]
    fn test_cell_blank() {
        assert!(Cell::Null.is_blank());
        assert!(Cell::Text("  ".to_string()).is_blank());
        assert!(Cell::Text("NULL".to_string()).is_blank());
        assert!(!Cell::Number(0.0).is_blank());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
    }

    #[test]
    fn test_record_duplicate_header_overwrites() {
        let mut record = Record::new();
        record.insert("a", Cell::Number(1.0));
        record.insert("b", Cell::Number(2.0));
        record.insert("a", Cell::Number(3.0));
        assert_eq!(record.headers(), vec!["a", "b"]);
        assert_eq!(record.get("a"), Some(&Cell::Number(3.0)));
    }

    #[test]
    fn test_source_table_dedupes_headers() {
        let table = SourceTable::new(
            "t",
            vec!["a".to_string(), "b".to_string(), "a".to_string()],
            Vec::new(),
        );
        assert_eq!(table.headers, vec!["a", "b"]);
        assert!(table.is_empty());
    }
}
