//! Bound SQL statements for the analytics service.
//!
//! The analytics SQL API only accepts a query string, so parameters are bound
//! on our side: templates use `?` placeholders and every value is rendered as
//! a literal with quoting applied. Identifiers (table and model names) cannot
//! be bound and are validated with [`ident`] instead.
//!
//! ```rust
//! use repo_reader::sql::Statement;
//!
//! let stmt = Statement::new("SELECT * FROM t WHERE user = ? LIMIT ?")
//!     .bind("o'brien")
//!     .bind(5i64);
//! assert_eq!(stmt.render().unwrap(), "SELECT * FROM t WHERE user = 'o''brien' LIMIT 5");
//! ```

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BindError {
    #[error("statement has {placeholders} placeholders but {params} parameters were bound")]
    CountMismatch { placeholders: usize, params: usize },
    #[error("cannot bind non-finite float {0}")]
    NonFinite(f64),
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
}

/// A value bound into a [`Statement`].
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl SqlValue {
    fn render(&self, out: &mut String) -> Result<(), BindError> {
        match self {
            SqlValue::Text(s) => {
                out.push('\'');
                for c in s.chars() {
                    match c {
                        '\'' => out.push_str("''"),
                        '\\' => out.push_str("\\\\"),
                        '\0' => out.push_str("\\0"),
                        _ => out.push(c),
                    }
                }
                out.push('\'');
            }
            SqlValue::Integer(i) => out.push_str(&i.to_string()),
            SqlValue::Float(f) => {
                if !f.is_finite() {
                    return Err(BindError::NonFinite(*f));
                }
                out.push_str(&f.to_string());
            }
        }
        Ok(())
    }
}

/// A SQL template plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    template: String,
    params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Produces the final query text.
    ///
    /// `?` inside single- or double-quoted literals of the template is left
    /// untouched.
    pub fn render(&self) -> Result<String, BindError> {
        let placeholders = count_placeholders(&self.template);
        if placeholders != self.params.len() {
            return Err(BindError::CountMismatch {
                placeholders,
                params: self.params.len(),
            });
        }

        let mut out = String::with_capacity(self.template.len() + 16);
        let mut params = self.params.iter();
        let mut quote: Option<char> = None;

        for c in self.template.chars() {
            match (quote, c) {
                (None, '\'' | '"') => {
                    quote = Some(c);
                    out.push(c);
                }
                (Some(q), _) if c == q => {
                    quote = None;
                    out.push(c);
                }
                (None, '?') => {
                    if let Some(p) = params.next() {
                        p.render(&mut out)?;
                    }
                }
                _ => out.push(c),
            }
        }

        Ok(out)
    }
}

fn count_placeholders(template: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut n = 0;
    for c in template.chars() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), _) if c == q => quote = None,
            (None, '?') => n += 1,
            _ => {}
        }
    }
    n
}

/// Validates an identifier for splicing into a template.
///
/// Accepts `name` or dotted `schema.name` where each part matches
/// `[A-Za-z_][A-Za-z0-9_]*`.
pub fn ident(name: &str) -> Result<&str, BindError> {
    let valid = !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(name)
    } else {
        Err(BindError::InvalidIdentifier(name.to_string()))
    }
}
