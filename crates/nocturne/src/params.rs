//! Named-parameter extraction.
//!
//! Rewrites `:name` placeholders into positional `?` placeholders in a single
//! left-to-right scan and records, per name, every positional slot it occupies.
//! Placeholders inside single-quoted literals are left alone. Within a literal a
//! backslash escapes the next character, and `''` closes and reopens the literal.

use indexmap::IndexMap;

use crate::error::{Error, Result};

/// A parameter name with the 1-based positional slots it occupies in the
/// normalized SQL. Positions are ascending and never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedParameter {
    name: String,
    positions: Vec<usize>,
}

impl NamedParameter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }
}

/// Parameter names in order of first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterMap {
    params: IndexMap<String, NamedParameter>,
    placeholders: usize,
}

impl ParameterMap {
    pub fn get(&self, name: &str) -> Option<&NamedParameter> {
        self.params.get(name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.params.get_index_of(name)
    }

    pub fn positions(&self, name: &str) -> Option<&[usize]> {
        self.params.get(name).map(NamedParameter::positions)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedParameter> {
        self.params.values()
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Number of `?` placeholders in the normalized SQL.
    pub fn placeholder_count(&self) -> usize {
        self.placeholders
    }

    fn record(&mut self, name: &str, start: usize) -> Result<()> {
        if name.is_empty() {
            return Err(Error::Syntax(format!(
                "zero-length parameter name at position {}",
                start
            )));
        }
        self.placeholders += 1;
        let position = self.placeholders;
        self.params
            .entry(name.to_string())
            .or_insert_with(|| NamedParameter {
                name: name.to_string(),
                positions: Vec::new(),
            })
            .positions
            .push(position);
        Ok(())
    }
}

enum State {
    Normal,
    Literal { escaped: bool },
    Name { start: usize },
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Normalize `sql`, returning the positional SQL and its parameter map.
pub fn extract(sql: &str) -> Result<(String, ParameterMap)> {
    let mut normalized = String::with_capacity(sql.len());
    let mut map = ParameterMap::default();
    let mut name = String::new();
    let mut state = State::Normal;

    for (i, c) in sql.char_indices() {
        state = match state {
            State::Literal { escaped } => {
                normalized.push(c);
                if escaped {
                    State::Literal { escaped: false }
                } else if c == '\\' {
                    State::Literal { escaped: true }
                } else if c == '\'' {
                    State::Normal
                } else {
                    State::Literal { escaped: false }
                }
            }
            State::Name { start } if is_name_char(c) => {
                name.push(c);
                State::Name { start }
            }
            State::Name { start } => {
                map.record(&name, start)?;
                if c == ':' {
                    return Err(Error::Syntax(format!(
                        "adjacent parameters at positions {} and {} cannot yield valid SQL",
                        start, i
                    )));
                }
                normalized.push(c);
                if c == '\'' {
                    State::Literal { escaped: false }
                } else {
                    State::Normal
                }
            }
            State::Normal if c == ':' => {
                normalized.push('?');
                name.clear();
                State::Name { start: i }
            }
            State::Normal => {
                normalized.push(c);
                if c == '\'' {
                    State::Literal { escaped: false }
                } else {
                    State::Normal
                }
            }
        };
    }

    if let State::Name { start } = state {
        map.record(&name, start)?;
    }
    Ok((normalized, map))
}
