//! Typed identifiers shared across analyzer/planner/runtime components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dotted identifier uniquely naming a relation, base or synthetic.
///
/// Equality, ordering and hashing are structural over the parts. Synthetic
/// join relations embed their children's rendered names as single parts, so
/// `join.a.b` stays distinguishable from a base table that happens to render
/// the same.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    parts: Vec<String>,
}

impl QualifiedName {
    /// Build a name from its parts.
    pub fn new(parts: Vec<String>) -> Self {
        Self { parts }
    }

    /// Parse a dotted identifier such as `doc.t1`.
    pub fn from_dotted(name: &str) -> Self {
        Self {
            parts: name.split('.').map(str::to_string).collect(),
        }
    }

    /// The name's parts, schema first.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts.join("."))
    }
}

impl From<&str> for QualifiedName {
    fn from(name: &str) -> Self {
        Self::from_dotted(name)
    }
}

/// Column path within a relation: a root name plus nested path elements.
///
/// The rendered form is `name['el1']['el2']`. Join planning prefixes a
/// field's path with its previous owner's relation name, and the rendered
/// form of the old path becomes a single nested element, which keeps
/// composite output names unique across repeated re-anchoring.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnIdent {
    name: String,
    path: Vec<String>,
}

impl ColumnIdent {
    /// A plain top-level column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: Vec::new(),
        }
    }

    /// A column with a single nested element, e.g. `owner['column']`.
    pub fn child(name: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: vec![element.into()],
        }
    }

    /// Root name of the path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nested path elements, outermost first.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Rendered output name, `name['el1']['el2']`.
    pub fn output_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ColumnIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for element in &self.path {
            write!(f, "['{element}']")?;
        }
        Ok(())
    }
}
