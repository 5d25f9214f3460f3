//! Plugin domains
//!
//! Each domain owns one schema root directory laid out as
//! `<root>/<plugin>/*.json` with an optional `<root>/<plugin>/migrate/` folder.

use std::fmt;
use std::str::FromStr;

use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};

use crate::engine::SourceFile;
use crate::error::SchemaError;

/// Envelope schemas every plugin of a domain must satisfy
static ENVELOPES: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/envelopes");

/// Package marker of plugin model schemas
pub const MODEL_PACKAGE: &str = "model";

/// Package marker of migration scripts
pub const MIGRATE_PACKAGE: &str = "migrate";

/// Name of the per-plugin folder holding migration scripts
pub const MIGRATE_DIR: &str = "migrate";

/// Annotation naming the package of a source file
pub const PACKAGE_ANNOTATION: &str = "x-package";

/// Whether a source file belongs to `package`. Files that do not parse as
/// JSON count as members; compiling them reports the syntax error.
pub(crate) fn declares_package(contents: &str, package: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(contents) {
        Ok(doc) => doc.get(PACKAGE_ANNOTATION).and_then(serde_json::Value::as_str) == Some(package),
        Err(_) => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Panel,
    Query,
    Datasource,
    Variable,
}

impl Domain {
    pub const ALL: [Domain; 4] = [
        Domain::Panel,
        Domain::Query,
        Domain::Datasource,
        Domain::Variable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Panel => "panel",
            Domain::Query => "query",
            Domain::Datasource => "datasource",
            Domain::Variable => "variable",
        }
    }

    /// Conventional directory name under a schemas root
    pub fn dir_name(&self) -> &'static str {
        match self {
            Domain::Panel => "panels",
            Domain::Query => "queries",
            Domain::Datasource => "datasources",
            Domain::Variable => "variables",
        }
    }

    /// The embedded envelope source, if this domain declares one
    pub fn envelope(&self) -> Option<SourceFile> {
        let file = ENVELOPES.get_file(format!("{}.json", self.as_str()))?;
        Some(SourceFile::new(
            file.path(),
            file.contents_utf8().unwrap_or_default(),
        ))
    }

    /// Whether migration scripts are looked up for this domain
    pub fn has_migrations(&self) -> bool {
        !matches!(self, Domain::Datasource)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == s || d.dir_name() == s)
            .ok_or_else(|| SchemaError::InvalidFormat(format!("unknown plugin domain: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_query_declares_envelope() {
        assert!(Domain::Query.envelope().is_some());
        assert!(Domain::Panel.envelope().is_none());
        assert!(Domain::Variable.envelope().is_none());
    }

    #[test]
    fn test_parse_domain() {
        assert_eq!("queries".parse::<Domain>().unwrap(), Domain::Query);
        assert_eq!("panel".parse::<Domain>().unwrap(), Domain::Panel);
        assert!("widgets".parse::<Domain>().is_err());
    }

    #[test]
    fn test_package_declaration() {
        assert!(declares_package(r#"{"x-package": "model", "kind": "Text"}"#, MODEL_PACKAGE));
        assert!(!declares_package(r#"{"x-package": "migrate"}"#, MODEL_PACKAGE));
        assert!(!declares_package(r#"{"name": "my-plugin", "$schema": "x"}"#, MODEL_PACKAGE));
        assert!(!declares_package("[1, 2]", MODEL_PACKAGE));
        assert!(declares_package(r#"{"x-package": "model", "kind": "#, MODEL_PACKAGE));
    }
}
