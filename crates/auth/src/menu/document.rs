//! Menu upload document (YAML).
//!
//! Accepted shapes:
//!
//! ```yaml
//! menus:
//!   - id: dashboard
//!     name: Dashboard
//!     path: /dashboard
//!     icon: home
//!     children:
//!       - id: patients
//!         name: Patients
//!         path: /dashboard/patients
//!         component: PatientList
//! ```
//!
//! or the bare top-level list.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use warden_core::MenuRowId;

use super::tree::MenuNode;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MenuDocumentError {
    #[error("menu document is not valid YAML: {0}")]
    Syntax(String),

    #[error("menu document contains no menus")]
    Empty,

    #[error("menu at {location} is missing required field '{field}'")]
    MissingField { location: String, field: &'static str },

    #[error("duplicate menu id '{0}'")]
    DuplicateId(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MenuSpec {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    pub icon: Option<String>,
    pub component: Option<String>,
    #[serde(default)]
    pub children: Vec<MenuSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDocument {
    Wrapped { menus: Vec<MenuSpec> },
    Bare(Vec<MenuSpec>),
}

/// Parse and validate an upload, returning its top-level specs.
pub fn parse_menu_document(text: &str) -> Result<Vec<MenuSpec>, MenuDocumentError> {
    let raw: RawDocument =
        serde_yaml::from_str(text).map_err(|e| MenuDocumentError::Syntax(e.to_string()))?;
    let menus = match raw {
        RawDocument::Wrapped { menus } => menus,
        RawDocument::Bare(menus) => menus,
    };
    if menus.is_empty() {
        return Err(MenuDocumentError::Empty);
    }

    let mut seen = HashSet::new();
    validate(&menus, "root", &mut seen)?;
    Ok(menus)
}

fn validate(
    specs: &[MenuSpec],
    parent: &str,
    seen: &mut HashSet<String>,
) -> Result<(), MenuDocumentError> {
    for (idx, spec) in specs.iter().enumerate() {
        // Rows store the trimmed id, so uniqueness is judged on it too.
        let id = spec.id.trim();
        let location = if id.is_empty() {
            format!("{parent}[{idx}]")
        } else {
            id.to_string()
        };
        for (field, value) in [("id", &spec.id), ("name", &spec.name), ("path", &spec.path)] {
            if value.trim().is_empty() {
                return Err(MenuDocumentError::MissingField { location, field });
            }
        }
        if !seen.insert(id.to_string()) {
            return Err(MenuDocumentError::DuplicateId(id.to_string()));
        }
        validate(&spec.children, &location, seen)?;
    }
    Ok(())
}

/// Flatten validated specs into storable rows of `version`.
///
/// `sort` is the position among siblings in document order.
pub fn flatten_menus(specs: &[MenuSpec], version: &str, created_at: DateTime<Utc>) -> Vec<MenuNode> {
    let mut out = Vec::new();
    push_rows(specs, None, version, created_at, &mut out);
    out
}

fn push_rows(
    specs: &[MenuSpec],
    parent: Option<&str>,
    version: &str,
    created_at: DateTime<Utc>,
    out: &mut Vec<MenuNode>,
) {
    for (idx, spec) in specs.iter().enumerate() {
        out.push(MenuNode {
            row_id: MenuRowId::new(),
            id: spec.id.trim().to_string(),
            parent_id: parent.map(str::to_string),
            name: spec.name.clone(),
            path: spec.path.clone(),
            icon: spec.icon.clone(),
            component: spec.component.clone(),
            sort: i32::try_from(idx).unwrap_or(i32::MAX),
            version: version.to_string(),
            created_at,
        });
        push_rows(&spec.children, Some(spec.id.trim()), version, created_at, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::tree::build_tree;

    const DOC: &str = r#"
menus:
  - id: dashboard
    name: Dashboard
    path: /dashboard
    icon: home
    children:
      - id: patients
        name: Patients
        path: /dashboard/patients
        component: PatientList
      - id: wards
        name: Wards
        path: /dashboard/wards
  - id: settings
    name: Settings
    path: /settings
"#;

    #[test]
    fn parses_wrapped_document_and_flattens_with_parents() {
        let specs = parse_menu_document(DOC).unwrap();
        let rows = flatten_menus(&specs, "v1", Utc::now());
        assert_eq!(rows.len(), 4);

        let patients = rows.iter().find(|r| r.id == "patients").unwrap();
        assert_eq!(patients.parent_id.as_deref(), Some("dashboard"));
        assert_eq!(patients.sort, 0);
        assert_eq!(patients.component.as_deref(), Some("PatientList"));

        let tree = build_tree(&rows);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].children.len(), 2);
    }

    #[test]
    fn accepts_bare_list() {
        let specs = parse_menu_document("- {id: a, name: A, path: /a}\n").unwrap();
        assert_eq!(specs.len(), 1);
    }

    #[test]
    fn rejects_duplicate_ids_across_levels() {
        let doc = r#"
- id: a
  name: A
  path: /a
  children:
    - id: a
      name: Again
      path: /a/a
"#;
        assert_eq!(
            parse_menu_document(doc),
            Err(MenuDocumentError::DuplicateId("a".into()))
        );
    }

    #[test]
    fn ids_differing_only_in_whitespace_are_duplicates() {
        let doc = r#"
- id: m1
  name: First
  path: /m1
- id: "m1 "
  name: Second
  path: /m1-again
"#;
        assert_eq!(
            parse_menu_document(doc),
            Err(MenuDocumentError::DuplicateId("m1".into()))
        );
    }

    #[test]
    fn rejects_missing_path() {
        let err = parse_menu_document("- {id: a, name: A}\n").unwrap_err();
        assert!(matches!(err, MenuDocumentError::MissingField { field: "path", .. }));
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert_eq!(parse_menu_document("menus: []"), Err(MenuDocumentError::Empty));
        assert!(matches!(
            parse_menu_document(": : :"),
            Err(MenuDocumentError::Syntax(_))
        ));
    }
}
