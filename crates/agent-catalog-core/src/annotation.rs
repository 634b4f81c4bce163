//! Annotation query predicates.
//!
//! Grammar:
//!
//! ```text
//! predicate := conjunct ( "OR" conjunct )*
//! conjunct  := term ( "AND" term )*
//! term      := KEY "=" "\"" VALUE "\""  |  "\"" VALUE "\"" "=" KEY
//! ```
//!
//! `AND` binds tighter than `OR`, so a parsed predicate is a list of
//! disjuncts, each a set of key/value pairs that must all hold. Keys are
//! identifiers; values are double-quoted and may not contain quotes.
//!
//! A predicate is compiled once and then either evaluated per record
//! ([`AnnotationPredicate::matches`]) or rendered into a SQL filter with
//! bound parameters ([`AnnotationPredicate::to_sql`]).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CatalogError, Result};

static TERM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*(?:([A-Za-z_][A-Za-z0-9_]*)\s*=\s*"([^"]*)"|"([^"]*)"\s*=\s*([A-Za-z_][A-Za-z0-9_]*))\s*"#,
    )
    .expect("static regex is valid")
});

static OPERATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(AND|OR)\s").expect("static regex is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
}

/// A compiled annotation query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationPredicate {
    query: String,
    disjuncts: Vec<Vec<(String, String)>>,
    operators: Vec<Operator>,
}

impl AnnotationPredicate {
    pub fn parse(query: &str) -> Result<Self> {
        let mut rest = query;
        let mut disjuncts: Vec<Vec<(String, String)>> = vec![Vec::new()];
        let mut operators = Vec::new();

        loop {
            let caps = TERM_RE.captures(rest).ok_or_else(|| {
                CatalogError::Annotation(format!(
                    "expected KEY=\"VALUE\" at '{}' in '{}'",
                    rest.trim(),
                    query
                ))
            })?;
            let (key, value) = match (caps.get(1), caps.get(2), caps.get(3), caps.get(4)) {
                (Some(k), Some(v), _, _) => (k.as_str(), v.as_str()),
                (_, _, Some(v), Some(k)) => (k.as_str(), v.as_str()),
                _ => {
                    return Err(CatalogError::Annotation(format!(
                        "malformed term in '{}'",
                        query
                    )))
                }
            };
            if let Some(current) = disjuncts.last_mut() {
                current.push((key.to_string(), value.to_string()));
            }
            rest = &rest[caps[0].len()..];

            if rest.trim().is_empty() {
                break;
            }
            // Operators need trailing whitespace before the next term.
            let op = OPERATOR_RE.captures(rest).ok_or_else(|| {
                CatalogError::Annotation(format!(
                    "expected AND or OR at '{}' in '{}'",
                    rest.trim(),
                    query
                ))
            })?;
            match &op[1] {
                "AND" => operators.push(Operator::And),
                _ => {
                    operators.push(Operator::Or);
                    disjuncts.push(Vec::new());
                }
            }
            rest = &rest[op[0].len()..];
        }

        Ok(Self {
            query: query.trim().to_string(),
            disjuncts,
            operators,
        })
    }

    pub fn disjuncts(&self) -> &[Vec<(String, String)>] {
        &self.disjuncts
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    /// True if any disjunct has all of its pairs present in `annotations`.
    ///
    /// Records without annotations never match.
    pub fn matches(&self, annotations: Option<&BTreeMap<String, String>>) -> bool {
        let Some(annotations) = annotations else {
            return false;
        };
        self.disjuncts.iter().any(|conjunct| {
            conjunct
                .iter()
                .all(|(k, v)| annotations.get(k).is_some_and(|actual| actual == v))
        })
    }

    /// Render as a SQL boolean expression over a JSON `column`.
    ///
    /// Values are returned as positional parameters in order of appearance;
    /// keys are identifiers and are safe to inline.
    pub fn to_sql(&self, column: &str) -> (String, Vec<String>) {
        let mut params = Vec::new();
        let disjuncts: Vec<String> = self
            .disjuncts
            .iter()
            .map(|conjunct| {
                let terms: Vec<String> = conjunct
                    .iter()
                    .map(|(k, v)| {
                        params.push(v.clone());
                        format!("json_extract({}, '$.annotations.{}') = ?", column, k)
                    })
                    .collect();
                format!("({})", terms.join(" AND "))
            })
            .collect();
        (format!("({})", disjuncts.join(" OR ")), params)
    }
}

impl fmt::Display for AnnotationPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query)
    }
}

impl std::str::FromStr for AnnotationPredicate {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        AnnotationPredicate::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn single_term_both_orientations() {
        let p = AnnotationPredicate::parse(r#" key =   "value"    "#).unwrap();
        assert_eq!(p.disjuncts(), &[pairs(&[("key", "value")])]);
        assert!(p.operators().is_empty());

        let p = AnnotationPredicate::parse(r#" "value1" = key1 AND "value2" = key2 "#).unwrap();
        assert_eq!(p.disjuncts(), &[pairs(&[("key1", "value1"), ("key2", "value2")])]);
        assert_eq!(p.operators(), &[Operator::And]);
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let p = AnnotationPredicate::parse(
            r#"key1 = "value1" AND key2 = "value2" OR key3 = "value3" AND key4 = "value4""#,
        )
        .unwrap();
        assert_eq!(
            p.disjuncts(),
            &[
                pairs(&[("key1", "value1"), ("key2", "value2")]),
                pairs(&[("key3", "value3"), ("key4", "value4")]),
            ]
        );
        assert_eq!(p.operators().len(), 3);

        let p = AnnotationPredicate::parse(r#"key1 = "value1" OR key2 = "value2" AND key3 = "value3""#)
            .unwrap();
        assert_eq!(
            p.disjuncts(),
            &[
                pairs(&[("key1", "value1")]),
                pairs(&[("key2", "value2"), ("key3", "value3")]),
            ]
        );
    }

    #[test]
    fn rejects_malformed_queries() {
        for bad in [
            "key",
            r#""value""#,
            "; DROP SCOPE myscope.mycollection;",
            "key=value",
            r#"key="a" AND"#,
            r#"key="a" XOR k2="b""#,
        ] {
            assert!(AnnotationPredicate::parse(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn matches_any_disjunct() {
        let p = AnnotationPredicate::parse(r#"gdpr="true" AND region="eu" OR public="yes""#).unwrap();

        let mut eu = BTreeMap::new();
        eu.insert("gdpr".to_string(), "true".to_string());
        eu.insert("region".to_string(), "eu".to_string());
        assert!(p.matches(Some(&eu)));

        eu.insert("region".to_string(), "us".to_string());
        assert!(!p.matches(Some(&eu)));

        let mut public = BTreeMap::new();
        public.insert("public".to_string(), "yes".to_string());
        assert!(p.matches(Some(&public)));

        assert!(!p.matches(None));
        assert!(!p.matches(Some(&BTreeMap::new())));
    }

    #[test]
    fn renders_parameterized_sql() {
        let p = AnnotationPredicate::parse(r#"a="1" AND b="2" OR c="3""#).unwrap();
        let (sql, params) = p.to_sql("body");
        assert_eq!(
            sql,
            "((json_extract(body, '$.annotations.a') = ? AND json_extract(body, '$.annotations.b') = ?) \
             OR (json_extract(body, '$.annotations.c') = ?))"
        );
        assert_eq!(params, vec!["1", "2", "3"]);
    }
}
