//! `*.py` indexer: functions decorated with `@tool`.
//!
//! The file is read as text, never imported. A tool is a `def` (or
//! `async def`) preceded by `@tool`, `@tool(...)`, or a dotted form such as
//! `@catalog.tool(...)`. Decorator arguments may override the name and
//! attach string annotations:
//!
//! ```python
//! @tool(name="monthly_sales", annotations={"type": "sales"})
//! def compute_sales_for_the_month(model: SalesModel) -> float:
//!     """Compute the sales total for the current month."""
//! ```
//!
//! The docstring is the description. A tool without one is an extraction
//! error; the remaining tools in the file are still returned.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use agent_catalog_core::models::{
    DescriptorKind, PythonContent, RecordDescriptor, VersionDescriptor,
};
use agent_catalog_core::CatalogError;

static DECORATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)@(?:[A-Za-z_][A-Za-z0-9_]*\.)*tool\b\s*(\()?")
        .expect("static regex is valid")
});

static DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(")
        .expect("static regex is valid")
});

// A single- or double-quoted string; the closing quote matches the opening one.
const QUOTED: &str = r#"(?:"([^"]*)"|'([^']*)')"#;

static NAME_ARG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\bname\s*=\s*{}", QUOTED)).expect("static regex is valid")
});

static DESCRIPTION_ARG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\bdescription\s*=\s*{}", QUOTED)).expect("static regex is valid")
});

static ANNOTATIONS_ARG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bannotations\s*=\s*\{([^}]*)\}").expect("static regex is valid")
});

static PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{}\s*:\s*{}", QUOTED, QUOTED)).expect("static regex is valid")
});

static DOCSTRING_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*[rRuU]?("""|''')"#).expect("static regex is valid")
});

/// Arguments captured from a `@tool(...)` decorator.
#[derive(Debug, Default)]
struct ToolArgs {
    name: Option<String>,
    description: Option<String>,
    annotations: Option<BTreeMap<String, String>>,
}

/// Contents of whichever of the capture groups `a` or `b` matched.
fn quoted(caps: &regex::Captures<'_>, a: usize, b: usize) -> String {
    caps.get(a)
        .or_else(|| caps.get(b))
        .map_or_else(String::new, |m| m.as_str().to_string())
}

fn parse_args(text: &str) -> ToolArgs {
    let annotations = ANNOTATIONS_ARG_RE.captures(text).map(|c| {
        PAIR_RE
            .captures_iter(&c[1])
            .map(|p| (quoted(&p, 1, 2), quoted(&p, 3, 4)))
            .collect::<BTreeMap<_, _>>()
    });
    // Strip the annotations dict so its keys cannot look like arguments.
    let rest = ANNOTATIONS_ARG_RE.replace(text, "");
    ToolArgs {
        name: NAME_ARG_RE.captures(&rest).map(|c| quoted(&c, 1, 2)),
        description: DESCRIPTION_ARG_RE.captures(&rest).map(|c| quoted(&c, 1, 2)),
        annotations,
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Net bracket depth of `line`. Brackets inside string literals and
/// after a `#` comment do not count.
fn paren_balance(line: &str) -> i32 {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(_), '\\') => {
                chars.next();
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '#') => break,
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth -= 1,
            (None, _) => {}
        }
    }
    depth
}

/// Extract and clean the docstring starting at `lines[start]`, if any.
fn docstring(lines: &[&str], start: usize) -> Option<String> {
    let first = lines.get(start)?;
    let open = DOCSTRING_OPEN_RE.captures(first)?;
    let quote = open.get(1)?.as_str();
    let after_open = &first[open.get(0)?.end()..];

    let mut raw = String::new();
    if let Some(end) = after_open.find(quote) {
        raw.push_str(&after_open[..end]);
    } else {
        raw.push_str(after_open);
        let mut closed = false;
        for line in &lines[start + 1..] {
            raw.push('\n');
            if let Some(end) = line.find(quote) {
                raw.push_str(&line[..end]);
                closed = true;
                break;
            }
            raw.push_str(line);
        }
        if !closed {
            return None;
        }
    }

    let cleaned = raw
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    Some(cleaned)
}

pub fn start_descriptors(
    path: &Path,
    text: &str,
    version: &VersionDescriptor,
) -> (Vec<CatalogError>, Vec<RecordDescriptor>) {
    let lines: Vec<&str> = text.lines().collect();
    let mut errors = Vec::new();
    let mut descriptors = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let Some(caps) = DECORATOR_RE.captures(lines[i]) else {
            i += 1;
            continue;
        };
        let decorator_start = i;
        let decorator_indent = caps.get(1).map_or(0, |m| m.as_str().len());

        // Collect a multi-line decorator call.
        let mut args_text = String::new();
        if caps.get(2).is_some() {
            let mut depth = 0;
            while i < lines.len() {
                args_text.push_str(lines[i]);
                args_text.push('\n');
                depth += paren_balance(lines[i]);
                i += 1;
                if depth <= 0 {
                    break;
                }
            }
        } else {
            i += 1;
        }

        // Skip any stacked decorators between `@tool` and the `def`.
        while i < lines.len() && lines[i].trim_start().starts_with('@') {
            i += 1;
        }
        let Some(def) = lines.get(i).and_then(|l| DEF_RE.captures(l)) else {
            errors.push(CatalogError::extraction(
                path,
                format!("@tool at line {} does not decorate a function", decorator_start + 1),
            ));
            continue;
        };
        let def_indent = def.get(1).map_or(decorator_indent, |m| m.as_str().len());
        let func_name = def[2].to_string();

        // Walk past the (possibly multi-line) signature.
        let mut depth = 0;
        while i < lines.len() {
            depth += paren_balance(lines[i]);
            let done = depth <= 0 && lines[i].trim_end().ends_with(':');
            i += 1;
            if done {
                break;
            }
        }
        let body_start = i;

        let mut end = body_start.saturating_sub(1);
        while i < lines.len() {
            let line = lines[i];
            if !line.trim().is_empty() {
                if indent_of(line) <= def_indent {
                    break;
                }
                end = i;
            }
            i += 1;
        }

        let args = parse_args(&args_text);
        let name = args.name.clone().unwrap_or(func_name);
        let first_statement = (body_start..=end).find(|&j| !lines[j].trim().is_empty());
        let description = args
            .description
            .clone()
            .or_else(|| first_statement.and_then(|j| docstring(&lines, j)));

        let Some(description) = description else {
            errors.push(CatalogError::extraction(
                path,
                format!(
                    "description must be specified for tool '{}'; give it a docstring",
                    name
                ),
            ));
            continue;
        };

        debug!(path = %path.display(), tool = %name, line = decorator_start + 1, "found python tool");
        let mut func_content = lines[decorator_start..=end].join("\n");
        func_content.push('\n');
        descriptors.push(RecordDescriptor {
            name,
            description,
            source: path.to_path_buf(),
            version: version.clone(),
            embedding: None,
            annotations: args.annotations,
            kind: DescriptorKind::PythonFunction {
                contents: PythonContent {
                    func_content,
                    line_start: decorator_start + 1,
                    line_end: end + 1,
                },
            },
        });
    }

    (errors, descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"from agentc.catalog import tool
from pydantic import BaseModel


class SalesModel(BaseModel):
    input_sources: list[str]


@tool
def compute_sales_for_this_week(sales_model: SalesModel) -> float:
    """Compute the sales total for the current week."""

    return 1.0 * 0.99


@tool(
    name="monthly_sales",
    annotations={"type": "sales", "gdpr_2016_compliant": "false"},
)
async def compute_sales_for_the_month(
    sales_model: SalesModel,
) -> float:
    """
    Compute the sales total
    for the current month.
    """
    return 2.0


def helper():
    """Not a tool."""
    return 0
"#;

    fn run(text: &str) -> (Vec<CatalogError>, Vec<RecordDescriptor>) {
        start_descriptors(
            Path::new("tools/sales.py"),
            text,
            &VersionDescriptor::committed("abc"),
        )
    }

    #[test]
    fn finds_decorated_functions_only() {
        let (errors, tools) = run(SOURCE);
        assert!(errors.is_empty(), "{:?}", errors);
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["compute_sales_for_this_week", "monthly_sales"]);
    }

    #[test]
    fn captures_docstring_lines_and_annotations() {
        let (_, tools) = run(SOURCE);
        assert_eq!(
            tools[0].description,
            "Compute the sales total for the current week."
        );
        assert_eq!(
            tools[1].description,
            "Compute the sales total\nfor the current month."
        );

        let annotations = tools[1].annotations.as_ref().unwrap();
        assert_eq!(annotations.get("type").map(String::as_str), Some("sales"));
        assert_eq!(annotations.len(), 2);
        assert!(tools[0].annotations.is_none());

        match &tools[0].kind {
            DescriptorKind::PythonFunction { contents } => {
                assert_eq!(contents.line_start, 9);
                assert_eq!(contents.line_end, 13);
                assert!(contents.func_content.starts_with("@tool\ndef compute_sales_for_this_week"));
                assert!(contents.func_content.ends_with("return 1.0 * 0.99\n"));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn missing_docstring_is_keep_going_error() {
        let text = "@tool\ndef no_doc():\n    return 1\n\n@tool\ndef with_doc():\n    '''Has one.'''\n";
        let (errors, tools) = run(text);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_keep_going());
        assert!(errors[0].to_string().contains("no_doc"));
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "with_doc");
    }

    #[test]
    fn methods_inside_classes_are_found() {
        let text = "class Tools:\n    @tool\n    def inner(self):\n        \"\"\"Inner tool.\"\"\"\n        return 1\n\n    def other(self):\n        pass\n";
        let (errors, tools) = run(text);
        assert!(errors.is_empty());
        assert_eq!(tools.len(), 1);
        match &tools[0].kind {
            DescriptorKind::PythonFunction { contents } => assert_eq!(contents.line_end, 5),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn brackets_inside_strings_do_not_count() {
        assert_eq!(paren_balance(r#"@tool(description="see (a""#), 1);
        assert_eq!(paren_balance(r#"f("(", ')')  # trailing ("#), 0);
        assert_eq!(paren_balance(r#"g("\"(")"#), 0);

        let text = "@tool(description=\"see (a\")\ndef open_paren():\n    return 1\n\n@tool\ndef second():\n    \"\"\"Second.\"\"\"\n";
        let (errors, tools) = run(text);
        assert!(errors.is_empty(), "{:?}", errors);
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["open_paren", "second"]);
        assert_eq!(tools[0].description, "see (a");
    }

    #[test]
    fn arguments_keep_the_other_quote_character() {
        let text = r#"@tool(name='book', description="Don't overbook.", annotations={'tier': "gold's"})
def book():
    pass
"#;
        let (errors, tools) = run(text);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(tools[0].name, "book");
        assert_eq!(tools[0].description, "Don't overbook.");
        let annotations = tools[0].annotations.as_ref().unwrap();
        assert_eq!(annotations.get("tier").map(String::as_str), Some("gold's"));
    }
}
