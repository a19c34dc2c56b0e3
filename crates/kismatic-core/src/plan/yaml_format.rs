//! Reading and writing the annotated `kismatic-cluster.yaml` format.
//!
//! Reads go through [`migrate`] and [`apply_defaults`], so callers only ever
//! see current-schema plans. Writes emit the current schema with the
//! documentation comments from [`super::comments`] placed above the keys
//! they describe.

use std::collections::HashMap;
use std::io::Write;

use super::comments::comment_table;
use super::defaults::apply_defaults;
use super::migrate::migrate;
use super::model::Plan;
use crate::error::PlanError;

/// Bring a freshly decoded plan up to the current schema with defaults.
pub fn normalize(plan: Plan) -> Plan {
    apply_defaults(migrate(plan))
}

/// Decode a plan from YAML bytes and normalize it.
pub fn read_plan(bytes: &[u8]) -> Result<Plan, PlanError> {
    let raw: Plan = serde_yaml::from_slice(bytes).map_err(PlanError::parse)?;
    Ok(normalize(raw))
}

/// Render a plan as annotated YAML.
///
/// Deprecated fields are migrated before rendering so the output never
/// carries a legacy key.
pub fn render_plan(plan: &Plan) -> Result<String, PlanError> {
    let current = migrate(plan.clone());
    let yaml = serde_yaml::to_string(&current).map_err(PlanError::encode)?;
    Ok(annotate(&yaml))
}

/// Write a plan as annotated YAML to `out`.
///
/// The document is rendered in full before anything is written, so an
/// encoding failure leaves `out` untouched.
pub fn write_plan<W: Write>(plan: &Plan, out: &mut W) -> Result<(), PlanError> {
    let text = render_plan(plan)?;
    out.write_all(text.as_bytes())
        .and_then(|()| out.flush())
        .map_err(PlanError::encode)
}

// ---------------------------------------------------------------------------
// Annotation
// ---------------------------------------------------------------------------

/// A `key:` line in serializer output.
#[derive(Debug, PartialEq, Eq)]
struct KeyLine<'a> {
    /// Column of the key, after any sequence-item dashes.
    column: usize,
    /// Leading spaces before the first non-space character.
    indent: usize,
    key: &'a str,
    /// Text after the colon, trimmed.
    value: &'a str,
}

fn parse_key_line(line: &str) -> Option<KeyLine<'_>> {
    let mut rest = line.trim_start_matches(' ');
    let indent = line.len() - rest.len();
    let mut column = indent;
    while let Some(stripped) = rest.strip_prefix("- ") {
        rest = stripped;
        column += 2;
    }

    let key_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
        .unwrap_or(rest.len());
    if key_len == 0 {
        return None;
    }
    let (key, after) = rest.split_at(key_len);
    let after = after.strip_prefix(':')?;
    if !(after.is_empty() || after.starts_with(' ')) {
        return None;
    }

    Some(KeyLine {
        column,
        indent,
        key,
        value: after.trim(),
    })
}

fn starts_block_scalar(value: &str) -> bool {
    value.starts_with('|') || value.starts_with('>')
}

/// Interleave documentation comments with serializer output.
///
/// Each line's dotted path is derived from a stack of keys indexed by
/// nesting depth (two spaces per level). A comment is emitted at most once,
/// before the first line whose path matches. Leaving a nested block inserts
/// a blank line, and an empty `labels: {}` under `etcd` is dropped.
fn annotate(yaml: &str) -> String {
    let mut pending: HashMap<&str, &[String]> = comment_table()
        .iter()
        .map(|(path, lines)| (*path, lines.as_slice()))
        .collect();

    let mut out = String::with_capacity(yaml.len() * 2);
    let mut path: Vec<&str> = Vec::new();
    let mut prev_depth: Option<usize> = None;
    let mut blank_before_comment = true;
    let mut in_etcd = false;
    // Lines indented deeper than this belong to a block scalar.
    let mut scalar_indent: Option<usize> = None;

    for line in yaml.lines() {
        if let Some(indent) = scalar_indent {
            let leading = line.len() - line.trim_start_matches(' ').len();
            if line.trim().is_empty() || leading > indent {
                out.push_str(line);
                out.push('\n');
                continue;
            }
            scalar_indent = None;
        }

        let Some(key_line) = parse_key_line(line) else {
            out.push_str(line);
            out.push('\n');
            blank_before_comment = true;
            continue;
        };

        let depth = key_line.column / 2;
        if depth == 0 {
            in_etcd = key_line.key == "etcd";
        }
        if in_etcd && key_line.key == "labels" && key_line.value == "{}" {
            continue;
        }

        if prev_depth.is_some_and(|prev| depth < prev) {
            out.push('\n');
            blank_before_comment = false;
        }
        prev_depth = Some(depth);
        path.truncate(depth);
        path.push(key_line.key);

        if starts_block_scalar(key_line.value) {
            scalar_indent = Some(key_line.indent);
        }

        if let Some(lines) = pending.remove(path.join(".").as_str()) {
            if blank_before_comment && !out.is_empty() {
                out.push('\n');
            }
            let pad = " ".repeat(key_line.indent);
            for comment in lines {
                out.push_str(&pad);
                out.push_str("# ");
                out.push_str(comment);
                out.push('\n');
            }
        }
        out.push_str(line);
        out.push('\n');
        blank_before_comment = true;
    }
    out
}
