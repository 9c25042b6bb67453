//! `{{key}}` substitution across the paragraphs and table cells of a document.
//!
//! Matching runs against the concatenated text of a paragraph, while the
//! rewrite happens inside the individual text nodes of its runs. A token split
//! over several runs (Word does this a lot) still matches, and the runs around
//! it keep their formatting.

use std::sync::LazyLock;

use docx_rs::{
    DocumentChild, Docx, Paragraph, ParagraphChild, Run, RunChild, Table, TableCellContent,
    TableChild, TableRowChild, Text,
};
use regex::Regex;
use serde_json::{Map, Value};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("placeholder pattern compiles"));

/// Builds the literal token for `key`: `name` becomes `{{name}}`.
pub fn token(key: &str) -> String {
    format!("{{{{{key}}}}}")
}

/// Text a payload value is replaced with.
///
/// Strings are used as-is; every other JSON value uses its JSON text
/// (`42`, `true`, `null`, `[1,2]`).
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Escaped form docx-rs writes verbatim. Loaded templates are normalized to
/// it (see [`normalize_text`]) so tokens, values and run text all agree.
pub(crate) fn stored(text: &str) -> String {
    Text::new(text).text
}

/// Inverse of [`stored`], for reporting keys back to callers.
fn unstored(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&#xA;", "\n")
        .replace("&amp;", "&")
}

/// The reader hands back plain text but the writer does not escape it, so
/// every text node of a freshly read document is put into [`stored`] form.
pub(crate) fn normalize_text(docx: &mut Docx) {
    for paragraph in paragraphs_mut(docx) {
        for run in runs_mut(paragraph) {
            for child in run.children.iter_mut() {
                if let RunChild::Text(text) = child {
                    text.text = stored(&text.text);
                }
            }
        }
    }
}

/// Replaces every `{{key}}` of `data` in body paragraphs, then in table cells.
///
/// Keys are applied in payload order. Returns the number of occurrences replaced.
pub fn substitute(docx: &mut Docx, data: &Map<String, Value>) -> usize {
    let replacements: Vec<(String, String)> = data
        .iter()
        .map(|(key, value)| (stored(&token(key)), stored(&stringify(value))))
        .collect();

    paragraphs_mut(docx)
        .into_iter()
        .map(|paragraph| substitute_paragraph(paragraph, &replacements))
        .sum()
}

fn substitute_paragraph(paragraph: &mut Paragraph, replacements: &[(String, String)]) -> usize {
    let mut nodes = text_nodes(paragraph);
    replacements
        .iter()
        .map(|(token, value)| replace_in_nodes(&mut nodes, token, value))
        .sum()
}

/// Body paragraphs in document order, then the paragraphs of every table
/// cell (nested tables included).
pub(crate) fn paragraphs_mut(docx: &mut Docx) -> Vec<&mut Paragraph> {
    let mut paragraphs = Vec::new();
    let mut tables = Vec::new();
    for child in docx.document.children.iter_mut() {
        match child {
            DocumentChild::Paragraph(p) => paragraphs.push(&mut **p),
            DocumentChild::Table(t) => tables.push(&mut **t),
            _ => {}
        }
    }
    for table in tables {
        collect_table_paragraphs(table, &mut paragraphs);
    }
    paragraphs
}

fn collect_table_paragraphs<'a>(table: &'a mut Table, out: &mut Vec<&'a mut Paragraph>) {
    for row in table.rows.iter_mut() {
        let TableChild::TableRow(row) = row;
        for cell in row.cells.iter_mut() {
            let TableRowChild::TableCell(cell) = cell;
            for content in cell.children.iter_mut() {
                match content {
                    TableCellContent::Paragraph(p) => out.push(p),
                    TableCellContent::Table(t) => collect_table_paragraphs(t, out),
                    _ => {}
                }
            }
        }
    }
}

/// Runs of a paragraph, including those inside hyperlinks, in document order.
pub(crate) fn runs_mut(paragraph: &mut Paragraph) -> Vec<&mut Run> {
    let mut runs = Vec::new();
    collect_runs_mut(&mut paragraph.children, &mut runs);
    runs
}

fn collect_runs_mut<'a>(children: &'a mut [ParagraphChild], runs: &mut Vec<&'a mut Run>) {
    for child in children.iter_mut() {
        match child {
            ParagraphChild::Run(run) => runs.push(&mut **run),
            ParagraphChild::Hyperlink(link) => collect_runs_mut(&mut link.children, runs),
            _ => {}
        }
    }
}

fn collect_runs<'a>(children: &'a [ParagraphChild], runs: &mut Vec<&'a Run>) {
    for child in children {
        match child {
            ParagraphChild::Run(run) => runs.push(&**run),
            ParagraphChild::Hyperlink(link) => collect_runs(&link.children, runs),
            _ => {}
        }
    }
}

/// Text nodes of the paragraph's runs, in document order.
pub(crate) fn text_nodes(paragraph: &mut Paragraph) -> Vec<&mut String> {
    let mut nodes = Vec::new();
    for run in runs_mut(paragraph) {
        for run_child in run.children.iter_mut() {
            if let RunChild::Text(text) = run_child {
                nodes.push(&mut text.text);
            }
        }
    }
    nodes
}

/// Concatenated run text of a paragraph, the unit placeholders are matched in.
pub(crate) fn paragraph_text(paragraph: &Paragraph) -> String {
    let mut runs = Vec::new();
    collect_runs(&paragraph.children, &mut runs);

    let mut text = String::new();
    for run in runs {
        for run_child in &run.children {
            if let RunChild::Text(t) = run_child {
                text.push_str(&t.text);
            }
        }
    }
    text
}

/// Replaces every non-overlapping occurrence of `token` in the concatenation
/// of `nodes`, left to right. A match that spans nodes is written into the
/// node it starts in; its tail is cut out of the following nodes.
pub(crate) fn replace_in_nodes(nodes: &mut [&mut String], token: &str, value: &str) -> usize {
    let mut joined = String::new();
    let mut ranges: Vec<(usize, usize)> = Vec::with_capacity(nodes.len());
    for node in nodes.iter() {
        let start = joined.len();
        joined.push_str(node);
        ranges.push((start, joined.len()));
    }

    let matches: Vec<(usize, usize)> = joined
        .match_indices(token)
        .map(|(start, m)| (start, start + m.len()))
        .collect();
    if matches.is_empty() {
        return 0;
    }

    let locate = |pos: usize| ranges.iter().position(|&(s, e)| s <= pos && pos < e);

    let mut edits: Vec<Vec<(usize, usize, &str)>> = vec![Vec::new(); nodes.len()];
    for &(match_start, match_end) in &matches {
        let (Some(first), Some(last)) = (locate(match_start), locate(match_end - 1)) else {
            continue;
        };
        let (first_start, first_end) = ranges[first];
        edits[first].push((match_start - first_start, match_end.min(first_end) - first_start, value));
        for mid in (first + 1)..last {
            let (mid_start, mid_end) = ranges[mid];
            edits[mid].push((0, mid_end - mid_start, ""));
        }
        if last != first {
            edits[last].push((0, match_end - ranges[last].0, ""));
        }
    }

    for (node, mut node_edits) in nodes.iter_mut().zip(edits) {
        node_edits.sort_by(|a, b| b.0.cmp(&a.0));
        for (from, to, replacement) in node_edits {
            node.replace_range(from..to, replacement);
        }
    }

    matches.len()
}

/// Every text unit placeholders are looked up in: body paragraphs first,
/// then the paragraphs of table cells.
pub(crate) fn collect_text_units(docx: &Docx) -> Vec<String> {
    let mut texts = Vec::new();
    for child in &docx.document.children {
        if let DocumentChild::Paragraph(p) = child {
            texts.push(paragraph_text(p));
        }
    }
    for child in &docx.document.children {
        if let DocumentChild::Table(t) = child {
            texts.extend(collect_text_from_table(t));
        }
    }
    texts
}

fn collect_text_from_table(table: &Table) -> Vec<String> {
    let mut texts = Vec::new();
    for row in &table.rows {
        let TableChild::TableRow(ref row) = row;
        for cell in &row.cells {
            let TableRowChild::TableCell(ref cell) = cell;
            for content in &cell.children {
                match content {
                    TableCellContent::Paragraph(p) => texts.push(paragraph_text(p)),
                    TableCellContent::Table(t) => texts.extend(collect_text_from_table(t)),
                    _ => {}
                }
            }
        }
    }
    texts
}

/// Distinct keys of every `{{key}}` token in the document, in document order.
pub fn find_placeholders(docx: &Docx) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut keys = Vec::new();

    for text in collect_text_units(docx) {
        for cap in PLACEHOLDER.captures_iter(&text) {
            let key = unstored(&cap[1]);
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
    }
    keys
}
