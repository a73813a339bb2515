//! Parses rule-match output of the command-line checker and diffs two
//! checker runs, e.g. before and after a rule change.
//!
//! Two input formats are understood: the human-readable text output
//! (`Line 5, column 10, Rule ID: ...` blocks with a `^^^` cover line) and
//! aggregated JSON, one result object per line as returned by the HTTP API.
//! Parsing the text output instead of requiring JSON means the same file
//! can be read by humans and by this tool, which is exactly how the nightly
//! regression diffs are used.

use fs_err as fs;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::types::{DefaultHashMap, DefaultHashSet, MatchStatus, RuleMatch};
use crate::Error;

const MAX_REPLACEMENTS: usize = 5;

lazy_static! {
    static ref START: Regex =
        Regex::new(r"^(?:\d+\.\) )?Line (\d+), column (\d+), Rule ID: (.*)").unwrap();
    static ref COVER: Regex = Regex::new(r"^[ ^]+$").unwrap();
}

/// All matches parsed from one checker run.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub matches: Vec<RuleMatch>,
    /// Build dates seen in JSON input, `{"unknown"}` for text input.
    pub build_dates: DefaultHashSet<String>,
}

impl ParseResult {
    /// Parses a file, choosing the format by extension: `.json` means
    /// JSON lines, anything else the text format.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let reader = BufReader::new(fs::File::open(path)?);

        if path.extension().map_or(false, |ext| ext == "json") {
            parse_json_lines(reader)
        } else {
            parse_text(reader)
        }
    }
}

/// Wraps `context[start..end)` (char indices) in the marker span used by
/// the diff reports.
fn context_with_span(context: &str, start: usize, end: usize) -> String {
    let mut result = String::with_capacity(context.len() + 32);
    for (i, c) in context.chars().enumerate() {
        if i == start {
            result.push_str("<span class='marker'>");
        }
        if i == end {
            result.push_str("</span>");
        }
        result.push(c);
    }
    if end >= context.chars().count() {
        result.push_str("</span>");
    }
    result
}

/// Parses the human-readable checker output.
pub fn parse_text<R: BufRead>(reader: R) -> Result<ParseResult, Error> {
    let mut matches = Vec::new();

    let mut line_num = 0;
    let mut column_num = 0;
    let mut rule_id: Option<String> = None;
    let mut message: Option<String> = None;
    let mut suggestion: Option<String> = None;
    let mut source: Option<String> = None;
    let mut context: Option<String> = None;
    // the title appears once and holds for all following matches
    let mut title = String::new();

    for line in reader.lines() {
        let line = line?;

        if let Some(rest) = line.strip_prefix("Message: ") {
            message = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("Suggestion: ") {
            suggestion = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("Rule source: ") {
            source = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("Title: ") {
            title = rest.to_string();
        } else if let Some(captures) = START.captures(&line) {
            line_num = captures[1].parse().unwrap_or(0);
            column_num = captures[2].parse().unwrap_or(0);
            rule_id = Some(captures[3].to_string());
        } else if (suggestion.is_some() || message.is_some()) && context.is_none() {
            // the context comes right after the suggestion (if any)
            context = Some(line);
        } else if COVER.is_match(&line) && line.contains('^') {
            let start = line.find('^').expect("cover line contains a caret.");
            let end = line.rfind('^').expect("cover line contains a caret.") + 1;

            let raw_context = context.take().unwrap_or_default();
            let context_chars = raw_context.chars().count();
            let (covered_text, marked_context) = if start < context_chars {
                let max_end = end.min(context_chars);
                let covered: String = raw_context
                    .chars()
                    .skip(start)
                    .take(max_end - start)
                    .collect();
                (covered, context_with_span(&raw_context, start, max_end))
            } else {
                warn!("cover line overruns context, recording '???': {}", raw_context);
                ("???".to_string(), raw_context)
            };

            let full_id = rule_id.take().unwrap_or_default();
            let status = if full_id.contains("[temp_off]") {
                MatchStatus::TempOff
            } else {
                MatchStatus::On
            };
            let clean_id = full_id.replace("[off]", "").replace("[temp_off]", "");

            matches.push(RuleMatch {
                line: line_num,
                column: column_num,
                rule_id: clean_id,
                message: message.take().unwrap_or_default(),
                category: String::new(),
                context: marked_context,
                covered_text,
                replacements: suggestion.take().into_iter().collect(),
                source: source.take(),
                title: title.clone(),
                status,
                tags: Vec::new(), // the text format doesn't carry tags
            });
            line_num = 0;
            column_num = 0;
        }
    }

    let mut build_dates = DefaultHashSet::default();
    build_dates.insert("unknown".to_string());
    Ok(ParseResult {
        matches,
        build_dates,
    })
}

/// Parses aggregated JSON output: one result object per line.
pub fn parse_json_lines<R: BufRead>(reader: R) -> Result<ParseResult, Error> {
    let mut matches = Vec::new();
    let mut build_dates = DefaultHashSet::default();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let node: Value = serde_json::from_str(&line).map_err(|e| {
            Error::MalformedInput(format!("line {}: invalid JSON: {}", i + 1, e))
        })?;

        let title = node["title"].as_str().unwrap_or("").to_string();
        build_dates.insert(
            node["software"]["buildDate"]
                .as_str()
                .unwrap_or("unknown")
                .to_string(),
        );

        for m in node["matches"].as_array().into_iter().flatten() {
            matches.push(json_to_match(&title, m));
        }
    }

    Ok(ParseResult {
        matches,
        build_dates,
    })
}

fn json_to_match(title: &str, m: &Value) -> RuleMatch {
    let rule = &m["rule"];
    let rule_id = rule["id"].as_str().unwrap_or("").to_string();
    let full_id = match rule["subId"].as_str() {
        Some(sub_id) => format!("{}[{}]", rule_id, sub_id),
        None => rule_id,
    };

    let context_text = m["context"]["text"].as_str().unwrap_or("");
    let context_offset = m["context"]["offset"].as_u64().unwrap_or(0) as usize;
    let context_length = m["context"]["length"].as_u64().unwrap_or(0) as usize;

    let context_chars = context_text.chars().count();
    let start = context_offset.min(context_chars);
    let max_end = (context_offset + context_length).min(context_chars);
    let covered_text: String = context_text
        .chars()
        .skip(start)
        .take(max_end.saturating_sub(start))
        .collect();

    let mut context = context_with_span(context_text, start, max_end);

    // prefer a sentence-based context: with a stable sentence the
    // before/after contexts line up even when the surrounding text moved
    if let Some(sentence) = m["sentence"].as_str() {
        if !covered_text.is_empty()
            && sentence.matches(covered_text.as_str()).count() == 1
        {
            let byte_idx = sentence.find(covered_text.as_str()).expect("counted above.");
            let char_idx = sentence[..byte_idx].chars().count();
            context = context_with_span(
                sentence,
                char_idx,
                char_idx + covered_text.chars().count(),
            );
        }
    }

    let replacements: Vec<String> = m["replacements"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|r| r["value"].as_str().map(|x| x.to_string()))
        .take(MAX_REPLACEMENTS)
        .collect();

    let status = if rule["tempOff"].as_bool() == Some(true) {
        MatchStatus::TempOff
    } else {
        MatchStatus::On
    };

    let tags: Vec<String> = rule["tags"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|t| t.as_str().map(|x| x.to_string()))
        .collect();

    RuleMatch {
        line: 0,
        column: m["offset"].as_u64().unwrap_or(0) as usize,
        rule_id: full_id,
        message: m["message"].as_str().unwrap_or("").to_string(),
        category: rule["category"]["name"].as_str().unwrap_or("(unknown)").to_string(),
        context,
        covered_text,
        replacements,
        source: rule["sourceFile"].as_str().map(|x| x.to_string()),
        title: title.to_string(),
        status,
        tags,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffKind {
    Added,
    Removed,
    Modified,
}

/// One difference between two checker runs.
#[derive(Debug, Clone)]
pub struct RuleMatchDiff {
    kind: DiffKind,
    old: Option<RuleMatch>,
    new: Option<RuleMatch>,
}

impl RuleMatchDiff {
    pub fn kind(&self) -> DiffKind {
        self.kind
    }

    pub fn old(&self) -> Option<&RuleMatch> {
        self.old.as_ref()
    }

    pub fn new(&self) -> Option<&RuleMatch> {
        self.new.as_ref()
    }

    /// The rule id this diff is about.
    pub fn rule_id(&self) -> &str {
        self.new
            .as_ref()
            .or_else(|| self.old.as_ref())
            .map(|m| m.rule_id.as_str())
            .expect("a diff has at least one side.")
    }
}

fn full_key(m: &RuleMatch) -> (String, String, String) {
    (m.rule_id.clone(), m.covered_text.clone(), m.context.clone())
}

fn rule_context_key(m: &RuleMatch) -> (String, String) {
    (m.rule_id.clone(), m.context.clone())
}

/// Diffs two runs. Matches are identified by (rule id, covered text,
/// context); an added and a removed match on the same (rule id, context)
/// collapse into one Modified entry, which is what happens when a rule's
/// message or suggestion changed.
pub fn find_diffs(old: &[RuleMatch], new: &[RuleMatch]) -> Vec<RuleMatchDiff> {
    let mut old_by_key: DefaultHashMap<_, Vec<&RuleMatch>> = DefaultHashMap::default();
    for m in old {
        old_by_key.entry(full_key(m)).or_default().push(m);
    }
    let mut new_by_key: DefaultHashMap<_, Vec<&RuleMatch>> = DefaultHashMap::default();
    for m in new {
        new_by_key.entry(full_key(m)).or_default().push(m);
    }

    let mut added: Vec<&RuleMatch> = new
        .iter()
        .filter(|m| !old_by_key.contains_key(&full_key(m)))
        .collect();
    let removed: Vec<&RuleMatch> = old
        .iter()
        .filter(|m| !new_by_key.contains_key(&full_key(m)))
        .collect();

    let mut diffs = Vec::new();
    let mut consumed_removed = vec![false; removed.len()];

    added.retain(|new_match| {
        let key = rule_context_key(new_match);
        let pair = removed
            .iter()
            .enumerate()
            .find(|&(idx, old_match)| !consumed_removed[idx] && rule_context_key(old_match) == key);

        if let Some((idx, old_match)) = pair {
            consumed_removed[idx] = true;
            diffs.push(RuleMatchDiff {
                kind: DiffKind::Modified,
                old: Some((*old_match).clone()),
                new: Some((*new_match).clone()),
            });
            false
        } else {
            true
        }
    });

    for new_match in added {
        diffs.push(RuleMatchDiff {
            kind: DiffKind::Added,
            old: None,
            new: Some(new_match.clone()),
        });
    }
    for (idx, old_match) in removed.iter().enumerate() {
        if !consumed_removed[idx] {
            diffs.push(RuleMatchDiff {
                kind: DiffKind::Removed,
                old: Some((*old_match).clone()),
                new: None,
            });
        }
    }

    diffs
}

/// Writes a plain-text report grouped by rule id.
pub fn write_report<W: Write>(
    diffs: &[RuleMatchDiff],
    old_dates: &DefaultHashSet<String>,
    new_dates: &DefaultHashSet<String>,
    mut writer: W,
) -> Result<(), Error> {
    let mut by_rule: IndexMap<String, Vec<&RuleMatchDiff>> = IndexMap::new();
    for diff in diffs {
        by_rule
            .entry(diff.rule_id().to_string())
            .or_default()
            .push(diff);
    }

    let mut old_dates: Vec<_> = old_dates.iter().cloned().collect();
    old_dates.sort();
    let mut new_dates: Vec<_> = new_dates.iter().cloned().collect();
    new_dates.sort();
    writeln!(
        writer,
        "Diff of {} rule(s), old build(s): {}, new build(s): {}",
        by_rule.len(),
        old_dates.join(", "),
        new_dates.join(", ")
    )?;

    by_rule.sort_keys();
    for (rule_id, diffs) in &by_rule {
        let added = diffs.iter().filter(|d| d.kind() == DiffKind::Added).count();
        let removed = diffs
            .iter()
            .filter(|d| d.kind() == DiffKind::Removed)
            .count();
        let modified = diffs
            .iter()
            .filter(|d| d.kind() == DiffKind::Modified)
            .count();

        writeln!(writer)?;
        writeln!(
            writer,
            "{} (+{} / -{} / ~{})",
            rule_id, added, removed, modified
        )?;
        for diff in diffs {
            match diff.kind() {
                DiffKind::Added => {
                    let m = diff.new().expect("added diffs have a new side.");
                    writeln!(writer, "  + {}", m.context)?;
                }
                DiffKind::Removed => {
                    let m = diff.old().expect("removed diffs have an old side.");
                    writeln!(writer, "  - {}", m.context)?;
                }
                DiffKind::Modified => {
                    let old = diff.old().expect("modified diffs have an old side.");
                    let new = diff.new().expect("modified diffs have a new side.");
                    writeln!(writer, "  ~ {}", new.context)?;
                    if old.message != new.message {
                        writeln!(writer, "    message: '{}' -> '{}'", old.message, new.message)?;
                    }
                    if old.replacements != new.replacements {
                        writeln!(
                            writer,
                            "    suggestions: {:?} -> {:?}",
                            old.replacements, new.replacements
                        )?;
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    const TEXT_OUTPUT: &str = "\
Title: Sample document
1.) Line 5, column 10, Rule ID: CONFUSION_RULE[1]
Message: Did you mean 'there'?
Suggestion: there
It is over their, behind the shed.
           ^^^^^
2.) Line 7, column 1, Rule ID: UPPERCASE_SENTENCE_START[temp_off]
Message: This sentence does not start with an uppercase letter.
the dog barks.
^^^
";

    #[test]
    fn parses_text_output() {
        let result = parse_text(TEXT_OUTPUT.as_bytes()).unwrap();
        assert_eq!(result.matches.len(), 2);

        let first = &result.matches[0];
        assert_eq!(first.line, 5);
        assert_eq!(first.column, 10);
        assert_eq!(first.rule_id, "CONFUSION_RULE[1]");
        assert_eq!(first.covered_text, "their");
        assert_eq!(first.replacements, vec!["there"]);
        assert_eq!(first.title, "Sample document");
        assert_eq!(
            first.context,
            "It is over <span class='marker'>their</span>, behind the shed."
        );
        assert_eq!(first.status, MatchStatus::On);

        let second = &result.matches[1];
        assert_eq!(second.rule_id, "UPPERCASE_SENTENCE_START");
        assert_eq!(second.status, MatchStatus::TempOff);
        assert_eq!(second.covered_text, "the");
        assert!(second.replacements.is_empty());
        // the title carries over to later matches
        assert_eq!(second.title, "Sample document");
    }

    #[test]
    fn overrunning_cover_line_records_unknown_covered_text() {
        let output = "\
Line 1, column 1, Rule ID: SOME_RULE
Message: msg
abc
                    ^^^
";
        let result = parse_text(output.as_bytes()).unwrap();
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].covered_text, "???");
        assert_eq!(result.matches[0].context, "abc");
    }

    #[quickcheck]
    fn text_parser_never_panics(input: String) -> bool {
        parse_text(input.as_bytes()).is_ok()
    }

    #[test]
    fn parses_json_lines() {
        let line = serde_json::json!({
            "title": "Doc",
            "software": {"buildDate": "2021-03-01"},
            "matches": [{
                "offset": 11,
                "message": "Did you mean 'there'?",
                "sentence": "It is over their, behind the shed.",
                "context": {"text": "...over their, behind...", "offset": 8, "length": 5},
                "replacements": [
                    {"value": "there"}, {"value": "they're"}, {"value": "a"},
                    {"value": "b"}, {"value": "c"}, {"value": "d"}
                ],
                "rule": {
                    "id": "CONFUSION_RULE",
                    "subId": "1",
                    "category": {"name": "Commonly Confused Words"},
                    "sourceFile": "grammar.xml",
                    "tags": ["picky"]
                }
            }]
        })
        .to_string();

        let result = parse_json_lines(line.as_bytes()).unwrap();
        assert!(result.build_dates.contains("2021-03-01"));
        assert_eq!(result.matches.len(), 1);

        let m = &result.matches[0];
        assert_eq!(m.rule_id, "CONFUSION_RULE[1]");
        assert_eq!(m.covered_text, "their");
        // the context is rebuilt from the sentence since the covered text
        // occurs in it exactly once
        assert_eq!(
            m.context,
            "It is over <span class='marker'>their</span>, behind the shed."
        );
        assert_eq!(m.replacements.len(), MAX_REPLACEMENTS);
        assert_eq!(m.category, "Commonly Confused Words");
        assert_eq!(m.source.as_deref(), Some("grammar.xml"));
        assert_eq!(m.tags, vec!["picky"]);
    }

    fn make_match(rule_id: &str, covered: &str, context: &str, message: &str) -> RuleMatch {
        RuleMatch {
            line: 1,
            column: 1,
            rule_id: rule_id.to_string(),
            message: message.to_string(),
            category: String::new(),
            context: context.to_string(),
            covered_text: covered.to_string(),
            replacements: vec![],
            source: None,
            title: String::new(),
            status: MatchStatus::On,
            tags: vec![],
        }
    }

    #[test]
    fn diff_classifies_added_removed_modified() {
        let old = vec![
            make_match("A", "their", "ctx1", "old message"),
            make_match("B", "foo", "ctx2", "msg"),
        ];
        let new = vec![
            // same rule and context, different covered text -> modified
            make_match("A", "their,", "ctx1", "new message"),
            make_match("C", "bar", "ctx3", "msg"),
        ];

        let diffs = find_diffs(&old, &new);
        assert_eq!(diffs.len(), 3);

        let modified: Vec<_> = diffs
            .iter()
            .filter(|d| d.kind() == DiffKind::Modified)
            .collect();
        assert_eq!(modified.len(), 1);
        assert_eq!(modified[0].rule_id(), "A");

        assert_eq!(
            diffs.iter().filter(|d| d.kind() == DiffKind::Added).count(),
            1
        );
        assert_eq!(
            diffs
                .iter()
                .filter(|d| d.kind() == DiffKind::Removed)
                .count(),
            1
        );
    }

    #[test]
    fn identical_runs_have_no_diffs() {
        let matches = vec![make_match("A", "their", "ctx1", "msg")];
        assert!(find_diffs(&matches, &matches).is_empty());
    }

    #[test]
    fn report_groups_by_rule() {
        let old = vec![make_match("B", "x", "ctx-b", "msg")];
        let new = vec![make_match("A", "y", "ctx-a", "msg")];
        let diffs = find_diffs(&old, &new);

        let mut dates = DefaultHashSet::default();
        dates.insert("unknown".to_string());

        let mut out = Vec::new();
        write_report(&diffs, &dates, &dates, &mut out).unwrap();
        let report = String::from_utf8(out).unwrap();

        assert!(report.contains("A (+1 / -0 / ~0)"));
        assert!(report.contains("B (+0 / -1 / ~0)"));
        assert!(report.contains("  + ctx-a"));
        assert!(report.contains("  - ctx-b"));
    }
}
