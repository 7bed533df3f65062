//! Prompts and parsing for the text-extraction and tagging stages.
//!
//! Model output is untrusted. Replies are cleaned (reasoning blocks and code
//! fences removed, surrounding prose trimmed) and then read item by item:
//! an item with a missing or mistyped field is dropped on its own, and a reply
//! that is not JSON at all yields an empty result. Transport failures are the
//! only errors these functions return, so callers can retry them.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use jotter_core::defaults::EXTRACTION_MAX_CHARS;
use jotter_core::{GenerationBackend, Result, TagTarget};

/// Upper bound on tags the model may assign to one entity.
const MAX_TAGS_PER_ENTITY: usize = 8;

pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract structured records from a personal journal entry.
Reply with a single JSON object and nothing else:
{
  "metrics": [{"name": "<what was measured>", "value": <number>, "units": "<unit or null>"}],
  "links":   [{"url": "<absolute URL>", "description": "<short description or null>"}],
  "tasks":   [{"summary": "<imperative summary>", "description": "<detail or null>", "priority": <0-5>, "completed": <true|false>}]
}
Only include values stated in the entry. Use empty arrays when nothing applies."#;

pub const TAGGING_SYSTEM_PROMPT: &str = r#"You assign short topical tags to records from a personal journal.
You receive a JSON array of records, each with "kind", "id" and "text".
Reply with a single JSON object and nothing else:
{"assignments": [{"kind": "<kind>", "id": <id>, "tags": ["<tag>", ...]}]}
Use one to three lowercase tags per record, reusing the same tag for related records."#;

static THINK_BLOCK: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?is)<think>.*?</think>").ok());

static CODE_FENCE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)```[a-zA-Z]*\s*(.*?)```").ok());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetric {
    pub name: String,
    pub value: f64,
    pub units: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedLink {
    pub url: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedTask {
    pub summary: String,
    pub description: Option<String>,
    pub priority: i32,
    pub completed: bool,
}

/// Everything the model found in one note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub metrics: Vec<ExtractedMetric>,
    pub links: Vec<ExtractedLink>,
    pub tasks: Vec<ExtractedTask>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.links.is_empty() && self.tasks.is_empty()
    }

    /// Parse a model reply; `None` when the reply holds no JSON value.
    pub fn parse(raw: &str) -> Option<Self> {
        let value = parse_model_json(raw)?;
        let mut out = Extraction::default();

        match value {
            JsonValue::Object(map) => {
                for item in array_field(&map, "metrics") {
                    out.metrics.extend(metric_from(item));
                }
                for item in array_field(&map, "links") {
                    out.links.extend(link_from(item));
                }
                for item in array_field(&map, "tasks") {
                    out.tasks.extend(task_from(item));
                }
            }
            // Flat form: one array of items discriminated by "type"
            JsonValue::Array(items) => {
                for item in &items {
                    match text_field(item, &["type", "kind"]).as_deref() {
                        Some("metric") => out.metrics.extend(metric_from(item)),
                        Some("link") => out.links.extend(link_from(item)),
                        Some("task") => out.tasks.extend(task_from(item)),
                        _ => {}
                    }
                }
            }
            _ => return None,
        }
        Some(out)
    }
}

/// An entity offered to the tagging model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCandidate {
    pub target: TagTarget,
    pub text: String,
}

/// Tags the model chose for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagAssignment {
    pub target: TagTarget,
    pub tags: Vec<String>,
}

impl TagAssignment {
    /// Parse a model reply, keeping only assignments for `candidates`.
    ///
    /// The model cannot widen the set of entities a tagging pass touches.
    pub fn parse_all(raw: &str, candidates: &[TagCandidate]) -> Option<Vec<Self>> {
        let value = parse_model_json(raw)?;
        let items = match &value {
            JsonValue::Array(items) => items.as_slice(),
            JsonValue::Object(map) => match map.values().find(|v| v.is_array()) {
                Some(JsonValue::Array(items)) => items.as_slice(),
                _ => return None,
            },
            _ => return None,
        };

        let allowed: HashSet<TagTarget> = candidates.iter().map(|c| c.target).collect();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for item in items {
            let Some(target) = target_from(item) else {
                continue;
            };
            if !allowed.contains(&target) || !seen.insert(target) {
                continue;
            }
            let tags: Vec<String> = item
                .get("tags")
                .and_then(JsonValue::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(|t| t.as_str())
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .take(MAX_TAGS_PER_ENTITY)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            out.push(TagAssignment { target, tags });
        }
        Some(out)
    }
}

/// Ask the model for metrics, links and tasks in `content`.
///
/// Malformed output is logged and treated as "nothing found".
pub async fn extract_entities(
    backend: &dyn GenerationBackend,
    content: &str,
) -> Result<Extraction> {
    let prompt = truncate_chars(content, EXTRACTION_MAX_CHARS);
    let raw = backend
        .generate_json_with_system(EXTRACTION_SYSTEM_PROMPT, prompt)
        .await?;

    match Extraction::parse(&raw) {
        Some(found) => {
            debug!(
                subsystem = "inference",
                component = "extraction",
                metrics = found.metrics.len(),
                links = found.links.len(),
                tasks = found.tasks.len(),
                "Parsed extraction"
            );
            Ok(found)
        }
        None => {
            warn!(
                subsystem = "inference",
                component = "extraction",
                model = backend.model_name(),
                response_len = raw.len(),
                "Model returned malformed extraction; treating as empty"
            );
            Ok(Extraction::default())
        }
    }
}

/// Ask the model for tags for each candidate.
pub async fn suggest_tags(
    backend: &dyn GenerationBackend,
    candidates: &[TagCandidate],
) -> Result<Vec<TagAssignment>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    let records: Vec<JsonValue> = candidates
        .iter()
        .map(|c| {
            serde_json::json!({
                "kind": c.target.kind(),
                "id": c.target.id(),
                "text": truncate_chars(&c.text, 500),
            })
        })
        .collect();
    let prompt = serde_json::to_string(&records)?;
    let raw = backend
        .generate_json_with_system(TAGGING_SYSTEM_PROMPT, &prompt)
        .await?;

    match TagAssignment::parse_all(&raw, candidates) {
        Some(assignments) => Ok(assignments),
        None => {
            warn!(
                subsystem = "inference",
                component = "tagging",
                model = backend.model_name(),
                response_len = raw.len(),
                "Model returned malformed tag assignments; treating as empty"
            );
            Ok(Vec::new())
        }
    }
}

/// Strip reasoning and markdown around a reply and parse the JSON inside.
pub fn parse_model_json(raw: &str) -> Option<JsonValue> {
    let without_think = match THINK_BLOCK.as_ref() {
        Some(re) => re.replace_all(raw, "").into_owned(),
        None => raw.to_string(),
    };
    let unfenced = match CODE_FENCE.as_ref().and_then(|re| re.captures(&without_think)) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).to_string(),
        None => without_think,
    };
    let text = unfenced.trim();

    if let Ok(value) = serde_json::from_str::<JsonValue>(text) {
        return Some(value);
    }

    // Prose around the payload: take the outermost bracketed span
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn array_field<'a>(
    map: &'a serde_json::Map<String, JsonValue>,
    key: &str,
) -> impl Iterator<Item = &'a JsonValue> {
    map.get(key)
        .and_then(JsonValue::as_array)
        .into_iter()
        .flatten()
}

fn text_field(item: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| item.get(*k))
        .filter_map(JsonValue::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

fn number_field(item: &JsonValue, key: &str) -> Option<f64> {
    let value = match item.get(key)? {
        JsonValue::Number(n) => n.as_f64()?,
        JsonValue::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

fn metric_from(item: &JsonValue) -> Option<ExtractedMetric> {
    Some(ExtractedMetric {
        name: text_field(item, &["name", "metric"])?,
        value: number_field(item, "value")?,
        units: text_field(item, &["units", "unit"]),
    })
}

fn link_from(item: &JsonValue) -> Option<ExtractedLink> {
    let url = text_field(item, &["url", "link"])?;
    if url.contains(char::is_whitespace) || !url.contains('.') {
        return None;
    }
    Some(ExtractedLink {
        url,
        description: text_field(item, &["description", "title"]),
    })
}

fn task_from(item: &JsonValue) -> Option<ExtractedTask> {
    Some(ExtractedTask {
        summary: text_field(item, &["summary", "task", "title"])?,
        description: text_field(item, &["description"]),
        priority: number_field(item, "priority")
            .map(|p| p.round().clamp(0.0, 5.0) as i32)
            .unwrap_or(0),
        completed: item
            .get("completed")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false),
    })
}

fn target_from(item: &JsonValue) -> Option<TagTarget> {
    let id = match item.get("id")? {
        JsonValue::Number(n) => n.as_i64()?,
        JsonValue::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    match text_field(item, &["kind", "type"])?.to_ascii_lowercase().as_str() {
        "task" => Some(TagTarget::Task(id)),
        "link" => Some(TagTarget::Link(id)),
        "metric" => Some(TagTarget::Metric(id)),
        _ => None,
    }
}
