//! Prompt construction and response parsing for document analysis.
//!
//! Backends are asked for a single JSON object. Models tend to wrap it in
//! prose or code fences, so parsing first isolates the outermost balanced
//! `{...}` span, then validates the known fields before anything is merged
//! into item metadata.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde_json::{Map, Value};

use docflow_core::{Content, ItemMeta, Todo};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("backend returned an empty response")]
    EmptyResponse,
    #[error("no JSON object found in response")]
    NoJsonObject,
    #[error("no matching closing brace found in response")]
    Unbalanced,
    #[error("invalid JSON in response: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("field `{field}` must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

const PROMPT_INTRO: &str =
    "You are an assistant that analyzes the OCR text of a scanned document and extracts structured information.";

const PROMPT_TASKS: &str = r#"Your tasks:

1. Tags: pick up to 5 topics that best describe the content. Write each tag in the language of the document, starting with an uppercase letter.
2. Document type: classify the document (for example Contract, Letter, Invoice) under the key "type", in the language of the document, starting with an uppercase letter.
3. Sender and receiver: extract who sent the document and who it is addressed to.
4. Contacts and persons: extract every email address, phone number and person name mentioned.
5. Additional properties: when present, extract further relevant properties such as addresses or reference numbers.
6. Date: find the main date of the document in whatever format it appears and output it as "date" in the format "YYYY-MM-DD".
7. Title: write a short title matching the content or type of the document.
8. Summary: write a brief, neutral summary of at most 3 sentences. Do not greet or address the receiver. Example: "Letter confirming that a stolen bank card was blocked."
9. Todos: list actionable items meant for the receiver. Each todo is an object with a short headline-style "description" and a "date" in the format "YYYY-MM-DD", or null when no target date is given.

Respond with ONLY a valid JSON object in exactly this shape:

{
  "title": "Document Title",
  "tags": ["Tag1", "Tag2"],
  "type": "Document Type",
  "sender": "sender details",
  "receiver": "receiver details",
  "emails": ["email1", "email2"],
  "phones": ["phone1", "phone2"],
  "persons": ["person1", "person2"],
  "date": "YYYY-MM-DD",
  "summary": "Document summary",
  "todos": [{"description": "todo1", "date": "YYYY-MM-DD"}, {"description": "todo2", "date": null}]
}

Include any additional relevant properties as extra keys of the same object. Do not output explanations, markdown or any text besides the JSON object."#;

/// Metadata keys owned by the pipeline itself. A backend reporting one of
/// these as an extra property must not shadow the typed field.
const RESERVED_KEYS: &[&str] = &[
    "size",
    "last_modified",
    "processing_error",
    "rendered",
    "page_count",
    "extracted",
    "analyzed",
    "llm_tags",
];

/// Build the system prompt, inserting operator-provided context when set.
pub fn system_prompt(custom_context: Option<&str>) -> String {
    let mut prompt = String::from(PROMPT_INTRO);
    if let Some(context) = custom_context.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str("\n\nAdditional context: ");
        prompt.push_str(context);
    }
    prompt.push_str("\n\n");
    prompt.push_str(PROMPT_TASKS);
    prompt
}

/// All page texts in ascending page order, joined by a single space.
pub fn document_text(content: &Content) -> String {
    content.values().map(String::as_str).collect::<Vec<_>>().join(" ")
}

/// Cut `text` to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Owned(format!("{}...", &text[..byte_idx])),
        None => Cow::Borrowed(text),
    }
}

/// Locate the outermost balanced `{...}` span starting at the first `{`.
///
/// Braces inside JSON string literals do not count towards the balance.
pub fn extract_json_object(text: &str) -> Result<&str, AnalysisError> {
    let start = text.find('{').ok_or(AnalysisError::NoJsonObject)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    Err(AnalysisError::Unbalanced)
}

/// Validated analysis output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisResult {
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub doc_type: String,
    pub sender: String,
    pub receiver: String,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub persons: Vec<String>,
    pub date: Option<String>,
    pub summary: Option<String>,
    pub todos: Vec<Todo>,
    /// Additional properties the backend chose to report.
    pub extra: BTreeMap<String, Value>,
}

impl AnalysisResult {
    /// Metadata patch carrying the analysis fields and the completion marker.
    pub fn into_meta(self) -> ItemMeta {
        ItemMeta {
            title: self.title,
            llm_tags: Some(self.tags),
            doc_type: Some(self.doc_type),
            sender: Some(self.sender),
            receiver: Some(self.receiver),
            emails: Some(self.emails),
            phones: Some(self.phones),
            persons: Some(self.persons),
            date: self.date,
            summary: self.summary,
            todos: (!self.todos.is_empty()).then_some(self.todos),
            analyzed: Some(true),
            extra: self.extra,
            ..ItemMeta::default()
        }
    }
}

/// Parse and validate a raw backend response.
pub fn parse_response(raw: &str) -> Result<AnalysisResult, AnalysisError> {
    if raw.trim().is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }
    let json = extract_json_object(raw)?;
    let mut map: Map<String, Value> = serde_json::from_str(json)?;

    let result = AnalysisResult {
        tags: take_string_array(&mut map, "tags")?,
        doc_type: take_string(&mut map, "type")?,
        sender: take_string(&mut map, "sender")?,
        receiver: take_string(&mut map, "receiver")?,
        emails: take_string_array(&mut map, "emails")?,
        phones: take_string_array(&mut map, "phones")?,
        persons: take_string_array(&mut map, "persons")?,
        title: take_opt_string(&mut map, "title")?,
        date: take_opt_string(&mut map, "date")?.filter(|d| !d.trim().is_empty()),
        summary: take_opt_string(&mut map, "summary")?,
        todos: take_todos(&mut map)?,
        extra: BTreeMap::new(),
    };

    Ok(AnalysisResult {
        extra: map
            .into_iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .collect(),
        ..result
    })
}

fn take_string(map: &mut Map<String, Value>, field: &'static str) -> Result<String, AnalysisError> {
    match map.remove(field) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(AnalysisError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}

fn take_opt_string(
    map: &mut Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, AnalysisError> {
    match map.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(AnalysisError::InvalidField {
            field,
            expected: "a string or null",
        }),
    }
}

fn take_string_array(
    map: &mut Map<String, Value>,
    field: &'static str,
) -> Result<Vec<String>, AnalysisError> {
    let invalid = AnalysisError::InvalidField {
        field,
        expected: "an array of strings",
    };
    let Some(Value::Array(values)) = map.remove(field) else {
        return Err(invalid);
    };
    values
        .into_iter()
        .map(|v| match v {
            Value::String(s) => Ok(s),
            _ => Err(AnalysisError::InvalidField {
                field,
                expected: "an array of strings",
            }),
        })
        .collect()
}

fn take_todos(map: &mut Map<String, Value>) -> Result<Vec<Todo>, AnalysisError> {
    let invalid = || AnalysisError::InvalidField {
        field: "todos",
        expected: "an array of todo objects or strings",
    };
    let values = match map.remove("todos") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(values)) => values,
        Some(_) => return Err(invalid()),
    };

    values
        .into_iter()
        .map(|v| match v {
            Value::String(description) => Ok(Todo {
                description,
                date: None,
            }),
            Value::Object(mut obj) => {
                let description = match obj.remove("description") {
                    Some(Value::String(s)) => s,
                    _ => return Err(invalid()),
                };
                let date = match obj.remove("date") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s),
                    Some(_) => return Err(invalid()),
                };
                Ok(Todo { description, date })
            }
            _ => Err(invalid()),
        })
        .collect()
}
