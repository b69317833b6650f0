use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned item identifier, ascending in insertion order.
pub type ItemId = i64;

/// Extracted text keyed by 1-based page number.
pub type Content = BTreeMap<u32, String>;

/// One discovered source file tracked through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: ItemId,
    /// Absolute source path. Unique across all items.
    pub path: String,
    pub meta: ItemMeta,
    pub content: Option<Content>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Stage this item is currently waiting on, derived from its markers.
    pub fn state(&self) -> ItemState {
        if self.meta.is_analyzed() {
            ItemState::Analyzed
        } else if self.meta.is_extracted() {
            ItemState::Extracted
        } else if self.meta.is_rendered() {
            ItemState::Rendered
        } else {
            ItemState::Discovered
        }
    }
}

/// Pipeline stages that pull work from the item store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Render,
    Extract,
    Analyze,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Render => "render",
            Stage::Extract => "extract",
            Stage::Analyze => "analyze",
        }
    }

    /// Whether an item with `meta` is waiting on this stage.
    pub fn is_eligible(&self, meta: &ItemMeta) -> bool {
        match self {
            Stage::Render => !meta.is_rendered(),
            Stage::Extract => meta.is_rendered() && !meta.is_extracted(),
            Stage::Analyze => meta.is_extracted() && !meta.is_analyzed(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conceptual per-item state derived from stage markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemState {
    Discovered,
    Rendered,
    Extracted,
    Analyzed,
}

/// An actionable item found in a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Todo {
    pub description: String,
    #[serde(default)]
    pub date: Option<String>,
}

/// Metadata accumulated by the pipeline stages.
///
/// Every field is optional so the same type doubles as a partial update:
/// [`ItemMeta::merge`] copies only the fields set on the patch. Keys that have
/// no typed field land in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemMeta {
    // ── Discover ──
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,

    // ── Stage markers ──
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed: Option<bool>,

    // ── Analysis results ──
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_tags: Option<Vec<String>>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emails: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phones: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persons: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todos: Option<Vec<Todo>>,

    /// Backend-specific properties without a typed field.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

macro_rules! merge_fields {
    ($self:ident, $patch:ident, $($field:ident),+ $(,)?) => {
        $(
            if $patch.$field.is_some() {
                $self.$field = $patch.$field;
            }
        )+
    };
}

impl ItemMeta {
    pub fn is_rendered(&self) -> bool {
        self.rendered.unwrap_or(false)
    }

    pub fn is_extracted(&self) -> bool {
        self.extracted.unwrap_or(false)
    }

    pub fn is_analyzed(&self) -> bool {
        self.analyzed.unwrap_or(false)
    }

    /// Apply `patch` on top of `self`. Fields absent from the patch keep
    /// their current value; `extra` keys are inserted or overwritten.
    pub fn merge(&mut self, patch: ItemMeta) {
        merge_fields!(
            self,
            patch,
            size,
            last_modified,
            processing_error,
            rendered,
            page_count,
            extracted,
            analyzed,
            title,
            llm_tags,
            doc_type,
            sender,
            receiver,
            emails,
            phones,
            persons,
            date,
            summary,
            todos,
        );
        self.extra.extend(patch.extra);
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw)
    }
}
