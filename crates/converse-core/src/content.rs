// Content model
//
// A message body is an ordered list of content items. The engine only needs
// two operations on it: append a text fragment (so streaming deltas assemble
// into a single item) and append an image reference. Providers translate the
// items into their own wire shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One item in a message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentItem {
    /// Plain text
    #[serde(rename = "text")]
    Text { text: String },

    /// An image, referenced by URL (usually a data: URL)
    #[serde(rename = "imageURL")]
    ImageUrl { image_url: String },

    /// Raw JSON, used for tool results
    #[serde(rename = "json")]
    Json { data: Value },
}

/// Ordered, append-only message body
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Content {
    items: Vec<ContentItem>,
}

impl Content {
    /// Create an empty body
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a body holding a single text item
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            items: vec![ContentItem::Text { text: text.into() }],
        }
    }

    /// Create a body holding a text item followed by an image reference
    pub fn from_text_and_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            items: vec![
                ContentItem::Text { text: text.into() },
                ContentItem::ImageUrl {
                    image_url: image_url.into(),
                },
            ],
        }
    }

    /// Create a body holding a single raw JSON item
    pub fn from_raw_json(data: Value) -> Self {
        Self {
            items: vec![ContentItem::Json { data }],
        }
    }

    /// Append a text fragment, merging into a trailing text item so that
    /// incremental deltas assemble into one item
    pub fn append_text(&mut self, fragment: &str) {
        if let Some(ContentItem::Text { text }) = self.items.last_mut() {
            text.push_str(fragment);
        } else {
            self.items.push(ContentItem::Text {
                text: fragment.to_string(),
            });
        }
    }

    /// Append an image reference
    pub fn add_image(&mut self, image_url: impl Into<String>) {
        self.items.push(ContentItem::ImageUrl {
            image_url: image_url.into(),
        });
    }

    /// The items in order
    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Concatenation of all text items
    pub fn text(&self) -> String {
        self.items
            .iter()
            .filter_map(|item| match item {
                ContentItem::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::from_text(text)
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::from_text(text)
    }
}
