use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The kind of content a block holds.
///
/// The set mirrors the editor's built-in block palette. Unknown strings are
/// preserved through [`BlockType::Other`] so rows written by a newer server
/// survive a round-trip instead of failing to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockType {
    /// Plain text paragraph
    Paragraph,
    /// Top-level heading
    Heading1,
    /// Second-level heading
    Heading2,
    /// Third-level heading
    Heading3,
    /// Bulleted list item
    BulletList,
    /// Numbered list item
    NumberedList,
    /// Checkbox item
    Todo,
    /// Block quote
    Quote,
    /// Code snippet
    Code,
    /// Embedded image
    Image,
    /// Inline sub-page
    Page,
    /// Inline database view
    Database,
    /// Forward-compatible escape hatch for unrecognized type strings
    Other(String),
}

impl BlockType {
    /// The wire/storage representation of this type.
    pub fn as_str(&self) -> &str {
        match self {
            BlockType::Paragraph => "paragraph",
            BlockType::Heading1 => "heading_1",
            BlockType::Heading2 => "heading_2",
            BlockType::Heading3 => "heading_3",
            BlockType::BulletList => "bullet_list",
            BlockType::NumberedList => "numbered_list",
            BlockType::Todo => "todo",
            BlockType::Quote => "quote",
            BlockType::Code => "code",
            BlockType::Image => "image",
            BlockType::Page => "page",
            BlockType::Database => "database",
            BlockType::Other(s) => s,
        }
    }

    /// Parse a type string. Never fails: unrecognized strings become
    /// [`BlockType::Other`].
    pub fn parse(s: &str) -> BlockType {
        match s {
            "paragraph" => BlockType::Paragraph,
            "heading_1" => BlockType::Heading1,
            "heading_2" => BlockType::Heading2,
            "heading_3" => BlockType::Heading3,
            "bullet_list" => BlockType::BulletList,
            "numbered_list" => BlockType::NumberedList,
            "todo" => BlockType::Todo,
            "quote" => BlockType::Quote,
            "code" => BlockType::Code,
            "image" => BlockType::Image,
            "page" => BlockType::Page,
            "database" => BlockType::Database,
            other => BlockType::Other(other.to_string()),
        }
    }
}

impl Serialize for BlockType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BlockType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(D::Error::custom("block type must not be empty"));
        }
        Ok(BlockType::parse(&s))
    }
}

/// The open per-block property document.
///
/// The declared fields cover every built-in block type (which fields are
/// meaningful depends on the type); anything else lands in `extra` and is
/// written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BlockProperties {
    /// Text content (paragraphs, headings, list items, quotes, code)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Title (page and database blocks)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Checked state (todo blocks)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    /// Source URL (image blocks)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Caption (image blocks)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Syntax highlighting language (code blocks)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Heading level override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    /// Unrecognized keys, preserved verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A page: a node in the page hierarchy that contains blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Page id (uuid)
    pub id: String,
    /// Parent page id; `None` for top-level pages
    pub parent_page_id: Option<String>,
    /// Page title
    pub title: String,
    /// Emoji or icon identifier
    pub icon: Option<String>,
    /// Cover image URL
    pub cover_image: Option<String>,
    /// Whether this page is a database view
    pub is_database: bool,
    /// Position among siblings
    pub sort_index: f64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Creator user id
    pub created_by_id: String,
    /// Soft-delete marker; live pages carry `None`
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A block: a unit of content inside a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Block id (uuid)
    pub id: String,
    /// Owning page id; never changes after creation
    pub page_id: String,
    /// Parent block id within the same page; `None` for top-level blocks
    pub parent_block_id: Option<String>,
    /// Block kind
    #[serde(rename = "type")]
    pub block_type: BlockType,
    /// Per-type property document
    pub properties: BlockProperties,
    /// Position among siblings
    pub sort_index: f64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Creator user id
    pub created_by_id: String,
    /// Last editor user id
    pub last_edited_by_id: String,
    /// Soft-delete marker; live blocks carry `None`
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Live child-page and block counts attached to page reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCounts {
    /// Number of live direct child pages (omitted where not computed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_pages: Option<i64>,
    /// Number of live blocks belonging to the page
    pub blocks: i64,
}

/// A page decorated with live child/block counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageWithCounts {
    /// The page itself
    #[serde(flatten)]
    pub page: Page,
    /// Live counts
    #[serde(rename = "_count")]
    pub count: PageCounts,
}

/// A page with its ordered live child pages and block count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDetail {
    /// The page itself
    #[serde(flatten)]
    pub page: Page,
    /// Ordered live child pages
    pub child_pages: Vec<Page>,
    /// Live counts
    #[serde(rename = "_count")]
    pub count: PageCounts,
}

/// A block with one level of ordered live children.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockWithChildren {
    /// The block itself
    #[serde(flatten)]
    pub block: Block,
    /// Ordered live direct children
    pub child_blocks: Vec<Block>,
}

/// A node in the fully assembled block tree of a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTree {
    /// The block itself
    #[serde(flatten)]
    pub block: Block,
    /// Recursively nested live children
    pub child_blocks: Vec<BlockTree>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_type_round_trip() {
        for s in [
            "paragraph",
            "heading_1",
            "heading_2",
            "heading_3",
            "bullet_list",
            "numbered_list",
            "todo",
            "quote",
            "code",
            "image",
            "page",
            "database",
        ] {
            assert_eq!(BlockType::parse(s).as_str(), s);
        }
    }

    #[test]
    fn test_block_type_unknown_preserved() {
        let parsed = BlockType::parse("synced_block");
        assert_eq!(parsed, BlockType::Other("synced_block".to_string()));
        assert_eq!(parsed.as_str(), "synced_block");

        let json: BlockType = serde_json::from_str("\"synced_block\"").unwrap();
        assert_eq!(serde_json::to_string(&json).unwrap(), "\"synced_block\"");
    }

    #[test]
    fn test_block_properties_unknown_keys_survive() {
        let raw = r#"{"text":"hello","checked":true,"rollupSource":"abc"}"#;
        let props: BlockProperties = serde_json::from_str(raw).unwrap();
        assert_eq!(props.text.as_deref(), Some("hello"));
        assert_eq!(props.checked, Some(true));
        assert_eq!(
            props.extra.get("rollupSource"),
            Some(&serde_json::Value::String("abc".to_string()))
        );

        let back = serde_json::to_string(&props).unwrap();
        let reparsed: BlockProperties = serde_json::from_str(&back).unwrap();
        assert_eq!(reparsed, props);
    }

    #[test]
    fn test_block_properties_none_fields_omitted() {
        let props = BlockProperties {
            text: Some("x".to_string()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&props).unwrap(), r#"{"text":"x"}"#);
    }
}
