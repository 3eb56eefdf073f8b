//! Recommendation feed entries.
//!
//! The catalog sends a flat record with a string `type` field. `RawItem`
//! mirrors that record; `Item` is the domain form with a closed set of
//! content kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Product,
    News,
    Video,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Product => "product",
            ContentKind::News => "news",
            ContentKind::Video => "video",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "product" | "products" => Ok(ContentKind::Product),
            "news" | "article" => Ok(ContentKind::News),
            "video" | "videos" => Ok(ContentKind::Video),
            other => Err(format!("unknown content type: {}", other)),
        }
    }
}

/// Kind-specific fields of a feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ItemContent {
    Product { skin_type: Option<String> },
    News { source: Option<String> },
    Video { source: Option<String> },
}

impl ItemContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            ItemContent::Product { .. } => ContentKind::Product,
            ItemContent::News { .. } => ContentKind::News,
            ItemContent::Video { .. } => ContentKind::Video,
        }
    }
}

/// A feed entry. Equality is full-value, so two fetches of an unchanged
/// item compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Item {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub content: ItemContent,
}

impl Item {
    pub fn kind(&self) -> ContentKind {
        self.content.kind()
    }

    pub fn skin_type(&self) -> Option<&str> {
        match &self.content {
            ItemContent::Product { skin_type } => skin_type.as_deref(),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<&str> {
        match &self.content {
            ItemContent::News { source } | ItemContent::Video { source } => source.as_deref(),
            ItemContent::Product { .. } => None,
        }
    }
}

/// Ids arrive as numbers from some catalog versions.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl From<RawId> for String {
    fn from(id: RawId) -> Self {
        match id {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

/// Wire form of a catalog record.
#[derive(Debug, Clone, Deserialize)]
pub struct RawItem {
    id: RawId,
    #[serde(alias = "title")]
    name: String,
    description: Option<String>,
    #[serde(alias = "imageUrl")]
    image_url: Option<String>,
    #[serde(rename = "type", alias = "kind")]
    kind: String,
    #[serde(alias = "skinType")]
    skin_type: Option<String>,
    source: Option<String>,
}

impl RawItem {
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl TryFrom<RawItem> for Item {
    type Error = String;

    fn try_from(raw: RawItem) -> Result<Self, Self::Error> {
        let content = match raw.kind.parse::<ContentKind>()? {
            ContentKind::Product => ItemContent::Product {
                skin_type: raw.skin_type,
            },
            ContentKind::News => ItemContent::News { source: raw.source },
            ContentKind::Video => ItemContent::Video { source: raw.source },
        };

        Ok(Item {
            id: raw.id.into(),
            name: raw.name,
            description: raw.description.filter(|d| !d.trim().is_empty()),
            image_url: raw.image_url.filter(|u| !u.trim().is_empty()),
            content,
        })
    }
}

/// `GET /products` response.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEnvelope {
    pub code: Option<i64>,
    pub status: Option<String>,
    pub message: Option<String>,
    pub data: Option<Vec<RawItem>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Item, String> {
        let raw: RawItem = serde_json::from_str(json).map_err(|e| e.to_string())?;
        Item::try_from(raw)
    }

    #[test]
    fn test_product_keeps_skin_type() {
        let item = parse(
            r#"{"id":7,"name":"Gentle Cleanser","description":"","image_url":"https://cdn/x.png","type":"product","skin_type":"Oily","source":"ignored"}"#,
        )
        .unwrap();
        assert_eq!(item.id, "7");
        assert_eq!(item.kind(), ContentKind::Product);
        assert_eq!(item.skin_type(), Some("Oily"));
        assert_eq!(item.source(), None);
        assert_eq!(item.description, None);
    }

    #[test]
    fn test_video_keeps_source() {
        let item = parse(
            r#"{"id":"v-1","title":"Night routine","type":"Video","source":"YouTube","skinType":"dry"}"#,
        )
        .unwrap();
        assert_eq!(item.kind(), ContentKind::Video);
        assert_eq!(item.source(), Some("YouTube"));
        assert_eq!(item.skin_type(), None);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = parse(r#"{"id":1,"name":"Quiz","type":"poll"}"#).unwrap_err();
        assert!(err.contains("poll"));
    }

    #[test]
    fn test_item_serializes_with_type_tag() {
        let item = Item {
            id: "n1".into(),
            name: "Sunscreen myths".into(),
            description: None,
            image_url: None,
            content: ItemContent::News { source: Some("Derm Weekly".into()) },
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["type"], "news");
        assert_eq!(value["source"], "Derm Weekly");

        let back: Item = serde_json::from_value(value).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_parse_catalog_envelope() {
        let json = r#"{"code":200,"status":"success","message":"ok","data":[{"id":1,"name":"A","type":"news"}]}"#;
        let env: CatalogEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.data.map(|d| d.len()), Some(1));
    }
}
