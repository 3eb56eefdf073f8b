use serde::{Deserialize, Serialize};

use crate::models::{ContentKind, Item};
use crate::utils::eq_ignore_case;

/// Client-side narrowing of a fetched page.
///
/// A skin-type filter only matches items tagged with that skin type, so it
/// leaves news and video entries out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFilter {
    pub kind: Option<ContentKind>,
    pub skin_type: Option<String>,
}

impl ItemFilter {
    pub fn kind(kind: ContentKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn skin_type(skin_type: impl Into<String>) -> Self {
        Self {
            skin_type: Some(skin_type.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.skin_type.is_none()
    }

    pub fn matches(&self, item: &Item) -> bool {
        if let Some(kind) = self.kind {
            if item.kind() != kind {
                return false;
            }
        }
        match &self.skin_type {
            Some(wanted) => item
                .skin_type()
                .map(|tag| eq_ignore_case(tag, wanted))
                .unwrap_or(false),
            None => true,
        }
    }

    pub fn apply(&self, items: Vec<Item>) -> Vec<Item> {
        if self.is_empty() {
            return items;
        }
        items.into_iter().filter(|item| self.matches(item)).collect()
    }
}
