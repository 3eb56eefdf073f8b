use super::FeedPage;
use crate::models::Item;

/// Pages a view has loaded, in order, plus the position it is scrolled to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagingState {
    pub pages: Vec<FeedPage>,
    pub anchor_position: Option<usize>,
}

impl PagingState {
    pub fn new(pages: Vec<FeedPage>, anchor_position: Option<usize>) -> Self {
        Self {
            pages,
            anchor_position,
        }
    }

    /// Add a freshly loaded page, replacing an older copy of the same key.
    pub fn insert(&mut self, page: FeedPage) {
        match self.pages.iter().position(|p| p.key == page.key) {
            Some(idx) => self.pages[idx] = page,
            None => {
                let idx = self.pages.partition_point(|p| p.key < page.key);
                self.pages.insert(idx, page);
            }
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.pages.iter().flat_map(|p| p.items.iter())
    }

    pub fn item_count(&self) -> usize {
        self.pages.iter().map(|p| p.items.len()).sum()
    }

    /// The page whose item range holds `position`, or the last page when
    /// the position lies past everything loaded.
    pub fn closest_page_to_position(&self, position: usize) -> Option<&FeedPage> {
        let mut start = 0;
        for page in &self.pages {
            let end = start + page.items.len();
            if position < end {
                return Some(page);
            }
            start = end;
        }
        self.pages.last()
    }

    /// Key to request when the view refreshes around its anchor.
    pub fn refresh_key(&self) -> Option<u32> {
        let anchor = self.anchor_position?;
        let page = self.closest_page_to_position(anchor)?;
        page.prev_key
            .and_then(|k| k.checked_add(1))
            .or_else(|| page.next_key.and_then(|k| k.checked_sub(1)))
    }
}

/// Key to reload so a refresh lands near `anchor_position`: the closest
/// page's `prev_key + 1`, else its `next_key - 1`, else none.
pub fn compute_refresh_key(anchor_position: Option<usize>, pages: &[FeedPage]) -> Option<u32> {
    PagingState::new(pages.to_vec(), anchor_position).refresh_key()
}
