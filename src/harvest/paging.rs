// src/harvest/paging.rs
//! One pagination loop for every offset-paginated discovery source.

use async_trait::async_trait;

use crate::catalog::{CatalogApi, CatalogResult, Category, Page, PlaylistRef};

/// A listing that can be fetched one page at a time by offset.
#[async_trait]
pub trait PagedFetch: Send + Sync {
    type Item: Send;

    /// Short human label used in error summaries, e.g. `search "gym"`.
    fn describe(&self) -> String;

    async fn fetch(&self, offset: u32) -> CatalogResult<Page<Self::Item>>;
}

/// Cursor over a [`PagedFetch`] source. Ends on an empty page, a page without
/// a `next` link, the page cap, or the first error (which is yielded once).
pub struct Pager<S> {
    source: S,
    page_size: u32,
    max_pages: u32,
    offset: u32,
    pages: u32,
    done: bool,
}

impl<S: PagedFetch> Pager<S> {
    pub fn new(source: S, page_size: u32, max_pages: u32) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            max_pages,
            offset: 0,
            pages: 0,
            done: false,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages
    }

    pub async fn next_page(&mut self) -> Option<CatalogResult<Vec<S::Item>>> {
        if self.done || self.pages >= self.max_pages {
            return None;
        }
        let page = match self.source.fetch(self.offset).await {
            Ok(p) => p,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        self.pages += 1;
        if page.items.is_empty() {
            self.done = true;
            return None;
        }
        if !page.has_next() {
            self.done = true;
        }
        let step = if page.limit > 0 { page.limit } else { self.page_size };
        self.offset = self.offset.saturating_add(step);
        Some(Ok(page.items))
    }
}

pub struct SearchPages<'a> {
    pub api: &'a dyn CatalogApi,
    pub query: &'a str,
}

#[async_trait]
impl PagedFetch for SearchPages<'_> {
    type Item = PlaylistRef;

    fn describe(&self) -> String {
        format!("search {:?}", self.query)
    }

    async fn fetch(&self, offset: u32) -> CatalogResult<Page<PlaylistRef>> {
        self.api.search_playlists(self.query, offset).await
    }
}

pub struct FeaturedPages<'a> {
    pub api: &'a dyn CatalogApi,
}

#[async_trait]
impl PagedFetch for FeaturedPages<'_> {
    type Item = PlaylistRef;

    fn describe(&self) -> String {
        "featured playlists".to_string()
    }

    async fn fetch(&self, offset: u32) -> CatalogResult<Page<PlaylistRef>> {
        self.api.featured_playlists(offset).await
    }
}

pub struct CategoryListPages<'a> {
    pub api: &'a dyn CatalogApi,
}

#[async_trait]
impl PagedFetch for CategoryListPages<'_> {
    type Item = Category;

    fn describe(&self) -> String {
        "category list".to_string()
    }

    async fn fetch(&self, offset: u32) -> CatalogResult<Page<Category>> {
        self.api.categories(offset).await
    }
}

pub struct CategoryPlaylistPages<'a> {
    pub api: &'a dyn CatalogApi,
    pub category_id: &'a str,
}

#[async_trait]
impl PagedFetch for CategoryPlaylistPages<'_> {
    type Item = PlaylistRef;

    fn describe(&self) -> String {
        format!("category {}", self.category_id)
    }

    async fn fetch(&self, offset: u32) -> CatalogResult<Page<PlaylistRef>> {
        self.api.category_playlists(self.category_id, offset).await
    }
}

pub struct UserPlaylistPages<'a> {
    pub api: &'a dyn CatalogApi,
    pub user_id: &'a str,
}

#[async_trait]
impl PagedFetch for UserPlaylistPages<'_> {
    type Item = PlaylistRef;

    fn describe(&self) -> String {
        format!("user {}", self.user_id)
    }

    async fn fetch(&self, offset: u32) -> CatalogResult<Page<PlaylistRef>> {
        self.api.user_playlists(self.user_id, offset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogError;
    use std::sync::Mutex;

    /// Serves canned pages by call order and records the requested offsets.
    struct Canned {
        pages: Vec<CatalogResult<Page<u32>>>,
        offsets: Mutex<Vec<u32>>,
    }

    impl Canned {
        fn new(pages: Vec<CatalogResult<Page<u32>>>) -> Self {
            Self {
                pages,
                offsets: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PagedFetch for &Canned {
        type Item = u32;

        fn describe(&self) -> String {
            "canned".into()
        }

        async fn fetch(&self, offset: u32) -> CatalogResult<Page<u32>> {
            let mut offsets = self.offsets.lock().unwrap();
            let n = offsets.len();
            offsets.push(offset);
            match self.pages.get(n) {
                Some(Ok(p)) => Ok(p.clone()),
                Some(Err(_)) => Err(CatalogError::api("GET", "/x", 500, "boom")),
                None => Ok(Page::empty()),
            }
        }
    }

    fn page(items: Vec<u32>, more: bool) -> CatalogResult<Page<u32>> {
        Ok(Page::new(items, more.then(|| "https://next".to_string())))
    }

    async fn drain<S: PagedFetch<Item = u32>>(pager: &mut Pager<S>) -> (Vec<u32>, usize) {
        let mut items = Vec::new();
        let mut errors = 0;
        while let Some(r) = pager.next_page().await {
            match r {
                Ok(v) => items.extend(v),
                Err(_) => errors += 1,
            }
        }
        (items, errors)
    }

    #[tokio::test]
    async fn empty_page_ends_without_error() {
        let src = Canned::new(vec![
            page(vec![1, 2], true),
            page(vec![], true),
            page(vec![9], true),
        ]);
        let mut pager = Pager::new(&src, 50, 10);
        let (items, errors) = drain(&mut pager).await;
        assert_eq!(items, vec![1, 2]);
        assert_eq!(errors, 0);
        assert_eq!(*src.offsets.lock().unwrap(), vec![0, 50]);
    }

    #[tokio::test]
    async fn missing_next_link_ends_after_page() {
        let src = Canned::new(vec![page(vec![1], true), page(vec![2], false), page(vec![3], true)]);
        let mut pager = Pager::new(&src, 50, 10);
        assert_eq!(drain(&mut pager).await, (vec![1, 2], 0));
    }

    #[tokio::test]
    async fn page_cap_is_respected() {
        let src = Canned::new((0..10).map(|i| page(vec![i], true)).collect());
        let mut pager = Pager::new(&src, 50, 3);
        assert_eq!(drain(&mut pager).await, (vec![0, 1, 2], 0));
        assert_eq!(pager.pages_fetched(), 3);
    }

    #[tokio::test]
    async fn error_is_yielded_once_then_stops() {
        let src = Canned::new(vec![
            page(vec![1], true),
            Err(CatalogError::Cancelled),
            page(vec![2], true),
        ]);
        let mut pager = Pager::new(&src, 50, 10);
        assert_eq!(drain(&mut pager).await, (vec![1], 1));
    }
}
