//! Read-through cache in front of the hotel listing, search, and detail
//! queries.
//!
//! Every entry is keyed by a canonical signature covering each parameter
//! that affects the response, including the member-discount flag and the
//! page window. Entries have no TTL; they only leave the cache through
//! the invalidation calls below. Listing and search results are supersets
//! of the per-hotel data, so any inventory or metadata change for one
//! hotel drops that hotel's detail entries and the whole listing/search
//! space at once.

use std::sync::Arc;

use moka::future::Cache;
use shared::dates::StayRange;
use shared::pagination::{PageParams, PagedResponse};

use crate::catalog::HotelView;

const MAX_DETAIL_ENTRIES: u64 = 10_000;
const MAX_LISTING_ENTRIES: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DetailKey {
    pub hotel_id: i64,
    pub discounted: bool,
}

pub struct QueryCache {
    details: Cache<DetailKey, Arc<HotelView>>,
    listings: Cache<String, Arc<PagedResponse<HotelView>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self {
            details: Cache::builder().max_capacity(MAX_DETAIL_ENTRIES).build(),
            listings: Cache::builder().max_capacity(MAX_LISTING_ENTRIES).build(),
        }
    }

    pub async fn detail(&self, key: &DetailKey) -> Option<Arc<HotelView>> {
        self.details.get(key).await
    }

    pub async fn store_detail(&self, key: DetailKey, view: Arc<HotelView>) {
        self.details.insert(key, view).await;
    }

    pub async fn listing(&self, signature: &str) -> Option<Arc<PagedResponse<HotelView>>> {
        self.listings.get(signature).await
    }

    pub async fn store_listing(&self, signature: String, page: Arc<PagedResponse<HotelView>>) {
        self.listings.insert(signature, page).await;
    }

    /// Invalidation after an inventory or metadata change for one hotel:
    /// both discount flavors of its detail entry, plus every listing and
    /// search entry.
    pub async fn invalidate_hotel(&self, hotel_id: i64) {
        for discounted in [false, true] {
            self.details
                .invalidate(&DetailKey {
                    hotel_id,
                    discounted,
                })
                .await;
        }
        self.listings.invalidate_all();
    }

    pub fn invalidate_all(&self) {
        self.details.invalidate_all();
        self.listings.invalidate_all();
    }
}

pub fn listing_signature(page: PageParams, discounted: bool) -> String {
    format!(
        "hotels:page={}:per={}:disc={}",
        page.page, page.per_page, discounted
    )
}

pub fn search_signature(
    location: &str,
    guest_count: i32,
    range: &StayRange,
    page: PageParams,
    discounted: bool,
) -> String {
    format!(
        "search:loc={}:guests={}:in={}:out={}:page={}:per={}:disc={}",
        location.to_lowercase(),
        guest_count,
        range.check_in(),
        range.check_out(),
        page.page,
        page.per_page,
        discounted
    )
}

/// Empty search results are recomputed on every request rather than
/// cached, so newly opened availability shows up without an eviction.
pub fn search_is_cacheable(page: &PagedResponse<HotelView>) -> bool {
    !page.content.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn view(hotel_id: i64) -> Arc<HotelView> {
        Arc::new(HotelView {
            id: hotel_id,
            name: format!("Hotel {hotel_id}"),
            location: "Ankara".into(),
            description: None,
            image: None,
            price: BigDecimal::from(100),
            rating: 4.0,
            room_count: 10,
        })
    }

    fn page_of(views: Vec<HotelView>) -> Arc<PagedResponse<HotelView>> {
        let params = PageParams::default();
        let total = views.len() as i64;
        Arc::new(PagedResponse::new(views, params, total))
    }

    fn range() -> StayRange {
        StayRange::new(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn listing_signatures_cover_page_and_discount() {
        let base = PageParams::default();
        let other_page = PageParams { page: 1, ..base };
        let other_size = PageParams {
            per_page: 20,
            ..base
        };

        let sig = listing_signature(base, false);
        assert_eq!(sig, listing_signature(base, false));
        assert_ne!(sig, listing_signature(other_page, false));
        assert_ne!(sig, listing_signature(other_size, false));
        assert_ne!(sig, listing_signature(base, true));
    }

    #[test]
    fn search_signatures_cover_every_parameter() {
        let page = PageParams::default();
        let sig = search_signature("Ankara", 2, &range(), page, false);

        assert_ne!(sig, search_signature("Izmir", 2, &range(), page, false));
        assert_ne!(sig, search_signature("Ankara", 3, &range(), page, false));
        assert_ne!(sig, search_signature("Ankara", 2, &range(), page, true));

        let longer = StayRange::new(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
        )
        .unwrap();
        assert_ne!(sig, search_signature("Ankara", 2, &longer, page, false));
    }

    #[test]
    fn search_signature_is_case_insensitive_on_location() {
        let page = PageParams::default();
        assert_eq!(
            search_signature("Ankara", 2, &range(), page, false),
            search_signature("ANKARA", 2, &range(), page, false),
        );
    }

    #[tokio::test]
    async fn invalidate_hotel_drops_details_and_all_listings() {
        let cache = QueryCache::new();
        let key_plain = DetailKey {
            hotel_id: 1,
            discounted: false,
        };
        let key_discounted = DetailKey {
            hotel_id: 1,
            discounted: true,
        };
        let unrelated = DetailKey {
            hotel_id: 2,
            discounted: false,
        };

        cache.store_detail(key_plain.clone(), view(1)).await;
        cache.store_detail(key_discounted.clone(), view(1)).await;
        cache.store_detail(unrelated.clone(), view(2)).await;
        cache
            .store_listing("hotels:page=0:per=10:disc=false".into(), page_of(vec![]))
            .await;
        cache
            .store_listing("search:loc=ankara".into(), page_of(vec![]))
            .await;

        cache.invalidate_hotel(1).await;

        assert!(cache.detail(&key_plain).await.is_none());
        assert!(cache.detail(&key_discounted).await.is_none());
        assert!(cache.detail(&unrelated).await.is_some());
        assert!(cache
            .listing("hotels:page=0:per=10:disc=false")
            .await
            .is_none());
        assert!(cache.listing("search:loc=ankara").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_all_clears_both_spaces() {
        let cache = QueryCache::new();
        cache
            .store_detail(
                DetailKey {
                    hotel_id: 1,
                    discounted: false,
                },
                view(1),
            )
            .await;
        cache.store_listing("hotels:x".into(), page_of(vec![])).await;

        cache.invalidate_all();

        assert!(cache
            .detail(&DetailKey {
                hotel_id: 1,
                discounted: false,
            })
            .await
            .is_none());
        assert!(cache.listing("hotels:x").await.is_none());
    }

    #[test]
    fn empty_search_pages_are_not_cacheable() {
        let empty = page_of(vec![]);
        assert!(!search_is_cacheable(&empty));

        let non_empty = page_of(vec![view(1).as_ref().clone()]);
        assert!(search_is_cacheable(&non_empty));
    }
}
