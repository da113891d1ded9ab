//! Remote document paths and tuning defaults shared across crates.

/// Token assumed when nothing has been applied or published.
pub const INITIAL_VERSION_TOKEN: &str = "0";

/// Collection holding the cache control record.
pub const METADATA_COLLECTION: &str = "metadata";

/// Document holding the published catalog version.
pub const CACHE_CONTROL_DOCUMENT: &str = "cache_control";

/// Field of the cache control document carrying the version token.
pub const VERSION_FIELD: &str = "version";

pub const CATEGORIES_COLLECTION: &str = "categories";
pub const PRODUCTS_COLLECTION: &str = "products";
pub const THEMED_COLLECTIONS_COLLECTION: &str = "themed_collections";
pub const CAROUSEL_ITEMS_COLLECTION: &str = "carousel_items";
pub const FEATURED_PRODUCTS_COLLECTION: &str = "featured_products";
pub const CATEGORY_PRODUCTS_COLLECTION: &str = "category_products";

/// Document listing the featured product ids.
pub const FEATURED_LIST_DOCUMENT: &str = "featured_list";

/// Field listing product ids on featured and category index documents.
pub const PRODUCT_IDS_FIELD: &str = "product_ids";

/// Field used to order categories and themed collections.
pub const ORDER_FIELD: &str = "order";

/// Field stamped on wishlist membership records.
pub const ADDED_AT_FIELD: &str = "added_at";

/// Timestamp field on recently viewed entries.
pub const VIEWED_AT_FIELD: &str = "timestamp";

/// Currency assumed when a product document does not carry one.
pub const DEFAULT_CURRENCY: &str = "Rs";

/// Maximum number of ids the remote store accepts in one "id in set" query.
pub const MAX_IDS_PER_QUERY: usize = 10;

/// Default memoization window for the remote version token (5 minutes).
pub const DEFAULT_VERSION_MEMO_WINDOW_SECS: u64 = 300;

/// Default LMDB map size for the version store.
pub const DEFAULT_VERSION_STORE_MAP_SIZE_MB: usize = 1;

/// Largest LMDB map size accepted for the version store.
pub const MAX_VERSION_STORE_MAP_SIZE_MB: usize = 1024;

/// Default directory for the version store.
pub const DEFAULT_VERSION_STORE_PATH: &str = ".vitrine/version";

/// Path of the per-user wishlist collection.
pub fn wishlist_collection(user_id: &str) -> String {
    format!("users/{user_id}/wishlist")
}

/// Path of the per-user recently viewed collection.
pub fn recently_viewed_collection(user_id: &str) -> String {
    format!("users/{user_id}/recently_viewed")
}
