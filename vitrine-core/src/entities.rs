//! Catalog entity types
//!
//! Every entity decodes from a remote [`Document`]. Decoding never fails on
//! missing fields; the catalog tooling treats every field as optional.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_CURRENCY;
use crate::document::Document;
use crate::identity::ProductId;

/// A browsable product category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub image_url: String,
}

impl Category {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            name: doc.str_or_empty("name"),
            image_url: doc.str_or_empty("image_url"),
        }
    }
}

/// A catalog product.
///
/// `is_favorite` is a read-time projection of the wishlist overlay for the
/// signed-in user. It is never written back to the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: f64,
    pub currency: String,
    pub image_url: String,
    pub category_id: String,
    pub material: String,
    pub stone: String,
    pub clarity: String,
    pub cut: String,
    pub description: String,
    pub is_favorite: bool,
}

impl Product {
    /// Decode a product document.
    ///
    /// The product id prefers an explicit `id` field over the document id,
    /// since featured lists reference products by that field. The image is
    /// the first entry of `images`.
    pub fn from_document(doc: &Document) -> Self {
        let id = doc
            .get_str("id")
            .map(ProductId::from)
            .unwrap_or_else(|| ProductId::new(doc.id.clone()));
        let image_url = doc
            .get_str_list("images")
            .into_iter()
            .next()
            .unwrap_or_default();

        Self {
            id,
            name: doc.str_or_empty("name"),
            price: doc.get_f64("price").unwrap_or(0.0),
            currency: doc
                .get_str("currency")
                .unwrap_or(DEFAULT_CURRENCY)
                .to_string(),
            image_url,
            category_id: doc.str_or_empty("category_id"),
            material: doc.str_or_empty("material"),
            stone: doc.str_or_empty("stone"),
            clarity: doc.str_or_empty("clarity"),
            cut: doc.str_or_empty("cut"),
            description: doc.str_or_empty("description"),
            is_favorite: false,
        }
    }

    /// Return a copy with the favorite projection set.
    pub fn with_favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }
}

/// A themed collection of products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub image_url: String,
    pub description: String,
}

impl Collection {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            name: doc.str_or_empty("name"),
            image_url: doc.str_or_empty("imageUrl"),
            description: doc.str_or_empty("description"),
        }
    }
}

/// A promotional carousel slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarouselItem {
    pub id: String,
    pub image_url: String,
    pub title: String,
    pub subtitle: String,
    pub button_text: String,
}

impl CarouselItem {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            image_url: doc.str_or_empty("imageUrl"),
            title: doc.str_or_empty("title"),
            subtitle: doc.str_or_empty("subtitle"),
            button_text: doc.str_or_empty("buttonText"),
        }
    }
}
