//! Wishlist overlay: per-user product membership cached in memory.
//!
//! The overlay is bound to at most one user at a time. Any call naming a
//! different user rebinds it and drops everything known about the previous
//! one, so membership never leaks across accounts. After a bulk refresh the
//! mapping is complete and absent entries are non-members. Before one,
//! absent entries are "unknown" and resolved with an authoritative point
//! lookup.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};
use vitrine_core::{Product, ProductId, UserId, VitrineResult};

use crate::source::CatalogSource;

#[derive(Debug, Default)]
struct OverlayState {
    user: Option<UserId>,
    members: HashMap<ProductId, bool>,
    /// Set by a bulk refresh: `members` lists every wishlisted product.
    complete: bool,
    /// Bumped on every rebind or clear; fills started under an older
    /// generation are discarded.
    generation: u64,
}

impl OverlayState {
    /// Bind to `user`, clearing on change. Returns the current generation.
    fn bind(&mut self, user: &UserId) -> u64 {
        if self.user.as_ref() != Some(user) {
            debug!(user = %user, "Binding wishlist overlay to new user");
            self.user = Some(user.clone());
            self.members.clear();
            self.complete = false;
            self.generation += 1;
        }
        self.generation
    }

    /// Membership if known without a lookup.
    fn known(&self, product: &ProductId) -> Option<bool> {
        match self.members.get(product) {
            Some(&member) => Some(member),
            None if self.complete => Some(false),
            None => None,
        }
    }

    fn is_current(&self, user: &UserId, generation: u64) -> bool {
        self.generation == generation && self.user.as_ref() == Some(user)
    }
}

/// In-memory productId to membership mapping for the signed-in user.
pub struct WishlistOverlay {
    source: Arc<dyn CatalogSource>,
    state: Mutex<OverlayState>,
}

impl WishlistOverlay {
    /// An unbound overlay reading from `source`.
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            source,
            state: Mutex::new(OverlayState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, OverlayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The user the overlay currently describes.
    pub fn bound_user(&self) -> Option<UserId> {
        self.state().user.clone()
    }

    /// Replace the mapping with an authoritative bulk read for `user`.
    pub async fn refresh(&self, user: &UserId) -> VitrineResult<()> {
        let generation = self.state().bind(user);
        let wishlist = self.source.wishlist(user).await?;

        let mut state = self.state();
        if !state.is_current(user, generation) {
            debug!(user = %user, "Discarding wishlist refresh for superseded session");
            return Ok(());
        }
        state.members = wishlist.into_iter().map(|id| (id, true)).collect();
        state.complete = true;
        debug!(user = %user, members = state.members.len(), "Refreshed wishlist overlay");
        Ok(())
    }

    /// Membership of `product`, from the overlay if known, otherwise from an
    /// authoritative lookup that is then cached. Once bulk-loaded, absent
    /// products are answered as non-members without a lookup.
    pub async fn is_member(&self, user: &UserId, product: &ProductId) -> VitrineResult<bool> {
        let generation = {
            let mut state = self.state();
            let generation = state.bind(user);
            if let Some(member) = state.known(product) {
                return Ok(member);
            }
            generation
        };

        let member = self.source.wishlist_contains(user, product).await?;

        let mut state = self.state();
        if state.is_current(user, generation) {
            // A concurrent write may have settled the entry while we looked.
            return Ok(*state.members.entry(product.clone()).or_insert(member));
        }
        Ok(member)
    }

    /// Record membership locally. Call only after the remote write has
    /// succeeded.
    pub fn set_member(&self, user: &UserId, product: &ProductId, member: bool) {
        let mut state = self.state();
        state.bind(user);
        state.members.insert(product.clone(), member);
    }

    /// Products known to be on the bound user's wishlist.
    pub fn members(&self) -> HashSet<ProductId> {
        self.state()
            .members
            .iter()
            .filter(|(_, member)| **member)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Forget the bound user and every entry.
    pub fn clear(&self) {
        let mut state = self.state();
        state.user = None;
        state.members.clear();
        state.complete = false;
        state.generation += 1;
    }

    /// Set `is_favorite` on each product from the overlay. With no user every
    /// product is marked not favorite. A failed lookup shows the product as
    /// not favorite without caching that answer.
    pub async fn annotate(&self, user: Option<&UserId>, products: Vec<Product>) -> Vec<Product> {
        let Some(user) = user else {
            return products.into_iter().map(|p| p.with_favorite(false)).collect();
        };

        let mut annotated = Vec::with_capacity(products.len());
        for product in products {
            let favorite = match self.is_member(user, &product.id).await {
                Ok(member) => member,
                Err(e) => {
                    warn!(error = %e, product = %product.id, "Wishlist lookup failed");
                    false
                }
            };
            annotated.push(product.with_favorite(favorite));
        }
        annotated
    }
}
