//! Browsing and listing books.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::backend::DataService;
use crate::common::{Listing, NewListing};
use crate::error::{FieldError, MarketError, Result};

pub const CATEGORIES: &[&str] = &[
    "Fiction",
    "Non-Fiction",
    "Academic",
    "Children",
    "Romance",
    "Mystery",
    "Science",
    "Biography",
    "Self-Help",
    "History",
    "Philosophy",
    "Poetry",
];

pub const CONDITIONS: &[&str] = &["Like New", "Very Good", "Good", "Fair", "Poor"];

pub const DEFAULT_MAX_PRICE: f64 = 10_000.0;
/// Listings shown under "you may also like" on a book's page.
pub const RELATED_LIMIT: usize = 4;
/// Listings shown on the landing page.
pub const RECENT_LIMIT: usize = 8;

static TEN_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10}$").expect("valid phone pattern"));
static IMAGE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpe?g|png|webp)$").expect("valid image pattern"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    PriceLow,
    PriceHigh,
    Title,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "newest" => Ok(SortOrder::Newest),
            "oldest" => Ok(SortOrder::Oldest),
            "price-low" => Ok(SortOrder::PriceLow),
            "price-high" => Ok(SortOrder::PriceHigh),
            "title" => Ok(SortOrder::Title),
            other => Err(format!(
                "unknown sort order `{other}` (expected newest, oldest, price-low, price-high or title)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseQuery {
    pub search: Option<String>,
    /// `None` (or "all") shows every category.
    pub category: Option<String>,
    pub min_price: f64,
    pub max_price: f64,
    pub sort: SortOrder,
}

impl Default for BrowseQuery {
    fn default() -> Self {
        Self {
            search: None,
            category: None,
            min_price: 0.0,
            max_price: DEFAULT_MAX_PRICE,
            sort: SortOrder::Newest,
        }
    }
}

impl BrowseQuery {
    fn matches(&self, listing: &Listing) -> bool {
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let hit = listing.title.to_lowercase().contains(&needle)
                || listing.author.to_lowercase().contains(&needle)
                || listing.category.to_lowercase().contains(&needle);
            if !hit {
                return false;
            }
        }

        if let Some(category) = self.category.as_deref().filter(|c| *c != "all") {
            if listing.category != category {
                return false;
            }
        }

        listing.price >= self.min_price && listing.price <= self.max_price
    }
}

/// Filter and sort listings for the browse view.
pub fn browse(listings: &[Listing], query: &BrowseQuery) -> Vec<Listing> {
    let mut found: Vec<Listing> = listings
        .iter()
        .filter(|listing| query.matches(listing))
        .cloned()
        .collect();

    match query.sort {
        SortOrder::Newest => found.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOrder::Oldest => found.sort_by_key(|l| l.created_at),
        SortOrder::PriceLow => found.sort_by(|a, b| cmp_price(a.price, b.price)),
        SortOrder::PriceHigh => found.sort_by(|a, b| cmp_price(b.price, a.price)),
        SortOrder::Title => found.sort_by(|a, b| {
            a.title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then_with(|| a.title.cmp(&b.title))
        }),
    }
    found
}

fn cmp_price(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// The newest `limit` listings other than `listing_id`.
pub fn related(listings: &[Listing], listing_id: &str, limit: usize) -> Vec<Listing> {
    let mut others: Vec<Listing> = listings
        .iter()
        .filter(|l| l.id != listing_id)
        .cloned()
        .collect();
    others.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    others.truncate(limit);
    others
}

/// Whether `raw` holds exactly ten digits once separators are dropped.
pub(crate) fn is_phone_number(raw: &str) -> bool {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    TEN_DIGITS.is_match(&digits)
}

impl NewListing {
    /// Check the sell form, reporting every bad field at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.title.trim().is_empty() {
            errors.push(FieldError::new("title", "Title is required"));
        }
        if self.author.trim().is_empty() {
            errors.push(FieldError::new("author", "Author is required"));
        }
        if !(self.price.is_finite() && self.price > 0.0) {
            errors.push(FieldError::new("price", "Valid price is required"));
        }
        if !CATEGORIES.contains(&self.category.as_str()) {
            errors.push(FieldError::new("category", "Category is required"));
        }
        if !CONDITIONS.contains(&self.condition.as_str()) {
            errors.push(FieldError::new("condition", "Condition is required"));
        }

        if self.contact_number.trim().is_empty() {
            errors.push(FieldError::new("contact", "Contact number is required"));
        } else if !is_phone_number(&self.contact_number) {
            errors.push(FieldError::new(
                "contact",
                "Please enter a valid 10-digit phone number",
            ));
        }

        if let Some(image) = &self.image_url {
            if !IMAGE_REFERENCE.is_match(image.trim()) {
                errors.push(FieldError::new(
                    "image",
                    "Only JPG, PNG, and WEBP files are allowed",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MarketError::InvalidListing(errors))
        }
    }
}

/// Totals shown on the seller's profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ListingStats {
    pub listed: usize,
    pub total_asking: f64,
}

impl ListingStats {
    pub fn from_listings(listings: &[Listing]) -> Self {
        Self {
            listed: listings.len(),
            total_asking: listings.iter().map(|l| l.price).sum(),
        }
    }
}

/// Validate and publish a listing owned by the current user.
pub async fn publish_listing<B: DataService + ?Sized>(
    backend: &B,
    listing: NewListing,
) -> Result<Listing> {
    let owner = backend
        .current_user()
        .ok_or(MarketError::NotAuthenticated)?;
    listing.validate()?;
    backend.insert_listing(&owner, listing).await
}

pub async fn browse_listings<B: DataService + ?Sized>(
    backend: &B,
    query: &BrowseQuery,
) -> Result<Vec<Listing>> {
    let listings = backend.fetch_listings().await?;
    let found = browse(&listings, query);
    log::debug!("Browse matched {} of {} listings", found.len(), listings.len());
    Ok(found)
}

/// A single listing for its details page.
pub async fn listing_details<B: DataService + ?Sized>(backend: &B, id: &str) -> Result<Listing> {
    backend
        .fetch_listing(id)
        .await?
        .ok_or_else(|| MarketError::NotFound(format!("listing {id}")))
}

pub async fn related_listings<B: DataService + ?Sized>(
    backend: &B,
    listing_id: &str,
    limit: usize,
) -> Result<Vec<Listing>> {
    let listings = backend.fetch_listings().await?;
    Ok(related(&listings, listing_id, limit))
}

pub async fn recent_listings<B: DataService + ?Sized>(
    backend: &B,
    limit: usize,
) -> Result<Vec<Listing>> {
    let mut listings = backend.fetch_listings().await?;
    listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    listings.truncate(limit);
    Ok(listings)
}

pub async fn my_listings<B: DataService + ?Sized>(
    backend: &B,
) -> Result<(Vec<Listing>, ListingStats)> {
    let owner = backend
        .current_user()
        .ok_or(MarketError::NotAuthenticated)?;
    let listings = backend.fetch_listings_by_owner(&owner).await?;
    let stats = ListingStats::from_listings(&listings);
    Ok((listings, stats))
}
