//! Product Catalog Types
//!
//! Read-only reference data (vendor → product type → product names) and the
//! value types that flow through the fan-out path.
//!
//! # Design
//!
//! The catalog is loaded once at startup and never mutated. Ingested
//! products are published to live subscribers only; they are not merged
//! back into the catalog.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Url carried by every product replayed from the catalog.
pub const REPLAY_URL: &str = "sampleUrl";

/// Prefix of generated short urls.
pub const SHORT_URL_PREFIX: &str = "https://made-up-url.com/";

const SHORT_URL_ID_LEN: usize = 6;

// =============================================================================
// Product Types
// =============================================================================

/// A single product as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Product {
    /// Display title.
    pub title: String,
    /// Full product url.
    pub url: String,
    /// Shortened url.
    pub short_url: String,
}

impl Product {
    /// Create a product from its three fields.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        short_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            short_url: short_url.into(),
        }
    }

    /// Build the product replayed for a catalog entry.
    ///
    /// Every call generates a fresh short url.
    #[must_use]
    pub fn from_catalog(title: impl Into<String>) -> Self {
        Self::new(title, REPLAY_URL, generate_short_url())
    }
}

/// Generate a short url from the first characters of a v4 UUID.
#[must_use]
pub fn generate_short_url() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{SHORT_URL_PREFIX}{}", &id[..SHORT_URL_ID_LEN])
}

/// Exact-match selection criterion for a subscription.
///
/// Both fields compare case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductFilter {
    /// Vendor name, e.g. `aws`.
    pub vendor: String,
    /// Product type, e.g. `compute`.
    pub product_type: String,
}

impl ProductFilter {
    /// Create a filter.
    #[must_use]
    pub fn new(vendor: impl Into<String>, product_type: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            product_type: product_type.into(),
        }
    }

    /// Whether a submission for `vendor`/`product_type` is selected.
    #[must_use]
    pub fn matches(&self, vendor: &str, product_type: &str) -> bool {
        self.vendor == vendor && self.product_type == product_type
    }
}

impl std::fmt::Display for ProductFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.vendor, self.product_type)
    }
}

/// An admin-originated product to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// The product, delivered to subscribers unchanged.
    pub product: Product,
    /// Vendor the product belongs to.
    pub vendor: String,
    /// Product type the product belongs to.
    pub product_type: String,
}

impl Submission {
    /// Create a submission.
    #[must_use]
    pub fn new(
        product: Product,
        vendor: impl Into<String>,
        product_type: impl Into<String>,
    ) -> Self {
        Self {
            product,
            vendor: vendor.into(),
            product_type: product_type.into(),
        }
    }

    /// The filter this submission is routed by.
    #[must_use]
    pub fn filter(&self) -> ProductFilter {
        ProductFilter::new(self.vendor.clone(), self.product_type.clone())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Catalog lookup and loading errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Vendor is not present in the catalog.
    #[error("wrong vendor, select between {}", known.join(", "))]
    UnknownVendor {
        /// The requested vendor.
        vendor: String,
        /// Known vendors in sorted order.
        known: Vec<String>,
    },

    /// Catalog file could not be read.
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Catalog document is not valid JSON of the expected shape.
    #[error("invalid catalog document: {0}")]
    Parse(#[from] serde_json::Error),
}

// =============================================================================
// Catalog
// =============================================================================

type Entries = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Read-only vendor → product type → product names mapping.
///
/// # Example
///
/// ```rust
/// use product_catalog_service::domain::catalog::Catalog;
///
/// let catalog = Catalog::builtin();
/// assert_eq!(catalog.lookup("aws", "compute").unwrap(), ["ECS", "EKR", "AWS Fargate"]);
/// assert!(catalog.lookup("aws", "quantum").unwrap().is_empty());
/// assert!(catalog.lookup("ibm", "compute").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    entries: Entries,
}

impl Catalog {
    /// The demo catalog served when no catalog file is configured.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_entries([
            (
                "google",
                vec![
                    ("compute", vec!["App Engine", "Cloud Run", "App Engine"]),
                    ("storage", vec!["Cloud Storage", "Filestore"]),
                ],
            ),
            (
                "aws",
                vec![
                    ("compute", vec!["ECS", "EKR", "AWS Fargate"]),
                    (
                        "storage",
                        vec!["Amazon Aurora", "Amazon RDS", "Amazon Redshift"],
                    ),
                ],
            ),
            (
                "oracle",
                vec![
                    ("compute", vec!["VM", "Bare Metal"]),
                    ("storage", vec!["Oracle ZFS", "Oracle StorageTek"]),
                ],
            ),
        ])
    }

    /// Build a catalog from literal entries.
    pub fn from_entries<'a, V, T>(vendors: V) -> Self
    where
        V: IntoIterator<Item = (&'a str, T)>,
        T: IntoIterator<Item = (&'a str, Vec<&'a str>)>,
    {
        let entries = vendors
            .into_iter()
            .map(|(vendor, types)| {
                let types = types
                    .into_iter()
                    .map(|(product_type, names)| {
                        (
                            product_type.to_string(),
                            names.into_iter().map(str::to_string).collect(),
                        )
                    })
                    .collect();
                (vendor.to_string(), types)
            })
            .collect();
        Self { entries }
    }

    /// Parse a catalog from a JSON object of the form
    /// `{"vendor": {"type": ["name", ...]}}`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Parse`] if the document has another shape.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a catalog from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Io`] if the file cannot be read, or
    /// [`CatalogError::Parse`] if its contents are invalid.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Product names for a vendor and product type, in catalog order.
    ///
    /// An unknown product type of a known vendor yields an empty slice.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownVendor`] if the vendor is absent.
    pub fn lookup(&self, vendor: &str, product_type: &str) -> Result<&[String], CatalogError> {
        let types = self.vendor_entry(vendor)?;
        Ok(types.get(product_type).map_or(&[][..], Vec::as_slice))
    }

    /// Product types offered by a vendor, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownVendor`] if the vendor is absent.
    pub fn product_types(&self, vendor: &str) -> Result<Vec<&str>, CatalogError> {
        Ok(self.vendor_entry(vendor)?.keys().map(String::as_str).collect())
    }

    /// Vendor names, sorted.
    #[must_use]
    pub fn vendors(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Number of vendors.
    #[must_use]
    pub fn vendor_count(&self) -> usize {
        self.entries.len()
    }

    fn vendor_entry(&self, vendor: &str) -> Result<&BTreeMap<String, Vec<String>>, CatalogError> {
        self.entries
            .get(vendor)
            .ok_or_else(|| CatalogError::UnknownVendor {
                vendor: vendor.to_string(),
                known: self.entries.keys().cloned().collect(),
            })
    }
}

// =============================================================================
// Tests
// =============================================================================
