//
// products.rs
// Report-Tools-rs
//
// Closed set of product lines and the per-product result-type table used when
// registering synthesized film images.
//
// Report-Tools-rs maintainers - October 2026

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    CtBmd,
    CtHeart,
    CtLung,
    MrHead,
}

impl Product {
    pub const ALL: [Product; 4] = [
        Product::CtBmd,
        Product::CtHeart,
        Product::CtLung,
        Product::MrHead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Product::CtBmd => "ct_bmd",
            Product::CtHeart => "ct_heart",
            Product::CtLung => "ct_lung",
            Product::MrHead => "mr_head",
        }
    }

    /// Built-in profile used when the configuration does not override it.
    pub fn default_profile(self) -> ProductProfile {
        match self {
            Product::CtBmd => ProductProfile {
                film_result: Some("ct_bmd_film".into()),
                series_result: None,
                custom_shape: CustomShape::Map,
            },
            Product::CtHeart => ProductProfile {
                film_result: Some("ct_heart_film".into()),
                series_result: Some("ct_heart_series".into()),
                custom_shape: CustomShape::Map,
            },
            Product::CtLung => ProductProfile {
                film_result: None,
                series_result: None,
                custom_shape: CustomShape::Map,
            },
            Product::MrHead => ProductProfile {
                film_result: Some("mr_head_film".into()),
                series_result: Some("mr_head_series".into()),
                custom_shape: CustomShape::List,
            },
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Product {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Product::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| ReportError::Validation(format!("unknown product `{}`", s)))
    }
}

/// Shape of the "Custom" collection inside a remote result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomShape {
    List,
    Map,
}

/// Which nested collection of the result record a result type writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageCollection {
    Film,
    Series,
}

impl ImageCollection {
    pub fn record_key(self) -> &'static str {
        match self {
            ImageCollection::Film => "filmImages",
            ImageCollection::Series => "seriesImages",
        }
    }
}

/// A result type configured for a product, paired with the collection it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultType {
    pub name: String,
    pub collection: ImageCollection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductProfile {
    #[serde(default)]
    pub film_result: Option<String>,
    #[serde(default)]
    pub series_result: Option<String>,
    pub custom_shape: CustomShape,
}

impl ProductProfile {
    /// Result types in update order: film first, then series. Unset slots are skipped.
    pub fn result_types(&self) -> Vec<ResultType> {
        let film = self.film_result.iter().map(|name| ResultType {
            name: name.clone(),
            collection: ImageCollection::Film,
        });
        let series = self.series_result.iter().map(|name| ResultType {
            name: name.clone(),
            collection: ImageCollection::Series,
        });
        film.chain(series).collect()
    }

    fn validate(&self, product: Product) -> Result<(), ReportError> {
        let names = self.film_result.iter().chain(self.series_result.iter());
        for name in names {
            if name.trim().is_empty() || name.contains('/') {
                return Err(ReportError::Validation(format!(
                    "product `{}` has an invalid result type `{}`",
                    product, name
                )));
            }
        }
        Ok(())
    }
}

/// Total mapping from every [`Product`] to its profile. Built from configuration
/// overrides layered on the defaults, so lookups can never miss.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BTreeMap<String, ProductProfile>")]
pub struct ProductTable {
    profiles: BTreeMap<Product, ProductProfile>,
}

impl ProductTable {
    pub fn from_overrides(
        overrides: BTreeMap<String, ProductProfile>,
    ) -> Result<Self, ReportError> {
        let mut profiles: BTreeMap<Product, ProductProfile> = Product::ALL
            .into_iter()
            .map(|p| (p, p.default_profile()))
            .collect();

        for (key, profile) in overrides {
            let product: Product = key.parse()?;
            profile.validate(product)?;
            profiles.insert(product, profile);
        }

        Ok(Self { profiles })
    }

    pub fn profile(&self, product: Product) -> &ProductProfile {
        // Every variant is inserted at construction.
        &self.profiles[&product]
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Product, &ProductProfile)> {
        self.profiles.iter()
    }
}

impl Default for ProductTable {
    fn default() -> Self {
        Self {
            profiles: Product::ALL
                .into_iter()
                .map(|p| (p, p.default_profile()))
                .collect(),
        }
    }
}

impl TryFrom<BTreeMap<String, ProductProfile>> for ProductTable {
    type Error = ReportError;

    fn try_from(value: BTreeMap<String, ProductProfile>) -> Result<Self, Self::Error> {
        ProductTable::from_overrides(value)
    }
}
