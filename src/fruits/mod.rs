//! Fruit inventory records and request validation

pub mod seed;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MAX_NAME_LEN: usize = 100;
pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fruit {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewFruit {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub quantity: i32,
}

/// Partial update; absent fields keep their value
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FruitUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub quantity: Option<i32>,
}

/// Paging query for list requests
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FruitPage {
    pub items: Vec<Fruit>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "name must be between 1 and {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(Error::Validation(
            "price must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

fn validate_quantity(quantity: i32) -> Result<()> {
    if quantity < 0 {
        return Err(Error::Validation(
            "quantity must not be negative".to_string(),
        ));
    }
    Ok(())
}

impl NewFruit {
    /// Check fields and return a normalized copy
    pub fn validated(self) -> Result<Self> {
        let name = validate_name(&self.name)?;
        validate_price(self.price)?;
        validate_quantity(self.quantity)?;
        Ok(Self {
            name,
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            ..self
        })
    }
}

impl FruitUpdate {
    pub fn validated(self) -> Result<Self> {
        let name = self.name.as_deref().map(validate_name).transpose()?;
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        if let Some(quantity) = self.quantity {
            validate_quantity(quantity)?;
        }
        Ok(Self { name, ..self })
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.quantity.is_none()
    }
}

impl ListQuery {
    /// Resolve to (limit, offset) within bounds
    pub fn resolve(&self) -> Result<(i64, i64)> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(Error::Validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(Error::Validation("offset must not be negative".to_string()));
        }
        Ok((limit, offset))
    }
}
