use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::cost::Cost;
use crate::domain::customer::Customer;
use crate::domain::payment::Payment;
use crate::domain::product::Product;
use crate::domain::reservation::Reservation;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The five collections an approval request can target.
///
/// Products are called `item` on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Customer,
    Item,
    Payment,
    Reservation,
    Cost,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] =
        [Self::Customer, Self::Item, Self::Payment, Self::Reservation, Self::Cost];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Item => "item",
            Self::Payment => "payment",
            Self::Reservation => "reservation",
            Self::Cost => "cost",
        }
    }

    /// SQL table holding documents of this kind.
    pub fn table(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Item => "product",
            Self::Payment => "payment",
            Self::Reservation => "reservation",
            Self::Cost => "cost",
        }
    }

    /// Top-level blob folder for files owned by this kind.
    pub fn storage_folder(self) -> &'static str {
        match self {
            Self::Customer => "customers",
            Self::Item => "products",
            Self::Payment => "payments",
            Self::Reservation => "reservations",
            Self::Cost => "costs",
        }
    }

    /// Payments and costs keep their existing attachments on edit and merge
    /// the new ones in; other kinds take the submitted list as-is.
    pub fn merges_attachments(self) -> bool {
        matches!(self, Self::Payment | Self::Cost)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "customer" | "customers" => Ok(Self::Customer),
            "item" | "items" | "product" | "products" => Ok(Self::Item),
            "payment" | "payments" => Ok(Self::Payment),
            "reservation" | "reservations" => Ok(Self::Reservation),
            "cost" | "costs" => Ok(Self::Cost),
            other => Err(DomainError::UnknownResourceKind(other.to_string())),
        }
    }
}

/// Round-trips a document through the typed resource for `kind`.
///
/// Unknown keys are dropped and defaults are filled in, so what gets stored
/// always deserializes again.
pub fn canonicalize(kind: ResourceKind, document: Value) -> Result<Value, DomainError> {
    fn through<T>(kind: ResourceKind, document: Value) -> Result<Value, DomainError>
    where
        T: serde::de::DeserializeOwned + Serialize,
    {
        let typed: T = serde_json::from_value(document).map_err(|error| {
            DomainError::InvalidDocument { kind: kind.as_str(), message: error.to_string() }
        })?;
        serde_json::to_value(typed).map_err(|error| DomainError::InvalidDocument {
            kind: kind.as_str(),
            message: error.to_string(),
        })
    }

    match kind {
        ResourceKind::Customer => through::<Customer>(kind, document),
        ResourceKind::Item => through::<Product>(kind, document),
        ResourceKind::Payment => through::<Payment>(kind, document),
        ResourceKind::Reservation => through::<Reservation>(kind, document),
        ResourceKind::Cost => through::<Cost>(kind, document),
    }
}
