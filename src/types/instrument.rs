use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Price, Size};
use rust_decimal::Decimal;

/// Venue instrument identifier (e.g. "BTC-USDT", "BTC-USDT-SWAP")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for InstrumentId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Product family of an instrument. Governs which feeds gate readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductType {
    Spot,
    /// Dated delivery contract, no funding
    Futures,
    /// Perpetual swap, pays funding
    Perpetual,
}

impl ProductType {
    pub fn is_derivative(&self) -> bool {
        !matches!(self, ProductType::Spot)
    }

    /// Classify an OKX-style instrument id.
    ///
    /// `BTC-USDT-SWAP` is a perpetual, `BTC-USD-240628` a dated future, anything else spot.
    pub fn from_instrument_id(id: &str) -> Self {
        if id.contains("SWAP") {
            return ProductType::Perpetual;
        }
        match id.rsplit('-').next() {
            Some(tail) if id.contains('-') && tail.len() == 6 && tail.chars().all(|c| c.is_ascii_digit()) => {
                ProductType::Futures
            }
            _ => ProductType::Spot,
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductType::Spot => write!(f, "spot"),
            ProductType::Futures => write!(f, "futures"),
            ProductType::Perpetual => write!(f, "perpetual"),
        }
    }
}

/// Static trading rules for one instrument.
///
/// For derivatives `base_currency` holds the contract value currency and
/// `quote_currency` the settlement currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub product: ProductType,
    pub base_currency: String,
    pub quote_currency: String,
    /// Face value of one contract in `base_currency`; 1 for spot
    pub contract_value: Decimal,
    pub tick_size: Price,
    pub lot_size: Size,
    pub min_size: Size,
}

impl Instrument {
    pub fn spot(id: impl Into<InstrumentId>, base: &str, quote: &str, tick_size: Price, lot_size: Size) -> Self {
        Self {
            id: id.into(),
            product: ProductType::Spot,
            base_currency: base.to_string(),
            quote_currency: quote.to_string(),
            contract_value: Decimal::ONE,
            tick_size,
            lot_size,
            min_size: lot_size,
        }
    }

    pub fn derivative(
        id: impl Into<InstrumentId>,
        value_ccy: &str,
        settle_ccy: &str,
        contract_value: Decimal,
        tick_size: Price,
        lot_size: Size,
    ) -> Self {
        let id = id.into();
        let product = match ProductType::from_instrument_id(id.as_str()) {
            ProductType::Spot => ProductType::Perpetual,
            other => other,
        };
        Self {
            id,
            product,
            base_currency: value_ccy.to_string(),
            quote_currency: settle_ccy.to_string(),
            contract_value,
            tick_size,
            lot_size,
            min_size: lot_size,
        }
    }

    pub fn value_currency(&self) -> &str {
        &self.base_currency
    }

    pub fn settle_currency(&self) -> &str {
        &self.quote_currency
    }
}
