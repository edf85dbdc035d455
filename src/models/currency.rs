use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currencies accepted for a PaymentIntent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    BRL,
    USD,
    EUR,
}

impl Currency {
    /// Returns the ISO 4217 numeric code for the currency.
    pub fn numeric_code(&self) -> u16 {
        match self {
            Currency::BRL => 986,
            Currency::USD => 840,
            Currency::EUR => 978,
        }
    }

    /// Returns the number of decimal places for the currency. All three are scale 2.
    pub fn decimal_places(&self) -> u8 {
        2
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::BRL => "R$",
            Currency::USD => "$",
            Currency::EUR => "€",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Currency::BRL => "Brazilian Real",
            Currency::USD => "US Dollar",
            Currency::EUR => "Euro",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for Currency {
    type Err = CurrencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BRL" => Ok(Currency::BRL),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            _ => Err(CurrencyParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CurrencyParseError(String);

impl fmt::Display for CurrencyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported currency code: {}", self.0)
    }
}

impl std::error::Error for CurrencyParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_accepts_supported_currencies() {
        assert_eq!(Currency::from_str("usd").unwrap(), Currency::USD);
        assert_eq!(Currency::from_str("BRL").unwrap(), Currency::BRL);
        assert_eq!(Currency::from_str("EUR").unwrap(), Currency::EUR);
    }

    #[test]
    fn from_str_rejects_unknown_currency() {
        assert!(Currency::from_str("GBP").is_err());
    }

    #[test]
    fn display_roundtrips_through_from_str() {
        assert_eq!(Currency::USD.to_string(), "USD");
    }

    #[test]
    fn all_supported_currencies_are_scale_two() {
        assert_eq!(Currency::BRL.decimal_places(), 2);
        assert_eq!(Currency::USD.decimal_places(), 2);
        assert_eq!(Currency::EUR.decimal_places(), 2);
    }

    #[test]
    fn serializes_uppercase() {
        let json = serde_json::to_string(&Currency::BRL).unwrap();
        assert_eq!(json, "\"BRL\"");
    }
}
