//! Currency normalizer.
//!
//! Every stored amount is in the canonical currency (USD cents). Conversion to
//! the display currency is a pure function of the amount and a fixed rate, and
//! the same conversion produces the amount requested from M-Pesa, so what the
//! customer sees, what the gateway authorizes and what the order records agree.

use serde::{Deserialize, Serialize};

use crate::order::Money;

/// Subtotal from which shipping is free.
pub const FREE_SHIPPING_THRESHOLD: Money = Money::from_dollars(50);

/// Shipping fee below the threshold.
pub const FLAT_SHIPPING_FEE: Money = Money::from_dollars(5);

/// Time zone of the primary market.
const NAIROBI_TIME_ZONE: &str = "Africa/Nairobi";

/// Supported currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Kenyan shilling, the display currency of the primary market.
    Kes,
    /// US dollar, the canonical currency.
    Usd,
}

impl Currency {
    /// The currency all amounts are stored and computed in.
    pub const CANONICAL: Currency = Currency::Usd;

    /// ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Kes => "KES",
            Currency::Usd => "USD",
        }
    }

    /// Display symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Kes => "KSh",
            Currency::Usd => "$",
        }
    }

    /// Units of this currency per canonical unit.
    pub fn rate(&self) -> i64 {
        match self {
            Currency::Kes => 150,
            Currency::Usd => 1,
        }
    }

    /// Display locale.
    pub fn locale(&self) -> &'static str {
        match self {
            Currency::Kes => "en-KE",
            Currency::Usd => "en-US",
        }
    }

    /// Decimal places kept after conversion.
    pub fn decimals(&self) -> u32 {
        match self {
            Currency::Kes => 0,
            Currency::Usd => 2,
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KES" => Ok(Currency::Kes),
            "USD" => Ok(Currency::Usd),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}

/// An amount converted to a target currency, in that currency's smallest
/// displayed unit (whole shillings, US cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyAmount {
    pub currency: Currency,
    pub minor_units: i64,
}

impl std::fmt::Display for CurrencyAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.currency {
            Currency::Kes => write!(
                f,
                "{} {}",
                self.currency.symbol(),
                group_thousands(self.minor_units)
            ),
            Currency::Usd => {
                let sign = if self.minor_units < 0 { "-" } else { "" };
                let abs = self.minor_units.abs();
                write!(
                    f,
                    "{sign}{}{}.{:02}",
                    self.currency.symbol(),
                    abs / 100,
                    abs % 100
                )
            }
        }
    }
}

/// Converts a canonical amount to `target`, rounding half away from zero to
/// the target's precision.
pub fn convert(amount: Money, target: Currency) -> CurrencyAmount {
    let scale = 10_i64.pow(target.decimals());
    // cents -> target units * scale, over the 100 cents of a canonical unit
    let numerator = amount.cents() * target.rate() * scale;
    CurrencyAmount {
        currency: target,
        minor_units: div_round_half_away(numerator, 100),
    }
}

/// Whole-shilling amount for M-Pesa requests.
pub fn to_kes(amount: Money) -> i64 {
    convert(amount, Currency::Kes).minor_units
}

/// Formats a canonical amount for display in `target`.
pub fn format_display(amount: Money, target: Currency) -> String {
    convert(amount, target).to_string()
}

/// Shipping cost for a subtotal, in the canonical currency.
pub fn shipping_cost(subtotal: Money) -> Money {
    if subtotal >= FREE_SHIPPING_THRESHOLD {
        Money::zero()
    } else {
        FLAT_SHIPPING_FEE
    }
}

/// Formats the shipping line for a subtotal: `"Free"` or the converted fee.
pub fn format_shipping(subtotal: Money, target: Currency) -> String {
    let cost = shipping_cost(subtotal);
    if cost.is_zero() {
        "Free".to_string()
    } else {
        format_display(cost, target)
    }
}

/// Best-effort display currency from a time zone or locale hint.
///
/// Presentation only; never used for stored amounts.
pub fn detect_display_currency(hint: &str) -> Currency {
    let hint = hint.trim();
    if hint.is_empty() || hint.eq_ignore_ascii_case(NAIROBI_TIME_ZONE) {
        return Currency::Kes;
    }

    let region = hint.rsplit(['-', '_']).next().unwrap_or_default();
    if hint.len() > region.len() && region.eq_ignore_ascii_case("KE") {
        return Currency::Kes;
    }

    Currency::Usd
}

fn div_round_half_away(numerator: i64, denominator: i64) -> i64 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
