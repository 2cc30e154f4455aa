//! Phone number normalization for M-Pesa.

use crate::error::GatewayError;

/// Country calling code of Kenya.
pub const KENYA_COUNTRY_CODE: &str = "254";

/// Rewrites a phone number into the international MSISDN form M-Pesa expects
/// (`254712345678`).
///
/// Local numbers with a leading `0` get the country code in place of the zero,
/// bare nine-digit subscriber numbers get it prepended, and numbers already in
/// international form pass through unchanged. Spaces, dashes, parentheses and
/// a leading `+` are ignored.
pub fn normalize_msisdn(raw: &str) -> Result<String, GatewayError> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(GatewayError::InvalidPhone(raw.to_string()));
    }

    let msisdn = if let Some(local) = cleaned.strip_prefix('0') {
        format!("{KENYA_COUNTRY_CODE}{local}")
    } else if cleaned.len() == 9 && cleaned.starts_with(['7', '1']) {
        format!("{KENYA_COUNTRY_CODE}{cleaned}")
    } else {
        cleaned
    };

    if !(10..=15).contains(&msisdn.len()) {
        return Err(GatewayError::InvalidPhone(raw.to_string()));
    }

    Ok(msisdn)
}
