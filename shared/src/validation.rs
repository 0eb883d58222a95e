//! Boundary parsing for loosely-typed ledger cells
//!
//! The lead ledger is filled by an upstream intake process, so quantities and
//! prices arrive as free text. Everything that guesses at a cell's meaning
//! lives here so the rest of the system only sees typed values.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Map Arabic-Indic and Eastern Arabic-Indic digits to ASCII digits
pub fn normalize_digits(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            '\u{066B}' => '.',
            '\u{066C}' => ',',
            other => other,
        })
        .collect()
}

/// Largest quantity accepted for a single order or stock movement
pub const MAX_QUANTITY: i64 = 1_000_000;

/// Parse a free-text order quantity.
///
/// Takes the leading integer (`"2 pcs"` is 2). An empty cell means a single
/// unit. Values above [`MAX_QUANTITY`] are refused.
pub fn parse_quantity(input: &str) -> Result<i64, &'static str> {
    let text = normalize_digits(input.trim());
    if text.is_empty() {
        return Ok(1);
    }
    if text.starts_with('-') {
        return Err("Quantity cannot be negative");
    }

    let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err("Quantity must be a number");
    }

    let quantity = digits
        .parse::<i64>()
        .map_err(|_| "Quantity is too large")?;

    if quantity == 0 {
        return Err("Quantity must be at least 1");
    }
    if quantity > MAX_QUANTITY {
        return Err("Quantity is too large");
    }
    Ok(quantity)
}

/// Parse a free-text price such as `"1,250 EGP"`
pub fn parse_price(input: &str) -> Result<Decimal, &'static str> {
    let text = normalize_digits(input.trim());
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    if cleaned.is_empty() {
        return Err("Price must be a number");
    }
    Decimal::from_str(&cleaned).map_err(|_| "Price must be a number")
}

/// Lowercase, trim and collapse inner whitespace
pub fn normalize_name(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Split a synonym cell on `,` `;` `|` or the Arabic comma
pub fn split_synonyms(cell: &str) -> Vec<String> {
    cell.split(|c: char| matches!(c, ',' | ';' | '|' | '\u{060C}'))
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Validate a product name for a new stock item
pub fn validate_product_name(name: &str) -> Result<(), &'static str> {
    let normalized = normalize_name(name);
    if normalized.is_empty() {
        return Err("Product name is required");
    }
    if normalized.chars().count() > 120 {
        return Err("Product name must be at most 120 characters");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_leading_integer() {
        assert_eq!(parse_quantity("2"), Ok(2));
        assert_eq!(parse_quantity(" 3 pcs "), Ok(3));
        assert_eq!(parse_quantity("\u{0663}"), Ok(3));
        assert_eq!(parse_quantity(""), Ok(1));
    }

    #[test]
    fn test_quantity_rejects_garbage() {
        assert!(parse_quantity("two").is_err());
        assert!(parse_quantity("0").is_err());
        assert!(parse_quantity("-4").is_err());
    }

    #[test]
    fn test_quantity_ceiling() {
        assert_eq!(parse_quantity("1000000"), Ok(MAX_QUANTITY));
        assert_eq!(parse_quantity("1000001"), Err("Quantity is too large"));
        assert_eq!(
            parse_quantity("9223372036854775807"),
            Err("Quantity is too large")
        );
        assert_eq!(
            parse_quantity("99999999999999999999999"),
            Err("Quantity is too large")
        );
    }

    #[test]
    fn test_price_strips_currency() {
        assert_eq!(parse_price("1,250 EGP"), Ok(Decimal::from(1250)));
        assert_eq!(parse_price("99.50"), Ok(Decimal::new(9950, 2)));
        assert!(parse_price("free").is_err());
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Blue   Widget "), "blue widget");
    }

    #[test]
    fn test_split_synonyms() {
        assert_eq!(
            split_synonyms("widget, wdg |  blue  widget;"),
            vec!["widget", "wdg", "blue widget"]
        );
        assert!(split_synonyms("").is_empty());
    }
}
