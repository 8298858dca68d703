// Money display helpers
//
// Amounts live in integer minor units (cents) everywhere. Conversion to
// "12,34" strings only happens at display time.

/// Format minor units with two decimals and a comma separator: 1234 -> "12,34"
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{},{:02}", sign, abs / 100, abs % 100)
}
