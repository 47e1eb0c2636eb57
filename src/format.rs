// Display formatting for prices and percent changes
use crate::models::micros_to_usd;

/// Format a micro-unit price for display. Decimal places step down with
/// magnitude so sub-cent assets stay readable: ≥1000 and ≥1 get two places
/// (with thousands separators above 1000), ≥0.01 four, everything else six.
pub fn format_usd(price_micros: u64) -> String {
    let usd = micros_to_usd(price_micros);

    if usd >= 1000.0 {
        format!("${}", group_thousands(usd))
    } else if usd >= 1.0 {
        format!("${:.2}", usd)
    } else if usd >= 0.01 {
        format!("${:.4}", usd)
    } else {
        format!("${:.6}", usd)
    }
}

/// Format a percent change with an explicit sign: "+5.50%", "-3.20%".
pub fn format_percent_change(change: f64) -> String {
    let prefix = if change >= 0.0 { "+" } else { "" };
    format!("{}{:.2}%", prefix, change)
}

fn group_thousands(usd: f64) -> String {
    let formatted = format!("{:.2}", usd);
    let (integer, fraction) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    let digits: Vec<char> = integer.chars().collect();
    let mut grouped = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }

    format!("{}.{}", grouped, fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MICROS_PER_USD;

    fn usd(units: f64) -> u64 {
        (units * MICROS_PER_USD as f64).round() as u64
    }

    #[test]
    fn test_format_usd_tiers() {
        assert_eq!(format_usd(usd(84_714.0)), "$84,714.00");
        assert_eq!(format_usd(usd(2_739.21)), "$2,739.21");
        assert_eq!(format_usd(usd(999.99)), "$999.99");
        assert_eq!(format_usd(usd(0.50)), "$0.50");
        assert_eq!(format_usd(usd(0.25)), "$0.2500");
        assert_eq!(format_usd(usd(0.000012)), "$0.000012");
    }

    #[test]
    fn test_format_usd_large_grouping() {
        assert_eq!(format_usd(usd(1_234_567.89)), "$1,234,567.89");
        assert_eq!(format_usd(usd(1_000.0)), "$1,000.00");
    }

    #[test]
    fn test_format_percent_change() {
        assert_eq!(format_percent_change(5.5), "+5.50%");
        assert_eq!(format_percent_change(-3.2), "-3.20%");
        assert_eq!(format_percent_change(0.0), "+0.00%");
    }
}
