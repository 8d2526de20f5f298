use std::time::Duration;

/// Parses an interval string such as `1d1h1m1s` into a [`Duration`].
///
/// The string is a sequence of `<digits><unit>` groups where the unit is one of
/// `s`, `m`, `h` or `d`. Groups may repeat and are summed, so `90s` and `1m30s`
/// are equivalent.
///
/// Returns `None` if the input is malformed or the total overflows.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use distrocache_utils::time::parse_interval;
///
/// assert_eq!(parse_interval("1h30m"), Some(Duration::from_secs(5400)));
/// ```
pub fn parse_interval(input: &str) -> Option<Duration> {
    let mut total: u64 = 0;
    let mut chars = input.trim().chars().peekable();

    while chars.peek().is_some() {
        let mut number_str = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_digit() {
                number_str.push(chars.next()?);
            } else {
                break;
            }
        }

        if number_str.is_empty() {
            return None;
        }

        let number: u64 = number_str.parse().ok()?;
        let multiplier = match chars.next()? {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 24 * 60 * 60,
            _ => return None,
        };

        total = total.checked_add(number.checked_mul(multiplier)?)?;
    }

    Some(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("1s"), Some(Duration::from_secs(1)));
        assert_eq!(parse_interval("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_interval("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_interval("1d"), Some(Duration::from_secs(86400)));
        assert_eq!(
            parse_interval("1d1h1m1s"),
            Some(Duration::from_secs(86400 + 3600 + 60 + 1))
        );
        assert_eq!(parse_interval("1m30s"), parse_interval("90s"));
        assert_eq!(parse_interval("1d1h1m1s1"), None);
        assert_eq!(parse_interval("3x"), None);
        assert_eq!(parse_interval("fail"), None);
        assert_eq!(parse_interval(""), Some(Duration::ZERO));
    }

    #[test]
    fn test_integer_overflow() {
        assert_eq!(parse_interval("18446744073709551615d"), None);
        assert_eq!(parse_interval("99999999999999999999999s"), None);
    }
}
