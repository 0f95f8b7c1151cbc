//! `Retry-After` header parsing.
//!
//! Servers answer throttled or still-processing requests with a
//! `Retry-After` header carrying either delta-seconds or an absolute
//! date. See [RFC 7231 §7.1.3](https://datatracker.ietf.org/doc/html/rfc7231#section-7.1.3).

use time::{
    format_description::{well_known::Rfc3339, BorrowedFormatItem},
    macros::format_description,
    parsing::Parsed,
    OffsetDateTime, PrimitiveDateTime,
};

/// `Sun, 06 Nov 1994 08:49:37 GMT`
const IMF_FIXDATE: &[BorrowedFormatItem<'_>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// `Sunday, 06-Nov-94 08:49:37 GMT`
const RFC850_DATE: &[BorrowedFormatItem<'_>] = format_description!(
    "[weekday], [day]-[month repr:short]-[year repr:last_two] [hour]:[minute]:[second] GMT"
);

/// Parses a `Retry-After` header value into whole seconds from now.
///
/// Accepted forms, tried in order: non-negative delta-seconds, an
/// RFC 3339 datetime, an RFC 1123 (IMF-fixdate) HTTP-date, and the
/// obsolete RFC 850 form. Surrounding whitespace is tolerated. Absolute
/// dates in the past, like the integer `0`, yield `0`.
///
/// Anything else yields `None` and the header is treated as absent.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    parse_retry_after_at(value, OffsetDateTime::now_utc())
}

pub(crate) fn parse_retry_after_at(value: &str, now: OffsetDateTime) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    // u64 parsing rejects signs and fractions, exactly the set of
    // delta-seconds RFC 7231 allows.
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }

    let instant = parse_http_instant(value)?;
    let delta = instant - now;
    Some(delta.whole_seconds().max(0) as u64)
}

fn parse_http_instant(value: &str) -> Option<OffsetDateTime> {
    if let Ok(instant) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(instant);
    }

    if let Ok(instant) = PrimitiveDateTime::parse(value, IMF_FIXDATE) {
        return Some(instant.assume_utc());
    }

    parse_rfc850(value)
}

/// RFC 850 dates carry a two-digit year; RFC 7231 reads 70..=99 as 19xx
/// and the rest as 20xx.
fn parse_rfc850(value: &str) -> Option<OffsetDateTime> {
    let mut parsed = Parsed::new();
    let rest = parsed.parse_items(value.as_bytes(), RFC850_DATE).ok()?;
    if !rest.is_empty() {
        return None;
    }

    let year_last_two = parsed.year_last_two()?;
    let year = if year_last_two >= 70 {
        1900 + i32::from(year_last_two)
    } else {
        2000 + i32::from(year_last_two)
    };
    parsed.set_year(year)?;

    let instant = PrimitiveDateTime::try_from(parsed).ok()?;
    Some(instant.assume_utc())
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    const NOW: OffsetDateTime = datetime!(1994-11-06 08:49:37 UTC);

    #[test]
    fn test_delta_seconds() {
        assert_eq!(parse_retry_after_at("120", NOW), Some(120));
        assert_eq!(parse_retry_after_at(" 300 ", NOW), Some(300));
        assert_eq!(parse_retry_after_at("0", NOW), Some(0));
    }

    #[test]
    fn test_rejects_signed_and_fractional() {
        assert_eq!(parse_retry_after_at("-30", NOW), None);
        assert_eq!(parse_retry_after_at("+30", NOW), None);
        assert_eq!(parse_retry_after_at("60.5", NOW), None);
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_retry_after_at("", NOW), None);
        assert_eq!(parse_retry_after_at("   ", NOW), None);
        assert_eq!(parse_retry_after_at("soon", NOW), None);
        assert_eq!(parse_retry_after_at("Sun, 06 Nov 1994", NOW), None);
    }

    #[test]
    fn test_imf_fixdate() {
        assert_eq!(
            parse_retry_after_at("Sun, 06 Nov 1994 08:53:37 GMT", NOW),
            Some(240)
        );
    }

    #[test]
    fn test_imf_fixdate_in_the_past_clamps_to_zero() {
        assert_eq!(
            parse_retry_after_at("Sun, 06 Nov 1994 08:45:37 GMT", NOW),
            Some(0)
        );
    }

    #[test]
    fn test_rfc850() {
        assert_eq!(
            parse_retry_after_at("Sunday, 06-Nov-94 08:50:37 GMT", NOW),
            Some(60)
        );
    }

    #[test]
    fn test_rfc850_century_pivot() {
        // 06-Nov-26 must read as 2026, not 1926.
        let now = datetime!(2026-11-06 08:49:37 UTC);
        assert_eq!(
            parse_retry_after_at("Friday, 06-Nov-26 08:49:57 GMT", now),
            Some(20)
        );
    }

    #[test]
    fn test_rfc3339() {
        assert_eq!(
            parse_retry_after_at("1994-11-06T08:51:37Z", NOW),
            Some(120)
        );
        assert_eq!(
            parse_retry_after_at("1994-11-06T09:49:37+01:00", NOW),
            Some(0)
        );
    }
}
