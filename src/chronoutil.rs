use {
    chrono::{
        format::{ParseError, ParseResult},
        naive::{NaiveDate, NaiveDateTime, NaiveTime},
        offset::{FixedOffset, TimeZone},
        DateTime, Utc,
    },
    lazy_static::lazy_static,
    regex::{Captures, Regex},
    std::str::FromStr,
};

lazy_static! {
    /// ISO 8601 timestamp in basic format (`20150830T123600Z`).
    static ref ISO_8601_REGEX: Regex = Regex::new(
        r"(?x)^
        (?P<year>\d{4})
        (?P<month>0[1-9]|1[0-2])
        (?P<day>0[1-9]|[12][0-9]|3[01])
        T
        (?P<hour>[01][0-9]|2[0-3])
        (?P<minute>[0-5][0-9])
        (?P<second>[0-5][0-9])
        (?P<offset>[-+][01][0-9][0-5][0-9]|Z)$").unwrap();

    static ref INVALID: ParseError = DateTime::<FixedOffset>::from_str("").unwrap_err();
}

pub(crate) trait ParseISO8601<T> {
    fn parse_from_iso8601(s: &str) -> ParseResult<T>;
}

fn capture<T: FromStr>(cap: &Captures, name: &str) -> ParseResult<T> {
    cap.name(name).and_then(|m| T::from_str(m.as_str()).ok()).ok_or(*INVALID)
}

impl ParseISO8601<DateTime<Utc>> for DateTime<Utc> {
    fn parse_from_iso8601(s: &str) -> ParseResult<DateTime<Utc>> {
        let Some(cap) = ISO_8601_REGEX.captures(s) else {
            return Err(*INVALID);
        };

        // Day-of-month overflow (e.g. February 30) is caught here.
        let naive_date =
            NaiveDate::from_ymd_opt(capture(&cap, "year")?, capture(&cap, "month")?, capture(&cap, "day")?)
                .ok_or(*INVALID)?;
        let naive_time =
            NaiveTime::from_hms_opt(capture(&cap, "hour")?, capture(&cap, "minute")?, capture(&cap, "second")?)
                .ok_or(*INVALID)?;
        let naive_dt = NaiveDateTime::new(naive_date, naive_time);

        let offset_str = cap.name("offset").map(|m| m.as_str()).ok_or(*INVALID)?;
        let offset_secs = if offset_str == "Z" {
            0
        } else {
            // [+-]HHMM
            let (sign_str, hm) = offset_str.split_at(1);
            let (hour_off_str, minute_off_str) = hm.split_at(2);
            let sign = if sign_str == "-" {
                -1
            } else {
                1
            };

            let hour = i32::from_str(hour_off_str).map_err(|_| *INVALID)?;
            let min = i32::from_str(minute_off_str).map_err(|_| *INVALID)?;
            sign * (hour * 3600 + min * 60)
        };

        let offset = FixedOffset::east_opt(offset_secs).ok_or(*INVALID)?;
        offset.from_local_datetime(&naive_dt).single().map(|dt| dt.with_timezone(&Utc)).ok_or(*INVALID)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::ParseISO8601,
        chrono::{DateTime, NaiveDate, Utc},
    };

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, s).unwrap(), Utc)
    }

    #[test_log::test]
    fn parse_basic() {
        assert_eq!(DateTime::<Utc>::parse_from_iso8601("20240101T000000Z").unwrap(), utc(2024, 1, 1, 0, 0, 0));
        assert_eq!(DateTime::<Utc>::parse_from_iso8601("20150830T123600Z").unwrap(), utc(2015, 8, 30, 12, 36, 0));
    }

    #[test_log::test]
    fn extended_format_is_rejected() {
        for s in ["2015-08-30T12:36:00Z", "2015-08-30T123600Z", "20150830T12:36:00Z", "20150830T123600+01:30"] {
            assert!(DateTime::<Utc>::parse_from_iso8601(s).is_err(), "{} should not parse", s);
        }
    }

    #[test_log::test]
    fn parse_with_offset() {
        // 12:36 at -07:00 is 19:36 UTC.
        assert_eq!(
            DateTime::<Utc>::parse_from_iso8601("20150830T123600-0700").unwrap(),
            utc(2015, 8, 30, 19, 36, 0)
        );
        assert_eq!(
            DateTime::<Utc>::parse_from_iso8601("20150830T123600+0130").unwrap(),
            utc(2015, 8, 30, 11, 6, 0)
        );
    }

    #[test_log::test]
    fn parse_invalid() {
        for s in ["", "zzzzzzzzz", "20150830", "20150830T123600", "20150230T123600Z", "20151330T123600Z", "20150830T246000Z"]
        {
            assert!(DateTime::<Utc>::parse_from_iso8601(s).is_err(), "{} should not parse", s);
        }
    }
}
