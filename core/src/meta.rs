use chrono::{DateTime, SecondsFormat, Utc};

/// Decoded archive metadata. A date that failed to parse is `None`; decoding
/// never errors (the retention policy decides what invalid dates mean).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMeta {
    /// Site identifier. May contain spaces.
    pub site_id: String,
    /// When the archive was created, if parseable.
    pub created_at: Option<DateTime<Utc>>,
    /// When the archive expires, if parseable.
    pub expiry: Option<DateTime<Utc>>,
}

/// Encode the metadata triple into the single free-text string the store keeps
/// per archive: `<site-id> <created-at> <expiry>`, space-separated, timestamps
/// rendered as RFC 3339 with millisecond precision.
///
/// The two dates go last on purpose: the site id may itself contain spaces, so
/// the decoder locates the dates by position from the end.
pub fn encode(site_id: &str, created_at: DateTime<Utc>, expiry: DateTime<Utc>) -> String {
    format!(
        "{} {} {}",
        site_id,
        created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        expiry.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// Decode a metadata string: the last token is the expiry, the second-to-last
/// the creation date, everything before them is the site id. The two trailing
/// positions are consumed whether or not they parse as dates.
pub fn decode(raw: &str) -> ArchiveMeta {
    let mut tokens: Vec<&str> = raw.split(' ').collect();
    let expiry = tokens.pop().and_then(parse_ts);
    let created_at = tokens.pop().and_then(parse_ts);
    ArchiveMeta {
        site_id: tokens.join(" "),
        created_at,
        expiry,
    }
}

fn parse_ts(tok: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(tok)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn round_trips_simple_site_id() {
        let created = ts("2024-03-01T12:00:00.250Z");
        let expiry = ts("2024-03-08T12:00:00.250Z");
        let meta = decode(&encode("homeserver", created, expiry));
        assert_eq!(meta.site_id, "homeserver");
        assert_eq!(meta.created_at, Some(created));
        assert_eq!(meta.expiry, Some(expiry));
    }

    #[test]
    fn round_trips_site_id_with_spaces() {
        let created = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let expiry = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let meta = decode(&encode("office file server", created, expiry));
        assert_eq!(meta.site_id, "office file server");
        assert_eq!(meta.created_at, Some(created));
        assert_eq!(meta.expiry, Some(expiry));
    }

    #[test]
    fn unparsable_dates_decode_to_none() {
        let meta = decode("site not-a-date also-not-a-date");
        assert_eq!(meta.site_id, "site");
        assert_eq!(meta.created_at, None);
        assert_eq!(meta.expiry, None);
    }

    #[test]
    fn one_bad_date_leaves_the_other_intact() {
        let meta = decode("site garbage 2024-03-08T12:00:00Z");
        assert_eq!(meta.created_at, None);
        assert_eq!(meta.expiry, Some(ts("2024-03-08T12:00:00Z")));
    }

    #[test]
    fn too_few_tokens_yields_empty_site_and_invalid_dates() {
        let meta = decode("2024-03-08T12:00:00Z");
        assert_eq!(meta.site_id, "");
        assert_eq!(meta.created_at, None);
        assert_eq!(meta.expiry, Some(ts("2024-03-08T12:00:00Z")));
    }
}
