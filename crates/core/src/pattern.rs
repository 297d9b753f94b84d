//! Storage path templates.
//!
//! A profile's `path_pattern` property is a relative path with placeholders
//! that are expanded at write time:
//!
//! | Placeholder | Value                     |
//! |-------------|---------------------------|
//! | `$DOMAIN`   | tenant (domain) id        |
//! | `$Y`        | year                      |
//! | `$M`        | month, 1-12               |
//! | `$D`        | day of month, 1-31        |
//! | `$H`        | hour, 0-23                |
//! | `$m`        | minute, 0-59              |
//!
//! Numbers are not zero padded. Any other `$` sequence is copied verbatim.

use time::OffsetDateTime;

/// Placeholders in match order. `$DOMAIN` must be tried before `$D`.
const PLACEHOLDERS: [&str; 6] = ["$DOMAIN", "$Y", "$M", "$D", "$H", "$m"];

/// Expand `pattern` for `domain_id` using the clock value `now`.
pub fn expand(pattern: &str, domain_id: i64, now: OffsetDateTime) -> String {
    let mut out = String::with_capacity(pattern.len() + 16);
    let mut rest = pattern;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        match PLACEHOLDERS.iter().find(|p| tail.starts_with(**p)) {
            Some(placeholder) => {
                let value = match *placeholder {
                    "$DOMAIN" => domain_id.to_string(),
                    "$Y" => now.year().to_string(),
                    "$M" => u8::from(now.month()).to_string(),
                    "$D" => now.day().to_string(),
                    "$H" => now.hour().to_string(),
                    _ => now.minute().to_string(),
                };
                out.push_str(&value);
                rest = &tail[placeholder.len()..];
            }
            None => {
                out.push('$');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn expands_all_placeholders_unpadded() {
        let now = datetime!(2024-03-07 04:05:00 UTC);
        assert_eq!(
            expand("$DOMAIN/$Y/$M/$D/$H/$m", 42, now),
            "42/2024/3/7/4/5"
        );
    }

    #[test]
    fn domain_wins_over_day() {
        let now = datetime!(2024-12-25 23:59:00 UTC);
        assert_eq!(expand("$DOMAIN-$D", 7, now), "7-25");
    }

    #[test]
    fn unknown_sequences_are_kept() {
        let now = datetime!(2024-01-01 00:00:00 UTC);
        assert_eq!(expand("a/$X/$/$Y", 1, now), "a/$X/$/2024");
        assert_eq!(expand("trailing$", 1, now), "trailing$");
    }

    #[test]
    fn plain_pattern_is_untouched() {
        let now = datetime!(2024-01-01 00:00:00 UTC);
        assert_eq!(expand("records/static", 1, now), "records/static");
    }
}
