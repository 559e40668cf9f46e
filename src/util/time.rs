//! 公開日時のパースと時間減衰の計算。
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

/// 減衰の傾き（1日あたり）。
pub const DECAY_RATE_PER_DAY: f64 = 0.1;
/// 古い記事にも残す減衰係数の下限。
pub const DECAY_FLOOR: f64 = 0.1;

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

/// 記事の公開日時文字列を UTC の `DateTime` に変換する。
///
/// RFC 3339、オフセット付き／なしの `YYYY-MM-DD HH:MM:SS`、日付のみの形式を受け付ける。
/// オフセットのない値は UTC とみなす。
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc())
}

/// 経過日数（切り捨て）。未来日付の記事は 0 日として扱う。
#[must_use]
pub fn age_in_days(now: DateTime<Utc>, published_at: DateTime<Utc>) -> i64 {
    (now - published_at).num_days().max(0)
}

/// `max(0.1, 1 / (1 + 0.1 * age_in_days))`
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn time_decay(now: DateTime<Utc>, published_at: DateTime<Utc>) -> f64 {
    let days = age_in_days(now, published_at) as f64;
    (1.0 / (1.0 + DECAY_RATE_PER_DAY * days)).max(DECAY_FLOOR)
}

/// `published_at` が `now` から `window` 以内かどうか。
#[must_use]
pub fn is_within(now: DateTime<Utc>, published_at: DateTime<Utc>, window: TimeDelta) -> bool {
    now - published_at <= window
}
