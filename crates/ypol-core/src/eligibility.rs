//! Liveness rules: which fetched records are stored, which stored rows are swept.

use chrono::NaiveDate;

use crate::dictionary::codes;
use crate::RawPolicyRecord;

/// Why a record was judged not live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    NotApproved,
    ApplicationClosed,
    OutsideApplicationWindow,
    OutsideBusinessWindow,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotApproved => "not_approved",
            Self::ApplicationClosed => "application_closed",
            Self::OutsideApplicationWindow => "outside_application_window",
            Self::OutsideBusinessWindow => "outside_business_window",
        }
    }
}

/// Strict `YYYYMMDD`: exactly eight ASCII digits forming a real calendar date.
pub fn parse_ymd(text: &str) -> Option<NaiveDate> {
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = text[0..4].parse().ok()?;
    let month = text[4..6].parse().ok()?;
    let day = text[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Inclusive range check; a missing bound is open-ended.
pub fn date_in_range(start: Option<NaiveDate>, end: Option<NaiveDate>, today: NaiveDate) -> bool {
    start.map_or(true, |s| s <= today) && end.map_or(true, |e| today <= e)
}

pub fn is_live(record: &RawPolicyRecord, today: NaiveDate) -> bool {
    liveness(record, today).is_ok()
}

/// Evaluate the approval, closure, application-window and business-window predicates.
pub fn liveness(record: &RawPolicyRecord, today: NaiveDate) -> Result<(), Rejection> {
    if record.get("plcyAprvSttsCd") != codes::APPROVED {
        return Err(Rejection::NotApproved);
    }

    let apply_period = record.get("aplyPrdSeCd");
    if apply_period == codes::APPLY_CLOSED {
        return Err(Rejection::ApplicationClosed);
    }

    // Without a `~` the window is not checked at all and the record stays live.
    let apply_ymd = record.get("aplyYmd");
    if apply_period == codes::APPLY_WINDOW && apply_ymd.contains('~') {
        let mut sides = apply_ymd.split('~').map(|s| s.trim().replace('.', ""));
        let start = sides.next().as_deref().and_then(parse_ymd);
        let end = sides.next().as_deref().and_then(parse_ymd);
        if !date_in_range(start, end, today) {
            return Err(Rejection::OutsideApplicationWindow);
        }
    }

    let biz_start = record.get("bizPrdBgngYmd");
    let biz_end = record.get("bizPrdEndYmd");
    if record.get("bizPrdSeCd") == codes::BUSINESS_WINDOW
        && !biz_start.is_empty()
        && !biz_end.is_empty()
        && !date_in_range(parse_ymd(biz_start), parse_ymd(biz_end), today)
    {
        return Err(Rejection::OutsideBusinessWindow);
    }

    Ok(())
}

/// Whether a stored row should be removed by the lifecycle sweep.
///
/// Works on stored display values; both the translated labels and the raw codes are
/// recognized because rows may predate a dictionary change.
pub fn is_sweep_candidate(apply_period: Option<&str>, apply_ymd: Option<&str>, today: NaiveDate) -> bool {
    let apply_period = apply_period.unwrap_or_default();
    if apply_period == codes::CLOSED_LABEL || apply_period == codes::APPLY_CLOSED {
        return true;
    }
    if apply_period != codes::WINDOW_LABEL && apply_period != codes::APPLY_WINDOW {
        return false;
    }
    let Some(apply_ymd) = apply_ymd.filter(|s| !s.is_empty()) else {
        return false;
    };
    let tail = apply_ymd.rsplit('~').next().unwrap_or(apply_ymd);
    let digits: String = tail.chars().filter(char::is_ascii_digit).collect();
    parse_ymd(&digits).is_some_and(|end| end < today)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn approved(extra: &[(&str, &str)]) -> RawPolicyRecord {
        let mut record = RawPolicyRecord::from_pairs([
            ("plcyNm", "청년 도약 계좌"),
            ("plcyAprvSttsCd", codes::APPROVED),
        ]);
        for (k, v) in extra {
            record.set(*k, *v);
        }
        record
    }

    #[test]
    fn parse_ymd_is_strict() {
        assert_eq!(parse_ymd("20240229"), Some(ymd(2024, 2, 29)));
        assert_eq!(parse_ymd("2024-02-29"), None);
        assert_eq!(parse_ymd("2024022"), None);
        assert_eq!(parse_ymd("20230229"), None);
        assert_eq!(parse_ymd("２０２４０１０１"), None);
        assert_eq!(parse_ymd(""), None);
    }

    #[test]
    fn unapproved_records_are_never_live() {
        let mut record = approved(&[("aplyPrdSeCd", "0057002")]);
        record.set("plcyAprvSttsCd", "0044001");
        assert_eq!(liveness(&record, ymd(2020, 6, 15)), Err(Rejection::NotApproved));
        record.set("plcyAprvSttsCd", "");
        assert!(!is_live(&record, ymd(2020, 6, 15)));
    }

    #[test]
    fn closed_application_period_is_never_live() {
        let record = approved(&[
            ("aplyPrdSeCd", codes::APPLY_CLOSED),
            ("aplyYmd", "20200101 ~ 20991231"),
        ]);
        assert_eq!(liveness(&record, ymd(2020, 6, 15)), Err(Rejection::ApplicationClosed));
    }

    #[test]
    fn application_window_bounds_are_inclusive() {
        let record = approved(&[
            ("aplyPrdSeCd", codes::APPLY_WINDOW),
            ("aplyYmd", "20200101~20201231"),
        ]);
        assert!(is_live(&record, ymd(2020, 6, 15)));
        assert!(is_live(&record, ymd(2020, 1, 1)));
        assert!(is_live(&record, ymd(2020, 12, 31)));
        assert!(!is_live(&record, ymd(2021, 1, 1)));
        assert_eq!(
            liveness(&record, ymd(2019, 12, 31)),
            Err(Rejection::OutsideApplicationWindow)
        );
    }

    #[test]
    fn application_window_accepts_dotted_dates_and_open_sides() {
        let dotted = approved(&[
            ("aplyPrdSeCd", codes::APPLY_WINDOW),
            ("aplyYmd", "2020.01.01 ~ 2020.12.31"),
        ]);
        assert!(is_live(&dotted, ymd(2020, 6, 15)));
        assert!(!is_live(&dotted, ymd(2021, 6, 15)));

        let open_start = approved(&[("aplyPrdSeCd", codes::APPLY_WINDOW), ("aplyYmd", " ~ 20201231")]);
        assert!(is_live(&open_start, ymd(1999, 1, 1)));
        assert!(!is_live(&open_start, ymd(2021, 1, 1)));

        let garbage_end = approved(&[("aplyPrdSeCd", codes::APPLY_WINDOW), ("aplyYmd", "20200101~추후 공지")]);
        assert!(is_live(&garbage_end, ymd(2030, 1, 1)));
        assert!(!is_live(&garbage_end, ymd(2019, 1, 1)));
    }

    #[test]
    fn application_window_without_separator_is_not_checked() {
        let record = approved(&[("aplyPrdSeCd", codes::APPLY_WINDOW), ("aplyYmd", "20200101")]);
        assert!(is_live(&record, ymd(2030, 1, 1)));
    }

    #[test]
    fn business_window_needs_both_dates() {
        let record = approved(&[
            ("bizPrdSeCd", codes::BUSINESS_WINDOW),
            ("bizPrdBgngYmd", "20200101"),
            ("bizPrdEndYmd", "20200601"),
        ]);
        assert!(!is_live(&record, ymd(2020, 7, 1)));
        assert!(is_live(&record, ymd(2020, 3, 1)));

        let only_start = approved(&[("bizPrdSeCd", codes::BUSINESS_WINDOW), ("bizPrdBgngYmd", "20200101")]);
        assert!(is_live(&only_start, ymd(2010, 1, 1)));

        let other_kind = approved(&[
            ("bizPrdSeCd", "0056002"),
            ("bizPrdBgngYmd", "20200101"),
            ("bizPrdEndYmd", "20200601"),
        ]);
        assert!(is_live(&other_kind, ymd(2020, 7, 1)));
    }

    #[test]
    fn malformed_business_dates_relax_that_bound() {
        let record = approved(&[
            ("bizPrdSeCd", codes::BUSINESS_WINDOW),
            ("bizPrdBgngYmd", "2020-01-01"),
            ("bizPrdEndYmd", "20200601"),
        ]);
        assert!(is_live(&record, ymd(2001, 1, 1)));
        assert_eq!(
            liveness(&record, ymd(2020, 7, 1)),
            Err(Rejection::OutsideBusinessWindow)
        );
    }

    #[test]
    fn sweep_candidates_match_labels_and_codes() {
        let today = ymd(2024, 5, 1);
        assert!(is_sweep_candidate(Some("마감"), None, today));
        assert!(is_sweep_candidate(Some("0057003"), Some(""), today));
        assert!(is_sweep_candidate(Some("특정기간"), Some("20240101 ~ 20240430"), today));
        assert!(is_sweep_candidate(Some("0057001"), Some("2024.01.01 ~ 2024.04.30"), today));
        assert!(!is_sweep_candidate(Some("특정기간"), Some("20240101 ~ 20240501"), today));
        assert!(!is_sweep_candidate(Some("특정기간"), Some(""), today));
        assert!(!is_sweep_candidate(Some("특정기간"), None, today));
        assert!(!is_sweep_candidate(Some("특정기간"), Some("20240101 ~ 상시"), today));
        assert!(!is_sweep_candidate(Some("상시"), Some("20200101 ~ 20200102"), today));
        assert!(!is_sweep_candidate(None, None, today));
    }

    #[test]
    fn sweep_candidate_without_separator_uses_whole_value() {
        let today = ymd(2024, 5, 1);
        assert!(is_sweep_candidate(Some("특정기간"), Some("20240430"), today));
        assert!(!is_sweep_candidate(Some("특정기간"), Some("20240502"), today));
    }
}
