//! Code → display-label translation tables.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Upstream code values the pipeline branches on, plus their display labels.
pub mod codes {
    pub const APPROVED: &str = "0044002";
    pub const APPLY_WINDOW: &str = "0057001";
    pub const APPLY_CLOSED: &str = "0057003";
    pub const BUSINESS_WINDOW: &str = "0056001";

    pub const WINDOW_LABEL: &str = "특정기간";
    pub const CLOSED_LABEL: &str = "마감";
}

/// Field carrying comma-separated region codes, resolved through [`GeoTable`].
pub const GEO_FIELD: &str = "zipCd";

/// Coded fields that may hold several comma-separated codes.
pub const MULTI_VALUED_FIELDS: &[&str] = &[
    "schoolCd",
    "plcyMajorCd",
    "jobCd",
    "sbizCd",
    "mrgSttsCd",
    "earnCndSeCd",
    "plcyPvsnMthdCd",
];

const BUILTIN_TABLES: &[(&str, &[(&str, &str)])] = &[
    (
        "plcyPvsnMthdCd",
        &[
            ("0042001", "인프라 구축"),
            ("0042002", "프로그램"),
            ("0042003", "직접대출"),
            ("0042004", "공공기관"),
            ("0042005", "계약(위탁운영)"),
            ("0042006", "보조금"),
            ("0042007", "대출보증"),
            ("0042008", "공적보험"),
            ("0042009", "조세지출"),
            ("0042010", "바우처"),
            ("0042011", "정보제공"),
            ("0042012", "경제적 규제"),
            ("0042013", "기타"),
        ],
    ),
    (
        "plcyAprvSttsCd",
        &[
            ("0044001", "신청"),
            (codes::APPROVED, "승인"),
            ("0044003", "반려"),
            ("0044004", "임시저장"),
        ],
    ),
    (
        "aplyPrdSeCd",
        &[
            (codes::APPLY_WINDOW, codes::WINDOW_LABEL),
            ("0057002", "상시"),
            (codes::APPLY_CLOSED, codes::CLOSED_LABEL),
        ],
    ),
    (
        "bizPrdSeCd",
        &[(codes::BUSINESS_WINDOW, codes::WINDOW_LABEL), ("0056002", "기타")],
    ),
    (
        "mrgSttsCd",
        &[("0055001", "기혼"), ("0055002", "미혼"), ("0055003", "제한없음")],
    ),
    (
        "earnCndSeCd",
        &[("0043001", "무관"), ("0043002", "연소득"), ("0043003", "기타")],
    ),
    (
        "plcyMajorCd",
        &[
            ("0011001", "인문계열"),
            ("0011002", "사회계열"),
            ("0011003", "상경계열"),
            ("0011004", "이학계역"),
            ("0011005", "공학계열"),
            ("0011006", "예체능계열"),
            ("0011007", "농산업계열"),
            ("0011008", "기타"),
            ("0011009", "제한없음"),
        ],
    ),
    (
        "jobCd",
        &[
            ("0013001", "재직자"),
            ("0013002", "자영업자"),
            ("0013003", "미취업자"),
            ("0013004", "프리랜서"),
            ("0013005", "일용근로자"),
            ("0013006", "(예비)창업자"),
            ("0013007", "단기근로자"),
            ("0013008", "영농종사자"),
            ("0013009", "기타"),
            ("0013010", "제한없음"),
        ],
    ),
    (
        "schoolCd",
        &[
            ("0049001", "고졸 미만"),
            ("0049002", "고교 재학"),
            ("0049003", "고졸 예정"),
            ("0049004", "고교 졸업"),
            ("0049005", "대학 재학"),
            ("0049006", "대졸 예정"),
            ("0049007", "대학 졸업"),
            ("0049008", "석·박사"),
            ("0049009", "기타"),
            ("0049010", "제한없음"),
        ],
    ),
    (
        "sbizCd",
        &[
            ("0014001", "중소기업"),
            ("0014002", "여성"),
            ("0014003", "기초생활수급자"),
            ("0014004", "한부모가정"),
            ("0014005", "장애인"),
            ("0014006", "농업인"),
            ("0014007", "군인"),
            ("0014008", "지역인재"),
            ("0014009", "기타"),
            ("0014010", "제한없음"),
        ],
    ),
];

/// Region code → "province district" table parsed from the legal district code file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoTable {
    entries: HashMap<String, String>,
}

impl GeoTable {
    /// Parse tab-delimited `code\tprovince\tdistrict` rows; the first line is a header.
    ///
    /// Blank lines and rows with fewer than three columns are skipped.
    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        for line in text.lines().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split('\t').map(str::trim).collect();
            if parts.len() < 3 {
                continue;
            }
            let district = respace_district(parts[2]);
            entries.insert(parts[0].to_string(), format!("{} {}", parts[1], district));
        }
        Self { entries }
    }

    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, code: &str) -> Option<&str> {
        self.entries.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `<hangul>시<hangul>구`, split at the last 시 that leaves a syllable before the 구.
static CITY_DISTRICT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([가-힣]+시)([가-힣]+구)$").expect("static pattern"));

/// `수원시장안구` → `수원시 장안구`. Anything not shaped `<hangul>시<hangul>구` is returned as-is.
fn respace_district(district: &str) -> String {
    CITY_DISTRICT.replace(district, "$1 $2").into_owned()
}

/// Immutable per-run translation state: the inline code tables plus the region table.
#[derive(Debug, Clone)]
pub struct CodeDictionary {
    tables: HashMap<String, HashMap<String, String>>,
    geo: GeoTable,
}

impl CodeDictionary {
    /// Built-in code tables combined with a loaded region table.
    pub fn new(geo: GeoTable) -> Self {
        let tables = BUILTIN_TABLES
            .iter()
            .map(|(field, entries)| {
                let table = entries
                    .iter()
                    .map(|(code, label)| (code.to_string(), label.to_string()))
                    .collect();
                (field.to_string(), table)
            })
            .collect();
        Self { tables, geo }
    }

    /// Translate one raw field value into its display form. Never fails: unknown codes
    /// come back unchanged and empty input stays empty.
    pub fn translate(&self, field: &str, raw: &str) -> String {
        if raw.is_empty() {
            return String::new();
        }

        if field == GEO_FIELD {
            return join_translated(raw, |code| self.geo.get(code));
        }

        let table = self.tables.get(field);
        if MULTI_VALUED_FIELDS.contains(&field) {
            return join_translated(raw, |code| {
                table.and_then(|t| t.get(code)).map(String::as_str)
            });
        }

        match table.and_then(|t| t.get(raw)) {
            Some(label) => label.clone(),
            None => raw.to_string(),
        }
    }
}

fn join_translated<'a>(raw: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    raw.split(',')
        .map(str::trim)
        .map(|code| lookup(code).unwrap_or(code))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dictionary() -> CodeDictionary {
        CodeDictionary::new(GeoTable::from_entries([
            ("11110", "서울특별시 종로구"),
            ("41111", "경기도 수원시 장안구"),
        ]))
    }

    #[test]
    fn known_codes_map_to_labels_and_unknown_codes_pass_through() {
        let dict = dictionary();
        for (field, entries) in BUILTIN_TABLES {
            for (code, label) in *entries {
                assert_eq!(dict.translate(field, code), *label, "{field}/{code}");
            }
            assert_eq!(dict.translate(field, "9999999"), "9999999");
        }
        assert_eq!(dict.translate("plcyNm", "청년 주거 지원"), "청년 주거 지원");
    }

    #[test]
    fn empty_input_translates_to_empty() {
        let dict = dictionary();
        for field in ["zipCd", "schoolCd", "aplyPrdSeCd", "plcyNm"] {
            assert_eq!(dict.translate(field, ""), "");
        }
    }

    #[test]
    fn multi_valued_fields_translate_each_token() {
        let dict = dictionary();
        let joined = dict.translate("jobCd", "0013001,0013003");
        let parts = [
            dict.translate("jobCd", "0013001"),
            dict.translate("jobCd", "0013003"),
        ];
        assert_eq!(joined, parts.join(", "));
        assert_eq!(joined, "재직자, 미취업자");
        assert_eq!(dict.translate("schoolCd", "0049010, 1234567"), "제한없음, 1234567");
    }

    #[test]
    fn single_valued_fields_do_not_split() {
        let dict = dictionary();
        assert_eq!(dict.translate("aplyPrdSeCd", "0057001,0057002"), "0057001,0057002");
    }

    #[test]
    fn geo_codes_resolve_through_region_table() {
        let dict = dictionary();
        assert_eq!(
            dict.translate("zipCd", "11110, 41111,99999"),
            "서울특별시 종로구, 경기도 수원시 장안구, 99999"
        );
    }

    #[test]
    fn geo_table_parses_rows_and_respaces_city_districts() {
        let text = "code\tprovince\tdistrict\n\
                    11110\t서울특별시\t종로구\n\
                    \n\
                    41111\t경기도\t수원시장안구\n\
                    broken-row\n\
                    36110\t세종특별자치시\t세종시\n";
        let table = GeoTable::parse(text);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get("11110"), Some("서울특별시 종로구"));
        assert_eq!(table.get("41111"), Some("경기도 수원시 장안구"));
        assert_eq!(table.get("36110"), Some("세종특별자치시 세종시"));
        assert_eq!(table.get("code"), None);
    }

    #[test]
    fn respacing_only_touches_city_district_shapes() {
        assert_eq!(respace_district("고양시일산동구"), "고양시 일산동구");
        assert_eq!(respace_district("종로구"), "종로구");
        assert_eq!(respace_district("시흥시"), "시흥시");
        assert_eq!(respace_district("Suwon시장안구"), "Suwon시장안구");
    }
}
