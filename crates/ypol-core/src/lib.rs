//! Core domain model for youth-policy ingestion: field list, raw and normalized records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

pub mod dictionary;
pub mod eligibility;
pub mod normalize;

pub use dictionary::{codes, CodeDictionary, GeoTable};
pub use eligibility::{is_live, is_sweep_candidate, liveness, parse_ymd, Rejection};
pub use normalize::normalize;

pub const CRATE_NAME: &str = "ypol-core";

/// Source key of the policy name, the natural key of a stored policy.
pub const NAME_FIELD: &str = "plcyNm";

/// Source key of the inquiry counter, persisted as an integer column.
pub const INQUIRY_COUNT_FIELD: &str = "inqCnt";

/// One persisted policy attribute: upstream JSON key and store column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyField {
    pub key: &'static str,
    pub column: &'static str,
}

const fn field(key: &'static str, column: &'static str) -> PolicyField {
    PolicyField { key, column }
}

/// Fixed, ordered field list. The order is also the column order of the `policies` table.
pub const POLICY_FIELDS: &[PolicyField] = &[
    field("plcyAprvSttsCd", "aprv_stts_cd"),
    field("aplyPrdSeCd", "aply_prd_se_cd"),
    field("aplyYmd", "aply_ymd"),
    field("bizPrdSeCd", "biz_prd_se_cd"),
    field("bizPrdBgngYmd", "biz_prd_bgng_ymd"),
    field("bizPrdEndYmd", "biz_prd_end_ymd"),
    field("bizPrdEtcCn", "biz_prd_etc_cn"),
    field("zipCd", "zip_cd"),
    field("sprtTrgtMinAge", "sprt_trgt_min_age"),
    field("sprtTrgtMaxAge", "sprt_trgt_max_age"),
    field("sprtTrgtAgeLmtYn", "sprt_trgt_age_lmt_yn"),
    field("mrgSttsCd", "mrg_stts_cd"),
    field("earnCndSeCd", "earn_cnd_se_cd"),
    field("earnMinAmt", "earn_min_amt"),
    field("earnMaxAmt", "earn_max_amt"),
    field("earnEtcCn", "earn_etc_cn"),
    field("schoolCd", "school_cd"),
    field("jobCd", "job_cd"),
    field("plcyMajorCd", "plcy_major_cd"),
    field("sbizCd", "sbiz_cd"),
    field("plcyPvsnMthdCd", "plcy_pvsn_mthd_cd"),
    field(NAME_FIELD, "plcy_nm"),
    field("lclsfNm", "lclsf_nm"),
    field("mclsfNm", "mclsf_nm"),
    field("plcyKywdNm", "plcy_kywd_nm"),
    field("plcyExplnCn", "plcy_expln_cn"),
    field("plcySprtCn", "plcy_sprt_cn"),
    field("sprtSclLmtYn", "sprt_scl_lmt_yn"),
    field("plcyAplyMthdCn", "plcy_aply_mthd_cn"),
    field("srngMthdCn", "srng_mthd_cn"),
    field("aplyUrlAddr", "aply_url_addr"),
    field("sbmsnDcmntCn", "sbmsn_dcmnt_cn"),
    field("etcMttrCn", "etc_mttr_cn"),
    field("refUrlAddr1", "ref_url_addr1"),
    field("refUrlAddr2", "ref_url_addr2"),
    field("sprtSclCnt", "sprt_scl_cnt"),
    field("addAplyQlfcCndCn", "add_aply_qlfc_cnd_cn"),
    field("ptcpPrpTrgtCn", "ptcp_prp_trgt_cn"),
    field(INQUIRY_COUNT_FIELD, "inq_cnt"),
];

/// One item of an upstream page, as a flat key → string mapping.
///
/// Non-string JSON scalars are stringified on the way in and `null` is dropped, so every
/// downstream stage only deals with text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "Map<String, JsonValue>")]
pub struct RawPolicyRecord {
    fields: BTreeMap<String, String>,
}

impl RawPolicyRecord {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Field value, or `""` when absent.
    pub fn get(&self, key: &str) -> &str {
        self.fields.get(key).map(String::as_str).unwrap_or_default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn name(&self) -> &str {
        self.get(NAME_FIELD)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Map<String, JsonValue>> for RawPolicyRecord {
    fn from(map: Map<String, JsonValue>) -> Self {
        let fields = map
            .into_iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    JsonValue::Null => return None,
                    JsonValue::String(s) => s,
                    JsonValue::Bool(b) => b.to_string(),
                    JsonValue::Number(n) => n.to_string(),
                    other => other.to_string(),
                };
                Some((key, text))
            })
            .collect();
        Self { fields }
    }
}

/// A record with every field of [`POLICY_FIELDS`] translated to display form.
///
/// `values[i]` belongs to `POLICY_FIELDS[i]`; empty strings mean "no value".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedPolicy {
    values: Vec<String>,
}

impl NormalizedPolicy {
    pub(crate) fn from_values(values: Vec<String>) -> Self {
        debug_assert_eq!(values.len(), POLICY_FIELDS.len());
        Self { values }
    }

    pub fn get(&self, key: &str) -> &str {
        POLICY_FIELDS
            .iter()
            .position(|f| f.key == key)
            .and_then(|idx| self.values.get(idx))
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.get(NAME_FIELD)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Field/value pairs in persistence column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static PolicyField, &str)> + '_ {
        POLICY_FIELDS
            .iter()
            .zip(self.values.iter().map(String::as_str))
    }
}

/// Row counts removed by one lifecycle sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub deleted_comments: u64,
    pub deleted_ratings: u64,
    pub deleted_policies: u64,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.deleted_comments == 0 && self.deleted_ratings == 0 && self.deleted_policies == 0
    }
}

/// Outcome of persisting one ingestion run's eligible records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertReport {
    pub attempted: usize,
    pub upserted: usize,
    pub failed: usize,
}
