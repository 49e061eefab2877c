use crate::dictionary::CodeDictionary;
use crate::{NormalizedPolicy, RawPolicyRecord, POLICY_FIELDS};

/// Translate every field of the fixed list, in column order. Fields outside the list are dropped.
pub fn normalize(record: &RawPolicyRecord, dictionary: &CodeDictionary) -> NormalizedPolicy {
    let values = POLICY_FIELDS
        .iter()
        .map(|field| dictionary.translate(field.key, record.get(field.key)))
        .collect();
    NormalizedPolicy::from_values(values)
}
