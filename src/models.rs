//! Resources returned by the Toastate API.
//!
//! Field names follow the remote JSON; empty values are left out when
//! serialising, and missing ones default when deserialising.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero_i64(value: &i64) -> bool {
    *value == 0
}

fn is_zero_f64(value: &f64) -> bool {
    *value == 0.0
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toaster {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub owner_id: String,

    #[serde(rename = "cryptographically_secure", skip_serializing_if = "is_false")]
    pub crypto_secure: bool,

    #[serde(rename = "build_command", skip_serializing_if = "Vec::is_empty")]
    pub build_cmd: Vec<String>,
    #[serde(rename = "execution_command", skip_serializing_if = "Vec::is_empty")]
    pub exe_cmd: Vec<String>,
    #[serde(rename = "environment_variables", skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,

    #[serde(rename = "joinable_for_seconds", skip_serializing_if = "is_zero_i64")]
    pub joinable_for_secs: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub max_concurrent_joiners: i64,
    #[serde(rename = "timeout_seconds", skip_serializing_if = "is_zero_i64")]
    pub timeout_secs: i64,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub readme: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(skip_serializing_if = "is_zero_i64")]
    pub version: i64,
}

/// Aggregated usage of one toaster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToasterStats {
    /// Milliseconds.
    #[serde(rename = "durationms", skip_serializing_if = "is_zero_i64")]
    pub aggregated_duration_ms: i64,
    #[serde(rename = "cpus", skip_serializing_if = "is_zero_i64")]
    pub cpu_seconds: i64,
    /// Gigabyte-seconds.
    #[serde(rename = "ramgbs", skip_serializing_if = "is_zero_f64")]
    pub ram_gb_seconds: f64,
    /// Bytes.
    #[serde(rename = "ingress", skip_serializing_if = "is_zero_f64")]
    pub net_ingress: f64,
    /// Bytes.
    #[serde(rename = "egress", skip_serializing_if = "is_zero_f64")]
    pub net_egress: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomDomain {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub root_domain: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    pub enabled: bool,
    pub ssl: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ssl_error: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub verification_token: String,
    /// Subdomain to toaster ID.
    #[serde(rename = "linked_toasters", skip_serializing_if = "BTreeMap::is_empty")]
    pub linked_toasters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(skip_serializing_if = "is_false")]
    pub active_billing: bool,
}

/// Byte fields travel as standard base64 strings.
pub(crate) mod base64_bytes {
    use data_encoding::BASE64;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        BASE64.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }

    /// Same encoding for a list of byte strings.
    pub mod list {
        use super::*;
        use serde::ser::SerializeSeq;

        pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(items.len()))?;
            for item in items {
                seq.serialize_element(&BASE64.encode(item))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<Vec<u8>>, D::Error> {
            Option::<Vec<String>>::deserialize(deserializer)?
                .unwrap_or_default()
                .iter()
                .map(|s| BASE64.decode(s.as_bytes()).map_err(D::Error::custom))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn toaster_uses_remote_field_names_and_omits_empty() {
        let toaster = Toaster {
            id: "t1".into(),
            build_cmd: vec!["pip".into(), "install".into()],
            exe_cmd: vec!["python".into(), "main.py".into()],
            joinable_for_secs: 30,
            ..Toaster::default()
        };
        let value = serde_json::to_value(&toaster).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "t1",
                "build_command": ["pip", "install"],
                "execution_command": ["python", "main.py"],
                "joinable_for_seconds": 30
            })
        );
    }

    #[test]
    fn custom_domain_always_sends_flags() {
        let value = serde_json::to_value(CustomDomain::default()).unwrap();
        assert_eq!(value, json!({"enabled": false, "ssl": false}));
    }

    #[test]
    fn stats_decode_from_short_names() {
        let stats: ToasterStats =
            serde_json::from_value(json!({"durationms": 1500, "cpus": 2, "egress": 10.5}))
                .unwrap();
        assert_eq!(stats.aggregated_duration_ms, 1500);
        assert_eq!(stats.cpu_seconds, 2);
        assert_eq!(stats.net_egress, 10.5);
        assert_eq!(stats.ram_gb_seconds, 0.0);
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Blob {
        #[serde(default, with = "base64_bytes")]
        data: Vec<u8>,
        #[serde(default, with = "base64_bytes::list")]
        many: Vec<Vec<u8>>,
    }

    #[test]
    fn byte_fields_are_base64() {
        let blob = Blob {
            data: b"hello".to_vec(),
            many: vec![b"a".to_vec(), vec![0xff, 0x00]],
        };
        let value = serde_json::to_value(&blob).unwrap();
        assert_eq!(value, json!({"data": "aGVsbG8=", "many": ["YQ==", "/wA="]}));

        let null: Blob = serde_json::from_value(json!({"data": null})).unwrap();
        assert!(null.data.is_empty() && null.many.is_empty());
    }
}
