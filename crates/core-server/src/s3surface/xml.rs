//! S3-flavored XML error and listing bodies.

use quick_xml::se::to_string;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename = "Error")]
pub struct S3Error {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

impl S3Error {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }

    pub fn to_xml(&self) -> String {
        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", to_string(self).unwrap_or_default())
    }
}

#[derive(Debug, Serialize)]
pub struct Contents {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "LastModified")]
    pub last_modified: String,
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "Size")]
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct CommonPrefix {
    #[serde(rename = "Prefix")]
    pub prefix: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "ListBucketResult")]
pub struct ListBucketResult {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Prefix")]
    pub prefix: String,
    #[serde(rename = "KeyCount")]
    pub key_count: usize,
    #[serde(rename = "MaxKeys")]
    pub max_keys: usize,
    #[serde(rename = "IsTruncated")]
    pub is_truncated: bool,
    #[serde(rename = "Contents", default)]
    pub contents: Vec<Contents>,
    #[serde(rename = "CommonPrefixes", default)]
    pub common_prefixes: Vec<CommonPrefix>,
}

impl ListBucketResult {
    pub fn to_xml(&self) -> String {
        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", to_string(self).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_xml_includes_code_and_message() {
        let xml = S3Error::new("NoSuchKey", "The specified key does not exist.").to_xml();
        assert!(xml.contains("NoSuchKey"));
        assert!(xml.contains("The specified key does not exist."));
    }

    #[test]
    fn list_result_serializes_contents_and_prefixes() {
        let result = ListBucketResult {
            name: "my-bucket".into(),
            prefix: "".into(),
            key_count: 1,
            max_keys: 1000,
            is_truncated: false,
            contents: vec![Contents {
                key: "a/b.csv".into(),
                last_modified: "2026-01-01T00:00:00.000Z".into(),
                etag: "\"abc\"".into(),
                size: 10,
            }],
            common_prefixes: vec![CommonPrefix { prefix: "a/".into() }],
        };
        let xml = result.to_xml();
        assert!(xml.contains("a/b.csv"));
        assert!(xml.contains("CommonPrefixes"));
    }
}
