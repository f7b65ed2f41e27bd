//! Negotiation options carried in the session call's metadata

use std::collections::HashMap;

pub const HEADER_SESSION_UUID: &str = "x-docker-expose-session-uuid";
pub const HEADER_SESSION_NAME: &str = "x-docker-expose-session-name";
pub const HEADER_SESSION_SHARED_KEY: &str = "x-docker-expose-session-sharedkey";
pub const HEADER_SESSION_METHOD: &str = "x-docker-expose-session-grpc-method";

/// Call metadata with case-insensitive keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    values: HashMap<String, Vec<String>>,
}

impl SessionOptions {
    /// Build options from raw metadata; keys differing only in case merge
    pub fn from_metadata(metadata: &HashMap<String, Vec<String>>) -> Self {
        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        for (key, vals) in metadata {
            values
                .entry(key.to_ascii_lowercase())
                .or_default()
                .extend(vals.iter().cloned());
        }
        Self { values }
    }

    /// First value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    /// All values for `key`
    pub fn get_all(&self, key: &str) -> &[String] {
        self.values
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn uuid(&self) -> Option<&str> {
        self.get(HEADER_SESSION_UUID)
    }

    pub fn name(&self) -> Option<&str> {
        self.get(HEADER_SESSION_NAME)
    }

    pub fn shared_key(&self) -> Option<&str> {
        self.get(HEADER_SESSION_SHARED_KEY)
    }

    /// Methods the caller exposes over the session
    pub fn methods(&self) -> &[String] {
        self.get_all(HEADER_SESSION_METHOD)
    }

    /// Raw key → values view
    pub fn as_map(&self) -> &HashMap<String, Vec<String>> {
        &self.values
    }
}
