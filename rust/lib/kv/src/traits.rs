use crate::error::KVError;

/// KVStore provides durable storage for small preference values.
///
/// Keys follow a namespaced convention: `backend:active_mode`, etc.
/// Every `set` is a single-key write; there are no multi-key transactions.
pub trait KVStore: Send + Sync {
    /// Get the value for a key. Returns None if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError>;

    /// Set a key-value pair, overwriting any previous value.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError>;

    /// Delete a key. No-op if the key does not exist.
    fn delete(&self, key: &str) -> Result<(), KVError>;

    /// Get a value as UTF-8 text.
    fn get_string(&self, key: &str) -> Result<Option<String>, KVError> {
        match self.get(key)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| KVError::Serialization(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    /// Set a UTF-8 text value.
    fn set_string(&self, key: &str, value: &str) -> Result<(), KVError> {
        self.set(key, value.as_bytes())
    }
}
