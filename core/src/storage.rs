use std::collections::HashMap;

use crate::error::StoreError;

/// Persisted key/value settings, shaped after the instrument's flash store:
/// small unsigned values and short strings under fixed keys.
pub trait SettingsStore {
    fn get_u8(&self, key: &str) -> Result<Option<u8>, StoreError>;
    fn set_u8(&mut self, key: &str, value: u8) -> Result<(), StoreError>;

    fn get_str(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set_str(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Flush pending writes.
    fn commit(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
enum StoredValue {
    U8(u8),
    Str(String),
}

/// In-memory store for tests and host tools.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, StoredValue>,
    commits: usize,
    read_only: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every write.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn write(&mut self, key: &str, value: StoredValue) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::WriteFailed {
                key: key.to_string(),
                reason: "store is read-only".to_string(),
            });
        }
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

impl SettingsStore for MemoryStore {
    fn get_u8(&self, key: &str) -> Result<Option<u8>, StoreError> {
        Ok(match self.values.get(key) {
            Some(StoredValue::U8(v)) => Some(*v),
            _ => None,
        })
    }

    fn set_u8(&mut self, key: &str, value: u8) -> Result<(), StoreError> {
        self.write(key, StoredValue::U8(value))
    }

    fn get_str(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(match self.values.get(key) {
            Some(StoredValue::Str(v)) => Some(v.clone()),
            _ => None,
        })
    }

    fn set_str(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.write(key, StoredValue::Str(value.to_string()))
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.commits += 1;
        Ok(())
    }
}
