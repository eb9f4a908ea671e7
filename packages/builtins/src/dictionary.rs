//! Read-only key/value lookups: dictionaries and config stores.

use edgebridge_host::validate::{self, ValidationError};
use edgebridge_host::{DictionaryHandle, Host, HostOp, OptionalResult};
use tracing::debug;

use crate::error::{Result, ScriptError};

type Check = fn(&str) -> std::result::Result<(), ValidationError>;

fn open(host: &mut dyn Host, label: &str, name: &str, check: Check) -> Result<DictionaryHandle> {
    check(name)?;
    match host.dictionary_open(name).optional() {
        Ok(Some(handle)) => {
            debug!(%handle, resource = name, "opened {label}");
            Ok(handle)
        }
        Ok(None) => Err(ScriptError::error(format!("{label} '{name}' does not exist"))),
        Err(error) => Err(ScriptError::host(HostOp::DictionaryOpen, error)),
    }
}

fn get(
    host: &mut dyn Host,
    handle: DictionaryHandle,
    key: &str,
    check: Check,
) -> Result<Option<String>> {
    check(key)?;
    host.dictionary_get(handle, key)
        .optional()
        .map_err(|error| ScriptError::host(HostOp::DictionaryGet, error))
}

/// An edge dictionary.
#[derive(Debug, Clone)]
pub struct Dictionary {
    name: String,
    handle: DictionaryHandle,
}

impl Dictionary {
    /// Open a dictionary by name. A name that fails validation is rejected
    /// before the host is called.
    pub fn open(host: &mut dyn Host, name: &str) -> Result<Self> {
        let handle = open(host, "dictionary", name, validate::dictionary_name)?;
        Ok(Self {
            name: name.to_string(),
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> DictionaryHandle {
        self.handle
    }

    /// Look up `key`. `Ok(None)` if the dictionary has no such key.
    pub fn get(&self, host: &mut dyn Host, key: &str) -> Result<Option<String>> {
        get(host, self.handle, key, validate::dictionary_key)
    }
}

/// A config store. Same lookups as [`Dictionary`], with its own naming in
/// error messages.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    name: String,
    handle: DictionaryHandle,
}

impl ConfigStore {
    pub fn open(host: &mut dyn Host, name: &str) -> Result<Self> {
        let handle = open(host, "config store", name, validate::config_store_name)?;
        Ok(Self {
            name: name.to_string(),
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, host: &mut dyn Host, key: &str) -> Result<Option<String>> {
        get(host, self.handle, key, validate::config_store_key)
    }
}
