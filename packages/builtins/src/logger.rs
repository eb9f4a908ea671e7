use edgebridge_host::validate;
use edgebridge_host::{Host, HostOp, LogEndpointHandle};

use crate::error::{Result, ScriptError};

/// A named log endpoint.
#[derive(Debug, Clone)]
pub struct Logger {
    name: String,
    handle: LogEndpointHandle,
}

impl Logger {
    pub fn open(host: &mut dyn Host, name: &str) -> Result<Self> {
        validate::log_endpoint_name(name)?;
        let handle = host
            .log_endpoint_open(name)
            .map_err(|error| ScriptError::host(HostOp::LogEndpointOpen, error))?;
        Ok(Self {
            name: name.to_string(),
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write one line to the endpoint.
    pub fn log(&self, host: &mut dyn Host, message: impl AsRef<str>) -> Result<()> {
        host.log_write(self.handle, message.as_ref())
            .map_err(|error| ScriptError::host(HostOp::LogWrite, error))
    }
}
