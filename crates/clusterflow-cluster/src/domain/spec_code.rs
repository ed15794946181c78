//! Host spec codes of the form `{cpu}C{memory}G`, e.g. `8C16G`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ClusterError;

/// CPU cores and memory requested per host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecCode {
    /// CPU cores
    pub cpu_cores: u32,
    /// Memory in GiB
    pub memory_gib: u32,
}

impl SpecCode {
    /// Spec from its parts
    pub fn new(cpu_cores: u32, memory_gib: u32) -> Self {
        Self { cpu_cores, memory_gib }
    }
}

impl fmt::Display for SpecCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}C{}G", self.cpu_cores, self.memory_gib)
    }
}

impl FromStr for SpecCode {
    type Err = ClusterError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let invalid = || ClusterError::InvalidSpecCode(code.to_string());

        let upper = code.trim().to_ascii_uppercase();
        let (cpu, rest) = upper.split_once('C').ok_or_else(invalid)?;
        let memory = rest.strip_suffix('G').ok_or_else(invalid)?;

        let cpu_cores: u32 = cpu.parse().map_err(|_| invalid())?;
        let memory_gib: u32 = memory.parse().map_err(|_| invalid())?;
        if cpu_cores == 0 || memory_gib == 0 {
            return Err(invalid());
        }

        Ok(Self { cpu_cores, memory_gib })
    }
}
