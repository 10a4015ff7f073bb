//! Configuration shared by the members of one ring.
use std::fs;
use std::io;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::consts::DEFAULT_BITS;
use crate::consts::DEFAULT_FIX_FINGERS_INTERVAL_MS;
use crate::consts::DEFAULT_STABILIZE_INTERVAL_MS;
use crate::consts::HOP_BOUND_FACTOR;
use crate::dht::DigestAlgorithm;
use crate::dht::IdentifierSpace;
use crate::error::Error;
use crate::error::Result;

/// Settings of a ring member. `bits` and `digest` must be the same on every member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingConfig {
    #[serde(default = "default_bits")]
    pub bits: u8,
    #[serde(default)]
    pub digest: DigestAlgorithm,
    /// Hop limit of a lookup, `2 * bits` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hops: Option<u32>,
    #[serde(default = "default_stabilize_interval_ms")]
    pub stabilize_interval_ms: u64,
    #[serde(default = "default_fix_fingers_interval_ms")]
    pub fix_fingers_interval_ms: u64,
}

fn default_bits() -> u8 {
    DEFAULT_BITS
}

fn default_stabilize_interval_ms() -> u64 {
    DEFAULT_STABILIZE_INTERVAL_MS
}

fn default_fix_fingers_interval_ms() -> u64 {
    DEFAULT_FIX_FINGERS_INTERVAL_MS
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            bits: DEFAULT_BITS,
            digest: DigestAlgorithm::default(),
            max_hops: None,
            stabilize_interval_ms: DEFAULT_STABILIZE_INTERVAL_MS,
            fix_fingers_interval_ms: DEFAULT_FIX_FINGERS_INTERVAL_MS,
        }
    }
}

impl RingConfig {
    pub fn new(bits: u8) -> Self {
        Self {
            bits,
            ..Default::default()
        }
    }

    /// The identifier space described by `bits` and `digest`.
    pub fn space(&self) -> Result<IdentifierSpace> {
        IdentifierSpace::new(self.bits, self.digest)
    }

    /// Effective hop limit of a lookup.
    pub fn hop_bound(&self) -> u32 {
        self.max_hops
            .unwrap_or(HOP_BOUND_FACTOR * self.bits as u32)
    }

    /// Check the settings a loaded config can't be trusted with.
    pub fn validate(&self) -> Result<()> {
        self.space()?;
        if self.max_hops == Some(0) {
            return Err(Error::Configuration(
                "max_hops must allow at least one hop".to_string(),
            ));
        }
        Ok(())
    }

    pub fn stabilize_interval(&self) -> Duration {
        Duration::from_millis(self.stabilize_interval_ms)
    }

    pub fn fix_fingers_interval(&self) -> Duration {
        Duration::from_millis(self.fix_fingers_interval_ms)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(Error::DecodeError)?;
        config.validate()?;
        Ok(config)
    }

    pub fn write_fs<P>(&self, path: P) -> Result<()>
    where P: AsRef<std::path::Path> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let f = fs::File::create(path)?;
        let f_writer = io::BufWriter::new(f);
        serde_yaml::to_writer(f_writer, self).map_err(Error::EncodeError)?;
        tracing::debug!("Write config to: {:?}", path);
        Ok(())
    }

    pub fn read_fs<P>(path: P) -> Result<Self>
    where P: AsRef<std::path::Path> {
        let path = path.as_ref();
        tracing::debug!("Read config from: {:?}", path);
        let f = fs::File::open(path)?;
        let f_rdr = io::BufReader::new(f);
        let config: Self = serde_yaml::from_reader(f_rdr).map_err(Error::DecodeError)?;
        config.validate()?;
        Ok(config)
    }
}
