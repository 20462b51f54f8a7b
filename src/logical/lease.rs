use std::time::{Duration, SystemTime};

use better_default::Default;
use serde::{Deserialize, Serialize};

use crate::utils::{deserialize_duration, deserialize_system_time, serialize_duration, serialize_system_time};

/// The time-bounded part of an auth or secret grant. `ttl` of zero
/// means the grant does not expire on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lease {
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub ttl: Duration,
    #[default(true)]
    pub renewable: bool,
    #[default(SystemTime::now())]
    #[serde(serialize_with = "serialize_system_time", deserialize_with = "deserialize_system_time")]
    pub issue_time: SystemTime,
}

impl Lease {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.ttl.as_secs() > 0
    }

    pub fn renewable(&self) -> bool {
        self.renewable
    }

    pub fn expiration_time(&self) -> SystemTime {
        self.issue_time + self.ttl
    }
}
