use std::fmt;

use crate::telemetry::Field;

pub const IDS_ROOT: &str = "/ids";

/// Addresses one logical sensor. Fragments are opaque and never checked for
/// existence: the first write for an identity creates its path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SensorIdentity {
    pub device_id: String,

    pub module_id: String,

    pub sensor_id: String,
}

impl SensorIdentity {
    pub fn new(
        device_id: impl Into<String>,
        module_id: impl Into<String>,
        sensor_id: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            module_id: module_id.into(),
            sensor_id: sensor_id.into(),
        }
    }

    pub fn path(&self) -> String {
        format!(
            "{IDS_ROOT}/{}/{}/{}",
            self.device_id, self.module_id, self.sensor_id
        )
    }

    pub fn field_path(&self, field: Field) -> String {
        format!("{}/{}", self.path(), field.as_str())
    }
}

impl fmt::Display for SensorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.device_id, self.module_id, self.sensor_id)
    }
}
