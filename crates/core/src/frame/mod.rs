use serde::{Deserialize, Serialize};

/// Coarse intensity tag attached to every generated pose frame by the
/// upstream image pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyTier {
    Low,
    Mid,
    High,
}

/// A single pose frame produced by the upstream image pipeline.
///
/// Frames are read-only inputs: the engine never mutates a frame it did not
/// synthesise itself. The `virtual_*` fields are only ever populated on
/// frames created by [`crate::mechanical`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFrame {
    pub url: String,
    /// Pose tag, conventionally `<family>_<index>`.
    pub pose: String,
    pub energy: EnergyTier,
    pub direction: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub mechanical_fx: Option<String>,
    #[serde(default)]
    pub virtual_zoom: Option<f32>,
    #[serde(default)]
    pub virtual_offset_y: Option<f32>,
}

impl GeneratedFrame {
    /// Returns the pose family, i.e. the pose tag with a trailing
    /// `_<digits>` index stripped. `groove_02` and `groove` both belong to
    /// the `groove` family.
    pub fn family(&self) -> &str {
        match self.pose.rfind('_') {
            Some(split)
                if split + 1 < self.pose.len()
                    && self.pose[split + 1..].chars().all(|c| c.is_ascii_digit()) =>
            {
                &self.pose[..split]
            }
            _ => &self.pose,
        }
    }
}
