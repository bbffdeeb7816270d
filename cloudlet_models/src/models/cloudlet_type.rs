/// CloudletType : Role of an instance booted from a cloudlet image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudletType {
    /// Instance resumed straight from a base VM
    CloudletBaseDisk,
    /// Instance synthesized from an overlay, or handed off from another cloudlet
    CloudletOverlay,
}

impl std::fmt::Display for CloudletType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloudletType::CloudletBaseDisk => f.write_str("cloudlet_base_disk"),
            CloudletType::CloudletOverlay => f.write_str("cloudlet_overlay"),
        }
    }
}
