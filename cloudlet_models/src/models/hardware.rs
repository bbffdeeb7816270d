/// HardwareDescriptor : CPU and memory envelope captured when the base VM was snapshotted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HardwareDescriptor {
    #[serde(rename = "cpu_count")]
    pub cpu_count: u32,
    /// Memory size in mebibytes
    #[serde(rename = "memory_size_mb")]
    pub memory_size_mb: u64,
}

impl HardwareDescriptor {
    pub fn new(cpu_count: u32, memory_size_mb: u64) -> HardwareDescriptor {
        HardwareDescriptor {
            cpu_count,
            memory_size_mb,
        }
    }
}
