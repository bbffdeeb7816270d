/// ArtifactKind : One of the four files shipped in a base VM package.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Disk,
    Memory,
    #[serde(rename = "diskhash")]
    DiskHash,
    #[serde(rename = "memhash")]
    MemoryHash,
}

impl ArtifactKind {
    /// Every artifact, in manifest order.
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Disk,
        ArtifactKind::Memory,
        ArtifactKind::DiskHash,
        ArtifactKind::MemoryHash,
    ];

    /// Name of the manifest element that carries the artifact path.
    pub fn element(&self) -> &'static str {
        match self {
            ArtifactKind::Disk => "disk",
            ArtifactKind::Memory => "memory",
            ArtifactKind::DiskHash => "disk_hash",
            ArtifactKind::MemoryHash => "memory_hash",
        }
    }

    /// Short key used as suffix of the uploaded image name.
    pub fn key(&self) -> &'static str {
        match self {
            ArtifactKind::Disk => "disk",
            ArtifactKind::Memory => "memory",
            ArtifactKind::DiskHash => "diskhash",
            ArtifactKind::MemoryHash => "memhash",
        }
    }

    /// Value of the `cloudlet_type` image property.
    pub fn cloudlet_type(&self) -> &'static str {
        match self {
            ArtifactKind::Disk => "cloudlet_base_disk",
            ArtifactKind::Memory => "cloudlet_base_memory",
            ArtifactKind::DiskHash => "cloudlet_base_disk_hash",
            ArtifactKind::MemoryHash => "cloudlet_base_memory_hash",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Manifest : Content of the `package.xml` file found at the root of a base VM package.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Content fingerprint of the base VM
    #[serde(rename = "hash_value")]
    pub hash_value: String,
    /// Path of the disk image, relative to the package root
    #[serde(rename = "disk", skip_serializing_if = "Option::is_none")]
    pub disk: Option<String>,
    /// Path of the memory snapshot, relative to the package root
    #[serde(rename = "memory", skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(rename = "disk_hash", skip_serializing_if = "Option::is_none")]
    pub disk_hash: Option<String>,
    #[serde(rename = "memory_hash", skip_serializing_if = "Option::is_none")]
    pub memory_hash: Option<String>,
}

impl Manifest {
    pub fn new(hash_value: String) -> Manifest {
        Manifest {
            hash_value,
            disk: None,
            memory: None,
            disk_hash: None,
            memory_hash: None,
        }
    }

    pub fn path(&self, kind: ArtifactKind) -> Option<&str> {
        match kind {
            ArtifactKind::Disk => self.disk.as_deref(),
            ArtifactKind::Memory => self.memory.as_deref(),
            ArtifactKind::DiskHash => self.disk_hash.as_deref(),
            ArtifactKind::MemoryHash => self.memory_hash.as_deref(),
        }
    }

    pub fn set_path(&mut self, kind: ArtifactKind, path: String) {
        let slot = match kind {
            ArtifactKind::Disk => &mut self.disk,
            ArtifactKind::Memory => &mut self.memory,
            ArtifactKind::DiskHash => &mut self.disk_hash,
            ArtifactKind::MemoryHash => &mut self.memory_hash,
        };
        *slot = Some(path);
    }
}

/// ArtifactPaths : The four artifact paths of a manifest, all known to be present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    #[serde(rename = "disk")]
    pub disk: String,
    #[serde(rename = "memory")]
    pub memory: String,
    #[serde(rename = "diskhash")]
    pub disk_hash: String,
    #[serde(rename = "memhash")]
    pub memory_hash: String,
}

impl ArtifactPaths {
    pub fn get(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Disk => &self.disk,
            ArtifactKind::Memory => &self.memory,
            ArtifactKind::DiskHash => &self.disk_hash,
            ArtifactKind::MemoryHash => &self.memory_hash,
        }
    }

    /// Iterate over `(kind, path)` pairs in manifest order.
    pub fn iter(&self) -> impl Iterator<Item = (ArtifactKind, &str)> + '_ {
        ArtifactKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}
