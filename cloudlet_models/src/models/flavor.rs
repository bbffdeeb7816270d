/// FlavorCandidate : Read-only view of a compute flavor owned by the compute service.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlavorCandidate {
    #[serde(rename = "id")]
    pub id: String,
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "vcpus")]
    pub vcpus: u32,
    #[serde(rename = "ram")]
    pub ram_mb: u64,
    #[serde(rename = "disk")]
    pub disk_gb: u64,
    /// Self link of the flavor, if the service returned one
    #[serde(rename = "link", skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl FlavorCandidate {
    pub fn new(id: String, name: String, vcpus: u32, ram_mb: u64, disk_gb: u64) -> FlavorCandidate {
        FlavorCandidate {
            id,
            name,
            vcpus,
            ram_mb,
            disk_gb,
            link: None,
        }
    }
}

/// FlavorSpec : Request body used to create a new flavor on the compute service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorSpec {
    #[serde(rename = "id")]
    pub id: uuid::Uuid,
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "ram")]
    pub ram_mb: u64,
    #[serde(rename = "vcpus")]
    pub vcpus: u32,
    #[serde(rename = "disk")]
    pub disk_gb: u64,
    #[serde(rename = "os-flavor-access:is_public")]
    pub is_public: bool,
}
