use std::collections::BTreeMap;

/// ImageRecord : An image as listed by the image service.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(rename = "id")]
    pub id: String,
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "visibility")]
    pub visibility: Visibility,
    #[serde(rename = "status")]
    pub status: String,
    /// Project owning the image
    #[serde(rename = "owner", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(rename = "container_format", default)]
    pub container_format: String,
    /// Minimum disk size in GiB
    #[serde(rename = "min_disk", default)]
    pub min_disk: u64,
    /// Free-form image properties
    #[serde(rename = "properties", default)]
    pub properties: BTreeMap<String, String>,
}

impl ImageRecord {
    pub fn new(id: String, name: String) -> ImageRecord {
        ImageRecord {
            id,
            name,
            visibility: Visibility::Private,
            status: "active".to_string(),
            owner: None,
            container_format: "bare".to_string(),
            min_disk: 0,
            properties: BTreeMap::new(),
        }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

impl Visibility {
    pub fn from_public(is_public: bool) -> Visibility {
        if is_public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

/// ImageMetadata : Body sent to the image service when creating an image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "disk_format")]
    pub disk_format: String,
    #[serde(rename = "container_format")]
    pub container_format: String,
    /// Minimum disk size in GiB
    #[serde(rename = "min_disk")]
    pub min_disk: u64,
    /// Minimum memory size in MiB
    #[serde(rename = "min_ram")]
    pub min_ram: u64,
    #[serde(rename = "visibility")]
    pub visibility: Visibility,
    #[serde(flatten)]
    pub properties: BTreeMap<String, String>,
}
