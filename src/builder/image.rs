use std::collections::BTreeMap;

use cloudlet_models::models::{ArtifactKind, ImageMetadata, Visibility};

use crate::builder::{assert_not_none, Builder, BuilderError};

pub const PROPERTY_BASE_HASH: &str = "base_sha256_uuid";
pub const PROPERTY_CLOUDLET_TYPE: &str = "cloudlet_type";
pub const PROPERTY_IS_CLOUDLET: &str = "is_cloudlet";
pub const PROPERTY_RESOURCE_XML: &str = "base_resource_xml_str";

/// Builds the metadata of one of the images a base VM package is split into.
/// The image is named `<base name>-<artifact key>`.
#[derive(Debug)]
pub struct ImageMetadataBuilder {
    pub base_name: Option<String>,
    pub artifact: Option<ArtifactKind>,
    pub base_hash: Option<String>,
    pub min_disk: u64,
    pub min_ram: u64,
    pub is_public: bool,
    pub extra: BTreeMap<String, String>,
}

impl Default for ImageMetadataBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageMetadataBuilder {
    pub fn new() -> ImageMetadataBuilder {
        ImageMetadataBuilder {
            base_name: None,
            artifact: None,
            base_hash: None,
            min_disk: 0,
            min_ram: 0,
            is_public: false,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_base_name(mut self, base_name: String) -> ImageMetadataBuilder {
        self.base_name = Some(base_name);
        self
    }

    pub fn with_artifact(mut self, artifact: ArtifactKind) -> ImageMetadataBuilder {
        self.artifact = Some(artifact);
        self
    }

    pub fn with_base_hash(mut self, base_hash: String) -> ImageMetadataBuilder {
        self.base_hash = Some(base_hash);
        self
    }

    pub fn with_min_disk(mut self, min_disk: u64) -> ImageMetadataBuilder {
        self.min_disk = min_disk;
        self
    }

    pub fn with_min_ram(mut self, min_ram: u64) -> ImageMetadataBuilder {
        self.min_ram = min_ram;
        self
    }

    pub fn as_public(mut self, is_public: bool) -> ImageMetadataBuilder {
        self.is_public = is_public;
        self
    }

    /// Add a free-form property. Properties set by the builder itself take
    /// precedence over these.
    pub fn with_property(mut self, key: String, value: String) -> ImageMetadataBuilder {
        self.extra.insert(key, value);
        self
    }
}

impl Builder<ImageMetadata> for ImageMetadataBuilder {
    fn try_build(self) -> Result<ImageMetadata, BuilderError> {
        assert_not_none(stringify!(self.base_name), &self.base_name)?;
        let artifact = self.artifact.ok_or_else(|| {
            BuilderError::MissingRequiredField(stringify!(self.artifact).to_string())
        })?;
        assert_not_none(stringify!(self.base_hash), &self.base_hash)?;
        let base_name = self.base_name.unwrap_or_default();
        let base_hash = self.base_hash.unwrap_or_default();

        let mut properties = self.extra;
        for (key, value) in [
            ("image_type", "snapshot"),
            ("image_location", "snapshot"),
            (PROPERTY_IS_CLOUDLET, "True"),
            (PROPERTY_CLOUDLET_TYPE, artifact.cloudlet_type()),
        ] {
            properties.insert(key.to_string(), value.to_string());
        }
        properties.insert(PROPERTY_BASE_HASH.to_string(), base_hash);

        Ok(ImageMetadata {
            name: format!("{}-{}", base_name, artifact.key()),
            disk_format: "raw".to_string(),
            container_format: "bare".to_string(),
            min_disk: self.min_disk,
            min_ram: self.min_ram,
            visibility: Visibility::from_public(self.is_public),
            properties,
        })
    }
}
