use cloudlet_models::models::FlavorSpec;
use uuid::Uuid;

use crate::builder::{assert_not_none, Builder, BuilderError};

#[derive(Debug)]
pub struct FlavorSpecBuilder {
    pub id: Option<Uuid>,
    pub name: Option<String>,
    pub vcpus: Option<u32>,
    pub ram_mb: Option<u64>,
    pub disk_gb: Option<u64>,
    pub is_public: bool,
}

impl Default for FlavorSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FlavorSpecBuilder {
    pub fn new() -> FlavorSpecBuilder {
        FlavorSpecBuilder {
            id: None,
            name: None,
            vcpus: None,
            ram_mb: None,
            disk_gb: None,
            is_public: false,
        }
    }

    /// Use a fixed identifier instead of a random one
    pub fn with_id(mut self, id: Uuid) -> FlavorSpecBuilder {
        self.id = Some(id);
        self
    }

    pub fn with_name(mut self, name: String) -> FlavorSpecBuilder {
        self.name = Some(name);
        self
    }

    pub fn with_vcpus(mut self, vcpus: u32) -> FlavorSpecBuilder {
        self.vcpus = Some(vcpus);
        self
    }

    pub fn with_ram_mb(mut self, ram_mb: u64) -> FlavorSpecBuilder {
        self.ram_mb = Some(ram_mb);
        self
    }

    pub fn with_disk_gb(mut self, disk_gb: u64) -> FlavorSpecBuilder {
        self.disk_gb = Some(disk_gb);
        self
    }

    pub fn as_public(mut self) -> FlavorSpecBuilder {
        self.is_public = true;
        self
    }
}

impl Builder<FlavorSpec> for FlavorSpecBuilder {
    fn try_build(self) -> Result<FlavorSpec, BuilderError> {
        assert_not_none(stringify!(self.name), &self.name)?;
        assert_not_none(stringify!(self.vcpus), &self.vcpus)?;
        assert_not_none(stringify!(self.ram_mb), &self.ram_mb)?;
        assert_not_none(stringify!(self.disk_gb), &self.disk_gb)?;

        let name = self.name.unwrap_or_default();
        if name.trim().is_empty() {
            return Err(BuilderError::InvalidField(
                stringify!(self.name).to_string(),
                "must not be empty".to_string(),
            ));
        }
        let vcpus = self.vcpus.unwrap_or_default();
        if vcpus == 0 {
            return Err(BuilderError::InvalidField(
                stringify!(self.vcpus).to_string(),
                "must be positive".to_string(),
            ));
        }
        let ram_mb = self.ram_mb.unwrap_or_default();
        if ram_mb == 0 {
            return Err(BuilderError::InvalidField(
                stringify!(self.ram_mb).to_string(),
                "must be positive".to_string(),
            ));
        }

        Ok(FlavorSpec {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            name,
            ram_mb,
            vcpus,
            disk_gb: self.disk_gb.unwrap_or_default(),
            is_public: self.is_public,
        })
    }
}
