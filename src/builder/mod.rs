//! # Builder Pattern
//!
//! This module provides builders for the values the importer hands over to
//! the compute and image services, and for the [Importer](crate::importer::Importer)
//! itself. For each component, all fields are optional and are validated once
//! you run the [`Builder::try_build`] method. Once the build is successful, the
//! value is complete and can be sent as is.
//!
//! ## Example
//!
//! ```rust
//! use cloudlet_base::builder::{Builder, flavor::FlavorSpecBuilder};
//! use cloudlet_base::builder::image::ImageMetadataBuilder;
//! use cloudlet_models::models::ArtifactKind;
//!
//! // Flavor matching a base VM with 2 vCPU, 2 GiB of RAM and a 10 GiB disk
//! let flavor = FlavorSpecBuilder::new()
//!     .with_name("cloudlet-flavor-ubuntu-base".to_string())
//!     .with_vcpus(2)
//!     .with_ram_mb(2048)
//!     .with_disk_gb(10)
//!     .as_public()
//!     .try_build()
//!     .unwrap();
//! assert_eq!(flavor.name, "cloudlet-flavor-ubuntu-base");
//!
//! // Metadata of the memory snapshot image
//! let metadata = ImageMetadataBuilder::new()
//!     .with_base_name("ubuntu-base".to_string())
//!     .with_artifact(ArtifactKind::Memory)
//!     .with_base_hash("abc123".to_string())
//!     .try_build()
//!     .unwrap();
//! assert_eq!(metadata.name, "ubuntu-base-memory");
//! ```

pub mod flavor;
pub mod image;
pub mod importer;

fn assert_not_none<T>(key: &str, value: &Option<T>) -> Result<(), BuilderError> {
    match value {
        Some(_) => Ok(()),
        None => Err(BuilderError::MissingRequiredField(key.to_string())),
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BuilderError {
    /// The field is required but was not provided in the builder object
    #[error("missing required field {0}")]
    MissingRequiredField(String),
    /// The field was provided but its value cannot be used
    #[error("invalid value for field {0}: {1}")]
    InvalidField(String, String),
}

/// Generic trait which all builder components must implement
pub trait Builder<T> {
    /// Validate all the fields from the builder object and apply it to the
    /// final object
    ///
    /// ## Example
    ///
    /// ```rust
    /// use cloudlet_base::builder::Builder;
    /// use cloudlet_base::builder::flavor::FlavorSpecBuilder;
    ///
    /// FlavorSpecBuilder::new()
    ///     .with_name("cloudlet-flavor-base".to_string())
    ///     .with_vcpus(1)
    ///     .with_ram_mb(512)
    ///     .with_disk_gb(1)
    ///     .try_build()
    ///     .unwrap();
    /// ```
    fn try_build(self) -> Result<T, BuilderError>;
}
