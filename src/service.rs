//! # External services
//!
//! Flavors and images are owned by the compute and image services of the
//! cloud. The importer only talks to them through these traits, which callers
//! implement on top of their own (request scoped, authenticated) clients.
use std::path::Path;

use cloudlet_models::models::{FlavorCandidate, FlavorSpec, ImageMetadata, ImageRecord, Visibility};

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("Could not reach {0} service, reason: {1}")]
    Unreachable(&'static str, String),
    #[error("{0} service rejected the request, reason: {1}")]
    Rejected(&'static str, String),
    #[error("Could not read image data from {0:?}, reason: {1}")]
    ImageData(std::path::PathBuf, std::io::Error),
}

/// Filter applied when listing images
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageFilter {
    pub visibility: Option<Visibility>,
    pub status: Option<String>,
    /// Project owning the image
    pub owner: Option<String>,
}

impl ImageFilter {
    /// Public images which are ready to be used
    pub fn public_active() -> ImageFilter {
        ImageFilter {
            visibility: Some(Visibility::Public),
            status: Some("active".to_string()),
            owner: None,
        }
    }

    /// Active images owned by the given project, whatever their visibility
    pub fn owned_active(project_id: &str) -> ImageFilter {
        ImageFilter {
            visibility: None,
            status: Some("active".to_string()),
            owner: Some(project_id.to_string()),
        }
    }

    pub fn matches(&self, image: &ImageRecord) -> bool {
        self.visibility.map_or(true, |v| v == image.visibility)
            && self.status.as_ref().map_or(true, |s| *s == image.status)
            && self
                .owner
                .as_deref()
                .map_or(true, |o| image.owner.as_deref() == Some(o))
    }
}

/// Compute service, owner of the flavors
pub trait ComputeService {
    fn list_flavors(&self) -> Result<Vec<FlavorCandidate>, ServiceError>;
    /// Create a new flavor, the service is expected to do it atomically
    fn create_flavor(&self, spec: &FlavorSpec) -> Result<FlavorCandidate, ServiceError>;
}

/// Image service, owner of the images
pub trait ImageService {
    fn list_images(&self, filter: &ImageFilter) -> Result<Vec<ImageRecord>, ServiceError>;
    /// Create an image with the given metadata and upload the content of `data`
    fn create_image(&self, metadata: &ImageMetadata, data: &Path) -> Result<ImageRecord, ServiceError>;
}
