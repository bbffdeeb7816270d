//! # Cloudlet images
//!
//! Helpers around the images a base VM is stored as: a request-scoped cache
//! of the image listing, lookup of already imported base VMs and
//! classification of instances booted from cloudlet images.
use std::collections::{HashMap, HashSet};

use cloudlet_models::models::{ArtifactKind, CloudletType, ImageRecord};
use tracing::debug;

use crate::builder::image::{PROPERTY_BASE_HASH, PROPERTY_CLOUDLET_TYPE, PROPERTY_IS_CLOUDLET};
use crate::service::{ImageFilter, ImageService, ServiceError};

/// Container formats of kernel and ramdisk images, never offered as base VMs
const KERNEL_CONTAINER_FORMATS: [&str; 2] = ["aki", "ari"];

/// Image listings fetched at most once per request.
///
/// A cache must not outlive the request it was created for, the listing may
/// be stale for the next one.
#[derive(Debug)]
pub struct ImageCache<'a, S: ?Sized> {
    service: &'a S,
    project_id: Option<String>,
    images: Option<Vec<ImageRecord>>,
    owned: Option<Vec<ImageRecord>>,
}

impl<'a, S: ImageService + ?Sized> ImageCache<'a, S> {
    pub fn new(service: &'a S) -> ImageCache<'a, S> {
        ImageCache {
            service,
            project_id: None,
            images: None,
            owned: None,
        }
    }

    /// Also consider the images owned by the user's project when listing base VMs
    pub fn with_project(mut self, project_id: String) -> ImageCache<'a, S> {
        self.project_id = Some(project_id);
        self
    }

    /// Public and active images
    pub fn images(&mut self) -> Result<&[ImageRecord], ServiceError> {
        if self.images.is_none() {
            debug!("Listing public images");
            let images = self.service.list_images(&ImageFilter::public_active())?;
            self.images = Some(images);
        }
        Ok(self.images.as_deref().unwrap_or_default())
    }

    /// Active images of the project, empty without a project
    pub fn owned_images(&mut self) -> Result<&[ImageRecord], ServiceError> {
        if self.owned.is_none() {
            let owned = match &self.project_id {
                Some(project_id) => {
                    debug!("Listing images of project {}", project_id);
                    self.service.list_images(&ImageFilter::owned_active(project_id))?
                }
                None => Vec::new(),
            };
            self.owned = Some(owned);
        }
        Ok(self.owned.as_deref().unwrap_or_default())
    }

    /// Image of an already imported base VM with the given hash, if any
    pub fn find_base(&mut self, base_hash: &str) -> Result<Option<&ImageRecord>, ServiceError> {
        Ok(self
            .images()?
            .iter()
            .find(|image| image.property(PROPERTY_BASE_HASH) == Some(base_hash)))
    }

    /// Disk images of the base VMs the user can resume: owned images first,
    /// then public ones, each listed once.
    pub fn base_vms(&mut self) -> Result<Vec<&ImageRecord>, ServiceError> {
        self.owned_images()?;
        self.images()?;
        let owned = self.owned.as_deref().unwrap_or_default();
        let public = self.images.as_deref().unwrap_or_default();

        let mut seen = HashSet::new();
        let mut base_vms = Vec::new();
        for image in owned.iter().chain(public) {
            if image.property(PROPERTY_CLOUDLET_TYPE) != Some(ArtifactKind::Disk.cloudlet_type())
                || KERNEL_CONTAINER_FORMATS.contains(&image.container_format.as_str())
            {
                continue;
            }
            if seen.insert(image.id.as_str()) {
                base_vms.push(image);
            }
        }
        Ok(base_vms)
    }

    /// Forget the listings, the next access fetches them again
    pub fn invalidate(&mut self) {
        self.images = None;
        self.owned = None;
    }
}

pub const METADATA_OVERLAY_URL: &str = "overlay_url";
pub const METADATA_HANDOFF_INFO: &str = "handoff_info";

/// Tells which kind of cloudlet instance was booted from `image` given the
/// instance metadata, or `None` for non-cloudlet instances.
///
/// Instances synthesized from an overlay, or received through a handoff,
/// carry the overlay URL or handoff information in their metadata.
pub fn classify(image: Option<&ImageRecord>, metadata: &HashMap<String, String>) -> Option<CloudletType> {
    let image = image?;
    image.property(PROPERTY_IS_CLOUDLET)?;
    if metadata.contains_key(METADATA_OVERLAY_URL) || metadata.contains_key(METADATA_HANDOFF_INFO) {
        Some(CloudletType::CloudletOverlay)
    } else {
        Some(CloudletType::CloudletBaseDisk)
    }
}
