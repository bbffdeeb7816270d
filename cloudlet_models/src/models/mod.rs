pub mod cloudlet_type;
pub use self::cloudlet_type::CloudletType;
pub mod flavor;
pub use self::flavor::{FlavorCandidate, FlavorSpec};
pub mod hardware;
pub use self::hardware::HardwareDescriptor;
pub mod image;
pub use self::image::{ImageMetadata, ImageRecord, Visibility};
pub mod manifest;
pub use self::manifest::{ArtifactKind, ArtifactPaths, Manifest};
