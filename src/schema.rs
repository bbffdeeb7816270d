//! # Manifest schema
//!
//! A base VM package describes its content in a small XML manifest. The schema
//! of that manifest is owned by the tool that produces the packages, so it is
//! injected here as a [ManifestSchema] value rather than hard-coded in the
//! parser. [ManifestSchema::default] describes the cloudlet package format:
//!
//! ```xml
//! <image xmlns="http://opencloudlet.org/xmlns/vmsynthesis/package" hash_value="abc123">
//!   <disk path="disk.img"/>
//!   <memory path="memory.img"/>
//!   <disk_hash path="disk.sha"/>
//!   <memory_hash path="memory.sha"/>
//! </image>
//! ```
use cloudlet_models::models::{ArtifactKind, Manifest};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use tracing::trace;

pub const DEFAULT_MANIFEST_FILENAME: &str = "package.xml";
pub const DEFAULT_NAMESPACE: &str = "http://opencloudlet.org/xmlns/vmsynthesis/package";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("manifest is not well-formed XML: {0}")]
    Malformed(String),
    #[error("manifest has no root element")]
    Empty,
    #[error("unexpected root element <{0}>")]
    UnexpectedRoot(String),
    #[error("element <{0}> is not in the expected namespace")]
    WrongNamespace(String),
    #[error("element <{element}> is missing attribute `{attribute}`")]
    MissingAttribute { element: String, attribute: String },
    #[error("unexpected element <{0}>")]
    UnexpectedElement(String),
    #[error("element <{0}> appears more than once")]
    DuplicateElement(String),
    #[error("unexpected text content: {0:?}")]
    UnexpectedText(String),
}

/// Shape of the manifest file shipped in a base VM package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestSchema {
    /// File name of the manifest at the root of the archive
    pub filename: String,
    /// Namespace every element must belong to, `None` for un-namespaced documents
    pub namespace: Option<String>,
    /// Name of the root element
    pub root: String,
    /// Root attribute holding the content fingerprint
    pub hash_attribute: String,
    /// Attribute holding the relative path on each artifact element
    pub path_attribute: String,
}

impl Default for ManifestSchema {
    fn default() -> Self {
        Self {
            filename: DEFAULT_MANIFEST_FILENAME.to_string(),
            namespace: Some(DEFAULT_NAMESPACE.to_string()),
            root: "image".to_string(),
            hash_attribute: "hash_value".to_string(),
            path_attribute: "path".to_string(),
        }
    }
}

impl ManifestSchema {
    /// Validate the given document against the schema and read it into a [Manifest].
    ///
    /// Artifact elements are optional at this stage: a manifest lacking one of
    /// them is schema-valid but will be rejected when its paths are extracted.
    pub fn parse(&self, xml: &[u8]) -> Result<Manifest, SchemaError> {
        let mut reader = NsReader::from_reader(xml);
        reader.trim_text(true);

        let mut manifest: Option<Manifest> = None;
        // Depth 1 is the root element, depth 2 the artifact elements.
        let mut depth = 0usize;
        let mut root_closed = false;

        loop {
            let (ns, event) = reader
                .read_resolved_event()
                .map_err(|e| SchemaError::Malformed(e.to_string()))?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    let name = local_name(e);
                    if !self.in_namespace(&ns) {
                        return Err(SchemaError::WrongNamespace(name));
                    }
                    match depth {
                        0 if root_closed => return Err(SchemaError::UnexpectedElement(name)),
                        0 => {
                            if name != self.root {
                                return Err(SchemaError::UnexpectedRoot(name));
                            }
                            let hash = self.required_attribute(e, &name, &self.hash_attribute)?;
                            manifest = Some(Manifest::new(hash));
                        }
                        1 => {
                            let kind = ArtifactKind::ALL
                                .into_iter()
                                .find(|kind| kind.element() == name)
                                .ok_or_else(|| SchemaError::UnexpectedElement(name.clone()))?;
                            let path = self.required_attribute(e, &name, &self.path_attribute)?;
                            let current = manifest.as_mut().ok_or(SchemaError::Empty)?;
                            if current.path(kind).is_some() {
                                return Err(SchemaError::DuplicateElement(name));
                            }
                            trace!("manifest entry {} -> {}", kind, path);
                            current.set_path(kind, path);
                        }
                        _ => return Err(SchemaError::UnexpectedElement(name)),
                    }
                    if is_empty {
                        if depth == 0 {
                            root_closed = true;
                        }
                    } else {
                        depth += 1;
                    }
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        root_closed = true;
                    }
                }
                Event::Text(ref t) => {
                    let text = t
                        .unescape()
                        .map_err(|e| SchemaError::Malformed(e.to_string()))?;
                    if !text.trim().is_empty() {
                        return Err(SchemaError::UnexpectedText(text.into_owned()));
                    }
                }
                Event::CData(ref t) => {
                    return Err(SchemaError::UnexpectedText(
                        String::from_utf8_lossy(t).into_owned(),
                    ));
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions and doctype
                _ => {}
            }
        }

        manifest.ok_or(SchemaError::Empty)
    }

    fn in_namespace(&self, ns: &ResolveResult) -> bool {
        match (&self.namespace, ns) {
            (None, ResolveResult::Unbound) => true,
            (Some(expected), ResolveResult::Bound(found)) => found.as_ref() == expected.as_bytes(),
            _ => false,
        }
    }

    fn required_attribute(
        &self,
        element: &BytesStart,
        name: &str,
        attribute: &str,
    ) -> Result<String, SchemaError> {
        for attr in element.attributes() {
            let attr = attr.map_err(|e| SchemaError::Malformed(e.to_string()))?;
            if attr.key.local_name().as_ref() == attribute.as_bytes() {
                let value = attr
                    .unescape_value()
                    .map_err(|e| SchemaError::Malformed(e.to_string()))?;
                return Ok(value.into_owned());
            }
        }
        Err(SchemaError::MissingAttribute {
            element: name.to_string(),
            attribute: attribute.to_string(),
        })
    }
}

fn local_name(element: &BytesStart) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}
