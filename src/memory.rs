//! # Memory snapshot inspection
//!
//! The memory artifact of a base VM is a libvirt QEMU save image. Its header
//! embeds the libvirt domain XML the VM was running with, which is where the
//! CPU count and memory size of the base VM are read from.
use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use cloudlet_models::models::HardwareDescriptor;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, instrument, trace};

#[derive(thiserror::Error, Debug)]
pub enum MemoryError {
    #[error("Could not open memory snapshot, reason: {0}")]
    Open(#[from] std::io::Error),
    #[error("Invalid memory image magic")]
    InvalidMagic,
    #[error("Unknown memory image version {0}")]
    UnknownVersion(u32),
    #[error("Unused header values not 0")]
    UnusedValues,
    #[error("Memory image header is truncated")]
    Truncated,
    #[error("Missing NUL byte after XML")]
    MissingNul,
    #[error("Embedded XML is not valid UTF-8")]
    Encoding,
}

/// Header of a libvirt QEMU save image.
///
/// Values are stored native-endian by libvirt; only little-endian hosts are
/// supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QemuMemoryHeader {
    pub version: u32,
    pub was_running: u32,
    pub compressed: u32,
    /// Libvirt domain XML without its trailing NUL padding
    pub xml: String,
}

impl QemuMemoryHeader {
    pub const MAGIC: &'static [u8; 16] = b"LibvirtQemudSave";
    pub const VERSION: u32 = 2;
    const VALUES: usize = 19;
    const UNUSED_VALUES: usize = 15;
    pub const LENGTH: usize = Self::MAGIC.len() + Self::VALUES * 4;

    pub const COMPRESS_RAW: u32 = 0;
    pub const COMPRESS_XZ: u32 = 3;

    /// Read the header from the beginning of the given stream.
    pub fn read<R: Read>(mut reader: R) -> Result<Self, MemoryError> {
        let mut buf = [0u8; Self::LENGTH];
        read_exact(&mut reader, &mut buf)?;

        let (magic, values) = buf.split_at(Self::MAGIC.len());
        if magic != Self::MAGIC {
            return Err(MemoryError::InvalidMagic);
        }
        let values: Vec<u32> = values
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let (version, xml_len, was_running, compressed) = (values[0], values[1], values[2], values[3]);
        if version != Self::VERSION {
            return Err(MemoryError::UnknownVersion(version));
        }
        if values[4..].len() != Self::UNUSED_VALUES || values[4..].iter().any(|v| *v != 0) {
            return Err(MemoryError::UnusedValues);
        }
        if xml_len == 0 {
            return Err(MemoryError::MissingNul);
        }
        trace!(xml_len, was_running, compressed, "memory header values");

        let mut xml = vec![0u8; xml_len as usize];
        read_exact(&mut reader, &mut xml)?;
        if xml.pop() != Some(0) {
            return Err(MemoryError::MissingNul);
        }
        while xml.last() == Some(&0) {
            xml.pop();
        }
        let xml = String::from_utf8(xml).map_err(|_| MemoryError::Encoding)?;

        Ok(Self {
            version,
            was_running,
            compressed,
            xml,
        })
    }
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), MemoryError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => MemoryError::Truncated,
        _ => MemoryError::Open(e),
    })
}

/// Read the hardware descriptor (libvirt domain XML) embedded in a memory snapshot.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn read_embedded_descriptor<P: AsRef<Path>>(path: P) -> Result<String, MemoryError> {
    debug!("Reading memory snapshot header");
    let file = File::open(path.as_ref())?;
    let header = QemuMemoryHeader::read(BufReader::new(file))?;
    Ok(header.xml)
}

/// Unit of the `<memory>` element of a libvirt domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryUnit {
    Kibibytes,
    Mebibytes,
    Gibibytes,
    /// Unit outside of the recognised set, the value is kept as is
    Other(String),
}

impl MemoryUnit {
    pub fn parse(unit: &str) -> MemoryUnit {
        let unit = unit.to_lowercase();
        match unit.as_str() {
            "mib" | "mb" | "m" => MemoryUnit::Mebibytes,
            "kib" | "kb" | "k" => MemoryUnit::Kibibytes,
            "gib" | "gg" | "g" => MemoryUnit::Gibibytes,
            _ => MemoryUnit::Other(unit),
        }
    }

    /// Convert a value expressed in this unit to mebibytes, truncating.
    pub fn to_mebibytes(&self, value: u64) -> u64 {
        match self {
            MemoryUnit::Kibibytes => value / 1024,
            MemoryUnit::Mebibytes => value,
            MemoryUnit::Gibibytes => value.saturating_mul(1024),
            MemoryUnit::Other(_) => value,
        }
    }
}

/// Extract CPU count and memory size (MiB) from a libvirt domain XML.
///
/// Only `<vcpu>` and `<memory>` elements that are children of the document
/// root (or top-level elements of a bare fragment) are considered, nested
/// elements with the same names such as memory devices are ignored. Returns
/// `None` when either element is absent or unreadable, when the CPU count is 0
/// or when the memory size is below 1 MiB.
pub fn parse_resources(xml: &str) -> Option<HardwareDescriptor> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut depth = 0usize;
    let mut current: Option<Field> = None;
    let mut unit: Option<String> = None;
    let mut vcpu: Option<u32> = None;
    let mut memory: Option<u64> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                current = None;
                if depth <= 2 {
                    match e.name().as_ref() {
                        b"vcpu" if vcpu.is_none() => current = Some(Field::Vcpu),
                        b"memory" if memory.is_none() => {
                            unit = e
                                .try_get_attribute("unit")
                                .ok()
                                .flatten()
                                .and_then(|a| a.unescape_value().ok())
                                .map(|v| v.into_owned());
                            current = Some(Field::Memory);
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(ref t)) => {
                let text = match t.unescape() {
                    Ok(text) => text,
                    Err(_) => return None,
                };
                match current {
                    Some(Field::Vcpu) => vcpu = text.trim().parse().ok(),
                    Some(Field::Memory) => memory = text.trim().parse().ok(),
                    None => {}
                }
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
                current = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("Unable to parse domain XML: {}", e);
                return None;
            }
            _ => {}
        }
    }

    let cpu_count = vcpu.filter(|c| *c > 0)?;
    // libvirt defaults to KiB when no unit is given
    let unit = MemoryUnit::parse(unit.as_deref().unwrap_or("KiB"));
    let memory_size_mb = unit.to_mebibytes(memory?);
    if memory_size_mb == 0 {
        debug!("Memory size below 1 MiB, ignoring it");
        return None;
    }
    Some(HardwareDescriptor::new(cpu_count, memory_size_mb))
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Vcpu,
    Memory,
}
