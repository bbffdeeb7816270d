use std::{env, fs::File, process::exit};

use cloudlet_base::{
    flavor::{flavor_name, FlavorRequirement, DEFAULT_FLAVOR_PREFIX},
    memory::{parse_resources, read_embedded_descriptor},
    package::{extract_paths, is_bundle, minimum_disk_gb, BaseVmPackage},
};
use tracing::info;

/// Print the hardware envelope of a base VM package.
///
/// Usage: `cargo run --example inspect_base -- path/to/base.zip`
fn main() {
    tracing_subscriber::fmt::init();

    let path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: inspect_base <package.zip>");
            exit(2);
        }
    };

    let mut file = File::open(&path).expect("failed to open package");
    if !is_bundle(&mut file) {
        eprintln!("{} is not a zipped base VM", path);
        exit(1);
    }

    let mut package = BaseVmPackage::open(file).expect("failed to open package");
    let manifest = match package.read_manifest().expect("invalid manifest") {
        Some(manifest) => manifest,
        None => {
            eprintln!("{} has no manifest", path);
            exit(1);
        }
    };
    let paths = extract_paths(&manifest).expect("incomplete manifest");
    let workspace = package.unpack(None).expect("failed to unpack package");

    let xml = read_embedded_descriptor(workspace.artifact(&paths.memory).unwrap()).unwrap();
    let hardware = parse_resources(&xml).expect("no CPU or memory in the memory snapshot");
    let disk_gb = minimum_disk_gb(workspace.artifact(&paths.disk).unwrap()).unwrap();
    info!("Base VM {} unpacked in {}", manifest.hash_value, workspace.path().display());

    println!("hash:   {}", manifest.hash_value);
    for (kind, artifact) in paths.iter() {
        println!("{:<7} {}", format!("{}:", kind), artifact);
    }
    println!("needs:  {}", FlavorRequirement::new(&hardware, disk_gb));
    println!("flavor: {}", flavor_name(DEFAULT_FLAVOR_PREFIX, "<name>"));
}
