use crate::output::print_json;
use conductor_core::config::Config;
use maa_driver::emulator::{AddressDiscovery, AdbDiscovery};
use maa_driver::DriverError;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    // An explicit adb from the configuration wins over PATH.
    let adb = Config::load(root)
        .ok()
        .and_then(|c| c.emulators.values().find_map(|e| e.adb_path.clone()));

    let rt = tokio::runtime::Runtime::new()?;
    let found = rt.block_on(AdbDiscovery::new(adb).discover())?;
    let address = found.ok_or(DriverError::AddressUnresolved)?;

    if json {
        print_json(&serde_json::json!({ "address": address }))?;
    } else {
        println!("{address}");
    }
    Ok(())
}
