use anyhow::Result;
use nodewatcher::equipment::{install_device_antenna_fixtures, AntennaStore};
use nodewatcher::generator::{DeviceRegistry, Polarization};
use nodewatcher::LocalStorage;
use serde_json::{json, Value};
use tempfile::TempDir;

#[tokio::test]
async fn test_sync_preserves_annotations_across_reloads() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let registry = DeviceRegistry::with_builtin_devices()?;
    let expected: usize = registry.iter_devices().map(|d| d.antennas.len()).sum();

    let mut store = AntennaStore::load(LocalStorage::new(temp_dir.path())).await?;
    let report = install_device_antenna_fixtures(&registry, &mut store).await?;
    assert_eq!(report.created, expected);
    assert_eq!(report.updated, 0);

    // 模擬管理者在檔案中加上註記
    let path = temp_dir.path().join("antennas.json");
    let mut records: Value = serde_json::from_slice(&std::fs::read(&path)?)?;
    for record in records.as_array_mut().unwrap() {
        if record["internal_for"] == "fon-2100" {
            record["annotations"] = json!({"mounted": "roof"});
        }
    }
    std::fs::write(&path, serde_json::to_vec(&records)?)?;

    let mut store = AntennaStore::load(LocalStorage::new(temp_dir.path())).await?;
    let report = install_device_antenna_fixtures(&registry, &mut store).await?;
    assert_eq!(report.created, 0);
    assert_eq!(report.updated, expected);

    let fonera = registry.find_device("fon-2100")?;
    let antenna = &fonera.antennas[0];
    let record = store.get("fon-2100", &antenna.identifier).unwrap();
    assert_eq!(record.annotations, json!({"mounted": "roof"}));
    assert_eq!(record.polarization, Polarization::Horizontal);
    assert_eq!(record.angle_horizontal, 360);
    assert_eq!(record.angle_vertical, 75);
    assert_eq!(record.name, fonera.name);
    Ok(())
}

#[test]
fn test_builtin_catalogue() {
    let registry = DeviceRegistry::with_builtin_devices().unwrap();

    let pro = registry.device("lede", "ub-uap-ac-pro").unwrap();
    assert!(pro.usb);
    assert_eq!(pro.remap_switch_vlan("openwrt", "sw0", 2).as_deref(), Some("eth0.2"));
    assert!(registry.device("openwrt", "ub-uap-ac-pro").is_err());

    let lr = registry.find_device("ub-uap-lr").unwrap();
    let uap = registry.find_device("ub-uap").unwrap();
    assert_eq!(lr.radios, uap.radios);
    assert_ne!(lr.name, uap.name);
}
