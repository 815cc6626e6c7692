//! Guide command implementation.

use anyhow::Result;
use serde_json::Value;

use iotdash_types::{Device, DeviceTree, SwitchState};

/// Build the example database document for a device tree stored at
/// `tree_path`.
pub fn guide_document(tree_path: &str) -> Result<Value> {
    let mut devices = DeviceTree::new();
    devices.insert(
        "lamp",
        Device::Switch {
            value: SwitchState::On,
        },
    );
    devices.insert("ceiling_fan", Device::dimmer(1024.0, "RPM").with_value(512.0));
    devices.insert("humidity", Device::sensor(100.0, "%").with_value(45.0));

    let document = tree_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .rev()
        .fold(devices.to_json()?, |child, segment| {
            let mut map = serde_json::Map::new();
            map.insert(segment.to_string(), child);
            Value::Object(map)
        });
    Ok(document)
}

/// Print the JSON shape the dashboard expects.
pub fn cmd_guide(tree_path: &str) -> Result<()> {
    let document = guide_document(tree_path)?;

    println!("Devices live under `{}` as a map of key to device.", tree_path);
    println!();
    println!("  switch  value: 0 or 1");
    println!("  dimmer  value, upper_limit (default 1024), unit (default RPM)");
    println!("  sensor  value, upper_limit (default 100), unit (default %)");
    println!();
    println!("Entries that do not match one of these shapes are ignored.");
    println!();
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_guide_document_nests_under_tree_path() {
        let document = guide_document("iot/monitoring").unwrap();
        let devices = &document["iot"]["monitoring"];
        assert_eq!(devices["lamp"], json!({"type": "switch", "value": 1}));
        assert_eq!(devices["ceiling_fan"]["type"], "dimmer");
        assert_eq!(devices["humidity"]["unit"], "%");
    }

    #[test]
    fn test_guide_document_ignores_extra_slashes() {
        let document = guide_document("/home//devices/").unwrap();
        assert!(document["home"]["devices"]["lamp"].is_object());
    }

    #[test]
    fn test_guide_document_decodes_cleanly() {
        let document = guide_document("a").unwrap();
        let (tree, skipped) = DeviceTree::from_json(document["a"].clone());
        assert_eq!(tree.len(), 3);
        assert!(skipped.is_empty());
    }
}
