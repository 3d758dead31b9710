use crate::model::{DeviceRef, RigSnapshot};

/// Finds the device to track: the first device, in rig-then-device order,
/// whose type matches `brand` and which is not disabled.
pub fn locate_device(snapshot: &RigSnapshot, brand: &str) -> Option<DeviceRef> {
    snapshot
        .mining_rigs
        .iter()
        .enumerate()
        .flat_map(|(rig_idx, rig)| {
            rig.devices
                .iter()
                .enumerate()
                .map(move |(device_idx, device)| {
                    (
                        DeviceRef {
                            rig: rig_idx,
                            device: device_idx,
                        },
                        device,
                    )
                })
        })
        .find(|(_, device)| device.device_type.enum_name == brand && !device.is_disabled())
        .map(|(at, _)| at)
}
