use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use sysinfo::{DiskKind, Disks};

use super::FilesystemObject;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDiskInfo {
    pub disk_label: String,
    pub disk_name: String,
    pub free_space: u64,
    pub total_size: u64,
    pub drive_type: String,
    pub file_system: String,
    pub ready: bool,
}

/// One mounted volume as seen by the host.
#[derive(Debug, Clone)]
struct Volume {
    label: String,
    mount_point: PathBuf,
    free_space: u64,
    total_size: u64,
    drive_type: String,
    file_system: String,
}

impl Volume {
    fn ready(&self) -> bool {
        self.total_size > 0
    }
}

fn volumes() -> Vec<Volume> {
    let disks = Disks::new_with_refreshed_list();
    let mut seen = HashSet::new();

    disks
        .list()
        .iter()
        .filter(|disk| seen.insert(disk.mount_point().to_path_buf()))
        .map(|disk| {
            let drive_type = if disk.is_removable() {
                "Removable".to_string()
            } else {
                match disk.kind() {
                    DiskKind::HDD => "Fixed (HDD)".to_string(),
                    DiskKind::SSD => "Fixed (SSD)".to_string(),
                    DiskKind::Unknown(_) => "Fixed".to_string(),
                }
            };
            Volume {
                label: disk.name().to_string_lossy().into_owned(),
                mount_point: disk.mount_point().to_path_buf(),
                free_space: disk.available_space(),
                total_size: disk.total_space(),
                drive_type,
                file_system: disk.file_system().to_string_lossy().into_owned(),
            }
        })
        .collect()
}

/// Structured information about every local volume.
pub fn local_disks() -> Vec<RemoteDiskInfo> {
    volumes()
        .into_iter()
        .map(|volume| RemoteDiskInfo {
            ready: volume.ready(),
            disk_label: volume.label,
            disk_name: volume.mount_point.to_string_lossy().into_owned(),
            free_space: volume.free_space,
            total_size: volume.total_size,
            drive_type: volume.drive_type,
            file_system: volume.file_system,
        })
        .collect()
}

/// Ready volumes presented as directories whose size is the free space.
pub fn root_objects() -> Vec<FilesystemObject> {
    volumes()
        .into_iter()
        .filter(Volume::ready)
        .map(|volume| {
            let mut object = FilesystemObject::describe_dir(&volume.mount_point, false);
            object.size = volume.free_space;
            object
        })
        .collect()
}
