pub mod disks;
pub mod object;

#[cfg(test)]
mod tests;

pub use disks::{local_disks, root_objects, RemoteDiskInfo};
pub use object::{
    file_sha256, human_readable_size, list_directory, recursive_size, remove_path, DescribeOptions,
    FilesystemObject, ObjectType,
};
