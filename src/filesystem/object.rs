use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{HostBoxError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ObjectType {
    File,
    Directory,
    Unknown,
}

/// How much work `describe_with` does beyond reading metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescribeOptions {
    /// Stream the file through SHA-256.
    pub compute_hash: bool,
    /// Walk the directory tree and sum file lengths.
    pub dir_size: bool,
}

/// Snapshot of a file or directory taken from a live path lookup.
///
/// Built fresh for each request. `move_to` and `remove` update the snapshot in
/// place so it keeps describing the object after the operation.
#[derive(Debug, Clone)]
pub struct FilesystemObject {
    pub name: String,
    pub full_path: PathBuf,
    pub size: u64,
    pub object_type: ObjectType,
    pub hash_calculated: bool,
    pub sha256: Option<String>,
    pub last_write: Option<DateTime<Local>>,
    pub creation_time: Option<DateTime<Local>>,
}

impl FilesystemObject {
    /// Describe `path`. Directories carry their recursive size, files carry a
    /// digest when `compute_hash` is set. Never fails: a missing path yields an
    /// `Unknown` object.
    pub fn describe(path: impl AsRef<Path>, compute_hash: bool) -> Self {
        Self::describe_with(
            path,
            DescribeOptions {
                compute_hash,
                dir_size: true,
            },
        )
    }

    pub fn describe_with(path: impl AsRef<Path>, options: DescribeOptions) -> Self {
        let path = path.as_ref();
        if path.is_dir() {
            Self::describe_dir(path, options.dir_size)
        } else {
            Self::describe_file(path, options.compute_hash)
        }
    }

    pub fn describe_file(path: impl AsRef<Path>, compute_hash: bool) -> Self {
        let path = path.as_ref();
        let mut object = Self::unknown(path);

        let metadata = match fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return object,
        };

        object.object_type = ObjectType::File;
        object.size = metadata.len();
        object.set_times(&metadata);

        if compute_hash {
            match file_sha256(path) {
                Ok(digest) => {
                    object.sha256 = Some(digest);
                    object.hash_calculated = true;
                }
                Err(e) => debug!("Hash of {} skipped: {}", path.display(), e),
            }
        }

        object
    }

    pub fn describe_dir(path: impl AsRef<Path>, with_size: bool) -> Self {
        let path = path.as_ref();
        let mut object = Self::unknown(path);

        let metadata = match fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => metadata,
            _ => return object,
        };

        object.object_type = ObjectType::Directory;
        object.set_times(&metadata);
        if with_size {
            object.size = recursive_size(path);
        }

        object
    }

    fn unknown(path: &Path) -> Self {
        let full_path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Self {
            name: object_name(&full_path),
            full_path,
            size: 0,
            object_type: ObjectType::Unknown,
            hash_calculated: false,
            sha256: None,
            last_write: None,
            creation_time: None,
        }
    }

    fn set_times(&mut self, metadata: &fs::Metadata) {
        self.last_write = metadata.modified().ok().map(local_time);
        self.creation_time = metadata.created().ok().map(local_time);
    }

    pub fn exists(&self) -> bool {
        self.object_type != ObjectType::Unknown
    }

    /// True only when both sides are files with computed, equal digests.
    pub fn compare_with(&self, other: &FilesystemObject) -> bool {
        self.object_type == ObjectType::File
            && other.object_type == ObjectType::File
            && self.hash_calculated
            && other.hash_calculated
            && self.sha256.is_some()
            && self.sha256 == other.sha256
    }

    /// Copy to `dest`. Directories are copied recursively; with `overwrite`
    /// unset any existing destination file fails the copy. A failure partway
    /// leaves whatever was already copied in place.
    pub fn copy_to(
        &self,
        dest: impl AsRef<Path>,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let dest = dest.as_ref();
        match self.object_type {
            ObjectType::Unknown => Err(self.not_found()),
            ObjectType::File => copy_file(&self.full_path, dest, overwrite),
            ObjectType::Directory => copy_dir(&self.full_path, dest, overwrite, cancel),
        }
    }

    /// Rename to `dest` and refresh path, name and timestamps.
    pub fn move_to(&mut self, dest: impl AsRef<Path>) -> Result<()> {
        let dest = dest.as_ref();
        if !self.exists() {
            return Err(self.not_found());
        }
        if dest.exists() {
            return Err(HostBoxError::already_exists(format!(
                "Destination already exists: {}",
                dest.display()
            )));
        }

        fs::rename(&self.full_path, dest).map_err(|e| HostBoxError::at(&self.full_path, e))?;

        let full_path = std::path::absolute(dest).unwrap_or_else(|_| dest.to_path_buf());
        self.name = object_name(&full_path);
        self.full_path = full_path;
        if let Ok(metadata) = fs::metadata(&self.full_path) {
            self.set_times(&metadata);
        }
        Ok(())
    }

    /// Delete the object (recursively for directories) and mark it `Unknown`.
    pub fn remove(&mut self, cancel: &CancellationToken) -> Result<()> {
        remove_path(&self.full_path, cancel)?;
        self.object_type = ObjectType::Unknown;
        Ok(())
    }

    pub fn human_readable_size(&self) -> String {
        human_readable_size(self.size)
    }

    fn not_found(&self) -> HostBoxError {
        HostBoxError::not_found(format!("Object not found: {}", self.full_path.display()))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FilesystemObjectWire<'a> {
    name: &'a str,
    full_path: String,
    size: u64,
    human_readable_size: String,
    object_type: ObjectType,
    hash_calculated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha256: Option<&'a str>,
    last_write: Option<DateTime<Local>>,
    creation_time: Option<DateTime<Local>>,
}

impl Serialize for FilesystemObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        FilesystemObjectWire {
            name: &self.name,
            full_path: self.full_path.to_string_lossy().into_owned(),
            size: self.size,
            human_readable_size: self.human_readable_size(),
            object_type: self.object_type,
            hash_calculated: self.hash_calculated,
            sha256: self.sha256.as_deref().filter(|_| self.hash_calculated),
            last_write: self.last_write,
            creation_time: self.creation_time,
        }
        .serialize(serializer)
    }
}

/// Sum of every file length below `dir`. Entries that cannot be read are
/// skipped; symlinked directories are not followed.
pub fn recursive_size(dir: impl AsRef<Path>) -> u64 {
    let entries = match fs::read_dir(dir.as_ref()) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let mut total = 0u64;
    for entry in entries.flatten() {
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(_) => continue,
        };
        if file_type.is_dir() {
            total = total.saturating_add(recursive_size(entry.path()));
        } else if let Ok(metadata) = fs::metadata(entry.path()) {
            if metadata.is_file() {
                total = total.saturating_add(metadata.len());
            }
        }
    }
    total
}

/// Entries of `dir`: subdirectories first, then files, each group by name.
/// Directories are sized only when `options.dir_size` is set.
pub fn list_directory(dir: impl AsRef<Path>, options: DescribeOptions) -> Result<Vec<FilesystemObject>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(HostBoxError::not_found("Object is not exists or not directory"));
    }

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| HostBoxError::at(dir, e))? {
        let entry = entry.map_err(|e| HostBoxError::at(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        } else {
            files.push(path);
        }
    }
    dirs.sort();
    files.sort();

    let mut objects: Vec<FilesystemObject> = dirs
        .iter()
        .map(|path| FilesystemObject::describe_dir(path, options.dir_size))
        .collect();
    objects.extend(
        files
            .iter()
            .map(|path| FilesystemObject::describe_file(path, options.compute_hash)),
    );
    Ok(objects)
}

/// Streaming SHA-256 of a file, lowercase hex.
pub fn file_sha256(path: impl AsRef<Path>) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Delete a file, or a directory's files, then its subdirectories, then the
/// directory itself.
pub fn remove_path(path: impl AsRef<Path>, cancel: &CancellationToken) -> Result<()> {
    let path = path.as_ref();
    let metadata = fs::symlink_metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => {
            HostBoxError::not_found(format!("Object not found: {}", path.display()))
        }
        _ => HostBoxError::at(path, e),
    })?;

    if metadata.is_dir() {
        remove_dir(path, cancel)
    } else {
        fs::remove_file(path).map_err(|e| HostBoxError::at(path, e))
    }
}

fn remove_dir(dir: &Path, cancel: &CancellationToken) -> Result<()> {
    let mut subdirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| HostBoxError::at(dir, e))? {
        if cancel.is_cancelled() {
            return Err(HostBoxError::Cancelled);
        }
        let entry = entry.map_err(|e| HostBoxError::at(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| HostBoxError::at(&path, e))?;
        if file_type.is_dir() {
            subdirs.push(path);
        } else {
            fs::remove_file(&path).map_err(|e| HostBoxError::at(&path, e))?;
        }
    }

    for subdir in subdirs {
        remove_dir(&subdir, cancel)?;
    }

    fs::remove_dir(dir).map_err(|e| HostBoxError::at(dir, e))
}

fn copy_file(src: &Path, dest: &Path, overwrite: bool) -> Result<()> {
    if !overwrite && dest.exists() {
        return Err(HostBoxError::already_exists(format!(
            "The file '{}' already exists",
            dest.display()
        )));
    }
    fs::copy(src, dest).map_err(|e| HostBoxError::at(src, e))?;
    Ok(())
}

fn copy_dir(src: &Path, dest: &Path, overwrite: bool, cancel: &CancellationToken) -> Result<()> {
    fs::create_dir_all(dest).map_err(|e| HostBoxError::at(dest, e))?;

    let mut subdirs = Vec::new();
    for entry in fs::read_dir(src).map_err(|e| HostBoxError::at(src, e))? {
        if cancel.is_cancelled() {
            return Err(HostBoxError::Cancelled);
        }
        let entry = entry.map_err(|e| HostBoxError::at(src, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| HostBoxError::at(&path, e))?;
        if file_type.is_dir() {
            subdirs.push((path, entry.file_name()));
        } else if file_type.is_symlink() && path.is_dir() {
            // Linked directories are left out of the copy.
            debug!("Skipping directory link {}", path.display());
        } else {
            copy_file(&path, &dest.join(entry.file_name()), overwrite)?;
        }
    }

    for (path, name) in subdirs {
        copy_dir(&path, &dest.join(name), overwrite, cancel)?;
    }
    Ok(())
}

fn object_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn local_time(time: SystemTime) -> DateTime<Local> {
    DateTime::<Local>::from(time)
}

pub fn human_readable_size(size: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];

    if size < 1024 {
        return format!("{size} B");
    }

    let mut value = size as f64;
    let mut unit = UNITS[0];
    for candidate in UNITS {
        value /= 1024.0;
        unit = candidate;
        if value < 1024.0 {
            break;
        }
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {unit}")
}
