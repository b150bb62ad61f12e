use std::path::Path;

/// Read-only view of the local filesystem used while validating a job.
pub trait HostFilesystem {
    fn is_dir(&self, path: &str) -> bool;

    /// Whether `volume` (e.g. `C:`) is a mounted local volume.
    fn is_mount_point(&self, volume: &str) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFilesystem;

impl HostFilesystem for LocalFilesystem {
    fn is_dir(&self, path: &str) -> bool {
        Path::new(path).is_dir()
    }

    fn is_mount_point(&self, volume: &str) -> bool {
        Path::new(&format!("{volume}\\")).is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_filesystem_checks() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        std::fs::write(&file, "content").unwrap();

        let dir = temp_dir.path().to_string_lossy().into_owned();
        let file = file.to_string_lossy().into_owned();
        assert!(LocalFilesystem.is_dir(&dir));
        assert!(!LocalFilesystem.is_dir(&file));
        assert!(!LocalFilesystem.is_dir(&format!("{dir}/missing")));
    }
}
