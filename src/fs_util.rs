use std::fs;
use std::io;
use std::path::Path;

use zip::ZipArchive;

use crate::error::ElprisError;

/// Unpacks every entry of `zip_path` into `target_dir`, overwriting files that
/// already exist. Returns the number of files written.
pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<usize, ElprisError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        ElprisError::Filesystem(format!("open zip {}: {err}", zip_path.display()))
    })?;
    let mut archive = ZipArchive::new(file).map_err(|err| ElprisError::Archive(err.to_string()))?;

    fs::create_dir_all(target_dir).map_err(|err| ElprisError::Filesystem(err.to_string()))?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| ElprisError::Archive(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(ElprisError::Archive(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| ElprisError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| ElprisError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| ElprisError::Filesystem(err.to_string()))?;
        // A truncated download fails here on the CRC or length check.
        io::copy(&mut entry, &mut outfile).map_err(|err| ElprisError::Archive(err.to_string()))?;
        written += 1;
    }
    Ok(written)
}

/// Deletes `path` if it exists, so a later read cannot pick up a file left
/// behind by an earlier run.
pub fn remove_stale_file(path: &Path) -> Result<(), ElprisError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ElprisError::Filesystem(format!(
            "remove {}: {err}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_and_overwrites() {
        let temp = tempfile::tempdir().unwrap();
        let zip_path = temp.path().join("file.zip");
        let target = temp.path().join("data");
        write_zip(
            &zip_path,
            &[("prices.csv", &b"new"[..]), ("nested/readme.txt", &b"hi"[..])],
        );

        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("prices.csv"), b"old contents that are longer").unwrap();

        let written = extract_zip(&zip_path, &target).unwrap();
        assert_eq!(written, 2);
        assert_eq!(fs::read(target.join("prices.csv")).unwrap(), b"new");
        assert_eq!(fs::read(target.join("nested/readme.txt")).unwrap(), b"hi");
    }

    #[test]
    fn corrupt_archive_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let zip_path = temp.path().join("file.zip");
        fs::write(&zip_path, b"<html>not a zip</html>").unwrap();

        let result = extract_zip(&zip_path, &temp.path().join("data"));
        assert_matches!(result, Err(ElprisError::Archive(_)));
    }

    #[test]
    fn removing_a_stale_file_tolerates_absence() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("EVIEW_Price.csv");
        fs::write(&path, b"old").unwrap();

        remove_stale_file(&path).unwrap();
        assert!(!path.exists());
        remove_stale_file(&path).unwrap();
    }

    #[test]
    fn missing_archive_is_a_filesystem_error() {
        let temp = tempfile::tempdir().unwrap();
        let result = extract_zip(&temp.path().join("absent.zip"), temp.path());
        assert_matches!(result, Err(ElprisError::Filesystem(_)));
    }
}
