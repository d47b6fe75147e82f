use crate::config::{FilenameTemplate, MetadataKeyPath};
use crate::types::{SamplingError, SamplingResult, SceneId};
use flate2::read::GzDecoder;
use regex::Regex;
use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::Archive;
use zip::ZipArchive;

/// Resolves the scene's scalar attribute (sun elevation by default)
pub trait SceneMetadataLookup {
    fn lookup(&self, scene: &SceneId) -> SamplingResult<f64>;
}

/// Reads the attribute from a JSON document inside a per-scene archive.
///
/// Archives may be `.tar`, `.tar.gz`/`.tgz` or `.zip`; the archive and the
/// member are located with wildcard templates.
#[derive(Debug, Clone)]
pub struct ArchiveMetadataLookup {
    archive_root: PathBuf,
    archive_template: FilenameTemplate,
    member_template: FilenameTemplate,
    key_path: MetadataKeyPath,
}

impl ArchiveMetadataLookup {
    pub fn new(
        archive_root: PathBuf,
        archive_template: FilenameTemplate,
        member_template: FilenameTemplate,
        key_path: MetadataKeyPath,
    ) -> Self {
        Self {
            archive_root,
            archive_template,
            member_template,
            key_path,
        }
    }

    /// First archive (by name) matching the scene's rendered template
    pub fn find_archive(&self, scene: &SceneId) -> SamplingResult<PathBuf> {
        let rendered = self.archive_template.render(scene)?;
        let relative = Path::new(&rendered);
        let (dir, name) = match (relative.parent(), relative.file_name()) {
            (Some(parent), Some(name)) => (self.archive_root.join(parent), name.to_string_lossy()),
            _ => {
                return Err(SamplingError::Configuration(format!(
                    "Archive template '{}' has no file name",
                    self.archive_template.as_str()
                )))
            }
        };

        if !self.archive_template.has_wildcards() {
            let candidate = dir.join(&*name);
            return if candidate.is_file() {
                Ok(candidate)
            } else {
                Err(SamplingError::MissingInput(format!(
                    "Metadata archive not found: {}",
                    candidate.display()
                )))
            };
        }

        let pattern = FilenameTemplate::name_pattern(&name)?;
        let mut matches: Vec<PathBuf> = match std::fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .filter(|p| {
                    p.file_name()
                        .map(|n| pattern.is_match(&n.to_string_lossy()))
                        .unwrap_or(false)
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        matches.sort();

        if matches.len() > 1 {
            log::warn!(
                "{} archives match {} for scene {}, using {}",
                matches.len(),
                name,
                scene,
                matches[0].display()
            );
        }

        matches.into_iter().next().ok_or_else(|| {
            SamplingError::MissingInput(format!(
                "No metadata archive matching {} in {}",
                name,
                dir.display()
            ))
        })
    }

    /// Contents of the first member whose file name matches `pattern`
    pub fn read_member(archive_path: &Path, pattern: &Regex) -> SamplingResult<String> {
        let name = archive_path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let found = if name.ends_with(".zip") {
            Self::read_zip_member(archive_path, pattern)?
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            let file = File::open(archive_path)?;
            Self::read_tar_member(Archive::new(GzDecoder::new(file)), pattern)?
        } else if name.ends_with(".tar") {
            let file = File::open(archive_path)?;
            Self::read_tar_member(Archive::new(file), pattern)?
        } else {
            return Err(SamplingError::Metadata(format!(
                "Unsupported archive format: {}",
                archive_path.display()
            )));
        };

        found.ok_or_else(|| {
            SamplingError::MissingInput(format!(
                "No member matching {} in {}",
                pattern.as_str(),
                archive_path.display()
            ))
        })
    }

    fn member_matches(member: &str, pattern: &Regex) -> bool {
        let file_name = member.rsplit(['/', '\\']).next().unwrap_or(member);
        pattern.is_match(file_name)
    }

    fn read_tar_member<R: Read>(
        mut archive: Archive<R>,
        pattern: &Regex,
    ) -> SamplingResult<Option<String>> {
        for entry in archive.entries()? {
            let mut entry = entry?;
            let member = entry.path()?.to_string_lossy().into_owned();
            if Self::member_matches(&member, pattern) {
                let mut contents = String::new();
                entry.read_to_string(&mut contents)?;
                log::debug!("Read metadata member {}", member);
                return Ok(Some(contents));
            }
        }
        Ok(None)
    }

    fn read_zip_member(archive_path: &Path, pattern: &Regex) -> SamplingResult<Option<String>> {
        let file = File::open(archive_path)?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| SamplingError::Metadata(format!("Failed to open ZIP: {}", e)))?;

        for i in 0..archive.len() {
            let mut member = archive
                .by_index(i)
                .map_err(|e| SamplingError::Metadata(format!("Failed to access file {}: {}", i, e)))?;
            let name = member.name().to_string();
            if Self::member_matches(&name, pattern) {
                let mut contents = String::new();
                member.read_to_string(&mut contents)?;
                log::debug!("Read metadata member {}", name);
                return Ok(Some(contents));
            }
        }
        Ok(None)
    }

    /// Follow `key_path` and coerce the leaf to f64 (numbers or numeric strings)
    pub fn extract_scalar(document: &str, key_path: &MetadataKeyPath) -> SamplingResult<f64> {
        let root: Value = serde_json::from_str(document)
            .map_err(|e| SamplingError::Metadata(format!("Invalid metadata JSON: {}", e)))?;

        let mut node = &root;
        for key in &key_path.0 {
            node = node.get(key).ok_or_else(|| {
                SamplingError::MissingInput(format!(
                    "Metadata key '{}' not found (path {})",
                    key, key_path
                ))
            })?;
        }

        let value = match node {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        value.ok_or_else(|| {
            SamplingError::Metadata(format!(
                "Metadata value at {} is not numeric: {}",
                key_path, node
            ))
        })
    }
}

impl SceneMetadataLookup for ArchiveMetadataLookup {
    fn lookup(&self, scene: &SceneId) -> SamplingResult<f64> {
        let archive_path = self.find_archive(scene)?;
        let member_name = self.member_template.render(scene)?;
        let pattern = FilenameTemplate::name_pattern(&member_name)?;

        let document = Self::read_member(&archive_path, &pattern)?;
        let value = Self::extract_scalar(&document, &self.key_path)?;
        log::debug!("Scene {}: {} = {}", scene, self.key_path, value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    const MTL: &str = r#"{"LANDSAT_METADATA_FILE": {"IMAGE_ATTRIBUTES": {"SUN_ELEVATION": "21.53649038"}}}"#;

    fn scene() -> SceneId {
        SceneId {
            path: "001".to_string(),
            row: "113".to_string(),
            doy_date: "2020045".to_string(),
            date: NaiveDate::from_yo_opt(2020, 45).unwrap(),
        }
    }

    fn tar_bytes<W: Write>(writer: W, members: &[(&str, &str)]) -> W {
        let mut builder = tar::Builder::new(writer);
        for (name, body) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, body.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn lookup(root: &Path, archive_template: &str) -> ArchiveMetadataLookup {
        ArchiveMetadataLookup::new(
            root.to_path_buf(),
            FilenameTemplate::new(archive_template),
            FilenameTemplate::new("LC08_L1GT_{path}{row}_{ymd_date}_*_02_T2_MTL.json"),
            MetadataKeyPath::default(),
        )
    }

    #[test]
    fn test_extract_scalar() {
        let key = MetadataKeyPath::default();
        assert_eq!(ArchiveMetadataLookup::extract_scalar(MTL, &key).unwrap(), 21.53649038);

        let numeric = r#"{"LANDSAT_METADATA_FILE": {"IMAGE_ATTRIBUTES": {"SUN_ELEVATION": 12.5}}}"#;
        assert_eq!(ArchiveMetadataLookup::extract_scalar(numeric, &key).unwrap(), 12.5);

        let missing = r#"{"LANDSAT_METADATA_FILE": {"IMAGE_ATTRIBUTES": {}}}"#;
        let err = ArchiveMetadataLookup::extract_scalar(missing, &key).unwrap_err();
        assert!(matches!(err, SamplingError::MissingInput(_)));

        let text = r#"{"LANDSAT_METADATA_FILE": {"IMAGE_ATTRIBUTES": {"SUN_ELEVATION": "high"}}}"#;
        assert!(ArchiveMetadataLookup::extract_scalar(text, &key).is_err());
    }

    #[test]
    fn test_lookup_from_tar() {
        let dir = TempDir::new().unwrap();
        let archive_dir = dir.path().join("p001_r113/earthexplorer");
        std::fs::create_dir_all(&archive_dir).unwrap();

        let file = File::create(archive_dir.join("LC08_L1GT_001113_20200214_20200225_02_T2.tar")).unwrap();
        tar_bytes(
            file,
            &[
                ("LC08_L1GT_001113_20200214_20200225_02_T2_B8.TIF", "not a tiff"),
                ("LC08_L1GT_001113_20200214_20200225_02_T2_MTL.json", MTL),
            ],
        );

        let lookup = lookup(
            dir.path(),
            "p{path}_r{row}/earthexplorer/LC08_L1GT_{path}{row}_{ymd_date}_*_02_T2.tar",
        );
        assert_eq!(lookup.lookup(&scene()).unwrap(), 21.53649038);
    }

    #[test]
    fn test_lookup_from_tar_gz_and_zip() {
        let dir = TempDir::new().unwrap();

        let gz = File::create(dir.path().join("LC08_L1GT_001113_20200214_20200225_02_T2.tar.gz")).unwrap();
        let encoder = tar_bytes(
            GzEncoder::new(gz, Compression::default()),
            &[("LC08_L1GT_001113_20200214_20200225_02_T2_MTL.json", MTL)],
        );
        encoder.finish().unwrap();

        let gz_lookup = lookup(dir.path(), "LC08_L1GT_{path}{row}_{ymd_date}_*_02_T2.tar.gz");
        assert_eq!(gz_lookup.lookup(&scene()).unwrap(), 21.53649038);

        let zip_file = File::create(dir.path().join("scene_001113.zip")).unwrap();
        let mut writer = zip::ZipWriter::new(zip_file);
        writer
            .start_file(
                "nested/LC08_L1GT_001113_20200214_20200225_02_T2_MTL.json",
                zip::write::FileOptions::default(),
            )
            .unwrap();
        writer.write_all(MTL.as_bytes()).unwrap();
        writer.finish().unwrap();

        let zip_lookup = lookup(dir.path(), "scene_{path}{row}.zip");
        assert_eq!(zip_lookup.lookup(&scene()).unwrap(), 21.53649038);
    }

    #[test]
    fn test_missing_archive_and_member() {
        let dir = TempDir::new().unwrap();
        let lookup = lookup(dir.path(), "p{path}_r{row}/LC08_*_T2.tar");
        let err = lookup.lookup(&scene()).unwrap_err();
        assert!(matches!(err, SamplingError::MissingInput(_)));

        let path = dir.path().join("empty.tar");
        tar_bytes(File::create(&path).unwrap(), &[("README.txt", "nothing here")]);
        let pattern = FilenameTemplate::name_pattern("*_MTL.json").unwrap();
        let err = ArchiveMetadataLookup::read_member(&path, &pattern).unwrap_err();
        assert!(matches!(err, SamplingError::MissingInput(_)));
    }
}
