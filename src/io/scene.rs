use crate::types::{SamplingResult, SceneId};
use chrono::NaiveDate;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// A discovered scene directory and the identity parsed from its name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Scene {
    pub id: SceneId,
    pub directory: PathBuf,
}

fn pathrow_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^.*P([0-9]{3})R([0-9]{3})_([0-9]{7})$").expect("static scene pattern is valid")
    })
}

/// Enumerates `...P<path>R<row>_<YYYYDDD>` directories
pub struct SceneDiscovery;

impl SceneDiscovery {
    /// Parse a directory name. Names that don't match, or whose date token is
    /// not a real year + day-of-year, give `None`.
    pub fn parse_name(name: &str) -> Option<SceneId> {
        let caps = pathrow_pattern().captures(name)?;
        let doy_date = caps[3].to_string();
        let year: i32 = doy_date.get(..4)?.parse().ok()?;
        let ordinal: u32 = doy_date.get(4..)?.parse().ok()?;

        let date = match NaiveDate::from_yo_opt(year, ordinal) {
            Some(date) => date,
            None => {
                log::debug!("Ignoring {}: {} is not a valid day of year", name, doy_date);
                return None;
            }
        };

        Some(SceneId {
            path: caps[1].to_string(),
            row: caps[2].to_string(),
            doy_date,
            date,
        })
    }

    /// Scene directories directly under `base`, sorted by directory path
    pub fn discover<P: AsRef<Path>>(base: P) -> SamplingResult<Vec<Scene>> {
        let base = base.as_ref();
        let mut scenes = Vec::new();

        for entry in std::fs::read_dir(base)? {
            let entry = entry?;
            let directory = entry.path();
            if !directory.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            match Self::parse_name(&name) {
                Some(id) => scenes.push(Scene { id, directory }),
                None => log::trace!("Skipping non-scene directory {}", name),
            }
        }

        scenes.sort_by(|a, b| a.directory.cmp(&b.directory));
        log::info!("Discovered {} scene directories in {}", scenes.len(), base.display());
        Ok(scenes)
    }
}
