use std::collections::HashMap;
use std::fs;
use std::path::Path;

use sgp4::{Constants, Elements};

use crate::orbit::error::OrbitError;

pub struct TleEntry {
    pub name: String,
    pub norad_id: u32,
    pub source: String,
    pub elements: Elements,
    pub constants: Constants,
}

/// Orbital elements keyed by NORAD id.
#[derive(Default)]
pub struct TleCatalog {
    satellites: HashMap<u32, TleEntry>,
}

impl TleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `.tle` / `.txt` file in `dir`. Files that fail to parse
    /// are logged and skipped.
    pub fn load_dir(dir: &Path) -> Result<Self, OrbitError> {
        if !dir.exists() {
            return Err(OrbitError::DirectoryNotFound(dir.display().to_string()));
        }

        let mut catalog = Self::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let is_tle = path
                .extension()
                .is_some_and(|ext| ext == "tle" || ext == "txt");
            if !is_tle {
                continue;
            }

            match parse_tle_file(&path) {
                Ok(entries) => {
                    for tle in entries {
                        catalog.satellites.insert(tle.norad_id, tle);
                    }
                }
                Err(e) => {
                    log::warn!("Failed to parse TLE file {}: {}", path.display(), e);
                }
            }
        }

        log::info!(
            "Loaded {} satellites from {}",
            catalog.len(),
            dir.display()
        );
        Ok(catalog)
    }

    /// Adds or replaces one element set. Returns its NORAD id.
    pub fn insert_tle(
        &mut self,
        name: Option<String>,
        line1: &str,
        line2: &str,
        source: &str,
    ) -> Result<u32, OrbitError> {
        let entry = build_entry(name, line1, line2, source)?;
        let id = entry.norad_id;
        self.satellites.insert(id, entry);
        Ok(id)
    }

    pub fn get(&self, norad_id: u32) -> Option<&TleEntry> {
        self.satellites.get(&norad_id)
    }

    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<_> = self.satellites.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.satellites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.satellites.is_empty()
    }
}

fn parse_tle_file(path: &Path) -> Result<Vec<TleEntry>, OrbitError> {
    let content = fs::read_to_string(path)?;
    let filename = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    parse_multi_tle(&content)
        .into_iter()
        .map(|(name, line1, line2)| build_entry(name, &line1, &line2, &filename))
        .collect()
}

fn build_entry(
    name: Option<String>,
    line1: &str,
    line2: &str,
    source: &str,
) -> Result<TleEntry, OrbitError> {
    let invalid = |message: String| OrbitError::InvalidTle {
        file: source.to_string(),
        message,
    };

    let elements = Elements::from_tle(name.clone(), line1.as_bytes(), line2.as_bytes())
        .map_err(|e| invalid(e.to_string()))?;
    let constants = Constants::from_elements(&elements).map_err(|e| invalid(e.to_string()))?;
    let norad_id = u32::try_from(elements.norad_id)
        .map_err(|_| invalid(format!("NORAD id {} out of range", elements.norad_id)))?;

    Ok(TleEntry {
        name: name.unwrap_or_else(|| format!("NORAD {norad_id}")),
        norad_id,
        source: source.to_string(),
        elements,
        constants,
    })
}

/// Splits text into (name, line1, line2) sets. Accepts both 2-line and
/// 3-line TLE layouts and skips anything else.
pub fn parse_multi_tle(content: &str) -> Vec<(Option<String>, String, String)> {
    let lines: Vec<&str> = content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    let mut result = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if lines[i].starts_with("1 ") && i + 1 < lines.len() && lines[i + 1].starts_with("2 ") {
            result.push((None, lines[i].to_string(), lines[i + 1].to_string()));
            i += 2;
        } else if i + 2 < lines.len()
            && lines[i + 1].starts_with("1 ")
            && lines[i + 2].starts_with("2 ")
        {
            result.push((
                Some(lines[i].to_string()),
                lines[i + 1].to_string(),
                lines[i + 2].to_string(),
            ));
            i += 3;
        } else {
            i += 1;
        }
    }

    result
}
