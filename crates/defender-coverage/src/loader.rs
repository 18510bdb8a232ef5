//! Satellite catalog loading from CelesTrak JSON (OMM) files

use crate::{BodyId, Candidate, CatalogId, CoverageError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info, warn};

/// The two fields every catalog record must carry
#[derive(Debug, Deserialize)]
struct RawCatalogRecord {
    #[serde(rename = "OBJECT_NAME")]
    object_name: Option<String>,
    #[serde(rename = "NORAD_CAT_ID")]
    norad_cat_id: Option<u64>,
}

/// Ordered name -> catalog id mapping, with orbital elements when the
/// records carry them.
///
/// Order is file order and is the tie-break priority of the coverage search.
/// A name that appears twice keeps its first position and takes the later
/// record's id.
#[derive(Default)]
pub struct Catalog {
    candidates: Vec<Candidate>,
    elements: Vec<Option<sgp4::Elements>>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<CatalogId, usize>,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("len", &self.candidates.len())
            .field(
                "with_elements",
                &self.elements.iter().filter(|e| e.is_some()).count(),
            )
            .field(
                "names",
                &self.candidates.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Catalog {
    /// Build a catalog from candidates that have no orbital elements
    pub fn from_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        let mut catalog = Catalog::default();
        for candidate in candidates {
            catalog.push(candidate, None);
        }
        catalog
    }

    /// Append an object, or update it in place when the name is already
    /// known. Returns whether the name was new.
    pub fn push(&mut self, candidate: Candidate, elements: Option<sgp4::Elements>) -> bool {
        match self.by_name.get(&candidate.name) {
            Some(&index) => {
                self.by_id.remove(&self.candidates[index].catalog_id);
                self.by_id.insert(candidate.catalog_id.clone(), index);
                self.candidates[index] = candidate;
                self.elements[index] = elements;
                false
            }
            None => {
                let index = self.candidates.len();
                self.by_name.insert(candidate.name.clone(), index);
                self.by_id.insert(candidate.catalog_id.clone(), index);
                self.candidates.push(candidate);
                self.elements.push(elements);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// All candidates in catalog order
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn get(&self, name: &str) -> Option<&Candidate> {
        self.by_name.get(name).map(|&i| &self.candidates[i])
    }

    /// Orbital elements for an object, by exact catalog name
    pub fn elements_by_name(&self, name: &str) -> Option<&sgp4::Elements> {
        self.by_name
            .get(name)
            .and_then(|&i| self.elements[i].as_ref())
    }

    /// Orbital elements for a catalog id
    pub fn elements(&self, catalog_id: &CatalogId) -> Option<&sgp4::Elements> {
        self.by_id
            .get(catalog_id)
            .and_then(|&i| self.elements[i].as_ref())
    }

    /// Canonical body names shared by more than one catalog name
    pub fn body_name_collisions(&self) -> Vec<(BodyId, Vec<String>)> {
        let mut by_body: HashMap<BodyId, Vec<String>> = HashMap::new();
        for candidate in &self.candidates {
            by_body
                .entry(candidate.body_id())
                .or_default()
                .push(candidate.name.clone());
        }

        let mut collisions: Vec<_> = by_body
            .into_iter()
            .filter(|(_, names)| names.len() > 1)
            .collect();
        collisions.sort_by(|a, b| a.0.cmp(&b.0));
        collisions
    }
}

/// Load a CelesTrak JSON catalog (e.g. the "Active Satellites" OMM export)
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Catalog> {
    let path = path.as_ref();
    info!("Loading catalog from {:?}", path);

    if !path.is_file() {
        return Err(CoverageError::CatalogNotFound(path.to_path_buf()));
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let records: Vec<serde_json::Value> = serde_json::from_reader(reader)?;

    let mut catalog = Catalog::default();
    let mut skipped = 0;
    let mut duplicates = 0;
    let mut without_elements = 0;

    for record in records {
        let raw: RawCatalogRecord = match serde_json::from_value(record.clone()) {
            Ok(raw) => raw,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        let (name, norad_id) = match (raw.object_name, raw.norad_cat_id) {
            (Some(name), Some(id)) if !name.trim().is_empty() => (name, id),
            _ => {
                skipped += 1;
                continue;
            }
        };

        let elements = match serde_json::from_value::<sgp4::Elements>(record) {
            Ok(elements) => Some(elements),
            Err(e) => {
                debug!("No usable orbital elements for {}: {}", name, e);
                without_elements += 1;
                None
            }
        };

        if !catalog.push(Candidate::new(name, CatalogId::from_norad(norad_id)), elements) {
            duplicates += 1;
        }
    }

    if catalog.is_empty() {
        return Err(CoverageError::EmptyCatalog(path.to_path_buf()));
    }

    for (body, names) in catalog.body_name_collisions() {
        warn!("Catalog names {:?} all map to body {}", names, body);
    }

    info!(
        "Loaded {} catalog objects ({} skipped, {} duplicate names, {} without elements)",
        catalog.len(),
        skipped,
        duplicates,
        without_elements
    );

    Ok(catalog)
}
