use crate::io::collection::Collection;
use crate::types::{Match, ValResult, ValidationError};
use std::collections::HashMap;
use std::path::PathBuf;

/// Join two collections on exact acquisition-date equality
///
/// The result follows the reference collection's timestamp order. Each
/// reference date binds at most one candidate product, the first occurrence of
/// that date on the candidate side; duplicate candidate dates are never
/// revisited. A reference date with no candidate counterpart fails the whole
/// join.
pub fn find_matching(reference: &Collection, candidate: &Collection) -> ValResult<Vec<Match>> {
    log::debug!(
        "Matching {} reference against {} candidate timestamps",
        reference.timestamps.len(),
        candidate.timestamps.len()
    );

    let mut index: HashMap<&str, &PathBuf> = HashMap::new();
    for (locator, date) in &candidate.timestamps {
        index.entry(date.as_str()).or_insert(locator);
    }

    let mut matches = Vec::with_capacity(reference.timestamps.len());
    for (locator, date) in &reference.timestamps {
        let bound = index.get(date.as_str()).ok_or_else(|| {
            ValidationError::Lookup(format!(
                "No candidate product matches date {} of {}",
                date,
                locator.display()
            ))
        })?;
        log::info!(
            "Found matching for {} between {} and {}",
            date,
            locator.display(),
            bound.display()
        );
        matches.push(Match {
            timestamp: date.clone(),
            reference: locator.clone(),
            candidate: (*bound).clone(),
        });
    }

    log::info!("Collections have {} products matching in dates", matches.len());
    Ok(matches)
}

/// The ordered match list of a reference/candidate collection pair
#[derive(Debug, Clone)]
pub struct Comparison {
    pub matches: Vec<Match>,
}

impl Comparison {
    pub fn new(reference: &Collection, candidate: &Collection) -> ValResult<Self> {
        Ok(Self {
            matches: find_matching(reference, candidate)?,
        })
    }
}
