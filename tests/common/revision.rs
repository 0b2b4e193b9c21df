//! In-memory stand-in for the revision-control collaborator

use std::collections::BTreeMap;

use lsif_bundler::existence::RevisionControl;
use lsif_bundler::Result;

/// Serves directory listings from a fixed map. Directories not present in
/// the map do not exist at the "commit".
pub struct FakeRevisionControl {
    listings: BTreeMap<String, Vec<String>>,
}

impl FakeRevisionControl {
    pub fn new(listings: &[(&str, &[&str])]) -> FakeRevisionControl {
        FakeRevisionControl {
            listings: listings
                .iter()
                .map(|(dir, entries)| {
                    (
                        dir.to_string(),
                        entries.iter().map(|entry| entry.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }

    /// A tree with the given files at the repository root.
    pub fn with_root_files(files: &[&str]) -> FakeRevisionControl {
        let mut listings = BTreeMap::new();
        listings.insert(
            String::new(),
            files.iter().map(|file| file.to_string()).collect(),
        );
        FakeRevisionControl { listings }
    }
}

impl RevisionControl for FakeRevisionControl {
    fn list_directory(
        &self,
        _commit: &str,
        dirnames: &[String],
    ) -> Result<BTreeMap<String, Vec<String>>> {
        Ok(dirnames
            .iter()
            .filter_map(|dirname| {
                self.listings
                    .get(dirname)
                    .map(|entries| (dirname.clone(), entries.clone()))
            })
            .collect())
    }
}
