//! Directory listings from a git checkout
//!
//! Production implementation of the `RevisionControl` contract. Uses a git
//! subprocess for maximum compatibility: one `ls-tree` invocation resolves
//! a whole batch of directories, and the output is partitioned back into
//! per-directory listings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{ConvertError, Result};
use crate::existence::RevisionControl;

/// Lists directories by shelling out to `git ls-tree` in a local checkout.
pub struct GitCli {
    repo: PathBuf,
}

impl GitCli {
    pub fn new(repo: &Path) -> GitCli {
        GitCli {
            repo: repo.to_path_buf(),
        }
    }

    fn git_command(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo)
            .output()
            .map_err(|e| ConvertError::Git {
                message: format!("failed to execute git: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConvertError::Git {
                message: format!("git {} failed: {}", args.join(" "), stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl RevisionControl for GitCli {
    fn list_directory(
        &self,
        commit: &str,
        dirnames: &[String],
    ) -> Result<BTreeMap<String, Vec<String>>> {
        if dirnames.is_empty() {
            return Ok(BTreeMap::new());
        }

        let mut args = vec!["ls-tree".to_string(), "--name-only".to_string()];
        args.push(commit.to_string());
        args.push("--".to_string());
        for dirname in dirnames {
            if dirname.is_empty() {
                args.push(".".to_string());
            } else {
                // A trailing slash makes ls-tree list the directory's
                // entries rather than the directory itself.
                args.push(format!("{}/", dirname.trim_end_matches('/')));
            }
        }

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let stdout = self.git_command(&arg_refs)?;
        let entries: Vec<&str> = stdout
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .collect();

        // ls-tree reports every requested directory's entries in one list;
        // partition them back by prefix.
        let mut listings = BTreeMap::new();
        for dirname in dirnames {
            let children: Vec<String> = if dirname.is_empty() {
                entries
                    .iter()
                    .filter(|entry| !entry.contains('/'))
                    .map(|entry| entry.to_string())
                    .collect()
            } else {
                let prefix = format!("{}/", dirname.trim_end_matches('/'));
                entries
                    .iter()
                    .filter(|entry| entry.starts_with(&prefix))
                    .map(|entry| entry.to_string())
                    .collect()
            };

            listings.insert(dirname.clone(), children);
        }

        Ok(listings)
    }
}
