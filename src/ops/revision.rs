//! Source revision tag.
//!
//! The tag is a local version suffix such as `+3f2a1bc`, taken from the
//! commit checked out in the project. Outside a repository, or when HEAD
//! cannot be read, the tag is empty.

use std::path::Path;

use git2::Repository;

/// Revision tag for the repository containing `project_root`.
pub fn revision_tag(project_root: &Path) -> String {
    match short_head_id(project_root) {
        Ok(id) => format!("+{}", id),
        Err(e) => {
            tracing::debug!("no revision tag: {}", e.message());
            String::new()
        }
    }
}

fn short_head_id(project_root: &Path) -> Result<String, git2::Error> {
    let repo = Repository::discover(project_root)?;
    let commit = repo.head()?.peel_to_commit()?;
    let short = commit.as_object().short_id()?;
    Ok(short.as_str().unwrap_or_default().to_string())
}
