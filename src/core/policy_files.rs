//! Policy input and rendered output on disk
//!
//! Policies are JSON files holding a [`Policy`]. Rendered documents are
//! written next to the policy (or into an output directory) with the
//! backend suffix, atomically, plus a `.sha256` sidecar so hand edits can be
//! spotted on the next run.

use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::aclgen::Platform;
use crate::core::error::{Error, Result};
use crate::core::policy::Policy;

/// Loads a policy file.
///
/// An unnamed policy takes the file stem as its name.
///
/// # Async
/// Uses `tokio::fs` for non-blocking file I/O.
pub async fn load_policy(path: &Path) -> Result<Policy> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::PolicyFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let mut policy: Policy = serde_json::from_str(&json).map_err(|e| Error::PolicyFile {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    if policy.name.is_empty()
        && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
    {
        policy.name = stem.to_string();
    }

    Ok(policy)
}

/// Where the rendered document for `policy_path` goes.
///
/// `policies/web.json` rendered for iptables becomes `web.ipt`, inside
/// `output_dir` when given, otherwise beside the policy.
pub fn output_path(policy_path: &Path, output_dir: Option<&Path>, platform: Platform) -> PathBuf {
    let stem = policy_path
        .file_stem()
        .map_or_else(|| "policy".into(), |s| s.to_string_lossy().into_owned());
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| policy_path.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{stem}.{}", platform.suffix()))
}

/// Hex SHA-256 of a rendered document.
pub fn checksum(contents: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn checksum_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".sha256");
    PathBuf::from(name)
}

/// Writes a rendered document atomically.
///
/// The text goes to a temporary file in the destination directory which is
/// then renamed over `path`, so readers never see a half-written file. With
/// `write_checksum`, a `<path>.sha256` sidecar follows.
///
/// # Async
/// The blocking temp-file work runs on the tokio blocking pool.
pub async fn write_output(path: &Path, contents: &str, write_checksum: bool) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&dir).await?;

    let target = path.to_path_buf();
    let text = contents.to_string();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut temp = tempfile::Builder::new()
            .prefix(".aclgen-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        temp.write_all(text.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| Error::Io(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(e)))??;

    if write_checksum {
        tokio::fs::write(checksum_path(path), checksum(contents)).await?;
    }
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

/// Reads a previously rendered document, if there is one.
///
/// A sidecar checksum that no longer matches is reported but not fatal; the
/// file may have been edited by hand.
pub async fn read_existing(path: &Path) -> Result<Option<String>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };

    if let Ok(expected) = tokio::fs::read_to_string(checksum_path(path)).await {
        let actual = checksum(&contents);
        if expected.trim() != actual {
            tracing::warn!(
                "{} checksum mismatch (expected: {}, got: {})",
                path.display(),
                expected.trim(),
                actual
            );
        }
    }

    Ok(Some(contents))
}

/// Line diff of `new` against `old`, or `None` when they are identical.
pub fn diff_text(old: &str, new: &str) -> Option<String> {
    use std::fmt::Write as _;
    if old == new {
        return None;
    }

    let diff = similar::TextDiff::from_lines(old, new);
    let mut result = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "- ",
            similar::ChangeTag::Insert => "+ ",
            similar::ChangeTag::Equal => continue,
        };
        let _ = write!(result, "{sign}{change}");
        if change.missing_newline() {
            result.push('\n');
        }
    }
    Some(result)
}

/// Diff of a fresh render against what is on disk at `path`.
///
/// A missing file diffs against the empty document.
pub async fn diff_against_existing(path: &Path, new: &str) -> Result<Option<String>> {
    let old = read_existing(path).await?.unwrap_or_default();
    Ok(diff_text(&old, new))
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY_JSON: &str = r#"{
        "filters": [{
            "header": {"targets": [{"platform": "iptables", "options": ["INPUT", "DROP"]}]},
            "terms": [{"name": "allow-ssh", "action": "accept", "protocol": ["tcp"],
                       "destination_port": [{"start": 22, "end": 22}]}]
        }]
    }"#;

    #[tokio::test]
    async fn test_load_policy_names_from_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edge.json");
        tokio::fs::write(&path, POLICY_JSON).await.unwrap();
        let policy = load_policy(&path).await.unwrap();
        assert_eq!(policy.name, "edge");
        assert_eq!(policy.filters[0].terms[0].name, "allow-ssh");
    }

    #[tokio::test]
    async fn test_load_policy_errors_name_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, "{ \"filters\": [").await.unwrap();
        let err = load_policy(&path).await.unwrap_err();
        assert!(matches!(err, Error::PolicyFile { ref path, .. } if path.contains("broken.json")));

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            load_policy(&missing).await,
            Err(Error::PolicyFile { .. })
        ));
    }

    #[test]
    fn test_output_path() {
        let policy = Path::new("policies/web.json");
        assert_eq!(
            output_path(policy, None, Platform::Iptables),
            PathBuf::from("policies/web.ipt")
        );
        assert_eq!(
            output_path(policy, Some(Path::new("out")), Platform::Nsxv),
            PathBuf::from("out/web.nsx")
        );
    }

    #[tokio::test]
    async fn test_write_output_with_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("web.ipt");
        write_output(&path, "-P INPUT DROP\n", true).await.unwrap();

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written, "-P INPUT DROP\n");
        let sidecar = tokio::fs::read_to_string(checksum_path(&path)).await.unwrap();
        assert_eq!(sidecar, checksum("-P INPUT DROP\n"));
        assert_eq!(sidecar.len(), 64);

        // overwrite leaves no temp files behind
        write_output(&path, "-P INPUT ACCEPT\n", false).await.unwrap();
        let mut entries = tokio::fs::read_dir(path.parent().unwrap()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        assert_eq!(names, vec!["web.ipt", "web.ipt.sha256"]);
    }

    #[tokio::test]
    async fn test_diff_against_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.ipt");
        assert_eq!(
            diff_against_existing(&path, "a\n").await.unwrap().as_deref(),
            Some("+ a\n")
        );

        write_output(&path, "a\nb\n", true).await.unwrap();
        assert!(diff_against_existing(&path, "a\nb\n").await.unwrap().is_none());
        let diff = diff_against_existing(&path, "a\nc\n").await.unwrap().unwrap();
        assert_eq!(diff, "- b\n+ c\n");
    }

    #[test]
    fn test_checksum_is_stable_hex() {
        assert_eq!(
            checksum(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
