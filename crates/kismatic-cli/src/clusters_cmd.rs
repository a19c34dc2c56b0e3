//! `kismatic clusters` command: list the clusters under `clusters/`.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

/// One entry of the clusters directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEntry {
    pub name: String,
    pub modified: Option<DateTime<Local>>,
    pub is_dir: bool,
}

/// Entries of `root`, sorted by name.
pub fn list_clusters(root: &Path) -> Result<Vec<ClusterEntry>> {
    let entries = std::fs::read_dir(root)
        .with_context(|| format!("failed to read clusters directory {}", root.display()))?;

    let mut clusters = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read clusters directory {}", root.display()))?;
        let meta = entry
            .metadata()
            .with_context(|| format!("failed to stat {}", entry.path().display()))?;
        clusters.push(ClusterEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            modified: meta.modified().ok().map(DateTime::<Local>::from),
            is_dir: meta.is_dir(),
        });
    }
    clusters.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(clusters)
}

/// Run the clusters command, printing a table to `out`.
pub fn run_clusters(out: &mut impl Write, root: &Path, verbose: bool) -> Result<()> {
    let clusters = list_clusters(root)?;

    let mut rows: Vec<Vec<String>> = vec![if verbose {
        vec![
            "Cluster Name:".to_owned(),
            "Last modified:".to_owned(),
            "Is dir:".to_owned(),
        ]
    } else {
        vec!["Cluster Name:".to_owned()]
    }];
    for cluster in &clusters {
        let mut row = vec![cluster.name.clone()];
        if verbose {
            row.push(
                cluster
                    .modified
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
            );
            row.push(cluster.is_dir.to_string());
        }
        rows.push(row);
    }

    writeln!(out, "Clusters currently being managed")?;
    write_table(out, &rows)?;
    Ok(())
}

/// Left-aligned columns separated by three spaces.
fn write_table(out: &mut impl Write, rows: &[Vec<String>]) -> Result<()> {
    let columns = rows.first().map_or(0, Vec::len);
    let widths: Vec<usize> = (0..columns)
        .map(|c| rows.iter().map(|r| r[c].len()).max().unwrap_or(0))
        .collect();

    for row in rows {
        let mut line = String::new();
        for (cell, width) in row.iter().zip(&widths) {
            line.push_str(&format!("{cell:<width$}   "));
        }
        writeln!(out, "{}", line.trim_end())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("staging")).unwrap();
        std::fs::create_dir(tmp.path().join("kubernetes")).unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();
        tmp
    }

    #[test]
    fn lists_entries_sorted() {
        let tmp = fixture();
        let clusters = list_clusters(tmp.path()).unwrap();
        let names: Vec<&str> = clusters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["kubernetes", "notes.txt", "staging"]);
        assert!(clusters[0].is_dir);
        assert!(!clusters[1].is_dir);
    }

    #[test]
    fn plain_listing_has_names_only() {
        let tmp = fixture();
        let mut out = Vec::new();
        run_clusters(&mut out, tmp.path(), false).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "Clusters currently being managed",
                "Cluster Name:",
                "kubernetes",
                "notes.txt",
                "staging",
            ]
        );
    }

    #[test]
    fn verbose_listing_adds_columns() {
        let tmp = fixture();
        let mut out = Vec::new();
        run_clusters(&mut out, tmp.path(), true).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[1].starts_with("Cluster Name:   Last modified:"));
        assert!(lines[1].ends_with("Is dir:"));
        assert!(lines[2].starts_with("kubernetes"));
        assert!(lines[2].ends_with("true"));
        assert!(lines[3].ends_with("false"));
        // Columns line up under the header.
        let col = lines[1].find("Last modified:").unwrap();
        assert_eq!(lines[2].as_bytes()[col - 1], b' ');
        assert_ne!(lines[2].as_bytes()[col], b' ');
    }

    #[test]
    fn missing_directory_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = run_clusters(&mut Vec::new(), &tmp.path().join("clusters"), false).unwrap_err();
        assert!(err.to_string().contains("failed to read clusters directory"));
    }
}
