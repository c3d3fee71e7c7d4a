//! Generated artifact model

use std::collections::BTreeMap;

use chrono::{Datelike, Utc};

use crate::utils::sha256_hex;

pub const LICENSE_PATH: &str = "LICENSE";
pub const README_PATH: &str = "README.md";

/// Path reserved for the deployment manifest inside each repository
pub const MANIFEST_PATH: &str = ".pagedeploy/manifest.json";

/// Files produced for one request, keyed by relative path.
///
/// Construct through [`GeneratedArtifact::from_files`] so the path rules and
/// the LICENSE/README guarantee always hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    files: BTreeMap<String, String>,
}

impl GeneratedArtifact {
    /// Validate paths and fill in LICENSE and README.md when missing
    pub fn from_files(
        files: BTreeMap<String, String>,
        brief: &str,
    ) -> Result<Self, String> {
        if files.is_empty() {
            return Err("no files were generated".to_string());
        }

        for path in files.keys() {
            validate_path(path)?;
        }

        let mut files = files;
        files
            .entry(LICENSE_PATH.to_string())
            .or_insert_with(mit_license);
        files
            .entry(README_PATH.to_string())
            .or_insert_with(|| readme_for(brief));

        Ok(Self { files })
    }

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Digest over every path and content, in path order
    pub fn digest(&self) -> String {
        let mut buf = Vec::new();
        for (path, content) in &self.files {
            buf.extend_from_slice(path.as_bytes());
            buf.push(0);
            buf.extend_from_slice(content.as_bytes());
            buf.push(0);
        }
        sha256_hex(&buf)
    }
}

/// Reject absolute paths, traversal and anything a repository tree can't hold
pub fn validate_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("empty file path".to_string());
    }
    if path.starts_with('/') {
        return Err(format!("absolute file path: {}", path));
    }
    if path.contains('\\') || path.contains('\0') {
        return Err(format!("invalid characters in file path: {}", path));
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(format!("invalid segment in file path: {}", path));
    }
    if path == MANIFEST_PATH || path.starts_with(".pagedeploy/") || path.starts_with(".git/") {
        return Err(format!("reserved file path: {}", path));
    }
    Ok(())
}

/// Standard MIT license text for the current year
pub fn mit_license() -> String {
    format!(
        "MIT License\n\
\n\
Copyright (c) {}\n\
\n\
Permission is hereby granted, free of charge, to any person obtaining a copy\n\
of this software and associated documentation files (the \"Software\"), to deal\n\
in the Software without restriction, including without limitation the rights\n\
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell\n\
copies of the Software, and to permit persons to whom the Software is\n\
furnished to do so, subject to the following conditions:\n\
\n\
The above copyright notice and this permission notice shall be included in all\n\
copies or substantial portions of the Software.\n\
\n\
THE SOFTWARE IS PROVIDED \"AS IS\", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR\n\
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,\n\
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE\n\
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER\n\
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,\n\
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE\n\
SOFTWARE.\n",
        Utc::now().year()
    )
}

/// README derived from the brief
pub fn readme_for(brief: &str) -> String {
    let title = brief
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("Generated App");
    let title = crate::utils::truncate_chars(title, 60);

    format!(
        "# {title}\n\n\
## Summary\n\n{brief}\n\n\
## Setup\n\nNone required. This is a static site; open `index.html` or visit the published page.\n\n\
## Usage\n\nOpen the published page in a browser.\n\n\
## Code Explanation\n\nThe application is plain HTML, CSS and JavaScript served as static files.\n\n\
## License\n\nMIT, see `LICENSE`.\n",
        title = title,
        brief = brief.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn test_license_and_readme_are_added() {
        let artifact =
            GeneratedArtifact::from_files(files(&[("index.html", "<html></html>")]), "a todo list")
                .unwrap();
        assert_eq!(artifact.len(), 3);
        assert!(artifact.get(LICENSE_PATH).unwrap().starts_with("MIT License"));
        assert!(artifact.get(README_PATH).unwrap().contains("a todo list"));
    }

    #[test]
    fn test_generated_readme_is_kept() {
        let artifact = GeneratedArtifact::from_files(
            files(&[("index.html", "x"), ("README.md", "# Mine")]),
            "brief",
        )
        .unwrap();
        assert_eq!(artifact.get(README_PATH), Some("# Mine"));
    }

    #[test]
    fn test_path_rules() {
        assert!(validate_path("index.html").is_ok());
        assert!(validate_path("assets/app.js").is_ok());
        assert!(validate_path("/etc/passwd").is_err());
        assert!(validate_path("../x").is_err());
        assert!(validate_path("a/../b").is_err());
        assert!(validate_path("a//b").is_err());
        assert!(validate_path("./a").is_err());
        assert!(validate_path("a\\b").is_err());
        assert!(validate_path(MANIFEST_PATH).is_err());
        assert!(validate_path(".git/config").is_err());
    }

    #[test]
    fn test_empty_file_set_is_rejected() {
        assert!(GeneratedArtifact::from_files(BTreeMap::new(), "brief").is_err());
    }

    #[test]
    fn test_digest_depends_on_content() {
        let a = GeneratedArtifact::from_files(files(&[("index.html", "a")]), "b").unwrap();
        let b = GeneratedArtifact::from_files(files(&[("index.html", "b")]), "b").unwrap();
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest(), a.clone().digest());
    }
}
