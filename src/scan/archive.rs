//! Repository archive download and extraction.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tracing::info;
use zip::ZipArchive;

use crate::error::{Error, Result};

/// Archive downloads get a generous but bounded timeout.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches branch archives from the source host.
pub struct ArchiveFetcher {
    http: Client,
    base_url: String,
}

impl ArchiveFetcher {
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(DOWNLOAD_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: "https://github.com".to_string(),
        }
    }

    /// Override the archive host (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn archive_url(&self, repo: &str, branch: &str) -> String {
        format!(
            "{}/{}/archive/refs/heads/{}.zip",
            self.base_url, repo, branch
        )
    }

    /// Download the branch archive. A 404 on `main` falls back to
    /// `master`; any other failure fails the scan.
    pub async fn download(&self, repo: &str, branch: &str) -> Result<Vec<u8>> {
        let url = self.archive_url(repo, branch);
        let mut response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Archive(format!("download failed for {repo}: {e}")))?;

        if response.status().as_u16() == 404 && branch == "main" {
            info!(%repo, "main branch not found, trying master");
            let fallback = self.archive_url(repo, "master");
            response = self
                .http
                .get(&fallback)
                .send()
                .await
                .map_err(|e| Error::Archive(format!("download failed for {repo}: {e}")))?;
        }

        if !response.status().is_success() {
            return Err(Error::Archive(format!(
                "archive fetch for {repo} returned HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Archive(format!("failed to read archive body: {e}")))?;
        Ok(bytes.to_vec())
    }

    /// Extract a zip archive into `dest`, rejecting entries that escape it.
    pub fn unpack(bytes: &[u8], dest: &Path) -> Result<()> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| Error::Archive(format!("invalid zip archive: {e}")))?;

        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .map_err(|e| Error::Archive(format!("corrupt zip entry: {e}")))?;

            let Some(rel) = file.enclosed_name().map(|p| p.to_path_buf()) else {
                continue;
            };
            let target = dest.join(rel);

            if file.name().ends_with('/') {
                std::fs::create_dir_all(&target)?;
            } else {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut out = std::fs::File::create(&target)?;
                std::io::copy(&mut file, &mut out)?;
            }
        }

        Ok(())
    }
}

impl Default for ArchiveFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn sample_zip() -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            writer
                .start_file("repo-main/app/api.py", FileOptions::default())
                .unwrap();
            writer.write_all(b"def handler():\n    pass\n").unwrap();
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn unpack_writes_entries() {
        let dir = tempfile::tempdir().unwrap();
        ArchiveFetcher::unpack(&sample_zip(), dir.path()).unwrap();

        let content = std::fs::read_to_string(dir.path().join("repo-main/app/api.py")).unwrap();
        assert!(content.contains("def handler"));
    }

    #[test]
    fn unpack_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArchiveFetcher::unpack(b"not a zip", dir.path()).unwrap_err();
        assert!(matches!(err, Error::Archive(_)));
    }

    #[test]
    fn archive_url_shape() {
        let fetcher = ArchiveFetcher::new();
        assert_eq!(
            fetcher.archive_url("acme/shop", "main"),
            "https://github.com/acme/shop/archive/refs/heads/main.zip"
        );
    }
}
