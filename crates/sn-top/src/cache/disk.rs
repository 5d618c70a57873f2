//! # Cache Policy

use anyhow::{Context, bail};
use burn::config::Config;
use std::fs::{File, create_dir_all, remove_file, rename};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Disk Cache Policy.
#[derive(Config, Debug)]
pub struct DiskCacheConfig {
    /// Key for the root cache directory.
    #[config(default = "\"sn-top\".to_string()")]
    pub root_cache_key: String,

    /// Override for the base cache directory.
    ///
    /// When ``None``, the cache lives under ``~/.cache/{root_cache_key}``.
    #[config(default = "None")]
    pub base_dir: Option<PathBuf>,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskCacheConfig {
    /// Fetch the base cache directory.
    ///
    /// If the cache directory does not exist, does not create it.
    pub fn base_cache_dir(&self) -> anyhow::Result<PathBuf> {
        let root = match &self.base_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .context("no home directory for the weight cache")?
                .join(".cache"),
        };
        Ok(root.join(&self.root_cache_key))
    }

    /// Fetch the base cache directory.
    ///
    /// If the cache directory does not exist, creates it.
    pub fn ensure_base_cache_dir(&self) -> anyhow::Result<PathBuf> {
        let dir = self.base_cache_dir()?;
        if !dir.exists() {
            create_dir_all(&dir)?;
        }
        Ok(dir)
    }

    /// Map a resource key to a cache path.
    ///
    /// Does not ensure that the path (or any of the parents) exist.
    pub fn resource_to_path(
        &self,
        resource_key: &[String],
    ) -> anyhow::Result<PathBuf> {
        let path = self.base_cache_dir()?;
        Ok(resource_key.iter().fold(path, |acc, s| acc.join(s)))
    }

    /// Map a resource key to a cache path and ensure the parent directory exists.
    pub fn ensure_resource_parent_dir(
        &self,
        resource_key: &[String],
    ) -> anyhow::Result<PathBuf> {
        let path = self.resource_to_path(resource_key)?;
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                create_dir_all(parent)?;
            }
        }
        Ok(path)
    }

    /// Fetch a Resource to the Cache.
    pub fn fetch_resource(
        &self,
        url: &str,
        resource: &[String],
    ) -> anyhow::Result<PathBuf> {
        let cache_file_path = self.ensure_resource_parent_dir(resource)?;
        try_cache_download_to_path(url, cache_file_path)
    }
}

/// Download a URL resource to a given path.
///
/// If the path already exists, does nothing.
///
/// # Returns
///
/// The cache path.
///
/// # Errors
///
/// Connection failures, non-success HTTP statuses, and write failures. On
/// error, nothing is left at `cache_file_path`.
pub fn try_cache_download_to_path(
    url: &str,
    cache_file_path: PathBuf,
) -> anyhow::Result<PathBuf> {
    if cache_file_path.exists() {
        tracing::debug!(path = %cache_file_path.display(), "weight cache hit");
        return Ok(cache_file_path);
    }

    // Weight files are large; no overall request timeout.
    let client = reqwest::blocking::Client::builder()
        .timeout(None)
        .build()
        .context("failed to build the http client")?;

    download_to_path(&client, url, &cache_file_path)?;
    Ok(cache_file_path)
}

/// Download a URL resource to a given path, replacing any existing file.
///
/// # Returns
///
/// The number of bytes written.
pub fn download_to_path(
    client: &reqwest::blocking::Client,
    url: &str,
    path: &Path,
) -> anyhow::Result<u64> {
    tracing::info!(url, path = %path.display(), "downloading weights");

    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("failed to request {url}"))?;

    let status = response.status();
    if !status.is_success() {
        bail!("Download of {url} failed with status: {status}");
    }

    let size = write_cache_file(path, &mut response)
        .with_context(|| format!("failed to download {url}"))?;
    tracing::info!(url, bytes = size, "weights downloaded");

    Ok(size)
}

/// The in-progress sibling of a cache file: ``{file_name}.part``.
pub fn partial_cache_path(path: &Path) -> anyhow::Result<PathBuf> {
    let file_name = path
        .file_name()
        .with_context(|| format!("invalid cache path: {}", path.display()))?;

    let mut partial = file_name.to_os_string();
    partial.push(".part");
    Ok(path.with_file_name(partial))
}

/// Write a complete cache file from a reader.
///
/// The content is written to [`partial_cache_path`] and renamed into place
/// once complete, so `path` only ever holds a whole file. A partial file is
/// removed on error.
///
/// # Returns
///
/// The number of bytes written.
pub fn write_cache_file<R: Read + ?Sized>(
    path: &Path,
    reader: &mut R,
) -> anyhow::Result<u64> {
    let partial = partial_cache_path(path)?;

    let result = (|| -> anyhow::Result<u64> {
        let mut output_file = File::create(&partial)?;
        let size = io::copy(reader, &mut output_file)?;
        output_file.flush()?;
        output_file.sync_all()?;
        rename(&partial, path)?;
        Ok(size)
    })();

    if result.is_err() && partial.exists() {
        if let Err(err) = remove_file(&partial) {
            tracing::warn!(path = %partial.display(), %err, "failed to remove partial cache file");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_root_key() {
        let config = DiskCacheConfig::default();
        assert_eq!(config.root_cache_key, "sn-top");
        assert!(config.base_dir.is_none());
    }

    #[test]
    fn test_resource_to_path() {
        let tmp = tempfile::tempdir().unwrap();
        let config = DiskCacheConfig::new().with_base_dir(Some(tmp.path().to_path_buf()));

        let resource = vec!["weights".to_string(), "model.pth".to_string()];
        let path = config.resource_to_path(&resource).unwrap();
        assert_eq!(path, tmp.path().join("sn-top").join("weights").join("model.pth"));
        assert!(!path.parent().unwrap().exists());

        let path = config.ensure_resource_parent_dir(&resource).unwrap();
        assert!(path.parent().unwrap().exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_cache_hit_skips_download() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cached.pth");
        write_cache_file(&path, &mut &b"weights"[..]).unwrap();

        // The url is never contacted for an existing file.
        let fetched = try_cache_download_to_path("http://invalid.invalid/cached.pth", path.clone())
            .unwrap();
        assert_eq!(fetched, path);
        assert_eq!(std::fs::read(&path).unwrap(), b"weights");
    }

    #[test]
    fn test_partial_cache_path() {
        let path = Path::new("/tmp/sn-top/weights/resnet50-0676ba61.pth");
        assert_eq!(
            partial_cache_path(path).unwrap(),
            Path::new("/tmp/sn-top/weights/resnet50-0676ba61.pth.part")
        );
    }

    #[test]
    fn test_write_cache_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model.pth");

        let bytes = vec![7u8; 100_000];
        let size = write_cache_file(&path, &mut bytes.as_slice()).unwrap();

        assert_eq!(size, 100_000);
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
        assert!(!partial_cache_path(&path).unwrap().exists());
    }

    /// Yields some bytes, then fails like a dropped connection.
    struct BrokenReader {
        remaining: usize,
    }

    impl Read for BrokenReader {
        fn read(
            &mut self,
            buf: &mut [u8],
        ) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            let n = buf.len().min(self.remaining);
            buf[..n].fill(1);
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_write_cache_file_interrupted() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model.pth");

        let err = write_cache_file(&path, &mut BrokenReader { remaining: 5000 }).unwrap_err();
        assert!(err.to_string().contains("reset"));

        assert!(!path.exists());
        assert!(!partial_cache_path(&path).unwrap().exists());
    }

    /// Serve one canned HTTP response on a loopback port.
    fn serve_once(
        status_line: &'static str,
        body: &'static [u8],
    ) -> String {
        use std::io::BufRead;
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = io::BufReader::new(stream);
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 {
                if line == "\r\n" {
                    break;
                }
                line.clear();
            }
            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .unwrap();
            // The client may hang up after reading the status.
            let _ = stream.write_all(body);
        });

        format!("http://{addr}/model.pth")
    }

    fn loopback_client() -> reqwest::blocking::Client {
        reqwest::blocking::Client::builder()
            .no_proxy()
            .build()
            .unwrap()
    }

    #[test]
    fn test_download() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model.pth");

        let url = serve_once("200 OK", b"weights");
        let size = download_to_path(&loopback_client(), &url, &path).unwrap();

        assert_eq!(size, 7);
        assert_eq!(std::fs::read(&path).unwrap(), b"weights");
        assert!(!partial_cache_path(&path).unwrap().exists());
    }

    #[test]
    fn test_download_error_status_is_not_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model.pth");

        let url = serve_once("404 Not Found", b"<html>not found</html>");
        let err = download_to_path(&loopback_client(), &url, &path).unwrap_err();

        assert!(err.to_string().contains("404"));
        assert!(!path.exists());
        assert!(!partial_cache_path(&path).unwrap().exists());
    }

    #[test]
    fn test_download_connection_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model.pth");

        // Bind then drop, so the port is closed.
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();

        let url = format!("http://{addr}/model.pth");
        let result = download_to_path(&loopback_client(), &url, &path);
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
