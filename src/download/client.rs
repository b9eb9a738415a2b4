use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, REFERER};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::config::ArchiveSource;
use crate::error::{PipelineError, Result};
use crate::ui::{format_bytes, Ui};

/// HTTP client for the registry archive.
///
/// The registry rejects requests that do not look like they come from a
/// browser, so every request carries the configured User-Agent and Referer.
pub struct RegistryClient {
    client: Client,
    url: String,
}

impl RegistryClient {
    pub fn new(source: &ArchiveSource) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, header_value("referer", &source.referer)?);
        headers.insert(
            ACCEPT_ENCODING,
            header_value("accept_encoding", &source.accept_encoding)?,
        );

        let client = Client::builder()
            .user_agent(header_value("user_agent", &source.user_agent)?)
            .default_headers(headers)
            .build()
            .map_err(|source_err| PipelineError::Http {
                url: source.url.clone(),
                source: source_err,
            })?;

        Ok(Self {
            client,
            url: source.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Download the archive to `dest`, replacing any previous copy.
    ///
    /// The body is written to `<dest>.part` first and renamed into place once
    /// complete. Returns the number of bytes written.
    pub fn download_archive(&self, dest: &Path, ui: &mut impl Ui) -> Result<u64> {
        tracing::info!("downloading {} -> {}", self.url, dest.display());

        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|source| PipelineError::Http {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::HttpStatus {
                url: self.url.clone(),
                status,
            });
        }

        let total_size = response.content_length().unwrap_or(0);
        let part = part_path(dest);

        let downloaded = match stream_to_file(response, &part, total_size, ui) {
            Ok(downloaded) => downloaded,
            Err(e) => {
                std::fs::remove_file(&part).ok();
                return Err(e);
            }
        };

        std::fs::rename(&part, dest).map_err(|e| PipelineError::io(dest, e))?;

        ui.clear_progress();
        ui.log(format!("Downloaded {}", format_bytes(downloaded, 0)));
        Ok(downloaded)
    }
}

fn stream_to_file(
    mut reader: impl Read,
    path: &Path,
    total_size: u64,
    ui: &mut impl Ui,
) -> Result<u64> {
    let mut file = File::create(path).map_err(|e| PipelineError::io(path, e))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| PipelineError::io(path, e))?;

        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .map_err(|e| PipelineError::io(path, e))?;

        downloaded += bytes_read as u64;
        ui.set_progress(downloaded, total_size, format_bytes(downloaded, total_size));
    }

    file.flush().map_err(|e| PipelineError::io(path, e))?;
    Ok(downloaded)
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| PipelineError::Config(format!("archive.{} is not a valid header value", field)))
}
