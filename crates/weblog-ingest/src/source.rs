//! Line sources: local files and streamed HTTP responses
//!
//! Both variants hand back a [`LineStream`]. The stream owns the underlying
//! file handle or HTTP connection, so dropping it (exhausted or not) releases
//! the resource.

use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::path::Path;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use crate::codec::LogLineCodec;
use crate::error::{IngestError, Result};

/// Content type prefix required from remote log sources
pub const EXPECTED_CONTENT_TYPE_PREFIX: &str = "text/plain;";

/// Lazy, single-pass sequence of raw log lines
pub type LineStream = BoxStream<'static, Result<String>>;

/// Open a local log file, framing lines with `codec`
pub async fn open_file(path: impl AsRef<Path>, codec: LogLineCodec) -> Result<LineStream> {
    let path = path.as_ref();
    let file = tokio::fs::File::open(path).await.map_err(|source| IngestError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), "Reading access log file");

    let lines = FramedRead::new(file, codec).map_err(IngestError::Read);
    Ok(lines.boxed())
}

/// Issue a GET for `url` and stream the body line by line
///
/// The response must be `200 OK` with a `Content-Type` starting with
/// [`EXPECTED_CONTENT_TYPE_PREFIX`]; anything else fails before a single line
/// is produced.
pub async fn fetch_url(
    client: &reqwest::Client,
    url: &str,
    codec: LogLineCodec,
) -> Result<LineStream> {
    debug!(url = %url, "Requesting access log");
    let response = client.get(url).send().await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(IngestError::Fetch {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default();
    if !content_type.starts_with(EXPECTED_CONTENT_TYPE_PREFIX) {
        return Err(IngestError::UnexpectedContentType {
            url: url.to_string(),
            content_type,
        });
    }

    info!(url = %url, content_length = ?response.content_length(), "Streaming access log");

    let body = response.bytes_stream().map_err(std::io::Error::other);
    let lines = FramedRead::new(StreamReader::new(body), codec)
        .map_err(IngestError::Read);
    Ok(lines.boxed())
}
