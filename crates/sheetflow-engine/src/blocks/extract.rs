//! Source blocks: HTTP and local file extraction.

use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sheetflow_types::error::BlockError;
use sheetflow_types::io::{BinaryFile, IoValue};

use super::{Block, BlockContext, BlockOutput, BuildContext};
use crate::config::types::{HttpExtractorOptions, LocalFileExtractorOptions};
use crate::fetch::FetchError;

/// Downloads one URL into a [`BinaryFile`].
#[derive(Debug)]
pub struct HttpExtractor {
    url: String,
    file_name: String,
    timeout: Duration,
}

impl HttpExtractor {
    /// # Errors
    ///
    /// Rejects unparsable URLs, non-HTTP schemes and a zero timeout.
    pub fn new(options: &HttpExtractorOptions, ctx: &BuildContext<'_>) -> Result<Self, String> {
        let url = reqwest::Url::parse(&options.url)
            .map_err(|e| format!("invalid url '{}': {e}", options.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!(
                "url '{}' must use http or https, not {}",
                options.url,
                url.scheme()
            ));
        }
        let timeout = match options.timeout_seconds {
            Some(0) => return Err("timeoutSeconds must be at least 1".to_string()),
            Some(secs) => Duration::from_secs(secs),
            None => ctx.extract_timeout,
        };
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or("download")
            .to_string();
        Ok(Self {
            url: options.url.clone(),
            file_name,
            timeout,
        })
    }
}

#[async_trait]
impl Block for HttpExtractor {
    async fn execute(
        &self,
        _input: Arc<IoValue>,
        ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        let fetched = tokio::time::timeout(self.timeout, ctx.fetcher.fetch(&self.url)).await;
        let body = match fetched {
            Err(_) => {
                return Err(BlockError::extraction(
                    "TIMEOUT",
                    format!(
                        "GET {} did not complete within {}s",
                        self.url,
                        self.timeout.as_secs()
                    ),
                ))
            }
            Ok(Err(e @ FetchError::Status { .. })) => {
                return Err(BlockError::extraction("HTTP_STATUS", e.to_string()))
            }
            Ok(Err(e @ FetchError::Transport { .. })) => {
                return Err(BlockError::extraction("TRANSPORT", e.to_string()))
            }
            Ok(Ok(body)) => body,
        };
        tracing::info!(
            pipeline = %ctx.pipeline,
            block = %ctx.block,
            url = %self.url,
            bytes = body.len(),
            "Downloaded source file"
        );
        Ok(BlockOutput::new(IoValue::File(BinaryFile::new(
            self.file_name.clone(),
            body,
        ))))
    }
}

/// Reads one local file into a [`BinaryFile`].
#[derive(Debug)]
pub struct LocalFileExtractor {
    path: PathBuf,
}

impl LocalFileExtractor {
    #[must_use]
    pub fn new(options: &LocalFileExtractorOptions, ctx: &BuildContext<'_>) -> Self {
        let path = if options.path.is_absolute() {
            options.path.clone()
        } else {
            ctx.base_dir.join(&options.path)
        };
        Self { path }
    }
}

#[async_trait]
impl Block for LocalFileExtractor {
    async fn execute(
        &self,
        _input: Arc<IoValue>,
        ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        let content = tokio::fs::read(&self.path).await.map_err(|e| {
            let code = if e.kind() == IoErrorKind::NotFound {
                "FILE_NOT_FOUND"
            } else {
                "READ_FAILED"
            };
            BlockError::extraction(code, format!("{}: {e}", self.path.display()))
        })?;
        let name = self
            .path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        tracing::info!(
            pipeline = %ctx.pipeline,
            block = %ctx.block,
            path = %self.path.display(),
            bytes = content.len(),
            "Read source file"
        );
        Ok(BlockOutput::new(IoValue::File(BinaryFile::new(name, content))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::testing::{build_context, context, context_with};
    use crate::fetch::Fetcher;
    use crate::valuetype::ValueTypeRegistry;
    use bytes::Bytes;
    use sheetflow_types::error::ErrorKind;
    use std::path::Path;

    struct Fixed(Result<Bytes, u16>);

    #[async_trait]
    impl Fetcher for Fixed {
        async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
            self.0.clone().map_err(|status| FetchError::Status {
                url: url.to_string(),
                status,
            })
        }
    }

    struct Hang;

    #[async_trait]
    impl Fetcher for Hang {
        async fn fetch(&self, _url: &str) -> Result<Bytes, FetchError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Bytes::new())
        }
    }

    fn http(url: &str, timeout_seconds: Option<u64>) -> Result<HttpExtractor, String> {
        let registry = ValueTypeRegistry::default();
        HttpExtractor::new(
            &HttpExtractorOptions {
                url: url.into(),
                timeout_seconds,
            },
            &build_context(&registry, Path::new(".")),
        )
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(http("ftp://example.com/a.zip", None).is_err());
        assert!(http("not a url", None).is_err());
        assert!(http("https://example.com/a.zip", Some(0)).is_err());
    }

    #[tokio::test]
    async fn names_file_after_last_path_segment() {
        let block = http("https://example.com/data/gtfs.zip?x=1", None).unwrap();
        let ctx = context_with(Arc::new(Fixed(Ok(Bytes::from_static(b"PK")))));
        let out = block.execute(Arc::new(IoValue::None), &ctx).await.unwrap();
        let IoValue::File(file) = out.value else {
            panic!("expected file");
        };
        assert_eq!(file.name, "gtfs.zip");
        assert_eq!(&file.content[..], b"PK");
    }

    #[tokio::test]
    async fn non_2xx_is_an_extraction_error() {
        let block = http("https://example.com/missing.csv", None).unwrap();
        let ctx = context_with(Arc::new(Fixed(Err(404))));
        let err = block
            .execute(Arc::new(IoValue::None), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Extraction);
        assert_eq!(err.code, "HTTP_STATUS");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out() {
        let block = http("https://example.com/slow.csv", Some(5)).unwrap();
        let ctx = context_with(Arc::new(Hang));
        let err = block
            .execute(Arc::new(IoValue::None), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code, "TIMEOUT");
    }

    #[tokio::test]
    async fn local_file_resolves_against_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stops.csv"), "id\n1\n").unwrap();
        let registry = ValueTypeRegistry::default();
        let block = LocalFileExtractor::new(
            &LocalFileExtractorOptions {
                path: PathBuf::from("stops.csv"),
            },
            &build_context(&registry, dir.path()),
        );
        let out = block.execute(Arc::new(IoValue::None), &context()).await.unwrap();
        let IoValue::File(file) = out.value else {
            panic!("expected file");
        };
        assert_eq!(file.name, "stops.csv");
        assert_eq!(&file.content[..], b"id\n1\n");
    }

    #[tokio::test]
    async fn missing_local_file_fails() {
        let registry = ValueTypeRegistry::default();
        let block = LocalFileExtractor::new(
            &LocalFileExtractorOptions {
                path: PathBuf::from("/definitely/not/here.csv"),
            },
            &build_context(&registry, Path::new(".")),
        );
        let err = block
            .execute(Arc::new(IoValue::None), &context())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Extraction);
        assert_eq!(err.code, "FILE_NOT_FOUND");
    }
}
