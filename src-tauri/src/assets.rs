//! `app://` protocol serving bundled resources with HTTP range support.
//!
//! `app://models/gemma.gguf` maps to `<resources>/models/gemma.gguf`. Large
//! artifacts are read through `Range` requests, so partial responses are
//! first-class. No response body exceeds [`MAX_CHUNK_BYTES`]: longer ranges
//! are shortened and files above the limit requested without a `Range`
//! header get their first chunk as a 206, so clients continue from
//! `Content-Range`.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use log::{debug, error, warn};
use percent_encoding::percent_decode_str;
use tauri::http::{header, Request, Response, StatusCode, Uri};
use tauri::{Manager, Runtime, UriSchemeContext, UriSchemeResponder};

pub const SCHEME: &str = "app";

/// Largest body held in memory for a single response (8 MiB)
pub const MAX_CHUNK_BYTES: u64 = 8 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Invalid asset path: {0}")]
    InvalidPath(String),
    #[error("Asset not found: {0}")]
    NotFound(PathBuf),
    #[error("Range not satisfiable for {size} bytes: {range}")]
    UnsatisfiableRange { range: String, size: u64 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl AssetError {
    fn status(&self) -> StatusCode {
        match self {
            AssetError::InvalidPath(_) | AssetError::NotFound(_) => StatusCode::NOT_FOUND,
            AssetError::UnsatisfiableRange { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            AssetError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Inclusive byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Shorten to at most `limit` bytes from `start`
    pub fn capped(self, limit: u64) -> Self {
        let limit = limit.max(1);
        Self {
            start: self.start,
            end: self.end.min(self.start.saturating_add(limit - 1)),
        }
    }
}

/// Root directory the protocol serves from
pub fn asset_root<R: Runtime>(app: &tauri::AppHandle<R>) -> tauri::Result<PathBuf> {
    Ok(app.path().resource_dir()?.join("resources"))
}

/// Protocol handler; file IO runs off the webview thread
pub fn handle_request<R: Runtime>(
    ctx: UriSchemeContext<'_, R>,
    request: Request<Vec<u8>>,
    responder: UriSchemeResponder,
) {
    let base = match asset_root(ctx.app_handle()) {
        Ok(base) => base,
        Err(e) => {
            error!("Protocol error: cannot locate resources: {}", e);
            responder.respond(empty_response(StatusCode::INTERNAL_SERVER_ERROR));
            return;
        }
    };

    tauri::async_runtime::spawn_blocking(move || {
        responder.respond(serve(&base, &request));
    });
}

/// Build the response for `request`, never failing
pub fn serve(base: &Path, request: &Request<Vec<u8>>) -> Response<Vec<u8>> {
    serve_with_limit(base, request, MAX_CHUNK_BYTES)
}

fn serve_with_limit(base: &Path, request: &Request<Vec<u8>>, limit: u64) -> Response<Vec<u8>> {
    let range = request
        .headers()
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());

    match try_serve(base, request.uri(), range, limit) {
        Ok(response) => response,
        Err(e) => {
            match &e {
                AssetError::NotFound(path) => warn!("File not found: {}", path.display()),
                AssetError::Io(_) => error!("Protocol error: {}", e),
                _ => debug!("Rejected asset request {}: {}", request.uri(), e),
            }
            let mut response = empty_response(e.status());
            if let AssetError::UnsatisfiableRange { size, .. } = e {
                if let Ok(value) = header::HeaderValue::from_str(&format!("bytes */{}", size)) {
                    response.headers_mut().insert(header::CONTENT_RANGE, value);
                }
            }
            response
        }
    }
}

fn try_serve(
    base: &Path,
    uri: &Uri,
    range: Option<&str>,
    limit: u64,
) -> Result<Response<Vec<u8>>, AssetError> {
    let path = resolve_asset_path(base, uri)?;
    let mut file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(AssetError::NotFound(path)),
        Err(e) => return Err(e.into()),
    };
    let size = file.metadata()?.len();
    let mime = mime_type(&path);

    let builder = Response::builder()
        .header(header::CONTENT_TYPE, mime)
        .header(header::ACCEPT_RANGES, "bytes");

    let requested = match range {
        Some(header_value) => Some(parse_range(header_value, size)?),
        None if size > limit => {
            debug!(
                "{} is {} bytes, serving the first chunk only",
                path.display(),
                size
            );
            Some(ByteRange {
                start: 0,
                end: size - 1,
            })
        }
        None => None,
    };

    let response = match requested {
        Some(range) => {
            let range = range.capped(limit);
            file.seek(SeekFrom::Start(range.start))?;
            let body = read_exact_len(&mut file, range.len())?;

            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", range.start, range.end, size),
                )
                .header(header::CONTENT_LENGTH, range.len())
                .body(body)
        }
        None => {
            let body = read_exact_len(&mut file, size)?;
            builder
                .status(StatusCode::OK)
                .header(header::CONTENT_LENGTH, size)
                .body(body)
        }
    };

    response.map_err(|e| AssetError::Io(io::Error::other(e)))
}

fn read_exact_len(file: &mut File, len: u64) -> io::Result<Vec<u8>> {
    let mut body = Vec::with_capacity(len as usize);
    file.take(len).read_to_end(&mut body)?;
    if (body.len() as u64) < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "file shrank while serving",
        ));
    }
    Ok(body)
}

/// Map `app://<host>/<path>` to a file under `base`, rejecting traversal
pub fn resolve_asset_path(base: &Path, uri: &Uri) -> Result<PathBuf, AssetError> {
    let host = uri.host().unwrap_or_default();
    let decoded = percent_decode_str(uri.path())
        .decode_utf8()
        .map_err(|_| AssetError::InvalidPath(uri.path().to_string()))?;

    let joined = Path::new(host).join(decoded.trim_start_matches(['/', '\\']));
    let mut relative = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return Err(AssetError::InvalidPath(joined.display().to_string())),
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(AssetError::InvalidPath(uri.to_string()));
    }
    Ok(base.join(relative))
}

/// Parse a single `bytes=start-end` range against a file of `size` bytes.
///
/// Open-ended ranges run to EOF, suffix ranges (`bytes=-N`) take the last N
/// bytes, and an end past EOF is clamped.
pub fn parse_range(value: &str, size: u64) -> Result<ByteRange, AssetError> {
    let unsatisfiable = || AssetError::UnsatisfiableRange {
        range: value.to_string(),
        size,
    };

    let spec = value
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(unsatisfiable)?;
    let (start, end) = spec.split_once('-').ok_or_else(unsatisfiable)?;
    let (start, end) = (start.trim(), end.trim());

    if size == 0 {
        return Err(unsatisfiable());
    }
    let last = size - 1;

    let range = match (start.is_empty(), end.is_empty()) {
        (true, true) => return Err(unsatisfiable()),
        (true, false) => {
            let suffix: u64 = end.parse().map_err(|_| unsatisfiable())?;
            if suffix == 0 {
                return Err(unsatisfiable());
            }
            ByteRange {
                start: size.saturating_sub(suffix),
                end: last,
            }
        }
        (false, open_ended) => {
            let start: u64 = start.parse().map_err(|_| unsatisfiable())?;
            let end = if open_ended {
                last
            } else {
                end.parse::<u64>().map_err(|_| unsatisfiable())?.min(last)
            };
            ByteRange { start, end }
        }
    };

    if range.start > range.end || range.start > last {
        return Err(unsatisfiable());
    }
    Ok(range)
}

pub fn mime_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("wasm") => "application/wasm",
        Some("js") => "application/javascript",
        _ => "application/octet-stream",
    }
}

fn empty_response(status: StatusCode) -> Response<Vec<u8>> {
    let mut response = Response::new(Vec::new());
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, range: Option<&str>) -> Request<Vec<u8>> {
        let mut builder = Request::builder().uri(uri);
        if let Some(range) = range {
            builder = builder.header(header::RANGE, range);
        }
        builder.body(Vec::new()).unwrap()
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("models")).unwrap();
        std::fs::write(dir.path().join("models/weights.gguf"), b"0123456789").unwrap();
        std::fs::write(dir.path().join("models/my model.task"), b"spaced").unwrap();
        dir
    }

    #[test]
    fn test_parse_range() {
        let test_cases = vec![
            ("closed", "bytes=0-4", Some((0, 4))),
            ("open ended", "bytes=5-", Some((5, 9))),
            ("end clamped", "bytes=8-100", Some((8, 9))),
            ("suffix", "bytes=-3", Some((7, 9))),
            ("suffix longer than file", "bytes=-50", Some((0, 9))),
            ("single byte", "bytes=9-9", Some((9, 9))),
            ("start past end of file", "bytes=10-", None),
            ("inverted", "bytes=6-2", None),
            ("not bytes", "items=0-1", None),
            ("garbage", "bytes=a-b", None),
            ("empty", "bytes=-", None),
        ];

        for (description, header_value, expected) in test_cases {
            let parsed = parse_range(header_value, 10).ok().map(|r| (r.start, r.end));
            assert_eq!(parsed, expected, "{}", description);
        }
    }

    #[test]
    fn test_resolve_asset_path() {
        let base = Path::new("/res");
        let test_cases = vec![
            ("host and file", "app://models/weights.gguf", Some("/res/models/weights.gguf")),
            ("nested", "app://wasm/lib/a.wasm", Some("/res/wasm/lib/a.wasm")),
            ("percent encoded", "app://models/my%20model.task", Some("/res/models/my model.task")),
            ("parent traversal", "app://models/../../etc/passwd", None),
            ("encoded traversal", "app://models/%2E%2E/secret", None),
        ];

        for (description, uri, expected) in test_cases {
            let uri: Uri = uri.parse().unwrap();
            let resolved = resolve_asset_path(base, &uri).ok();
            assert_eq!(resolved, expected.map(PathBuf::from), "{}", description);
        }
    }

    #[test]
    fn test_mime_type() {
        let test_cases = vec![
            ("genai_wasm_internal.wasm", "application/wasm"),
            ("genai_wasm_internal.js", "application/javascript"),
            ("gemma.task", "application/octet-stream"),
            ("gemma.litertlm", "application/octet-stream"),
            ("gemma.gguf", "application/octet-stream"),
        ];

        for (file, expected) in test_cases {
            assert_eq!(mime_type(Path::new(file)), expected, "{}", file);
        }
    }

    #[test]
    fn test_serve_full_file() {
        let dir = fixture();
        let response = serve(dir.path(), &request("app://models/weights.gguf", None));

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), b"0123456789");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
    }

    #[test]
    fn test_serve_partial_content() {
        let dir = fixture();
        let response = serve(
            dir.path(),
            &request("app://models/weights.gguf", Some("bytes=2-5")),
        );

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.body(), b"2345");
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 2-5/10");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "4");
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
    }

    #[test]
    fn test_serve_caps_chunk_size() {
        let dir = fixture();
        let test_cases = vec![
            ("closed range", Some("bytes=2-9"), "bytes 2-5/10", &b"2345"[..]),
            ("open ended", Some("bytes=0-"), "bytes 0-3/10", &b"0123"[..]),
            ("no range header", None, "bytes 0-3/10", &b"0123"[..]),
            ("within limit", Some("bytes=8-"), "bytes 8-9/10", &b"89"[..]),
        ];

        for (description, range, content_range, body) in test_cases {
            let response =
                serve_with_limit(dir.path(), &request("app://models/weights.gguf", range), 4);
            assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT, "{}", description);
            assert_eq!(response.headers()[header::CONTENT_RANGE], content_range, "{}", description);
            assert_eq!(
                response.headers()[header::CONTENT_LENGTH],
                body.len().to_string().as_str(),
                "{}",
                description
            );
            assert_eq!(response.body().as_slice(), body, "{}", description);
        }

        // Small files still come back whole
        let response = serve_with_limit(dir.path(), &request("app://models/my%20model.task", None), 8);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), b"spaced");
    }

    #[test]
    fn test_serve_errors() {
        let dir = fixture();
        let test_cases = vec![
            ("missing file", "app://models/nope.gguf", None, StatusCode::NOT_FOUND),
            ("traversal", "app://models/../../x", None, StatusCode::NOT_FOUND),
            (
                "unsatisfiable range",
                "app://models/weights.gguf",
                Some("bytes=20-30"),
                StatusCode::RANGE_NOT_SATISFIABLE,
            ),
        ];

        for (description, uri, range, expected) in test_cases {
            let response = serve(dir.path(), &request(uri, range));
            assert_eq!(response.status(), expected, "{}", description);
            assert!(response.body().is_empty(), "{}", description);
        }
    }

    #[test]
    fn test_serve_percent_encoded_name() {
        let dir = fixture();
        let response = serve(dir.path(), &request("app://models/my%20model.task", None));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), b"spaced");
    }
}
