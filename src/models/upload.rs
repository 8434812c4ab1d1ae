//! A pending upload: raw bytes plus the name the user gave them.

use super::object::DEFAULT_CONTENT_TYPE;
use bytes::Bytes;

/// Ephemeral upload payload. Consumed once by `ObjectStore::upload_request`.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    bytes: Bytes,
    original_name: String,
    content_type: String,
}

impl UploadRequest {
    /// Build a request, guessing the content type from the file extension.
    pub fn new(bytes: impl Into<Bytes>, original_name: impl Into<String>) -> Self {
        let original_name = original_name.into();
        let content_type = guess_content_type(&original_name).to_string();
        Self {
            bytes: bytes.into(),
            original_name,
            content_type,
        }
    }

    /// Override the guessed content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_parts(self) -> (Bytes, String, String) {
        (self.bytes, self.original_name, self.content_type)
    }
}

/// Best-effort MIME type from a file extension.
pub fn guess_content_type(name: &str) -> &'static str {
    let ext = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return DEFAULT_CONTENT_TYPE,
    };
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_from_extension_case_insensitively() {
        assert_eq!(guess_content_type("photo.JPG"), "image/jpeg");
        assert_eq!(guess_content_type("a.txt"), "text/plain");
        assert_eq!(guess_content_type("archive.tar.gz"), "application/gzip");
    }

    #[test]
    fn unknown_or_missing_extension_is_opaque() {
        assert_eq!(guess_content_type("Makefile"), DEFAULT_CONTENT_TYPE);
        assert_eq!(guess_content_type(".bashrc"), DEFAULT_CONTENT_TYPE);
        assert_eq!(guess_content_type("data.bin"), DEFAULT_CONTENT_TYPE);
        assert_eq!(guess_content_type(""), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn explicit_content_type_wins() {
        let req = UploadRequest::new(&b"{}"[..], "x.txt").with_content_type("application/json");
        assert_eq!(req.content_type(), "application/json");
        assert_eq!(req.len(), 2);
        let (bytes, name, ct) = req.into_parts();
        assert_eq!(&bytes[..], b"{}");
        assert_eq!(name, "x.txt");
        assert_eq!(ct, "application/json");
    }
}
