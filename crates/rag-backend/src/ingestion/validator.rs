/// Result of validating a single uploaded file.
#[derive(Debug, Clone)]
pub struct FileValidationOutcome {
    pub is_valid: bool,
    pub filename: String,
    pub file_size_bytes: usize,
    pub mime_type: String,
    pub extension: String,
    pub error: Option<String>,
}

impl FileValidationOutcome {
    pub fn file_size_mb(&self) -> f64 {
        self.file_size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Validates uploaded files against format and size constraints.
pub struct FileValidator;

impl FileValidator {
    pub const MAX_FILE_SIZE_BYTES: usize = 50 * 1024 * 1024;
    pub const MAX_FILES_PER_REQUEST: usize = 10;
    pub const MAX_TOTAL_SIZE_BYTES: usize = 500 * 1024 * 1024;

    const SUPPORTED_MIME_TYPES: [(&'static str, &'static [&'static str]); 4] = [
        ("application/pdf", &[".pdf"]),
        ("text/plain", &[".txt"]),
        ("text/markdown", &[".md"]),
        ("text/x-markdown", &[".md"]),
    ];

    fn supported_extensions(mime_type: &str) -> Option<&'static [&'static str]> {
        Self::SUPPORTED_MIME_TYPES
            .iter()
            .find(|(mime, _)| *mime == mime_type)
            .map(|(_, extensions)| *extensions)
    }

    /// Detect MIME type from the filename, falling back to content
    /// sniffing for files without a recognizable extension.
    fn detect_mime_type(filename: &str, content: &[u8]) -> String {
        let guessed = mime_guess::from_path(filename).first_raw();
        if let Some(mime) = guessed {
            return mime.to_string();
        }

        if let Some(kind) = infer::get(content) {
            return kind.mime_type().to_string();
        }

        "application/octet-stream".to_string()
    }

    fn extension(filename: &str) -> String {
        match filename.rsplit_once('.') {
            Some((_, ext)) => format!(".{}", ext.to_lowercase()),
            None => String::new(),
        }
    }

    pub fn validate_single_file(filename: &str, content: &[u8]) -> FileValidationOutcome {
        let extension = Self::extension(filename);
        let file_size = content.len();
        let mime_type = Self::detect_mime_type(filename, content);

        let mut outcome = FileValidationOutcome {
            is_valid: true,
            filename: filename.to_string(),
            file_size_bytes: file_size,
            mime_type: mime_type.clone(),
            extension: extension.clone(),
            error: None,
        };

        if file_size > Self::MAX_FILE_SIZE_BYTES {
            outcome.is_valid = false;
            outcome.error = Some(format!(
                "File size {:.1} MB exceeds 50 MB limit",
                file_size as f64 / (1024.0 * 1024.0)
            ));
            return outcome;
        }

        let Some(supported_extensions) = Self::supported_extensions(&mime_type) else {
            outcome.is_valid = false;
            outcome.error = Some(format!(
                "Unsupported file type {}",
                if extension.is_empty() {
                    mime_type
                } else {
                    extension
                }
            ));
            return outcome;
        };

        if !supported_extensions.contains(&extension.as_str()) {
            outcome.is_valid = false;
            outcome.error = Some(format!(
                "File extension {extension} does not match MIME type {mime_type}"
            ));
            return outcome;
        }

        outcome
    }

    /// Validate all files in a batch. Returns per-file results plus a
    /// batch-level error message when any file or global limit fails.
    pub fn validate_batch(
        files: &[(String, bytes::Bytes)],
    ) -> (Vec<FileValidationOutcome>, Option<String>) {
        if files.is_empty() {
            return (Vec::new(), Some("No files provided".to_string()));
        }

        if files.len() > Self::MAX_FILES_PER_REQUEST {
            return (
                Vec::new(),
                Some(format!(
                    "Maximum {} files per request, got {}",
                    Self::MAX_FILES_PER_REQUEST,
                    files.len()
                )),
            );
        }

        let mut results = Vec::with_capacity(files.len());
        let mut total_size = 0usize;

        for (filename, content) in files {
            let result = Self::validate_single_file(filename, content);
            if result.is_valid {
                total_size += result.file_size_bytes;
            }
            results.push(result);
        }

        if results.iter().any(|r| !r.is_valid) {
            return (results, Some("File validation failed".to_string()));
        }

        if total_size > Self::MAX_TOTAL_SIZE_BYTES {
            let message = format!(
                "Total payload {:.1} MB exceeds 500 MB limit",
                total_size as f64 / (1024.0 * 1024.0)
            );
            return (results, Some(message));
        }

        (results, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn accepts_supported_types() {
        for (name, body) in [
            ("doc.pdf", &b"%PDF-1.4 data"[..]),
            ("notes.txt", b"plain text"),
            ("readme.md", b"# heading"),
        ] {
            let outcome = FileValidator::validate_single_file(name, body);
            assert!(outcome.is_valid, "{name}: {:?}", outcome.error);
        }
    }

    #[test]
    fn rejects_unsupported_type() {
        let outcome = FileValidator::validate_single_file("slides.pptx", b"PK\x03\x04");
        assert!(!outcome.is_valid);
        assert!(outcome.error.as_deref().unwrap().contains("Unsupported"));
    }

    #[test]
    fn rejects_oversized_file() {
        let big = vec![0u8; FileValidator::MAX_FILE_SIZE_BYTES + 1];
        let outcome = FileValidator::validate_single_file("big.txt", &big);
        assert!(!outcome.is_valid);
        assert!(outcome.error.as_deref().unwrap().contains("50 MB"));
    }

    #[test]
    fn batch_rejects_too_many_files() {
        let files: Vec<(String, Bytes)> = (0..11)
            .map(|i| (format!("f{i}.txt"), Bytes::from_static(b"data")))
            .collect();
        let (_, error) = FileValidator::validate_batch(&files);
        assert!(error.unwrap().contains("Maximum 10 files"));
    }

    #[test]
    fn batch_rejects_empty_request() {
        let (_, error) = FileValidator::validate_batch(&[]);
        assert_eq!(error.as_deref(), Some("No files provided"));
    }

    #[test]
    fn valid_batch_passes() {
        let files = vec![
            ("a.txt".to_string(), Bytes::from_static(b"hello")),
            ("b.md".to_string(), Bytes::from_static(b"# hi")),
        ];
        let (results, error) = FileValidator::validate_batch(&files);
        assert!(error.is_none());
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_valid));
    }
}
