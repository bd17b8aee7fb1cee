//! Tests for error types.

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::path::Path;

    #[test]
    fn test_error_display() {
        let err = Error::config("missing scan_path");
        assert_eq!(err.to_string(), "configuration error: missing scan_path");
    }

    #[test]
    fn test_comparer_error_access() {
        let err = ComparerError::access(Path::new("/data/word_comparer.txt"), "permission denied");
        assert_eq!(
            err.to_string(),
            "failed to access comparer file '/data/word_comparer.txt': permission denied"
        );
        let err: Error = err.into();
        assert!(matches!(err, Error::Comparer(_)));
    }

    #[test]
    fn test_index_error_status() {
        let err = IndexError::Status {
            operation: "bulk",
            status: 429,
            body: "too many requests".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "index service returned 429 for bulk: too many requests"
        );
    }

    #[test]
    fn test_index_error_conversion() {
        let err: Error = IndexError::Missing("docs-word".to_string()).into();
        assert!(matches!(err, Error::Index(_)));
        assert!(err.to_string().contains("docs-word"));
    }

    #[test]
    fn test_decode_error_constructors() {
        let err = DecodeError::read(Path::new("/a.docx"), "no such file");
        assert_eq!(err.to_string(), "failed to read '/a.docx': no such file");

        let err = DecodeError::format(Path::new("/b.pdf"), "truncated xref table");
        assert_eq!(
            err.to_string(),
            "unsupported or corrupt document '/b.pdf': truncated xref table"
        );
    }

    #[test]
    fn test_job_error_scan_root() {
        let err = JobError::ScanRoot {
            path: "/mnt/share".to_string(),
            reason: "not a directory".to_string(),
        };
        let err: Error = err.into();
        assert!(matches!(err, Error::Job(_)));
        assert_eq!(
            err.to_string(),
            "job error: scan root '/mnt/share' is not accessible: not a directory"
        );
    }

    #[test]
    fn test_server_error_conversion() {
        let server_err = ServerError::BindFailed {
            address: "127.0.0.1:8080".to_string(),
            reason: "address in use".to_string(),
        };
        let err: Error = server_err.into();
        assert!(matches!(err, Error::Server(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_error_propagation_with_question_mark() {
        fn inner() -> Result<i32> {
            Err(Error::config("inner error"))
        }

        fn outer() -> Result<i32> {
            let _ = inner()?;
            Ok(0)
        }

        let result = outer();
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "configuration error: inner error"
        );
    }
}
