// Credential provider: the fixed header set attached to every request.
//
// Cookie acquisition itself is out of scope; the session cookie line is
// consumed from a file the user exports from their browser.

use std::path::Path;

use reqwest::header::{self, HeaderMap, HeaderValue};

use crate::error::DownloadError;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/86.0.4240.75 Safari/537.36";
const ACCEPT_LANGUAGES: &str = "en,en-US;q=0.9,en-GB;q=0.8,it-IT;q=0.7,it;q=0.6";

/// Capability handed to every request-issuing component. There is no
/// ambient credential state; whoever builds the transport supplies one.
pub trait HeaderProvider: Send + Sync {
    /// The header set attached to every outgoing request
    /// (user-agent, accept-language, cookie).
    fn common_headers(&self) -> Result<HeaderMap, DownloadError>;
}

/// Header provider backed by a cookie jar file holding the raw `Cookie`
/// header line for the remote service.
#[derive(Debug, Clone)]
pub struct CookieFile {
    cookies: String,
}

impl CookieFile {
    /// Reads and trims the cookie header line. A missing or empty file is a
    /// credential error, not an I/O error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DownloadError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DownloadError::MissingCredentials(format!(
                "cannot read cookie file {}: {e}",
                path.display()
            ))
        })?;
        let cookies = raw.trim().to_string();
        if cookies.is_empty() {
            return Err(DownloadError::MissingCredentials(format!(
                "cookie file {} is empty",
                path.display()
            )));
        }
        Ok(Self { cookies })
    }
}

impl HeaderProvider for CookieFile {
    fn common_headers(&self) -> Result<HeaderMap, DownloadError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGES),
        );
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&self.cookies).map_err(|e| {
                DownloadError::MissingCredentials(format!(
                    "cookie contains invalid header characters: {e}"
                ))
            })?,
        );
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cookie_file_headers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "session=abc123; auth=tok").unwrap();

        let provider = CookieFile::load(file.path()).unwrap();
        let headers = provider.common_headers().unwrap();

        assert_eq!(
            headers.get(header::COOKIE).unwrap(),
            "session=abc123; auth=tok"
        );
        assert!(headers.contains_key(header::USER_AGENT));
        assert!(headers.contains_key(header::ACCEPT_LANGUAGE));
    }

    #[test]
    fn test_missing_cookie_file() {
        let err = CookieFile::load("/nonexistent/cookies.txt").unwrap_err();
        assert!(matches!(err, DownloadError::MissingCredentials(_)));
    }

    #[test]
    fn test_empty_cookie_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = CookieFile::load(file.path()).unwrap_err();
        assert!(matches!(err, DownloadError::MissingCredentials(_)));
    }
}
