use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} must contain exactly two lines (username and password), found {found}")]
    LineCount { path: String, found: usize },
    #[error("{path}: line {line} is empty")]
    EmptyLine { path: String, line: usize },
}

/// Username and password read from a two-line credentials file.
///
/// The username may carry a Windows domain (`DOMAIN\user`); it is used for authentication as
/// written.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Credentials {
            username: username.to_owned(),
            password: password.to_owned(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CredentialsError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let content = fs::read_to_string(path).map_err(|source| CredentialsError::Io {
            path: display.clone(),
            source,
        })?;

        Self::parse(&content, &display)
    }

    fn parse(content: &str, path: &str) -> Result<Self, CredentialsError> {
        let lines: Vec<&str> = content.lines().map(str::trim).collect();
        if lines.len() != 2 {
            return Err(CredentialsError::LineCount {
                path: path.to_owned(),
                found: lines.len(),
            });
        }

        if let Some(i) = lines.iter().position(|l| l.is_empty()) {
            return Err(CredentialsError::EmptyLine {
                path: path.to_owned(),
                line: i + 1,
            });
        }

        Ok(Credentials::new(lines[0], lines[1]))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// The domain part of a `DOMAIN\user` username.
    pub fn domain(&self) -> Option<&str> {
        self.username.split_once('\\').map(|(domain, _)| domain)
    }

    /// The username without its domain.
    pub fn account(&self) -> &str {
        self.username
            .split_once('\\')
            .map(|(_, account)| account)
            .unwrap_or(&self.username)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_from_file() -> anyhow::Result<()> {
        let file = write_file("admin\ns3cret \r\n");
        let credentials = Credentials::from_file(file.path())?;

        assert_eq!(credentials.username(), "admin");
        assert_eq!(credentials.password(), "s3cret");
        assert_eq!(credentials.domain(), None);
        assert_eq!(credentials.account(), "admin");
        Ok(())
    }

    #[test]
    fn test_domain_user() -> anyhow::Result<()> {
        let file = write_file("CORP\\svc-monitor\npassword");
        let credentials = Credentials::from_file(file.path())?;

        assert_eq!(credentials.username(), "CORP\\svc-monitor");
        assert_eq!(credentials.domain(), Some("CORP"));
        assert_eq!(credentials.account(), "svc-monitor");
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Credentials::from_file(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, CredentialsError::Io { .. }));
    }

    #[test]
    fn test_wrong_line_count() {
        let file = write_file("admin\n");
        let err = Credentials::from_file(file.path()).unwrap_err();
        assert!(matches!(err, CredentialsError::LineCount { found: 1, .. }));

        let file = write_file("admin\npassword\nextra\n");
        let err = Credentials::from_file(file.path()).unwrap_err();
        assert!(matches!(err, CredentialsError::LineCount { found: 3, .. }));
    }

    #[test]
    fn test_empty_line() {
        let file = write_file("admin\n   \n");
        let err = Credentials::from_file(file.path()).unwrap_err();
        assert!(matches!(err, CredentialsError::EmptyLine { line: 2, .. }));
    }

    #[test]
    fn test_debug_redacts_password() {
        let credentials = Credentials::new("admin", "hunter2");
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }
}
