use std::path::PathBuf;

/// Conditions that stop a repair before anything is mutated
#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("{process} is running; stop the media server before running this tool")]
    ServerRunning { process: String },

    #[error("could not find database at {}", .0.display())]
    StoreNotFound(PathBuf),

    #[error("no write access to {}", .path.display())]
    NotWritable { path: PathBuf, hint: String },
}

impl PreflightError {
    /// Remediation shown to the operator under the error message
    pub fn remediation(&self) -> String {
        match self {
            Self::ServerRunning { .. } => "$ systemctl stop jellyfin".to_string(),
            Self::StoreNotFound(_) => {
                "Pass --data-dir with the path to your Jellyfin data directory".to_string()
            }
            Self::NotWritable { hint, .. } => hint.clone(),
        }
    }

    /// Process exit status for this condition
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::ServerRunning { .. } => 50,
            Self::StoreNotFound(_) | Self::NotWritable { .. } => 100,
        }
    }
}

/// Failures reading or rewriting a sidecar XML document
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Parse(#[from] quick_xml::Error),

    #[error("element <{0}> not found")]
    MissingElement(String),

    #[error("rewritten document is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}
