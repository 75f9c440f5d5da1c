use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrbitError {
    #[error("unknown satellite: {0}")]
    UnknownSatellite(u32),
    #[error("no orbital elements for satellite {0}")]
    MissingElements(u32),
    #[error("propagation error: {0}")]
    Propagation(String),
    #[error("TLE directory not found: {0}")]
    DirectoryNotFound(String),
    #[error("TLE file read error: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("invalid TLE format in {file}: {message}")]
    InvalidTle { file: String, message: String },
}

impl From<sgp4::Error> for OrbitError {
    fn from(err: sgp4::Error) -> Self {
        OrbitError::Propagation(err.to_string())
    }
}
