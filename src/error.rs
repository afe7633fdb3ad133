use std::{io, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum TestError {
    #[error("block size must be positive, got {0}M")]
    InvalidBlockSize(f64),
    #[error("random source unavailable: {0}")]
    RandomSource(#[from] rand::Error),
    #[error("all block generators exited before the write phase finished")]
    GeneratorsExhausted,
    #[error("could not create {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("could not enter {}: {source}", path.display())]
    EnterDir { path: PathBuf, source: io::Error },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, TestError>;

impl TestError {
    /// Process exit status: only a block directory that cannot be created or
    /// entered fails the run. Anything else is reported and exits cleanly.
    pub fn exit_code(&self) -> i32 {
        match self {
            TestError::CreateDir { .. } | TestError::EnterDir { .. } => 1,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_directory_failures_exit_nonzero() {
        let denied = || io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let create = TestError::CreateDir {
            path: PathBuf::from("/mnt/stick/bad"),
            source: denied(),
        };
        let enter = TestError::EnterDir {
            path: PathBuf::from("/mnt/stick/bad"),
            source: denied(),
        };
        assert_eq!(create.exit_code(), 1);
        assert_eq!(enter.exit_code(), 1);
        assert_eq!(TestError::GeneratorsExhausted.exit_code(), 0);
        assert_eq!(TestError::InvalidBlockSize(0.0).exit_code(), 0);
        assert_eq!(TestError::Io(denied()).exit_code(), 0);
    }
}
