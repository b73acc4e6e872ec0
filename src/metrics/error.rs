use std::fmt;
use std::io;

/// Failure of a single OS query. Every sampler turns these into a neutral
/// value at its public boundary; they only surface through the `try_*` calls.
#[derive(Debug)]
pub enum SampleError {
    MachCallFailed(&'static str, i32),
    SysctlError(String, io::Error),
    Io(String, io::Error),
    Parse(&'static str, String),
    Unsupported(&'static str),
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleError::MachCallFailed(call, code) => {
                write!(f, "{} returned {}", call, code)
            }
            SampleError::SysctlError(name, err) => {
                write!(f, "sysctl {} failed: {}", name, err)
            }
            SampleError::Io(path, err) => write!(f, "reading {} failed: {}", path, err),
            SampleError::Parse(source, detail) => {
                write!(f, "could not parse {}: {}", source, detail)
            }
            SampleError::Unsupported(what) => {
                write!(f, "{} is not supported on this platform", what)
            }
        }
    }
}

impl std::error::Error for SampleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SampleError::SysctlError(_, err) | SampleError::Io(_, err) => Some(err),
            _ => None,
        }
    }
}
