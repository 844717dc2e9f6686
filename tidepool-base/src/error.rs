// Every error in the system funnels through here so that:
// 1. It carries a backtrace from the point it was first wrapped
// 2. It is logged into the tracing system once, at creation
// 3. Callers can branch on a coarse kind without string matching

use std::borrow::Cow;
use backtrace_error::DynBacktraceError;
use tracing::error;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ErrorKind {
    // A row did not match the schema of the load it was offered to.
    SchemaMismatch,
    // A batch (or base row) could not be written to the row store.
    Persist,
    // A read against the row store failed.
    Scan,
    // The store refused to scope a connection to a set of buckets.
    BucketRouting,
    // Bad table options or builder parameters.
    Config,
    // A stored buffer could not be decoded.
    Corrupt,
    // A named table does not exist.
    NotFound,
    Other,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::SchemaMismatch => "schema mismatch",
            ErrorKind::Persist => "persist failure",
            ErrorKind::Scan => "scan failure",
            ErrorKind::BucketRouting => "bucket routing failure",
            ErrorKind::Config => "configuration error",
            ErrorKind::Corrupt => "corrupt data",
            ErrorKind::NotFound => "not found",
            ErrorKind::Other => "error",
        }
    }
}

#[derive(Debug)]
#[allow(dead_code)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
    inner: DynBacktraceError,
}
pub type Result<T> = std::result::Result<T, Error>;

struct SimpleErr(Cow<'static, str>);
impl std::fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {}

impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(err: E) -> Error {
        Error::new(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.msg)
    }
}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(err: E) -> Error {
        Error::with_kind(ErrorKind::Other, err)
    }

    pub fn with_kind<E: std::error::Error + Send + Sync + 'static>(kind: ErrorKind, err: E) -> Error {
        error!(target: "tidepool", kind = kind.name(), "{:?}", err);
        let msg = err.to_string();
        let inner = DynBacktraceError::from(err);
        Error { kind, msg, inner }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    pub fn message(&self) -> &str {
        &self.msg
    }

    // Re-tags an error propagated from a lower layer, keeping its backtrace.
    pub fn rekind(mut self, kind: ErrorKind) -> Error {
        self.kind = kind;
        self
    }
}

pub fn err(msg: impl Into<Cow<'static, str>>) -> Error {
    err_kind(ErrorKind::Other, msg)
}

pub fn err_kind(kind: ErrorKind, msg: impl Into<Cow<'static, str>>) -> Error {
    Error::with_kind(kind, SimpleErr(msg.into()))
}
