//! Request classification
//!
//! Maps an incoming HTTP method and path onto the fixed operation set of the
//! bridge. Classification is purely syntactic; body-shape and type
//! validation happen in the operation handlers.

use axum::http::Method;

/// The operations the bridge serves, plus the three rejection classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpOperation {
    CreateConsumer,
    DeleteConsumer,
    Subscribe,
    Unsubscribe,
    Assign,
    Poll,
    Commit,
    Seek,
    SeekToBeginning,
    SeekToEnd,
    Produce,
    /// A request that requires a payload arrived without one
    Empty,
    /// The path does not belong to the bridge surface
    Invalid,
    /// The path is known but the method is not served on it
    Unprocessable,
}

impl HttpOperation {
    /// Whether the operation requires a request payload.
    ///
    /// Commit is the exception: an empty commit body means "commit the last
    /// delivered offsets".
    pub fn requires_body(&self) -> bool {
        matches!(
            self,
            HttpOperation::CreateConsumer
                | HttpOperation::Subscribe
                | HttpOperation::Assign
                | HttpOperation::Seek
                | HttpOperation::SeekToBeginning
                | HttpOperation::SeekToEnd
                | HttpOperation::Produce
        )
    }
}

/// Classify a request by method, path and payload presence.
///
/// `has_body` is derived from the request's content length; it only matters
/// for operations that require a payload.
pub fn classify(method: &Method, path: &str, has_body: bool) -> HttpOperation {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    let segments: Vec<&str> = trimmed.split('/').skip(1).collect();

    if segments.iter().any(|s| s.is_empty()) {
        return HttpOperation::Invalid;
    }

    let op = match (method.as_str(), segments.as_slice()) {
        ("POST", ["consumers", _group]) => HttpOperation::CreateConsumer,
        ("DELETE", ["consumers", _group, "instances", _name]) => HttpOperation::DeleteConsumer,
        ("POST", ["consumers", _group, "instances", _name, "subscription"]) => {
            HttpOperation::Subscribe
        }
        ("DELETE", ["consumers", _group, "instances", _name, "subscription"]) => {
            HttpOperation::Unsubscribe
        }
        ("POST", ["consumers", _group, "instances", _name, "assignments"]) => HttpOperation::Assign,
        ("GET", ["consumers", _group, "instances", _name, "records"]) => HttpOperation::Poll,
        ("POST", ["consumers", _group, "instances", _name, "offsets"]) => HttpOperation::Commit,
        ("POST", ["consumers", _group, "instances", _name, "positions"]) => HttpOperation::Seek,
        ("POST", ["consumers", _group, "instances", _name, "positions", "beginning"]) => {
            HttpOperation::SeekToBeginning
        }
        ("POST", ["consumers", _group, "instances", _name, "positions", "end"]) => {
            HttpOperation::SeekToEnd
        }
        ("POST", ["topics", _topic]) => HttpOperation::Produce,
        _ => {
            return if path_is_known(segments.as_slice()) {
                HttpOperation::Unprocessable
            } else {
                HttpOperation::Invalid
            };
        }
    };

    if op.requires_body() && !has_body {
        HttpOperation::Empty
    } else {
        op
    }
}

/// Whether the path shape belongs to the bridge surface, regardless of
/// method
fn path_is_known(segments: &[&str]) -> bool {
    matches!(
        segments,
        ["consumers", _]
            | ["consumers", _, "instances", _]
            | ["consumers", _, "instances", _, "subscription"]
            | ["consumers", _, "instances", _, "assignments"]
            | ["consumers", _, "instances", _, "records"]
            | ["consumers", _, "instances", _, "offsets"]
            | ["consumers", _, "instances", _, "positions"]
            | ["consumers", _, "instances", _, "positions", "beginning"]
            | ["consumers", _, "instances", _, "positions", "end"]
            | ["topics", _]
    )
}
