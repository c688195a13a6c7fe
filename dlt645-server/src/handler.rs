//! Business handler seam

use dlt645_core::Dlt645Result;
use dlt645_protocol::Frame;

/// Answers decoded request frames
///
/// Called once per complete frame, in arrival order per connection. The returned bytes
/// are written back as they are; `None` or an empty vector sends nothing. Errors are
/// logged by the dispatch loop and the connection stays open.
#[cfg_attr(test, mockall::automock)]
pub trait RequestHandler: Send + Sync {
    fn handle_request(&self, request: &Frame) -> Dlt645Result<Option<Vec<u8>>>;
}

impl<F> RequestHandler for F
where
    F: Fn(&Frame) -> Dlt645Result<Option<Vec<u8>>> + Send + Sync,
{
    fn handle_request(&self, request: &Frame) -> Dlt645Result<Option<Vec<u8>>> {
        self(request)
    }
}
