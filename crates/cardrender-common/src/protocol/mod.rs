pub mod context;
pub mod error;
pub mod requests;
pub mod responses;


pub use context::RequestContext;
pub use error::{RenderError, Result};
pub use requests::{RenderArgs, RenderKwargs, RenderRequest, RequestId};
pub use responses::{RenderResponse, RequestState};
