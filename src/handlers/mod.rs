//! Handler interface and resolution.
//!
//! Endpoint configuration names handlers by dotted reference
//! (`files.upload_handler`). The embedding application registers callables
//! under those references in a [`HandlerTable`]; the registry resolves each
//! reference once when it is built and stores the resulting `Arc<dyn Handler>`.

mod table;
mod types;

pub use table::{HandlerTable, UnresolvedHandler};
pub use types::{Handler, HandlerContext, HandlerError, HandlerOutcome, Payload};
