use crate::handlers::{HandlerContext, HandlerError, HandlerOutcome, HandlerTable};
use serde_json::json;

/// Reference under which [`echo_handler`] is registered
pub const ECHO_HANDLER: &str = "builtin.echo";

/// Smoke-test handler: reflects the validated call back to the client
pub fn echo_handler(ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
    Ok(HandlerOutcome::json(json!({
        "endpoint": ctx.endpoint.name,
        "method": ctx.method.as_str(),
        "path": ctx.path,
        "user": ctx.user(),
        "params": ctx.params.to_json(),
    })))
}

/// Handlers every binary gets for free
pub fn register_builtin_handlers(table: &mut HandlerTable) {
    table.register(ECHO_HANDLER, echo_handler);
}
