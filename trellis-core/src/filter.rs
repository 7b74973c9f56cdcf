// Front filter wrapping every request

use crate::Error;
use crate::context::RequestContext;
use crate::handler::HandlerFuture;
use async_trait::async_trait;

/// The rest of the request pipeline, handed to a front filter.
pub type Next = Box<dyn FnOnce(RequestContext) -> HandlerFuture + Send>;

/// Request-scoped interceptor.
///
/// A component with the front-filter role that also provides `dyn FrontFilter`
/// sees every request before routing. It either calls `next` to continue or
/// ends the response itself.
///
/// ```ignore
/// struct RequireApiKey;
///
/// #[async_trait]
/// impl FrontFilter for RequireApiKey {
///     async fn intercept(&self, ctx: RequestContext, next: Next) -> Result<(), Error> {
///         if ctx.request().header("x-api-key").is_none() {
///             ctx.response().set_status(401);
///             ctx.response().end("missing api key");
///             return Ok(());
///         }
///         next(ctx).await
///     }
/// }
/// ```
#[async_trait]
pub trait FrontFilter: Send + Sync {
    async fn intercept(&self, ctx: RequestContext, next: Next) -> Result<(), Error>;
}
