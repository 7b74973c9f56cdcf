// Routing of requests to handler-group endpoints

use crate::binder::bind_arguments;
use crate::context::{RequestContext, ResponseSink};
use crate::descriptor::{Role, TypeKey};
use crate::exception::{ExceptionDispatcher, Failure};
use crate::filter::{FrontFilter, Next};
use crate::handler::{HandlerFuture, HandlerMethod, Verb};
use crate::logging::{debug, trace, warn};
use crate::registry::{Instance, Registry};
use crate::{Error, HttpMethod, HttpRequest, HttpResponse};
use std::collections::HashMap;
use std::sync::Arc;

/// One (verb, path) pair routed to a handler method.
#[derive(Clone)]
pub struct RouteEndpoint {
    pub verb: Verb,
    pub path: String,
    pub consumes: Option<String>,
    pub produces: String,
    pub method: Arc<HandlerMethod>,
    pub owner: Instance,
    pub owner_name: &'static str,
}

impl std::fmt::Debug for RouteEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEndpoint")
            .field("verb", &self.verb)
            .field("path", &self.path)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .field("method", &self.method.name())
            .field("owner", &self.owner_name)
            .finish()
    }
}

/// Where a request goes after matching.
#[derive(Debug)]
enum Target {
    Endpoint(usize),
    CatchAll,
    Reject(Error),
}

/// Router built from a frozen registry.
pub struct Router {
    registry: Arc<Registry>,
    endpoints: Vec<RouteEndpoint>,
    catch_all: Option<RouteEndpoint>,
    filter: Option<Arc<dyn FrontFilter>>,
    exceptions: ExceptionDispatcher,
}

impl Router {
    /// Collect the endpoints of every handler group.
    ///
    /// Fails with [`Error::MalformedRegistration`] when a routable method has
    /// no parameter able to carry the request context.
    pub fn from_registry(registry: Arc<Registry>) -> Result<Self, Error> {
        let mut endpoints = Vec::new();
        let mut catch_all: Option<RouteEndpoint> = None;

        for entry in registry.with_role(Role::HandlerGroup) {
            let Some(descriptor) = entry.descriptor() else {
                continue;
            };
            for routable in descriptor.routes() {
                let method = &routable.method;
                if !method.accepts_context() {
                    return Err(Error::MalformedRegistration {
                        component: entry.name().to_string(),
                        method: method.name().to_string(),
                        parameters: method.signature(),
                    });
                }

                let mapping = &routable.mapping;
                let endpoint = |path: String| RouteEndpoint {
                    verb: mapping.verb(),
                    path,
                    consumes: mapping.consumed().map(str::to_string),
                    produces: mapping.produced().to_string(),
                    method: Arc::clone(method),
                    owner: entry.instance().clone(),
                    owner_name: entry.name(),
                };

                match mapping.verb() {
                    Verb::CatchAll if catch_all.is_none() => {
                        debug!(component = entry.name(), method = method.name(), "Catch-all route registered");
                        catch_all = Some(endpoint(join_path(descriptor.prefix(), "*")));
                    }
                    Verb::CatchAll => {
                        warn!(
                            component = entry.name(),
                            method = method.name(),
                            "Ignoring catch-all route, one is already registered"
                        );
                    }
                    Verb::Method(_) => {
                        for path in mapping.paths() {
                            let route = endpoint(join_path(descriptor.prefix(), path));
                            debug!(
                                verb = %route.verb,
                                path = %route.path,
                                component = entry.name(),
                                method = method.name(),
                                "Route registered"
                            );
                            endpoints.push(route);
                        }
                    }
                }
            }
        }

        let filter = front_filter(&registry);
        let exceptions = ExceptionDispatcher::from_registry(&registry);

        Ok(Self {
            registry,
            endpoints,
            catch_all,
            filter,
            exceptions,
        })
    }

    pub fn endpoints(&self) -> &[RouteEndpoint] {
        &self.endpoints
    }

    pub fn catch_all(&self) -> Option<&RouteEndpoint> {
        self.catch_all.as_ref()
    }

    /// Whether anything at all can be routed.
    pub fn has_endpoints(&self) -> bool {
        !self.endpoints.is_empty() || self.catch_all.is_some()
    }

    pub fn has_front_filter(&self) -> bool {
        self.filter.is_some()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Route one request and return the response it produced.
    pub async fn handle(self: &Arc<Self>, mut request: HttpRequest) -> HttpResponse {
        let (path, query_string) = match request.path.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (request.path.clone(), None),
        };
        if let Some(query) = query_string {
            request.query_params.extend(parse_query_string(&query));
        }
        request.path = path;

        let target = self.match_route(&mut request);
        trace!(method = %request.method, path = %request.path, target = ?target, "Request matched");

        let ctx = RequestContext::new(request);
        let result = match &self.filter {
            Some(filter) => {
                let router = Arc::clone(self);
                let next: Next = Box::new(move |ctx: RequestContext| -> HandlerFuture {
                    Box::pin(async move { router.dispatch(target, ctx).await })
                });
                filter.intercept(ctx.clone(), next).await
            }
            None => self.dispatch(target, ctx.clone()).await,
        };

        if let Err(e) = result {
            self.exceptions
                .dispatch(Failure::new(e), &ctx, &self.registry)
                .await;
        }
        ctx.response().snapshot()
    }

    fn match_route(&self, request: &mut HttpRequest) -> Target {
        let method = HttpMethod::from_str(&request.method);
        let mut rejection = None;

        for (index, endpoint) in self.endpoints.iter().enumerate() {
            if Some(endpoint.verb) != method.map(Verb::Method) {
                continue;
            }
            let Some(params) = match_path(&endpoint.path, &request.path) else {
                continue;
            };
            if let Some(consumes) = &endpoint.consumes {
                let matches = request
                    .content_type()
                    .is_some_and(|ct| ct.eq_ignore_ascii_case(consumes));
                if !matches {
                    if rejection.is_none() {
                        rejection = Some(Error::UnsupportedMediaType(consumes.clone()));
                    }
                    continue;
                }
            }
            if !accepts(request.header("accept"), &endpoint.produces) {
                if rejection.is_none() {
                    rejection = Some(Error::NotAcceptable(endpoint.produces.clone()));
                }
                continue;
            }
            request.path_params = params;
            return Target::Endpoint(index);
        }

        match (rejection, &self.catch_all) {
            (Some(error), _) => Target::Reject(error),
            (None, Some(_)) => Target::CatchAll,
            (None, None) => Target::Reject(Error::RouteNotFound(format!(
                "{} {}",
                request.method, request.path
            ))),
        }
    }

    async fn dispatch(&self, target: Target, ctx: RequestContext) -> Result<(), Error> {
        let endpoint = match target {
            Target::Endpoint(index) => &self.endpoints[index],
            Target::CatchAll => match &self.catch_all {
                Some(endpoint) => endpoint,
                None => return Ok(()),
            },
            Target::Reject(error) => {
                debug!(error = %error, "Request rejected");
                write_error(ctx.response(), &error);
                return Ok(());
            }
        };

        ctx.response().default_header("Content-Type", &endpoint.produces);
        let args = bind_arguments(endpoint.method.params(), &ctx, &self.registry)?;
        debug!(
            component = endpoint.owner_name,
            method = endpoint.method.name(),
            bound = args.len(),
            "Invoking handler"
        );
        endpoint.method.invoke(endpoint.owner.clone(), args).await
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("endpoints", &self.endpoints)
            .field("catch_all", &self.catch_all)
            .field("front_filter", &self.filter.is_some())
            .field("error_groups", &self.exceptions.len())
            .finish()
    }
}

/// The first front-filter entry that provides `dyn FrontFilter`.
fn front_filter(registry: &Registry) -> Option<Arc<dyn FrontFilter>> {
    let capability = TypeKey::of::<dyn FrontFilter>();
    for entry in registry.with_role(Role::FrontFilter) {
        let filter = entry
            .cast(&capability)
            .and_then(|binding| binding.downcast::<Arc<dyn FrontFilter>>().ok());
        match filter {
            Some(filter) => {
                debug!(component = entry.name(), "Front filter registered");
                return Some(*filter);
            }
            None => warn!(
                component = entry.name(),
                "Front filter doesn't provide dyn FrontFilter, ignoring"
            ),
        }
    }
    None
}

/// End the response with the JSON error body of `error`.
fn write_error(sink: &ResponseSink, error: &Error) {
    let response = HttpResponse::from_error(error);
    sink.set_status(response.status);
    for (name, value) in response.headers {
        sink.put_header(name, value);
    }
    sink.end(response.body);
}

/// Whether an `Accept` header admits `produces`. A missing header admits anything.
fn accepts(accept: Option<&str>, produces: &str) -> bool {
    let Some(accept) = accept else {
        return true;
    };
    let (kind, _) = produces.split_once('/').unwrap_or((produces, ""));
    accept
        .split(',')
        .map(|range| range.split(';').next().unwrap_or(range).trim())
        .any(|range| {
            range == "*/*"
                || range.eq_ignore_ascii_case(produces)
                || range
                    .strip_suffix("/*")
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(kind))
        })
}

fn join_path(prefix: &str, path: &str) -> String {
    let mut joined = String::new();
    for segment in prefix.split('/').chain(path.split('/')) {
        if !segment.is_empty() {
            joined.push('/');
            joined.push_str(segment);
        }
    }
    if joined.is_empty() {
        joined.push('/');
    }
    joined
}

/// Match a route path pattern against a request path
/// Returns Some(params) if matched, None otherwise
fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (pattern_part, path_part) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(param_name) = pattern_part.strip_prefix(':') {
            let value = urlencoding::decode(path_part)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| path_part.to_string());
            params.insert(param_name.to_string(), value);
        } else if pattern_part != path_part {
            return None;
        }
    }

    Some(params)
}

/// Parse a query string into a map of percent-decoded parameters
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            let key = urlencoding::decode(&key.replace('+', " ")).ok()?.into_owned();
            let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
            Some((key, value))
        })
        .collect()
}
