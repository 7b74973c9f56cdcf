// Application bootstrapper and HTTP server

use crate::config::{ConfigSource, ServerOptions};
use crate::descriptor::TypeDescriptor;
use crate::lifecycle::{HookFailure, invoke_init_hooks};
use crate::logging::{LogConfig, debug, error, info, warn};
use crate::registry::{ComponentEntry, Registry};
use crate::resolver::Resolver;
use crate::routing::Router;
use crate::{Error, HttpRequest, HttpResponse};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Called with the bound address once the server accepts connections.
pub type StartCallback = Arc<dyn Fn(SocketAddr) + Send + Sync>;

/// Called when the server can't be started.
pub type StartFailureCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// Collects the composition root: descriptors, seeded entries and configuration.
pub struct ApplicationBuilder {
    descriptors: Vec<TypeDescriptor>,
    seeded: Vec<ComponentEntry>,
    config: Arc<dyn ConfigSource>,
    on_start: Option<StartCallback>,
    on_start_failure: Option<StartFailureCallback>,
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
            seeded: Vec::new(),
            config: Arc::new(HashMap::<String, String>::new()),
            on_start: None,
            on_start_failure: None,
        }
    }

    /// Add a candidate component type.
    pub fn component(mut self, descriptor: impl Into<TypeDescriptor>) -> Self {
        self.descriptors.push(descriptor.into());
        self
    }

    pub fn components(mut self, descriptors: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    /// Register a prepared instance before resolution starts.
    pub fn seed(mut self, entry: ComponentEntry) -> Self {
        self.seeded.push(entry);
        self
    }

    pub fn config(mut self, config: impl ConfigSource + 'static) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn shared_config(mut self, config: Arc<dyn ConfigSource>) -> Self {
        self.config = config;
        self
    }

    /// Run `callback` after the listener is bound and init hooks have run.
    pub fn on_start<F>(mut self, callback: F) -> Self
    where
        F: Fn(SocketAddr) + Send + Sync + 'static,
    {
        self.on_start = Some(Arc::new(callback));
        self
    }

    /// Run `callback` when binding the listener fails.
    pub fn on_start_failure<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_start_failure = Some(Arc::new(callback));
        self
    }

    /// Resolve every component and build the routes.
    ///
    /// Both steps are fatal: an unsatisfied dependency or a malformed route
    /// registration aborts startup.
    pub fn build(self) -> Result<Application, Error> {
        info!(components = self.descriptors.len(), "Bootstrapping Trellis application");

        let mut registry = Registry::new();
        for entry in self.seeded {
            registry.insert(entry);
        }
        let registry = Arc::new(Resolver::new(self.config.as_ref()).resolve(self.descriptors, registry)?);
        let router = Arc::new(Router::from_registry(Arc::clone(&registry))?);
        let options = ServerOptions::from_config(self.config.as_ref());

        info!(
            components = registry.len(),
            routes = router.endpoints().len(),
            "Application bootstrap complete"
        );
        Ok(Application {
            registry,
            router,
            config: self.config,
            options,
            on_start: self.on_start,
            on_start_failure: self.on_start_failure,
        })
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A resolved application: frozen registry plus router.
pub struct Application {
    registry: Arc<Registry>,
    router: Arc<Router>,
    config: Arc<dyn ConfigSource>,
    options: ServerOptions,
    on_start: Option<StartCallback>,
    on_start_failure: Option<StartFailureCallback>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn config(&self) -> &Arc<dyn ConfigSource> {
        &self.config
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Logging setup derived from `trellis.debug` and `trellis.log.format`.
    pub fn log_config(&self) -> Result<LogConfig, Error> {
        LogConfig::from_config(self.config.as_ref())
    }

    /// Override the configured listening port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.options = self.options.with_port(port);
        self
    }

    /// Dispatch a request in-process.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        self.router.handle(request).await
    }

    /// Run every initialization hook once. Failures are logged and returned.
    pub fn invoke_init_hooks(&self) -> Result<usize, Vec<HookFailure>> {
        invoke_init_hooks(&self.registry)
    }

    /// Install logging, bind the configured address and serve until the
    /// listener fails.
    ///
    /// Without any endpoint the server is not started. A failed bind is
    /// reported to the start-failure callback before it is returned.
    pub async fn listen(self) -> Result<(), Error> {
        let _log_guard = self.log_config()?.init()?;
        if self.options.debug {
            debug!("Debug logging enabled");
        }

        if !self.router.has_endpoints() {
            warn!("No handler groups with endpoints registered, server not started");
            return Ok(());
        }
        let addr = self.options.socket_addr();
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                let e = Error::from(e);
                error!(address = %addr, error = %e, "Can't start server");
                if let Some(callback) = &self.on_start_failure {
                    callback(&e);
                }
                return Err(e);
            }
        };
        self.serve(listener).await
    }

    /// Serve on an already bound listener. Initialization hooks run once,
    /// before the first connection is accepted.
    pub async fn serve(self, listener: TcpListener) -> Result<(), Error> {
        let addr: SocketAddr = listener.local_addr()?;
        info!(address = %addr, "Server listening");

        match self.invoke_init_hooks() {
            Ok(count) => debug!(hooks = count, "Initialization hooks completed"),
            Err(failures) => warn!(failed = failures.len(), "Some initialization hooks failed"),
        }
        if let Some(callback) = &self.on_start {
            callback(addr);
        }

        let router = self.router.clone();
        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let router = router.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<IncomingBody>| {
                    let router = router.clone();
                    async move { handle_request(req, router).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(error = ?err, "Error serving connection");
                }
            });
        }
    }
}

/// Handle an incoming HTTP request
async fn handle_request(
    req: Request<IncomingBody>,
    router: Arc<Router>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().to_string();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let mut request = HttpRequest::new(method, path);
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            request.headers.insert(name.to_string(), value.to_string());
        }
    }
    request.body = req.collect().await?.to_bytes().to_vec();

    let response = router.handle(request).await;
    Ok(into_hyper_response(response))
}

fn into_hyper_response(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(response.status);
    for (key, value) in response.headers {
        builder = builder.header(key, value);
    }
    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|e| {
            error!(error = %e, "Invalid response, replacing with 500");
            let mut fallback = Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
