//! # Handler Dispatch
//!
//! Handlers come in a closed set of fast-path shapes, plus a generic shape
//! whose parameters are resolved from the request scope.
//!
//! | Shape                  | Signature                                  |
//! |------------------------|--------------------------------------------|
//! | `Empty`                | `Fn()`                                     |
//! | `Context`              | `Fn(&mut Context)`                         |
//! | `WriterRequest`        | `Fn(&Writer, &Request)`                    |
//! | `RequestWriter`        | `Fn(&Request, &Writer)`                    |
//! | `ContextWriterRequest` | `Fn(&mut Context, &Writer, &Request)`      |
//! | `ContextRequestWriter` | `Fn(&mut Context, &Request, &Writer)`      |
//! | `Generic`              | `Fn(A, B, ..)` or `Fn(&mut Context, A, ..)`  with `A: Resolve` |
//!
//! The shape is picked at compile time through [`IntoHandler`]; every shape may
//! return `()` or `Result<(), E>` with `E: Into<Error>`.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::resolve::Resolve;
use crate::writer::Writer;
use std::any::type_name;
use std::sync::Arc;
use tracing::warn;

/// `Fn()` handler
pub type EmptyFn = Arc<dyn Fn() -> Result<()> + Send + Sync>;
/// `Fn(&mut Context)` handler
pub type ContextFn = Arc<dyn Fn(&mut Context) -> Result<()> + Send + Sync>;
/// `Fn(&Writer, &Request)` handler
pub type WriterRequestFn = Arc<dyn Fn(&Writer, &Request) -> Result<()> + Send + Sync>;
/// `Fn(&Request, &Writer)` handler
pub type RequestWriterFn = Arc<dyn Fn(&Request, &Writer) -> Result<()> + Send + Sync>;
/// `Fn(&mut Context, &Writer, &Request)` handler
pub type ContextWriterRequestFn =
    Arc<dyn Fn(&mut Context, &Writer, &Request) -> Result<()> + Send + Sync>;
/// `Fn(&mut Context, &Request, &Writer)` handler
pub type ContextRequestWriterFn =
    Arc<dyn Fn(&mut Context, &Request, &Writer) -> Result<()> + Send + Sync>;

/// Describes one resolved parameter of a generic handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamDescriptor {
    /// Rust type name of the parameter
    pub type_name: &'static str,
}

impl ParamDescriptor {
    /// Descriptor for `T`
    #[must_use]
    pub fn of<T: ?Sized>() -> Self {
        Self {
            type_name: type_name::<T>(),
        }
    }
}

/// Handler whose parameters are resolved per request
#[derive(Clone)]
pub struct GenericHandler {
    params: Arc<[ParamDescriptor]>,
    takes_context: bool,
    call: ContextFn,
}

impl GenericHandler {
    /// Resolved parameters, in declaration order
    #[must_use]
    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    /// Whether the handler also receives `&mut Context` first
    #[must_use]
    pub const fn takes_context(&self) -> bool {
        self.takes_context
    }
}

/// A handler or middleware of any supported shape
#[derive(Clone)]
pub enum Handler {
    /// `Fn()`
    Empty(EmptyFn),
    /// `Fn(&mut Context)`
    Context(ContextFn),
    /// `Fn(&Writer, &Request)`
    WriterRequest(WriterRequestFn),
    /// `Fn(&Request, &Writer)`
    RequestWriter(RequestWriterFn),
    /// `Fn(&mut Context, &Writer, &Request)`
    ContextWriterRequest(ContextWriterRequestFn),
    /// `Fn(&mut Context, &Request, &Writer)`
    ContextRequestWriter(ContextRequestWriterFn),
    /// Parameters resolved from the request scope
    Generic(GenericHandler),
}

/// Discriminant of a [`Handler`], for introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerShape {
    /// `Fn()`
    Empty,
    /// `Fn(&mut Context)`
    Context,
    /// `Fn(&Writer, &Request)`
    WriterRequest,
    /// `Fn(&Request, &Writer)`
    RequestWriter,
    /// `Fn(&mut Context, &Writer, &Request)`
    ContextWriterRequest,
    /// `Fn(&mut Context, &Request, &Writer)`
    ContextRequestWriter,
    /// Resolved parameters
    Generic,
}

impl Handler {
    /// Handler that does nothing
    #[must_use]
    pub fn noop() -> Self {
        Self::Empty(Arc::new(|| Ok(())))
    }

    /// Shape of this handler
    #[must_use]
    pub const fn shape(&self) -> HandlerShape {
        match self {
            Self::Empty(_) => HandlerShape::Empty,
            Self::Context(_) => HandlerShape::Context,
            Self::WriterRequest(_) => HandlerShape::WriterRequest,
            Self::RequestWriter(_) => HandlerShape::RequestWriter,
            Self::ContextWriterRequest(_) => HandlerShape::ContextWriterRequest,
            Self::ContextRequestWriter(_) => HandlerShape::ContextRequestWriter,
            Self::Generic(_) => HandlerShape::Generic,
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generic(g) => f
                .debug_struct("Generic")
                .field("params", &g.params)
                .field("takes_context", &g.takes_context)
                .finish(),
            other => write!(f, "{:?}", other.shape()),
        }
    }
}

/// Invoke `handler` with arguments taken from `ctx`
///
/// # Errors
///
/// Returns the handler's error, or `Error::Unresolved` when a generic
/// parameter has no provider (the handler is not called then).
pub fn dispatch(ctx: &mut Context, handler: &Handler) -> Result<()> {
    match handler {
        Handler::Empty(f) => f(),
        Handler::Context(f) => f(ctx),
        Handler::WriterRequest(f) => {
            let (w, r) = ctx.io();
            f(&w, &r)
        }
        Handler::RequestWriter(f) => {
            let (w, r) = ctx.io();
            f(&r, &w)
        }
        Handler::ContextWriterRequest(f) => {
            let (w, r) = ctx.io();
            f(ctx, &w, &r)
        }
        Handler::ContextRequestWriter(f) => {
            let (w, r) = ctx.io();
            f(ctx, &r, &w)
        }
        Handler::Generic(g) => {
            let result = (g.call)(ctx);
            if let Err(Error::Unresolved { type_name }) = &result {
                warn!(
                    missing = type_name,
                    params = ?g.params.iter().map(|p| p.type_name).collect::<Vec<_>>(),
                    "Generic handler parameter could not be resolved"
                );
            }
            result
        }
    }
}

/// Return value accepted from handlers
pub trait IntoOutcome {
    /// Normalize into the pipeline result
    ///
    /// # Errors
    ///
    /// Returns the handler's failure converted into [`Error`].
    fn into_outcome(self) -> Result<()>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<()> {
        Ok(())
    }
}

impl<E: Into<Error>> IntoOutcome for std::result::Result<(), E> {
    fn into_outcome(self) -> Result<()> {
        self.map_err(Into::into)
    }
}

/// Conversion into a [`Handler`]
///
/// `Marker` only tells the impls apart; callers never name it.
pub trait IntoHandler<Marker>: Send + Sync + 'static {
    /// Build the handler
    fn into_handler(self) -> Handler;
}

/// Marker types selecting an [`IntoHandler`] impl
pub mod marker {
    use std::marker::PhantomData;

    /// `Fn()`
    #[derive(Debug)]
    pub struct NoArgs;
    /// `Fn(&mut Context)`
    #[derive(Debug)]
    pub struct ContextOnly;
    /// `Fn(&Writer, &Request)`
    #[derive(Debug)]
    pub struct WriterRequest;
    /// `Fn(&Request, &Writer)`
    #[derive(Debug)]
    pub struct RequestWriter;
    /// `Fn(&mut Context, &Writer, &Request)`
    #[derive(Debug)]
    pub struct ContextWriterRequest;
    /// `Fn(&mut Context, &Request, &Writer)`
    #[derive(Debug)]
    pub struct ContextRequestWriter;
    /// `Fn(A, ..)` with resolvable parameters
    #[derive(Debug)]
    pub struct Resolved<T>(PhantomData<T>);
    /// `Fn(&mut Context, A, ..)` with resolvable parameters
    #[derive(Debug)]
    pub struct ContextResolved<T>(PhantomData<T>);
    /// A `Middleware` value
    #[derive(Debug)]
    pub struct Stage;
    /// An already built `Handler`
    #[derive(Debug)]
    pub struct Prebuilt;
}

impl IntoHandler<marker::Prebuilt> for Handler {
    fn into_handler(self) -> Handler {
        self
    }
}

impl<M: Middleware> IntoHandler<marker::Stage> for M {
    fn into_handler(self) -> Handler {
        Handler::Context(Arc::new(move |ctx: &mut Context| self.handle(ctx)))
    }
}

impl<F, R> IntoHandler<marker::NoArgs> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoOutcome,
{
    fn into_handler(self) -> Handler {
        Handler::Empty(Arc::new(move || self().into_outcome()))
    }
}

impl<F, R> IntoHandler<marker::ContextOnly> for F
where
    F: Fn(&mut Context) -> R + Send + Sync + 'static,
    R: IntoOutcome,
{
    fn into_handler(self) -> Handler {
        Handler::Context(Arc::new(move |ctx: &mut Context| self(ctx).into_outcome()))
    }
}

impl<F, R> IntoHandler<marker::WriterRequest> for F
where
    F: Fn(&Writer, &Request) -> R + Send + Sync + 'static,
    R: IntoOutcome,
{
    fn into_handler(self) -> Handler {
        Handler::WriterRequest(Arc::new(move |w: &Writer, r: &Request| self(w, r).into_outcome()))
    }
}

impl<F, R> IntoHandler<marker::RequestWriter> for F
where
    F: Fn(&Request, &Writer) -> R + Send + Sync + 'static,
    R: IntoOutcome,
{
    fn into_handler(self) -> Handler {
        Handler::RequestWriter(Arc::new(move |r: &Request, w: &Writer| self(r, w).into_outcome()))
    }
}

impl<F, R> IntoHandler<marker::ContextWriterRequest> for F
where
    F: Fn(&mut Context, &Writer, &Request) -> R + Send + Sync + 'static,
    R: IntoOutcome,
{
    fn into_handler(self) -> Handler {
        Handler::ContextWriterRequest(Arc::new(
            move |ctx: &mut Context, w: &Writer, r: &Request| self(ctx, w, r).into_outcome(),
        ))
    }
}

impl<F, R> IntoHandler<marker::ContextRequestWriter> for F
where
    F: Fn(&mut Context, &Request, &Writer) -> R + Send + Sync + 'static,
    R: IntoOutcome,
{
    fn into_handler(self) -> Handler {
        Handler::ContextRequestWriter(Arc::new(
            move |ctx: &mut Context, r: &Request, w: &Writer| self(ctx, r, w).into_outcome(),
        ))
    }
}

macro_rules! impl_resolved_handler {
    ($($ty:ident),+) => {
        impl<F, R, $($ty,)+> IntoHandler<marker::Resolved<($($ty,)+)>> for F
        where
            F: Fn($($ty),+) -> R + Send + Sync + 'static,
            R: IntoOutcome,
            $($ty: Resolve,)+
        {
            fn into_handler(self) -> Handler {
                Handler::Generic(GenericHandler {
                    params: vec![$($ty::descriptor()),+].into(),
                    takes_context: false,
                    call: Arc::new(move |ctx: &mut Context| {
                        $(
                            #[allow(non_snake_case)]
                            let $ty = $ty::resolve(ctx)?;
                        )+
                        self($($ty),+).into_outcome()
                    }),
                })
            }
        }

        impl<F, R, $($ty,)+> IntoHandler<marker::ContextResolved<($($ty,)+)>> for F
        where
            F: Fn(&mut Context, $($ty),+) -> R + Send + Sync + 'static,
            R: IntoOutcome,
            $($ty: Resolve,)+
        {
            fn into_handler(self) -> Handler {
                Handler::Generic(GenericHandler {
                    params: vec![$($ty::descriptor()),+].into(),
                    takes_context: true,
                    call: Arc::new(move |ctx: &mut Context| {
                        $(
                            #[allow(non_snake_case)]
                            let $ty = $ty::resolve(ctx)?;
                        )+
                        self(ctx, $($ty),+).into_outcome()
                    }),
                })
            }
        }
    };
}

impl_resolved_handler!(T1);
impl_resolved_handler!(T1, T2);
impl_resolved_handler!(T1, T2, T3);
impl_resolved_handler!(T1, T2, T3, T4);
impl_resolved_handler!(T1, T2, T3, T4, T5);
impl_resolved_handler!(T1, T2, T3, T4, T5, T6);
