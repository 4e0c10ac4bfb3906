//! # Parameter Resolution
//!
//! Types a generic handler may take as parameters.
//!
//! Built-ins come straight from the context (`Writer`, `Arc<Request>`, `Vars`,
//! `CancellationToken`, `Injector`); [`Dep`] pulls from the request-scoped
//! injector; [`Json`] decodes the body.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::handler::ParamDescriptor;
use crate::injector::Injector;
use crate::request::Request;
use crate::route::Vars;
use crate::writer::Writer;
use serde::de::DeserializeOwned;
use std::ops::Deref;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A value a generic handler can ask for
pub trait Resolve: Sized + Send + 'static {
    /// Produce the value for the current request
    ///
    /// # Errors
    ///
    /// Returns `Error::Unresolved` when nothing provides the value.
    fn resolve(ctx: &mut Context) -> Result<Self>;

    /// Registration-time description of this parameter
    #[must_use]
    fn descriptor() -> ParamDescriptor {
        ParamDescriptor::of::<Self>()
    }
}

/// Dependency resolved from the injector by type
#[derive(Debug)]
pub struct Dep<T: ?Sized>(pub Arc<T>);

impl<T: ?Sized> Clone for Dep<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> Deref for Dep<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Send + Sync + 'static> Resolve for Dep<T> {
    fn resolve(ctx: &mut Context) -> Result<Self> {
        ctx.scope().resolve::<T>().map(Dep)
    }

    fn descriptor() -> ParamDescriptor {
        ParamDescriptor::of::<T>()
    }
}

/// Request body decoded as JSON
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

impl<T: DeserializeOwned + Send + 'static> Resolve for Json<T> {
    fn resolve(ctx: &mut Context) -> Result<Self> {
        ctx.decode_json().map(Json)
    }
}

impl Resolve for Writer {
    fn resolve(ctx: &mut Context) -> Result<Self> {
        Ok(ctx.writer().clone())
    }
}

impl Resolve for Arc<Request> {
    fn resolve(ctx: &mut Context) -> Result<Self> {
        Ok(ctx.request_arc())
    }
}

impl Resolve for Vars {
    fn resolve(ctx: &mut Context) -> Result<Self> {
        Ok(ctx.vars().clone())
    }
}

impl Resolve for CancellationToken {
    fn resolve(ctx: &mut Context) -> Result<Self> {
        Ok(ctx.cancellation().clone())
    }
}

impl Resolve for Injector {
    fn resolve(ctx: &mut Context) -> Result<Self> {
        Ok(ctx.scope().clone())
    }
}

/// Optional parameter: `None` when unresolved, other errors still fail
impl<T: Resolve> Resolve for Option<T> {
    fn resolve(ctx: &mut Context) -> Result<Self> {
        match T::resolve(ctx) {
            Ok(value) => Ok(Some(value)),
            Err(Error::Unresolved { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn descriptor() -> ParamDescriptor {
        ParamDescriptor::of::<Self>()
    }
}
