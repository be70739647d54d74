//! Low-level capability table for native consumers.
//!
//! Components that need proxy support without going through the named module functions
//! take a [`ProxyApi`] from the runtime at set-up and call through its function
//! pointers. The table only grows: fields are appended and `version` bumped, so a
//! consumer built against version `n` works with any table whose version is `>= n`.

use crate::{
    exception::{ExcType, RunResult},
    heap::HeapId,
    runtime::Runtime,
    value::Value,
};

/// Version of the [`ProxyApi`] layout published by this crate.
pub const PROXY_API_VERSION: u32 = 1;

/// Entry points for proxy support.
///
/// `None` arguments stand for a missing object on the consumer's side.
#[derive(Debug, Clone, Copy)]
pub struct ProxyApi {
    pub version: u32,
    /// `ProxyBase` of the runtime that published the table.
    pub proxy_class: HeapId,
    /// Whether the value is a proxy of any kind. `None` is not.
    pub check: fn(&Runtime, Option<&Value>) -> bool,
    /// Wraps the value in a new `ProxyBase`; `None` is a `ValueError`.
    pub create: fn(&mut Runtime, Option<&Value>) -> RunResult<Value>,
    /// The immediate target; `None` is a `RuntimeError`, a non-proxy a `TypeError`.
    pub get_object: fn(&Runtime, Option<&Value>) -> RunResult<Value>,
}

impl ProxyApi {
    /// Fails unless this table provides at least `version`.
    pub fn require(&self, version: u32) -> RunResult<()> {
        if self.version < version {
            return Err(ExcType::runtime_error(format!(
                "proxy API version {version} required, runtime provides {}",
                self.version
            )));
        }
        Ok(())
    }
}

fn api_check(rt: &Runtime, obj: Option<&Value>) -> bool {
    obj.is_some_and(|obj| rt.is_proxy_instance(obj))
}

fn api_create(rt: &mut Runtime, obj: Option<&Value>) -> RunResult<Value> {
    let Some(obj) = obj else {
        return Err(ExcType::invalid_target());
    };
    rt.create_proxy(obj)
}

fn api_get_object(rt: &Runtime, proxy: Option<&Value>) -> RunResult<Value> {
    let Some(proxy) = proxy else {
        return Err(ExcType::runtime_error("cannot pass NULL to ProxyApi.get_object()"));
    };
    rt.proxy_target(proxy)
}

impl Runtime {
    /// The capability table for this runtime.
    #[must_use]
    pub fn proxy_api(&self) -> ProxyApi {
        ProxyApi {
            version: PROXY_API_VERSION,
            proxy_class: self.proxy_class(),
            check: api_check,
            create: api_create,
            get_object: api_get_object,
        }
    }
}
