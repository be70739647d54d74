use std::fmt;

/// Error returned when a resource limit is exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Maximum number of allocations exceeded.
    Allocation { limit: usize, count: usize },
    /// Maximum memory usage exceeded.
    Memory { limit: usize, used: usize },
    /// Maximum forwarding depth exceeded.
    Recursion { limit: usize, depth: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => {
                write!(f, "allocation limit exceeded: {count} > {limit}")
            }
            Self::Memory { limit, used } => {
                write!(f, "memory limit exceeded: {used} bytes > {limit} bytes")
            }
            Self::Recursion { .. } => write!(f, "maximum recursion depth exceeded"),
        }
    }
}

impl std::error::Error for ResourceError {}

/// Recommended maximum forwarding depth if not otherwise specified.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

/// Default cadence of automatic cycle collection, in tracked allocations.
pub const DEFAULT_GC_INTERVAL: usize = 10_000;

/// Trait for tracking resource usage and scheduling cycle collection.
///
/// The heap calls into the tracker on every allocation and free; the runtime asks it
/// for the recursion limit before forwarding an operation one proxy layer deeper.
pub trait ResourceTracker: fmt::Debug {
    /// Called before each heap allocation.
    ///
    /// `get_size` is only evaluated when a memory limit is configured.
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError>;

    /// Called when an entry is freed, either by `dec_ref` or by the cycle collector.
    fn on_free(&mut self, get_size: impl FnOnce() -> usize);

    /// Called before descending one more level of nested forwarding.
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError>;

    /// Number of tracked allocations between automatic collections, `None` to disable.
    fn gc_interval(&self) -> Option<usize>;
}

/// Configuration for resource limits.
///
/// All limits are optional. `ResourceLimits::default()` imposes none beyond the
/// default recursion depth and collection interval.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Maximum number of heap allocations allowed.
    pub max_allocations: Option<usize>,
    /// Maximum heap memory in bytes (approximate).
    pub max_memory: Option<usize>,
    /// Maximum depth of nested forwarding through proxies.
    pub max_recursion_depth: Option<usize>,
    /// Run cycle collection every N tracked allocations.
    pub gc_interval: Option<usize>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_allocations: None,
            max_memory: None,
            max_recursion_depth: Some(DEFAULT_MAX_RECURSION_DEPTH),
            gc_interval: Some(DEFAULT_GC_INTERVAL),
        }
    }
}

impl ResourceLimits {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of allocations.
    #[must_use]
    pub fn max_allocations(mut self, limit: usize) -> Self {
        self.max_allocations = Some(limit);
        self
    }

    /// Sets the maximum memory usage in bytes.
    #[must_use]
    pub fn max_memory(mut self, limit: usize) -> Self {
        self.max_memory = Some(limit);
        self
    }

    /// Sets the maximum forwarding depth.
    #[must_use]
    pub fn max_recursion_depth(mut self, limit: Option<usize>) -> Self {
        self.max_recursion_depth = limit;
        self
    }

    /// Sets the collection interval, `None` disables automatic collection.
    #[must_use]
    pub fn gc_interval(mut self, interval: Option<usize>) -> Self {
        self.gc_interval = interval;
        self
    }
}

/// A tracker that never refuses an allocation.
///
/// Still enforces the default recursion depth so runaway forwarding cannot
/// overflow the native stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self, _get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn on_free(&mut self, _get_size: impl FnOnce() -> usize) {}

    #[inline]
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        check_depth(DEFAULT_MAX_RECURSION_DEPTH, current_depth)
    }

    #[inline]
    fn gc_interval(&self) -> Option<usize> {
        Some(DEFAULT_GC_INTERVAL)
    }
}

/// A resource tracker that enforces configurable limits.
#[derive(Debug, Clone)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    allocation_count: usize,
    current_memory: usize,
}

impl LimitedTracker {
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            allocation_count: 0,
            current_memory: 0,
        }
    }

    /// Returns the number of allocations made since the tracker was installed.
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    /// Returns the current approximate memory usage.
    #[must_use]
    pub fn current_memory(&self) -> usize {
        self.current_memory
    }

    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_allocations
            && self.allocation_count >= max
        {
            return Err(ResourceError::Allocation {
                limit: max,
                count: self.allocation_count + 1,
            });
        }

        if let Some(max) = self.limits.max_memory {
            let new_memory = self.current_memory + get_size();
            if new_memory > max {
                return Err(ResourceError::Memory {
                    limit: max,
                    used: new_memory,
                });
            }
            self.current_memory = new_memory;
        }

        self.allocation_count += 1;
        Ok(())
    }

    fn on_free(&mut self, get_size: impl FnOnce() -> usize) {
        if self.limits.max_memory.is_some() {
            self.current_memory = self.current_memory.saturating_sub(get_size());
        }
    }

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        match self.limits.max_recursion_depth {
            Some(limit) => check_depth(limit, current_depth),
            None => Ok(()),
        }
    }

    fn gc_interval(&self) -> Option<usize> {
        self.limits.gc_interval
    }
}

#[inline]
fn check_depth(limit: usize, current_depth: usize) -> Result<(), ResourceError> {
    if current_depth >= limit {
        Err(ResourceError::Recursion {
            limit,
            depth: current_depth + 1,
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_limit() {
        let mut tracker = LimitedTracker::new(ResourceLimits::new().max_allocations(2));
        assert!(tracker.on_allocate(|| 8).is_ok());
        assert!(tracker.on_allocate(|| 8).is_ok());
        assert_eq!(
            tracker.on_allocate(|| 8),
            Err(ResourceError::Allocation { limit: 2, count: 3 })
        );
    }

    #[test]
    fn memory_is_returned_on_free() {
        let mut tracker = LimitedTracker::new(ResourceLimits::new().max_memory(100));
        tracker.on_allocate(|| 60).unwrap();
        assert!(tracker.on_allocate(|| 60).is_err());
        tracker.on_free(|| 60);
        assert!(tracker.on_allocate(|| 60).is_ok());
        assert_eq!(tracker.current_memory(), 60);
    }

    #[test]
    fn unlimited_depth_never_fails() {
        let tracker = LimitedTracker::new(ResourceLimits::new().max_recursion_depth(None));
        assert!(tracker.check_recursion_depth(usize::MAX - 1).is_ok());
        let tracker = LimitedTracker::new(ResourceLimits::new().max_recursion_depth(Some(3)));
        assert_eq!(
            tracker.check_recursion_depth(3),
            Err(ResourceError::Recursion { limit: 3, depth: 4 })
        );
    }
}
