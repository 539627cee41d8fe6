scoped_tls::scoped_thread_local!(static SESSION_GLOBALS: SessionGlobals);

/// Per-session global state.
///
/// Stored in scoped thread-local storage so that it is reachable from code
/// that has no handle to the session, such as `Symbol::intern` and
/// `Symbol::as_str`.
pub struct SessionGlobals {
    pub(crate) symbol_interner: crate::symbol::Interner,
}

impl Default for SessionGlobals {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionGlobals {
    /// Creates a new session globals object, with all keywords pre-interned.
    pub fn new() -> Self {
        Self { symbol_interner: crate::symbol::Interner::fresh() }
    }

    /// Sets this instance as the global instance for the duration of the
    /// closure.
    #[inline]
    #[track_caller]
    pub fn set<R>(&self, f: impl FnOnce() -> R) -> R {
        SESSION_GLOBALS.set(self, f)
    }

    /// Calls the given closure with the current session globals.
    ///
    /// # Panics
    ///
    /// Panics if `set` has not previously been called on this thread.
    #[inline]
    #[track_caller]
    pub fn with<R>(f: impl FnOnce(&Self) -> R) -> R {
        if !SESSION_GLOBALS.is_set() {
            panic!(
                "cannot access session globals without calling `set` first;\n\
                 did you forget to call `Session::enter`?"
            );
        }
        SESSION_GLOBALS.with(f)
    }

    /// Calls the closure with the current session globals if they have been
    /// set, otherwise creates a fresh instance for its duration.
    #[inline]
    pub fn with_or_default<R>(f: impl FnOnce(&Self) -> R) -> R {
        if Self::is_set() { Self::with(f) } else { Self::new().set(|| Self::with(f)) }
    }

    /// Returns `true` if the session globals have been set on this thread.
    #[inline]
    pub fn is_set() -> bool {
        SESSION_GLOBALS.is_set()
    }
}
