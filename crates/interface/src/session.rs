use crate::{
    ColorChoice, SessionGlobals, SourceMap,
    diagnostics::{DiagCtxt, HumanEmitter},
};
use std::sync::Arc;

/// Information about the current compiler session.
pub struct Session {
    /// The diagnostics context.
    pub dcx: DiagCtxt,
    /// The source map.
    source_map: Arc<SourceMap>,
    /// The globals, entered with [`enter`](Self::enter).
    globals: SessionGlobals,
}

impl Session {
    /// Creates a new session builder.
    #[inline]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Returns the source map.
    #[inline]
    pub fn source_map(&self) -> &SourceMap {
        &self.source_map
    }

    /// Returns a shared reference-counted handle to the source map.
    #[inline]
    pub fn clone_source_map(&self) -> Arc<SourceMap> {
        self.source_map.clone()
    }

    /// Sets up the session globals for the duration of the closure.
    ///
    /// All parsing must happen inside `enter`, since `Symbol` interning
    /// requires the globals.
    #[inline]
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        self.globals.set(f)
    }
}

/// [`Session`] builder.
#[derive(Default)]
#[must_use = "builders don't do anything unless you call `build`"]
pub struct SessionBuilder {
    dcx: Option<DiagCtxt>,
    source_map: Option<Arc<SourceMap>>,
}

impl SessionBuilder {
    /// Sets the diagnostic context.
    ///
    /// The context's emitter should share the builder's source map; prefer
    /// the `with_*_emitter` helpers which guarantee that.
    pub fn dcx(mut self, dcx: DiagCtxt) -> Self {
        self.dcx = Some(dcx);
        self
    }

    /// Sets the source map.
    pub fn source_map(mut self, source_map: Arc<SourceMap>) -> Self {
        self.source_map = Some(source_map);
        self
    }

    /// Sets the diagnostic context to a stderr emitter.
    pub fn with_stderr_emitter(self) -> Self {
        self.with_stderr_emitter_and_color(ColorChoice::Auto)
    }

    /// Sets the diagnostic context to a stderr emitter with a color choice.
    pub fn with_stderr_emitter_and_color(mut self, color_choice: ColorChoice) -> Self {
        let sm = self.get_source_map();
        self.dcx(DiagCtxt::new(Box::new(
            HumanEmitter::stderr(color_choice).source_map(Some(sm)),
        )))
    }

    /// Sets the diagnostic context to a test emitter.
    pub fn with_test_emitter(mut self) -> Self {
        let sm = self.get_source_map();
        self.dcx(DiagCtxt::with_test_emitter(Some(sm)))
    }

    /// Sets the diagnostic context to an emitter rendering into a local
    /// buffer, retrievable with `dcx.emitted_diagnostics()`.
    pub fn with_buffer_emitter(mut self) -> Self {
        let sm = self.get_source_map();
        self.dcx(DiagCtxt::with_buffer_emitter(Some(sm)))
    }

    /// Sets the diagnostic context to a silent emitter.
    pub fn with_silent_emitter(self) -> Self {
        self.dcx(DiagCtxt::with_silent_emitter())
    }

    fn get_source_map(&mut self) -> Arc<SourceMap> {
        self.source_map.get_or_insert_with(Default::default).clone()
    }

    /// Consumes the builder to create a new session.
    ///
    /// Defaults to a stderr emitter if no diagnostic context was set.
    pub fn build(mut self) -> Session {
        let source_map = self.get_source_map();
        let dcx = match self.dcx {
            Some(dcx) => dcx,
            None => DiagCtxt::with_stderr_emitter(Some(source_map.clone())),
        };
        Session { dcx, source_map, globals: SessionGlobals::new() }
    }
}
