use super::{
    BufferEmitter, Diag, DiagBuilder, DiagMsg, DynEmitter, ErrorGuaranteed, FatalAbort,
    HumanEmitter, Level, SilentEmitter,
};
use crate::SourceMap;
use anstream::ColorChoice;
use std::sync::{Arc, Mutex};

/// A handler that deals with errors and other compiler output.
///
/// Emitting a `Fatal` diagnostic unwinds; `Error` diagnostics are counted so
/// the driver can stop the pipeline at the first failing stage.
pub struct DiagCtxt {
    inner: Mutex<DiagCtxtInner>,
}

struct DiagCtxtInner {
    emitter: Box<DynEmitter>,
    /// The number of errors that have been emitted.
    err_count: usize,
    /// The number of warnings that have been emitted.
    warn_count: usize,
}

impl DiagCtxt {
    /// Creates a new `DiagCtxt` with the given diagnostics emitter.
    pub fn new(emitter: Box<DynEmitter>) -> Self {
        Self { inner: Mutex::new(DiagCtxtInner { emitter, err_count: 0, warn_count: 0 }) }
    }

    /// Creates a new `DiagCtxt` with a stderr emitter.
    pub fn with_stderr_emitter(source_map: Option<Arc<SourceMap>>) -> Self {
        Self::with_stderr_emitter_and_color(source_map, ColorChoice::Auto)
    }

    /// Creates a new `DiagCtxt` with a stderr emitter and a color choice.
    pub fn with_stderr_emitter_and_color(
        source_map: Option<Arc<SourceMap>>,
        color_choice: ColorChoice,
    ) -> Self {
        Self::new(Box::new(HumanEmitter::stderr(color_choice).source_map(source_map)))
    }

    /// Creates a new `DiagCtxt` with a test emitter whose output is captured
    /// by the test harness.
    pub fn with_test_emitter(source_map: Option<Arc<SourceMap>>) -> Self {
        Self::new(Box::new(HumanEmitter::test().source_map(source_map)))
    }

    /// Creates a new `DiagCtxt` that renders diagnostics into a local buffer.
    pub fn with_buffer_emitter(source_map: Option<Arc<SourceMap>>) -> Self {
        Self::new(Box::new(BufferEmitter::new().source_map(source_map)))
    }

    /// Creates a new `DiagCtxt` that emits nothing but fatal diagnostics.
    pub fn with_silent_emitter() -> Self {
        Self::new(Box::new(SilentEmitter::new()))
    }

    /// Emits the given diagnostic with this context.
    pub fn emit_diagnostic(&self, diagnostic: Diag) -> Result<(), ErrorGuaranteed> {
        let mut inner = self.inner.lock().unwrap();
        if diagnostic.is_error() {
            inner.err_count += 1;
        } else if diagnostic.level == Level::Warning {
            inner.warn_count += 1;
        }
        let is_error = diagnostic.is_error();
        inner.emitter.emit_diagnostic(&diagnostic);
        if is_error { Err(ErrorGuaranteed::new_unchecked()) } else { Ok(()) }
    }

    /// Returns the number of errors that have been emitted.
    pub fn err_count(&self) -> usize {
        self.inner.lock().unwrap().err_count
    }

    /// Returns `Err` if any errors have been emitted.
    pub fn has_errors(&self) -> Result<(), ErrorGuaranteed> {
        if self.err_count() > 0 { Err(ErrorGuaranteed::new_unchecked()) } else { Ok(()) }
    }

    /// Returns the rendered contents of a buffer emitter.
    ///
    /// Returns `None` if the underlying emitter was not created with
    /// [`with_buffer_emitter`](Self::with_buffer_emitter).
    pub fn emitted_diagnostics(&self) -> Option<String> {
        self.inner.lock().unwrap().emitter.local_buffer()
    }
}

/// `Diag` constructors.
impl DiagCtxt {
    /// Creates a builder at the given `level` with the given `msg`.
    pub fn diag<G: super::EmissionGuarantee>(
        &self,
        level: Level,
        msg: impl Into<DiagMsg>,
    ) -> DiagBuilder<'_, G> {
        DiagBuilder::new(self, level, msg)
    }

    /// Creates a builder at the `Fatal` level; emitting it unwinds.
    pub fn fatal(&self, msg: impl Into<DiagMsg>) -> DiagBuilder<'_, FatalAbort> {
        self.diag(Level::Fatal, msg)
    }

    /// Creates a builder at the `Error` level.
    pub fn err(&self, msg: impl Into<DiagMsg>) -> DiagBuilder<'_, ErrorGuaranteed> {
        self.diag(Level::Error, msg)
    }

    /// Creates a builder at the `Warning` level.
    pub fn warn(&self, msg: impl Into<DiagMsg>) -> DiagBuilder<'_, ()> {
        self.diag(Level::Warning, msg)
    }

    /// Creates a builder at the `Note` level.
    pub fn note(&self, msg: impl Into<DiagMsg>) -> DiagBuilder<'_, ()> {
        self.diag(Level::Note, msg)
    }
}
