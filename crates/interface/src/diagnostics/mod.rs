//! Diagnostics implementation.
//!
//! A reduced take on [`rustc_errors`]: diagnostics are built with a
//! [`DiagBuilder`], emitted through a [`DiagCtxt`] into an [`Emitter`], and
//! rendered as single lines of the form `error in line <N>: <message>`.
//!
//! [`rustc_errors`]: https://github.com/rust-lang/rust/tree/master/compiler/rustc_errors

use crate::Span;
use anstyle::{AnsiColor, Color};
use std::{borrow::Cow, fmt, panic, process::ExitCode};

mod builder;
pub use builder::{DiagBuilder, EmissionGuarantee};

mod context;
pub use context::DiagCtxt;

mod emitter;
pub use emitter::{BufferEmitter, DynEmitter, Emitter, HumanEmitter, SilentEmitter};

/// Proof that an error diagnostic has been emitted, so callers need not
/// continue checking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ErrorGuaranteed(());

impl ErrorGuaranteed {
    /// Creates a new `ErrorGuaranteed`.
    ///
    /// Use of this method is discouraged outside of diagnostic machinery.
    #[inline]
    pub const fn new_unchecked() -> Self {
        Self(())
    }
}

/// Marker type which enables fatal diagnostics: emitting one unwinds.
pub struct FatalAbort(());

/// Used as a return value to signify that a fatal error occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub struct FatalError;

impl FatalError {
    /// Raises a fatal error that can be caught by [`catch`](Self::catch).
    pub fn raise(self) -> ! {
        panic::resume_unwind(Box::new(self))
    }

    /// Catches a fatal error raised by [`raise`](Self::raise) or by emitting
    /// a [`DiagCtxt::fatal`] diagnostic.
    pub fn catch<R>(f: impl FnOnce() -> R) -> Result<R, ErrorGuaranteed> {
        panic::catch_unwind(panic::AssertUnwindSafe(f)).map_err(|value| {
            if value.is::<Self>() || value.is::<FatalAbort>() {
                ErrorGuaranteed::new_unchecked()
            } else {
                panic::resume_unwind(value)
            }
        })
    }

    /// Catches a fatal error, mapping the outcome to a process exit code.
    pub fn catch_with_exit_code(f: impl FnOnce() -> crate::Result<()>) -> ExitCode {
        match Self::catch(f).and_then(std::convert::identity) {
            Ok(()) => ExitCode::SUCCESS,
            Err(_) => ExitCode::FAILURE,
        }
    }
}

/// A diagnostic message.
pub type DiagMsg = Cow<'static, str>;

/// Diagnostic level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// An error that aborts the whole pipeline when emitted.
    Fatal,
    /// An error in the code being compiled. Prevents the pipeline from
    /// continuing past the current stage.
    Error,
    /// A warning. Does not prevent compilation from finishing.
    Warning,
    /// A message giving additional context.
    Note,
    /// A message suggesting how to fix something.
    Help,
}

impl Level {
    /// Returns the string representation of the level.
    pub fn to_str(self) -> &'static str {
        match self {
            Self::Fatal | Self::Error => "error",
            Self::Warning => "warning",
            Self::Note => "note",
            Self::Help => "help",
        }
    }

    /// Returns `true` if this level is an error.
    #[inline]
    pub fn is_error(self) -> bool {
        matches!(self, Self::Fatal | Self::Error)
    }

    /// Returns the style used to render the level name.
    #[inline]
    pub const fn style(self) -> anstyle::Style {
        anstyle::Style::new().fg_color(self.color()).bold()
    }

    /// Returns the color of this level.
    #[inline]
    pub const fn color(self) -> Option<Color> {
        match self {
            Self::Fatal | Self::Error => Some(Color::Ansi(AnsiColor::Red)),
            Self::Warning => Some(Color::Ansi(AnsiColor::Yellow)),
            Self::Note => Some(Color::Ansi(AnsiColor::Green)),
            Self::Help => Some(Color::Ansi(AnsiColor::Cyan)),
        }
    }
}

/// A compiler diagnostic.
#[must_use]
#[derive(Clone, Debug)]
pub struct Diag {
    pub(crate) level: Level,
    pub msg: DiagMsg,
    /// The primary location. Rendered as `in line <N>` when present.
    pub span: Option<Span>,
    /// Additional notes, rendered as their own `note:` lines.
    pub notes: Vec<DiagMsg>,
}

impl Diag {
    /// Creates a new `Diag` with a single message.
    pub fn new(level: Level, msg: impl Into<DiagMsg>) -> Self {
        Self { level, msg: msg.into(), span: None, notes: Vec::new() }
    }

    /// Returns `true` if this diagnostic is an error.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.level.is_error()
    }

    /// Returns the level of this diagnostic.
    #[inline]
    pub fn level(&self) -> Level {
        self.level
    }

    /// Sets the primary span of this diagnostic.
    pub fn span(&mut self, span: Span) -> &mut Self {
        self.span = Some(span);
        self
    }

    /// Attaches a note to this diagnostic.
    pub fn note(&mut self, msg: impl Into<DiagMsg>) -> &mut Self {
        self.notes.push(msg.into());
        self
    }
}

impl fmt::Display for Diag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level.to_str(), self.msg)
    }
}
