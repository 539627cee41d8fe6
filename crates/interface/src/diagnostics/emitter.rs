use super::{Diag, Level};
use crate::SourceMap;
use anstream::{AutoStream, ColorChoice};
use std::{
    io::{self, Write},
    sync::{Arc, Mutex},
};

type Writer = dyn Write + Send + 'static;

/// Dynamic diagnostic emitter. See [`Emitter`].
pub type DynEmitter = dyn Emitter + Send;

/// Diagnostic emitter.
pub trait Emitter {
    /// Emits a diagnostic.
    fn emit_diagnostic(&mut self, diagnostic: &Diag);

    /// Returns a reference to the source map, if any.
    fn source_map(&self) -> Option<&Arc<SourceMap>> {
        None
    }

    /// Returns the rendered local buffer, for emitters that have one.
    fn local_buffer(&self) -> Option<String> {
        None
    }
}

/// Diagnostic emitter that writes one line per diagnostic to an arbitrary
/// [`io::Write`] writer:
///
/// ```text
/// error in line 3: Undefined id: y
/// ```
///
/// The `in line N` part is resolved through the source map and omitted when
/// the diagnostic carries no span (e.g. runtime traps).
pub struct HumanEmitter {
    writer: AutoStream<Box<Writer>>,
    source_map: Option<Arc<SourceMap>>,
}

impl Emitter for HumanEmitter {
    fn emit_diagnostic(&mut self, diagnostic: &Diag) {
        self.write_diagnostic(diagnostic).unwrap_or_else(|e| io_panic(e));
    }

    fn source_map(&self) -> Option<&Arc<SourceMap>> {
        self.source_map.as_ref()
    }
}

impl HumanEmitter {
    /// Creates a new `HumanEmitter` that writes to the given writer.
    pub fn new<W: Write + Send + 'static>(writer: W, color: ColorChoice) -> Self {
        let writer: Box<Writer> = Box::new(writer);
        Self { writer: AutoStream::new(writer, color), source_map: None }
    }

    /// Creates a new `HumanEmitter` that writes to stderr.
    pub fn stderr(color_choice: ColorChoice) -> Self {
        // `io::Stderr` is not buffered.
        let choice = match color_choice {
            ColorChoice::Auto => AutoStream::choice(&io::stderr()),
            other => other,
        };
        Self::new(io::BufWriter::new(io::stderr()), choice)
    }

    /// Creates a new `HumanEmitter` whose output is captured by the test
    /// harness.
    pub fn test() -> Self {
        struct TestWriter;

        impl Write for TestWriter {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                // Use the `eprint!` macro so that the output can get captured
                // by the test harness.
                eprint!("{}", String::from_utf8_lossy(buf));
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                io::stderr().flush()
            }
        }

        Self::new(TestWriter, ColorChoice::Never)
    }

    /// Sets the source map.
    pub fn source_map(mut self, source_map: Option<Arc<SourceMap>>) -> Self {
        self.source_map = source_map;
        self
    }

    fn write_diagnostic(&mut self, diagnostic: &Diag) -> io::Result<()> {
        write_one_line(&mut self.writer, self.source_map.as_deref(), diagnostic)?;
        self.writer.flush()
    }
}

fn write_one_line(
    w: &mut impl Write,
    sm: Option<&SourceMap>,
    diagnostic: &Diag,
) -> io::Result<()> {
    let level = diagnostic.level();
    let style = level.style();
    write!(w, "{}{}{}", style.render(), level.to_str(), style.render_reset())?;
    if let (Some(sm), Some(span)) = (sm, diagnostic.span) {
        write!(w, " in line {}", sm.span_to_line(span))?;
    }
    writeln!(w, ": {}", diagnostic.msg)?;
    for note in &diagnostic.notes {
        let style = Level::Note.style();
        writeln!(w, "{}note{}: {note}", style.render(), style.render_reset())?;
    }
    Ok(())
}

/// Diagnostic emitter that renders into a shared in-memory buffer, colorless.
///
/// Used by tests to assert on exact diagnostic output.
pub struct BufferEmitter {
    buffer: Arc<Mutex<Vec<u8>>>,
    source_map: Option<Arc<SourceMap>>,
}

impl Default for BufferEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferEmitter {
    /// Creates a new `BufferEmitter`.
    pub fn new() -> Self {
        Self { buffer: Arc::new(Mutex::new(Vec::new())), source_map: None }
    }

    /// Sets the source map.
    pub fn source_map(mut self, source_map: Option<Arc<SourceMap>>) -> Self {
        self.source_map = source_map;
        self
    }
}

impl Emitter for BufferEmitter {
    fn emit_diagnostic(&mut self, diagnostic: &Diag) {
        let mut buffer = self.buffer.lock().unwrap();
        let mut writer = AutoStream::new(&mut *buffer, ColorChoice::Never);
        write_one_line(&mut writer, self.source_map.as_deref(), diagnostic)
            .unwrap_or_else(|e| io_panic(e));
    }

    fn source_map(&self) -> Option<&Arc<SourceMap>> {
        self.source_map.as_ref()
    }

    fn local_buffer(&self) -> Option<String> {
        Some(String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned())
    }
}

/// Diagnostic emitter that only emits fatal diagnostics, to stderr.
pub struct SilentEmitter {
    fatal_emitter: HumanEmitter,
}

impl Default for SilentEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl SilentEmitter {
    /// Creates a new `SilentEmitter`.
    pub fn new() -> Self {
        Self { fatal_emitter: HumanEmitter::stderr(ColorChoice::Auto) }
    }
}

impl Emitter for SilentEmitter {
    fn emit_diagnostic(&mut self, diagnostic: &Diag) {
        if diagnostic.level() == Level::Fatal {
            self.fatal_emitter.emit_diagnostic(diagnostic);
        }
    }
}

fn io_panic(error: io::Error) -> ! {
    panic!("failed to emit diagnostic: {error}")
}
