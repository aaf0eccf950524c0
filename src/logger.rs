use std::{io::Write, sync::Mutex};

use anyhow::Result;
use log::{LevelFilter, Metadata, Record};
use termcolor::{BufferedStandardStream, Color, ColorChoice, ColorSpec, WriteColor};
use time::{OffsetDateTime, macros::format_description};

use crate::context::REQ_CONTEXT;

/// Process-wide logger, prefixing records emitted by workers with their
/// connection details.
pub(crate) struct Logger {
    /// Max level the logger will output.
    max_level: LevelFilter,
    /// Errors go to stderr, all other records to stdout.
    stdout: Mutex<BufferedStandardStream>,
    stderr: Mutex<BufferedStandardStream>,
}

impl Logger {
    pub(crate) fn init(max_level: LevelFilter) -> Result<()> {
        log::set_max_level(max_level);
        log::set_boxed_logger(Box::new(Self {
            max_level,
            stdout: Mutex::new(BufferedStandardStream::stdout(ColorChoice::Auto)),
            stderr: Mutex::new(BufferedStandardStream::stderr(ColorChoice::Auto)),
        }))?;
        Ok(())
    }

    fn try_log(&self, out: &mut BufferedStandardStream, record: &Record) -> Result<()> {
        static LEVEL_COLORS: &[Option<Color>] = &[
            None,                 // Default.
            Some(Color::Red),     // Error.
            Some(Color::Yellow),  // Warn.
            Some(Color::Green),   // Info.
            Some(Color::Cyan),    // Debug.
            Some(Color::Magenta), // Trace.
        ];

        // Timestamps are only useful when following a connection through
        // debug! and trace! messages.
        if self.max_level >= LevelFilter::Debug {
            OffsetDateTime::now_utc().format_into(
                out,
                format_description!("[hour]:[minute]:[second].[subsecond digits:6] "),
            )?;
        }

        // Records emitted outside of a worker (e.g. by the accept loop) have
        // no context.
        if let Ok(ret) = REQ_CONTEXT.try_with(|context| -> Result<()> {
            let context = context.borrow();
            write!(out, "{}>{} ", context.peer, context.local)?;
            if let Some(target) = &context.target {
                write!(out, "({target}) ")?;
            }
            Ok(())
        }) {
            ret?;
        }

        if record.level() <= LevelFilter::Warn || self.max_level >= LevelFilter::Debug {
            out.set_color(ColorSpec::new().set_fg(LEVEL_COLORS[record.level() as usize]))?;
            write!(out, "{:5} ", record.level())?;
            out.reset()?;
        }

        writeln!(out, "{}", record.args())?;
        out.flush()?;

        Ok(())
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let out = match record.level() {
            level if level == LevelFilter::Error => &self.stderr,
            _ => &self.stdout,
        };
        // A worker panicking while holding the lock must not silence the
        // other ones.
        let mut out = out.lock().unwrap_or_else(|e| e.into_inner());

        // Not much we can do to report the error.
        let _ = self.try_log(&mut out, record);
    }

    fn flush(&self) {
        for out in [&self.stdout, &self.stderr] {
            let _ = out.lock().unwrap_or_else(|e| e.into_inner()).flush();
        }
    }
}
