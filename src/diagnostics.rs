use codespan_reporting::diagnostic::Diagnostic as CsDiagnostic;
use codespan_reporting::diagnostic::Label;
use codespan_reporting::files::SimpleFile;
use codespan_reporting::term::termcolor::Buffer;
use codespan_reporting::term::{emit, Config};
use miette::Diagnostic as MietteDiagnostic;
use std::ops::Range;

use crate::interpreter::Error;

fn location_of_miette_diagnostic(diag: &impl MietteDiagnostic) -> Option<(Range<usize>, Option<String>)> {
    let mut first_secondary = None;
    if let Some(labels) = diag.labels() {
        for label in labels {
            let start = label.offset();
            let location = (start..start + label.len(), label.label().map(str::to_string));

            // If this label is primary, return its span immediately
            if label.primary() {
                return Some(location);
            }

            // Save the first label as a fallback
            if first_secondary.is_none() {
                first_secondary = Some(location);
            }
        }
    }
    first_secondary
}

// one past the last character that is not a line break
fn end_of_input(source: &str) -> Range<usize> {
    let offset = source.trim_end_matches(|c| c == '\n' || c == '\r').len();
    offset..offset
}

fn clamp(range: Range<usize>, len: usize) -> Range<usize> {
    range.start.min(len)..range.end.min(len)
}

fn to_codespan_diagnostic(error: &Error, source: &str) -> CsDiagnostic<()> {
    let mut diag = CsDiagnostic::<()>::error().with_message(error.to_string());

    if let Some((range, message)) = location_of_miette_diagnostic(error) {
        let range = match error {
            Error::Parse(e) if e.at_eof => end_of_input(source),
            _ => clamp(range, source.len()),
        };
        let mut label = Label::primary((), range);
        if let Some(message) = message {
            label = label.with_message(message);
        }
        diag.labels.push(label);
    }

    // spans of nested errors point into other files, so the chain is rendered as notes
    let mut current = error;
    while let Error::ImportFailed { path, cause, .. } | Error::RunFileFailed { path, cause, .. } =
        current
    {
        diag.notes.push(format!("while loading '{}'", path.display()));
        current = cause.as_ref();
    }
    if !std::ptr::eq(current, error) {
        diag.notes.push(format!("caused by: {current}"));
    }

    diag
}

/// Renders `error` against the text it was raised for.
pub fn format_diagnostic(error: &Error, filename: &str, source: &str, colored: bool) -> String {
    let file = SimpleFile::new(filename, source);
    let diagnostic = to_codespan_diagnostic(error, source);

    let mut writer = if colored {
        Buffer::ansi()
    } else {
        Buffer::no_color()
    };

    match emit(&mut writer, &Config::default(), &file, &diagnostic) {
        Ok(()) => String::from_utf8_lossy(writer.as_slice()).into_owned(),
        Err(_) => format!("error: {error}\n"),
    }
}
