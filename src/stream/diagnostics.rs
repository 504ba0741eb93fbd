/// A problem found while decoding a response stream.
///
/// None of these stop decoding. They are handed to a [`DiagnosticSink`] so
/// that nothing is dropped without a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A line that is not valid JSON.
    MalformedLine { raw: String, error: String },
    /// Valid JSON without a recognized `type`.
    UnknownEventKind { kind: Option<String>, raw: String },
    /// A recognized `type` whose `value` is missing or not a string.
    InvalidValue { kind: String, raw: String },
}

pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Default sink: structured `tracing` records.
///
/// Malformed lines are logged at `error` so they reach Sentry as events;
/// the rest are warnings and end up as breadcrumbs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::MalformedLine { raw, error } => {
                tracing::error!(%raw, %error, "Malformed JSON line in response stream");
            }
            Diagnostic::UnknownEventKind { kind, raw } => {
                tracing::warn!(kind = kind.as_deref().unwrap_or("<none>"), %raw, "Unknown chunk type");
            }
            Diagnostic::InvalidValue { kind, raw } => {
                tracing::warn!(%kind, %raw, "Chunk value is missing or not a string");
            }
        }
    }
}
