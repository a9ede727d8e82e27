//! A tracing layer that redacts sensitive field values at emission time,
//! rather than trusting every call site to avoid logging them.

use std::fmt;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

const SENSITIVE_FIELDS: &[&str] = &[
    "authorization",
    "cookie",
    "refreshtoken",
    "accesstoken",
    "apikey",
    "password",
    "secret",
];

fn is_sensitive(name: &str) -> bool {
    SENSITIVE_FIELDS.iter().any(|f| f.eq_ignore_ascii_case(name))
}

struct LineVisitor {
    line: String,
}

impl Visit for LineVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if !self.line.is_empty() {
            self.line.push(' ');
        }
        let name = field.name();
        if is_sensitive(name) {
            self.line.push_str(&format!("{name}=[REDACTED]"));
        } else if name == "message" {
            self.line.push_str(&format!("{value:?}"));
        } else {
            self.line.push_str(&format!("{name}={value:?}"));
        }
    }
}

pub struct RedactingLayer;

impl<S> Layer<S> for RedactingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut visitor = LineVisitor {
            line: String::new(),
        };
        event.record(&mut visitor);
        println!("{} {}: {}", meta.level(), meta.target(), visitor.line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitive_field_names_match_case_insensitively() {
        assert!(is_sensitive("Authorization"));
        assert!(is_sensitive("REFRESHTOKEN"));
        assert!(!is_sensitive("user_id"));
    }
}
