//! Telemetry utilities for permission operations.

/// Standardized span constructors for permission observability.
pub mod spans {
    use crate::model::UserRef;
    use tracing::{Span, info_span};

    /// Create a span for a mutating permission or role store operation.
    pub fn mutation(op: &'static str, name: &str, guard: &str) -> Span {
        info_span!("mutation", op = op, name = %name, guard = %guard)
    }

    /// Create a span for a change to a user's roles or direct permissions.
    pub fn assignment(op: &'static str, user: &UserRef, target: &str) -> Span {
        info_span!("assignment", op = op, user = %user, target = %target)
    }

    /// Create a span for an authorization check against a user.
    pub fn check(op: &'static str, user: &UserRef, target: &str) -> Span {
        info_span!("check", op = op, user = %user, target = %target)
    }

    /// Create a span for a registrar reload.
    pub fn reload() -> Span {
        info_span!("registrar_reload")
    }
}

#[cfg(test)]
mod tests {
    use super::spans;
    use crate::model::UserRef;

    #[test]
    fn test_span_names() {
        let subscriber = tracing_subscriber::registry();
        tracing::subscriber::with_default(subscriber, || {
            let user = UserRef::new("user", 1);
            let name = |span: tracing::Span| span.metadata().map(|m| m.name());
            assert_eq!(name(spans::assignment("assign_role", &user, "writer")), Some("assignment"));
            assert_eq!(name(spans::mutation("create_role", "writer", "web")), Some("mutation"));
            assert_eq!(name(spans::check("has_role", &user, "writer")), Some("check"));
            assert_eq!(name(spans::reload()), Some("registrar_reload"));
        });
    }
}
