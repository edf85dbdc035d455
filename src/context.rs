//! Ambient correlation context threaded through every request and worker task.
//!
//! Expressed with `tokio::task_local!`, the idiomatic async-Rust equivalent of
//! a context-local variable (a process-global would leak across concurrent
//! requests).

use uuid::Uuid;

tokio::task_local! {
    static CORRELATION_ID: String;
    static TENANT_ID: String;
    static SUBJECT: String;
}

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub correlation_id: String,
    pub tenant_id: String,
    pub subject: String,
}

impl RequestContext {
    pub fn new(tenant_id: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            correlation_id: new_correlation_id(),
            tenant_id: tenant_id.into(),
            subject: subject.into(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

pub fn new_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Runs `f` with the given context bound to this task's ambient storage.
pub async fn scope<F, T>(ctx: RequestContext, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    CORRELATION_ID
        .scope(
            ctx.correlation_id,
            TENANT_ID.scope(ctx.tenant_id, SUBJECT.scope(ctx.subject, f)),
        )
        .await
}

pub fn correlation_id() -> String {
    CORRELATION_ID.try_with(|v| v.clone()).unwrap_or_default()
}

pub fn tenant_id() -> String {
    TENANT_ID.try_with(|v| v.clone()).unwrap_or_default()
}

pub fn subject() -> String {
    SUBJECT.try_with(|v| v.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scope_makes_context_visible_inside_but_not_outside() {
        assert_eq!(correlation_id(), "");

        let ctx = RequestContext::new("tenant-1", "user-1").with_correlation_id("corr-1");
        scope(ctx, async {
            assert_eq!(correlation_id(), "corr-1");
            assert_eq!(tenant_id(), "tenant-1");
            assert_eq!(subject(), "user-1");
        })
        .await;

        assert_eq!(correlation_id(), "");
    }

    #[test]
    fn new_correlation_id_is_not_empty() {
        assert!(!new_correlation_id().is_empty());
    }
}
