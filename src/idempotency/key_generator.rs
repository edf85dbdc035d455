/// Builds the composite idempotency key `idem:<tenant>:<op>:<resource>:<key>`
/// used by mutating HTTP endpoints that accept `Idempotency-Key`.
pub fn composite_key(tenant_id: &str, operation: &str, resource: &str, idempotency_key: &str) -> String {
    format!("idem:{tenant_id}:{operation}:{resource}:{idempotency_key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_key_has_expected_shape() {
        let key = composite_key("t1", "confirm", "pi_123", "abc");
        assert_eq!(key, "idem:t1:confirm:pi_123:abc");
    }
}
